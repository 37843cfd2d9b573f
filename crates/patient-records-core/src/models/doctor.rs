//! Doctor identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of an authenticated doctor, as issued by the identity provider.
///
/// This is the sole authorization scope for patient records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DoctorId(String);

impl DoctorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DoctorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DoctorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DoctorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
