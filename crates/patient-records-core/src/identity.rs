//! Identity provider contract.
//!
//! Sign-in itself happens outside this crate; sessions only ask who the
//! current doctor is.

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::models::DoctorId;

/// Supplies the authenticated doctor, if any.
pub trait IdentityProvider {
    fn current_doctor_id(&self) -> Option<DoctorId>;
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    fn current_doctor_id(&self) -> Option<DoctorId> {
        (**self).current_doctor_id()
    }
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for &P {
    fn current_doctor_id(&self) -> Option<DoctorId> {
        (**self).current_doctor_id()
    }
}

/// A fixed identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIdentity(Option<DoctorId>);

impl StaticIdentity {
    pub fn signed_in(doctor: impl Into<DoctorId>) -> Self {
        Self(Some(doctor.into()))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_doctor_id(&self) -> Option<DoctorId> {
        self.0.clone()
    }
}

/// Shared auth state a host updates whenever its identity provider reports
/// a sign-in or sign-out.
#[derive(Debug, Default)]
pub struct AuthState {
    current: RwLock<Option<DoctorId>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, doctor: DoctorId) {
        debug!(doctor_id = %doctor, "Doctor signed in");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(doctor);
    }

    pub fn sign_out(&self) {
        debug!("Doctor signed out");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl IdentityProvider for AuthState {
    fn current_doctor_id(&self) -> Option<DoctorId> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
