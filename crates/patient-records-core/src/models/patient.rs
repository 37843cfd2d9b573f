//! Patient models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DoctorId;

/// Current time at the precision records are stored with (microseconds).
pub fn stamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The mutable, free-form part of a patient record.
///
/// Doubles as the intake form and as the shadow edit buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatientFields {
    pub name: String,
    pub age: String,
    /// Free text, e.g. "120/80"
    pub blood_pressure: String,
    pub disease: String,
    pub prescription: String,
}

impl PatientFields {
    /// Create fields with just a name and age (the two required at intake).
    pub fn new(name: impl Into<String>, age: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: age.into(),
            ..Default::default()
        }
    }

    /// Read a single field.
    pub fn get(&self, field: EditableField) -> &str {
        match field {
            EditableField::Name => &self.name,
            EditableField::Age => &self.age,
            EditableField::BloodPressure => &self.blood_pressure,
            EditableField::Disease => &self.disease,
            EditableField::Prescription => &self.prescription,
        }
    }

    /// Overwrite a single field.
    pub fn set(&mut self, field: EditableField, value: String) {
        let slot = match field {
            EditableField::Name => &mut self.name,
            EditableField::Age => &mut self.age,
            EditableField::BloodPressure => &mut self.blood_pressure,
            EditableField::Disease => &mut self.disease,
            EditableField::Prescription => &mut self.prescription,
        };
        *slot = value;
    }
}

/// A stored patient record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Store-assigned identifier, stable for the document lifetime
    pub id: String,
    /// Owning doctor, set at creation and never changed
    pub doctor_id: DoctorId,
    #[serde(flatten)]
    pub fields: PatientFields,
    pub created_at: DateTime<Utc>,
    /// Stamped on every successful write
    pub last_visit_date: DateTime<Utc>,
}

/// Everything the store needs to create a record, minus its id and owner.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatientRecord {
    pub fields: PatientFields,
    pub created_at: DateTime<Utc>,
    pub last_visit_date: DateTime<Utc>,
}

impl NewPatientRecord {
    /// Stamp both timestamps with the current time.
    pub fn now(fields: PatientFields) -> Self {
        let now = stamp_now();
        Self {
            fields,
            created_at: now,
            last_visit_date: now,
        }
    }
}

/// A mutable field that may be edited through a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EditableField {
    Name,
    Age,
    BloodPressure,
    Disease,
    Prescription,
}

impl EditableField {
    pub const ALL: [EditableField; 5] = [
        EditableField::Name,
        EditableField::Age,
        EditableField::BloodPressure,
        EditableField::Disease,
        EditableField::Prescription,
    ];

    /// Document key used on the wire and in form state.
    pub fn wire_name(self) -> &'static str {
        match self {
            EditableField::Name => "name",
            EditableField::Age => "age",
            EditableField::BloodPressure => "bloodPressure",
            EditableField::Disease => "disease",
            EditableField::Prescription => "prescription",
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Store-controlled fields that the edit path must never write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedField {
    Id,
    DoctorId,
    CreatedAt,
    LastVisitDate,
}

/// A field name as supplied by a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Editable(EditableField),
    Protected(ProtectedField),
}

/// Returned when a field name matches nothing in the record schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown patient field '{0}'")]
pub struct UnknownField(pub String);

impl FromStr for FieldName {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = match s {
            "id" => FieldName::Protected(ProtectedField::Id),
            "doctorId" => FieldName::Protected(ProtectedField::DoctorId),
            "createdAt" => FieldName::Protected(ProtectedField::CreatedAt),
            "lastVisitDate" => FieldName::Protected(ProtectedField::LastVisitDate),
            other => {
                let field = EditableField::ALL
                    .into_iter()
                    .find(|f| f.wire_name() == other)
                    .ok_or_else(|| UnknownField(other.to_string()))?;
                FieldName::Editable(field)
            }
        };
        Ok(name)
    }
}

/// Partial update written by a submit.
///
/// Only the fields that were changed are present; `last_visit_date` always is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
    pub last_visit_date: DateTime<Utc>,
}

impl PatientPatch {
    /// A patch that only touches the visit timestamp.
    pub fn touch(last_visit_date: DateTime<Utc>) -> Self {
        Self {
            name: None,
            age: None,
            blood_pressure: None,
            disease: None,
            prescription: None,
            last_visit_date,
        }
    }

    /// Build a patch holding every field of `edited` that differs from `base`.
    pub fn diff(base: &PatientFields, edited: &PatientFields, last_visit_date: DateTime<Utc>) -> Self {
        let mut patch = Self::touch(last_visit_date);
        for field in EditableField::ALL {
            if base.get(field) != edited.get(field) {
                patch.set(field, edited.get(field).to_string());
            }
        }
        patch
    }

    pub fn set(&mut self, field: EditableField, value: String) {
        let slot = match field {
            EditableField::Name => &mut self.name,
            EditableField::Age => &mut self.age,
            EditableField::BloodPressure => &mut self.blood_pressure,
            EditableField::Disease => &mut self.disease,
            EditableField::Prescription => &mut self.prescription,
        };
        *slot = Some(value);
    }

    pub fn get(&self, field: EditableField) -> Option<&str> {
        match field {
            EditableField::Name => self.name.as_deref(),
            EditableField::Age => self.age.as_deref(),
            EditableField::BloodPressure => self.blood_pressure.as_deref(),
            EditableField::Disease => self.disease.as_deref(),
            EditableField::Prescription => self.prescription.as_deref(),
        }
    }

    /// Fields carried by this patch, in schema order.
    pub fn changes(&self) -> impl Iterator<Item = (EditableField, &str)> + '_ {
        EditableField::ALL
            .into_iter()
            .filter_map(move |field| self.get(field).map(|value| (field, value)))
    }

    /// True if only the timestamp would be written.
    pub fn is_touch_only(&self) -> bool {
        self.changes().next().is_none()
    }
}
