//! Shadow edit buffer.

use chrono::{DateTime, Utc};

use crate::models::{EditableField, PatientFields, PatientPatch, PatientRecord};

/// Local copy of a record's mutable fields.
///
/// `base` is what the buffer was last synced from; `fields` is what the user
/// has typed since. A submit writes only the difference, so fields the user
/// never touched cannot overwrite changes pushed by someone else meanwhile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBuffer {
    base: PatientFields,
    fields: PatientFields,
}

impl EditBuffer {
    /// Replace both the base and the edits with the record's current fields.
    pub fn resync(&mut self, record: &PatientRecord) {
        self.base = record.fields.clone();
        self.fields = record.fields.clone();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set(&mut self, field: EditableField, value: String) {
        self.fields.set(field, value);
    }

    pub fn fields(&self) -> &PatientFields {
        &self.fields
    }

    /// Partial update carrying the edited fields and `last_visit_date`.
    pub fn to_patch(&self, last_visit_date: DateTime<Utc>) -> PatientPatch {
        PatientPatch::diff(&self.base, &self.fields, last_visit_date)
    }
}
