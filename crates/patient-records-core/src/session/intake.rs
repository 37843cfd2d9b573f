//! New-patient intake.

use tracing::info;

use super::{SessionError, SessionResult};
use crate::identity::IdentityProvider;
use crate::models::{NewPatientRecord, PatientFields};
use crate::store::{RecordRef, RecordStore};

/// Create a record owned by the current doctor from an intake form.
///
/// Name and age are required. Both timestamps are set to the same instant.
pub fn create_patient<S, P>(store: &S, identity: &P, form: PatientFields) -> SessionResult<RecordRef>
where
    S: RecordStore + ?Sized,
    P: IdentityProvider + ?Sized,
{
    let doctor = identity
        .current_doctor_id()
        .ok_or(SessionError::Unauthenticated)?;

    if form.name.trim().is_empty() || form.age.trim().is_empty() {
        return Err(SessionError::InvalidInput(
            "patient name and age are required".into(),
        ));
    }

    let record = store.create_record(&doctor, &NewPatientRecord::now(form))?;
    info!(record_id = record.id(), doctor_id = %doctor, "New patient admitted");
    Ok(record)
}
