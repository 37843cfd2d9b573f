//! Patient Records Core Library
//!
//! Doctor-scoped patient records with live-synced search and editing.
//!
//! # Architecture
//!
//! ```text
//!   record id ──▶ scoped lookup (doctor_id, id) ──miss──▶ NotFound
//!                          │
//!                         hit
//!                          ▼
//!                 live subscription ──push──▶ displayed record
//!                          │                        │
//!                          │              (not editing) resync
//!                          ▼                        ▼
//!                     store write ◀──submit── shadow edit buffer
//! ```
//!
//! # Core Principle
//!
//! **Authorize before transmitting.** A record is only ever streamed to the
//! doctor who owns it; the owner check happens before a subscription opens.
//!
//! # Modules
//!
//! - [`session`]: search/view/edit state machine and new-patient intake
//! - [`store`]: record store contract and the SQLite implementation
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (PatientRecord, PatientFields, PatientPatch, etc.)
//! - [`identity`]: identity provider contract
//! - [`config`] / [`logging`]: store configuration and tracing setup

pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod models;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::StoreConfig;
pub use db::Database;
pub use identity::{AuthState, IdentityProvider, StaticIdentity};
pub use models::{
    DoctorId, EditableField, NewPatientRecord, PatientFields, PatientPatch, PatientRecord,
};
pub use session::{
    create_patient, FieldUpdate, PatientRecordSession, SearchOutcome, SessionError, SessionState,
};
pub use store::{RecordEvent, RecordRef, RecordStore, SqliteRecordStore, StoreError, Subscription};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PatientRecordsError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("No active record")]
    NoActiveRecord,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Store error: {0}")]
    StoreUnavailable(String),

    #[error("Session disposed")]
    Disposed,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<SessionError> for PatientRecordsError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Unauthenticated => PatientRecordsError::Unauthenticated,
            SessionError::NoActiveRecord => PatientRecordsError::NoActiveRecord,
            SessionError::InvalidInput(msg) => PatientRecordsError::InvalidInput(msg),
            e @ SessionError::InvalidTransition { .. } => {
                PatientRecordsError::InvalidState(e.to_string())
            }
            SessionError::StoreUnavailable(msg) => PatientRecordsError::StoreUnavailable(msg),
            SessionError::Disposed => PatientRecordsError::Disposed,
        }
    }
}

impl From<StoreError> for PatientRecordsError {
    fn from(e: StoreError) -> Self {
        PatientRecordsError::StoreUnavailable(e.to_string())
    }
}

impl From<config::ConfigError> for PatientRecordsError {
    fn from(e: config::ConfigError) -> Self {
        PatientRecordsError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for PatientRecordsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PatientRecordsError::StoreUnavailable(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a record database at the given path.
#[uniffi::export]
pub fn open_records(path: String) -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let store = SqliteRecordStore::open(&path)?;
    Ok(PatientRecordsCore::with_store(store))
}

/// Create an in-memory record database (for testing).
#[uniffi::export]
pub fn open_records_in_memory() -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let store = SqliteRecordStore::open_in_memory()?;
    Ok(PatientRecordsCore::with_store(store))
}

/// Open records from a JSON [`StoreConfig`], installing tracing with its filter.
#[uniffi::export]
pub fn open_records_with_config(
    config_json: String,
) -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let config = StoreConfig::from_json_str(&config_json)?;
    logging::init_tracing(&config.log_filter);
    let store = SqliteRecordStore::from_config(&config)?;
    Ok(PatientRecordsCore::with_store(store))
}

// =========================================================================
// Main API Object
// =========================================================================

type SharedSession = PatientRecordSession<Arc<SqliteRecordStore>, Arc<AuthState>>;

/// Thread-safe session wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PatientRecordsCore {
    auth: Arc<AuthState>,
    session: Mutex<SharedSession>,
}

impl PatientRecordsCore {
    /// Close the open record if the signed-in doctor no longer owns it.
    fn revalidate(&self) -> Result<(), PatientRecordsError> {
        // A closed record shows up in state(), not as an error here
        let _ = self.session.lock()?.check_identity();
        Ok(())
    }

    fn with_store(store: SqliteRecordStore) -> Arc<Self> {
        let auth = Arc::new(AuthState::new());
        let session = PatientRecordSession::new(Arc::new(store), auth.clone());
        Arc::new(Self {
            auth,
            session: Mutex::new(session),
        })
    }
}

#[uniffi::export]
impl PatientRecordsCore {
    // =========================================================================
    // Identity
    // =========================================================================

    /// Record that the identity provider signed a doctor in.
    ///
    /// A record opened by a different doctor is closed.
    pub fn sign_in(&self, doctor_id: String) -> Result<(), PatientRecordsError> {
        self.auth.sign_in(DoctorId::new(doctor_id));
        self.revalidate()
    }

    /// Record that the identity provider signed the doctor out, closing any open record.
    pub fn sign_out(&self) -> Result<(), PatientRecordsError> {
        self.auth.sign_out();
        self.revalidate()
    }

    // =========================================================================
    // Record Workflow
    // =========================================================================

    /// Create a patient from the intake form and open it. Returns the new record id.
    pub fn create_patient(&self, form: FfiPatientFields) -> Result<String, PatientRecordsError> {
        let mut session = self.session.lock()?;
        session.create_and_open(form.into())?;
        let id = session
            .resolved()
            .map(|record| record.id().to_string())
            .ok_or(PatientRecordsError::NoActiveRecord)?;
        Ok(id)
    }

    /// Search for a record by id. Returns true if an owned record was found.
    pub fn search(&self, record_id: String) -> Result<bool, PatientRecordsError> {
        let mut session = self.session.lock()?;
        let outcome = session.search(&record_id)?;
        Ok(matches!(outcome, SearchOutcome::Found(_)))
    }

    /// Apply pending live updates. Returns how many were applied.
    ///
    /// Updates queue without bound until drained, so call this on every
    /// render tick while a record is open.
    pub fn pump(&self) -> Result<u32, PatientRecordsError> {
        let mut session = self.session.lock()?;
        Ok(u32::try_from(session.pump()).unwrap_or(u32::MAX))
    }

    /// Toggle edit mode. Returns the new state.
    pub fn toggle_edit(&self) -> Result<FfiSessionState, PatientRecordsError> {
        let mut session = self.session.lock()?;
        Ok(session.toggle_edit()?.into())
    }

    /// Set an edit-buffer field by form name. Returns false for protected fields.
    pub fn update_field(&self, name: String, value: String) -> Result<bool, PatientRecordsError> {
        let mut session = self.session.lock()?;
        let update = session.update_field(&name, value)?;
        Ok(update == FieldUpdate::Applied)
    }

    /// Write the edit buffer to the store.
    pub fn submit(&self) -> Result<(), PatientRecordsError> {
        let mut session = self.session.lock()?;
        session.submit()?;
        Ok(())
    }

    /// Cancel the live subscription.
    pub fn dispose(&self) -> Result<(), PatientRecordsError> {
        self.session.lock()?.dispose();
        Ok(())
    }

    // =========================================================================
    // Read Model
    // =========================================================================

    pub fn state(&self) -> Result<FfiSessionState, PatientRecordsError> {
        Ok(self.session.lock()?.state().into())
    }

    pub fn displayed(&self) -> Result<Option<FfiPatientRecord>, PatientRecordsError> {
        let session = self.session.lock()?;
        Ok(session.displayed().cloned().map(Into::into))
    }

    pub fn edit_buffer(&self) -> Result<FfiPatientFields, PatientRecordsError> {
        let session = self.session.lock()?;
        Ok(session.edit_buffer().clone().into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSessionState {
    Idle,
    Searching,
    NotFound,
    Viewing,
    Editing,
}

impl From<SessionState> for FfiSessionState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle => FfiSessionState::Idle,
            SessionState::Searching => FfiSessionState::Searching,
            SessionState::NotFound => FfiSessionState::NotFound,
            SessionState::Viewing => FfiSessionState::Viewing,
            SessionState::Editing => FfiSessionState::Editing,
        }
    }
}

/// FFI-safe editable fields.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiPatientFields {
    pub name: String,
    pub age: String,
    pub blood_pressure: String,
    pub disease: String,
    pub prescription: String,
}

impl From<PatientFields> for FfiPatientFields {
    fn from(fields: PatientFields) -> Self {
        Self {
            name: fields.name,
            age: fields.age,
            blood_pressure: fields.blood_pressure,
            disease: fields.disease,
            prescription: fields.prescription,
        }
    }
}

impl From<FfiPatientFields> for PatientFields {
    fn from(fields: FfiPatientFields) -> Self {
        PatientFields {
            name: fields.name,
            age: fields.age,
            blood_pressure: fields.blood_pressure,
            disease: fields.disease,
            prescription: fields.prescription,
        }
    }
}

/// FFI-safe patient record. Timestamps are RFC 3339.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiPatientRecord {
    pub id: String,
    pub doctor_id: String,
    pub fields: FfiPatientFields,
    pub created_at: String,
    pub last_visit_date: String,
}

impl From<PatientRecord> for FfiPatientRecord {
    fn from(record: PatientRecord) -> Self {
        Self {
            id: record.id,
            doctor_id: record.doctor_id.to_string(),
            fields: record.fields.into(),
            created_at: record.created_at.to_rfc3339(),
            last_visit_date: record.last_visit_date.to_rfc3339(),
        }
    }
}
