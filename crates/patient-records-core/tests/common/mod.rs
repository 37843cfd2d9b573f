//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use patient_records_core::models::{DoctorId, NewPatientRecord, PatientFields, PatientPatch};
use patient_records_core::store::{
    RecordRef, RecordStore, SqliteRecordStore, StoreError, StoreResult, Subscription,
    SubscriptionId,
};
use patient_records_core::{create_patient, AuthState, PatientRecordSession, StaticIdentity};

/// SQLite store that logs writes and can be told to fail.
pub struct ScriptedStore {
    pub inner: SqliteRecordStore,
    pub fail_lookups: AtomicBool,
    pub fail_writes: AtomicBool,
    pub writes: Mutex<Vec<(RecordRef, PatientPatch)>>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteRecordStore::open_in_memory().unwrap(),
            fail_lookups: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn written(&self) -> Vec<(RecordRef, PatientPatch)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.active_subscriptions().unwrap()
    }
}

impl RecordStore for ScriptedStore {
    fn find_owned_record(
        &self,
        owner: &DoctorId,
        record_id: &str,
    ) -> StoreResult<Option<RecordRef>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("network unreachable".into()));
        }
        self.inner.find_owned_record(owner, record_id)
    }

    fn subscribe(&self, record: &RecordRef) -> StoreResult<Subscription> {
        self.inner.subscribe(record)
    }

    fn cancel(&self, subscription: SubscriptionId) -> StoreResult<()> {
        self.inner.cancel(subscription)
    }

    fn apply_partial_update(&self, record: &RecordRef, patch: &PatientPatch) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("network unreachable".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((record.clone(), patch.clone()));
        self.inner.apply_partial_update(record, patch)
    }

    fn create_record(&self, owner: &DoctorId, record: &NewPatientRecord) -> StoreResult<RecordRef> {
        self.inner.create_record(owner, record)
    }
}

pub type Session = PatientRecordSession<Arc<ScriptedStore>, StaticIdentity>;

pub fn session_for(store: &Arc<ScriptedStore>, doctor: &str) -> Session {
    PatientRecordSession::new(store.clone(), StaticIdentity::signed_in(doctor))
}

pub type AuthSession = PatientRecordSession<Arc<ScriptedStore>, Arc<AuthState>>;

/// Session whose identity follows `auth`, signed in as `doctor`.
pub fn session_with_auth(
    store: &Arc<ScriptedStore>,
    doctor: &str,
) -> (Arc<AuthState>, AuthSession) {
    let auth = Arc::new(AuthState::new());
    auth.sign_in(DoctorId::new(doctor));
    (auth.clone(), PatientRecordSession::new(store.clone(), auth))
}

/// Create a record for `doctor` directly through the store.
pub fn admit(store: &ScriptedStore, doctor: &str, name: &str) -> RecordRef {
    let mut form = PatientFields::new(name, "34");
    form.blood_pressure = "120/80".into();
    form.disease = "Hypertension".into();
    create_patient(store, &StaticIdentity::signed_in(doctor), form).unwrap()
}
