//! SQLite-backed record store with in-process live subscriptions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;

use tracing::{debug, info, trace};

use super::{
    RecordEvent, RecordRef, RecordStore, StoreError, StoreResult, Subscription, SubscriptionId,
};
use crate::config::StoreConfig;
use crate::db::Database;
use crate::models::{DoctorId, NewPatientRecord, PatientPatch, PatientRecord};

/// Record store over the local patients table.
///
/// After every successful write, each subscriber of the written document
/// receives a fresh snapshot (or [`RecordEvent::Deleted`]). Lock order is
/// always database first, then subscribers.
pub struct SqliteRecordStore {
    db: Mutex<Database>,
    subscribers: Mutex<Subscribers>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_id: HashMap<SubscriptionId, Subscriber>,
}

struct Subscriber {
    record: RecordRef,
    tx: Sender<RecordEvent>,
}

impl SqliteRecordStore {
    /// Wrap an already opened database.
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            subscribers: Mutex::new(Subscribers::default()),
        }
    }

    /// Open a store at path, creating the database if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Open the store described by `config`.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        match &config.database_path {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    /// Delete an owned record, pushing [`RecordEvent::Deleted`] to its subscribers.
    ///
    /// Returns false if no owned record matched.
    pub fn delete_record(&self, record: &RecordRef) -> StoreResult<bool> {
        let db = self.db.lock()?;
        let deleted = db.delete_patient_record(record.owner(), record.id())?;
        if deleted {
            debug!(record_id = record.id(), "Patient record deleted");
            self.notify(&db, record)?;
        }
        Ok(deleted)
    }

    /// Number of subscriptions that have not been cancelled.
    pub fn active_subscriptions(&self) -> StoreResult<usize> {
        Ok(self.subscribers.lock()?.by_id.len())
    }

    fn snapshot(db: &Database, record: &RecordRef) -> StoreResult<RecordEvent> {
        let event = match db.find_owned_patient(record.owner(), record.id())? {
            Some(patient) => RecordEvent::Snapshot(patient),
            None => RecordEvent::Deleted,
        };
        Ok(event)
    }

    /// Push the current state of `record` to every subscriber of it.
    ///
    /// Callers hold the database lock so snapshots are delivered in write order.
    fn notify(&self, db: &Database, record: &RecordRef) -> StoreResult<()> {
        let event = Self::snapshot(db, record)?;
        let mut subscribers = self.subscribers.lock()?;

        // Receivers dropped without a cancel are pruned here
        subscribers.by_id.retain(|id, subscriber| {
            if subscriber.record != *record {
                return true;
            }
            let delivered = subscriber.tx.send(event.clone()).is_ok();
            if !delivered {
                trace!(subscription = %id, "Pruning disconnected subscriber");
            }
            delivered
        });
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn find_owned_record(
        &self,
        owner: &DoctorId,
        record_id: &str,
    ) -> StoreResult<Option<RecordRef>> {
        let db = self.db.lock()?;
        let found = db.owns_patient(owner, record_id)?;
        Ok(found.then(|| RecordRef::new(record_id, owner.clone())))
    }

    fn subscribe(&self, record: &RecordRef) -> StoreResult<Subscription> {
        let db = self.db.lock()?;
        let initial = Self::snapshot(&db, record)?;

        let mut subscribers = self.subscribers.lock()?;
        subscribers.next_id += 1;
        let id = SubscriptionId::new(subscribers.next_id);

        let (tx, rx) = mpsc::channel();
        // The receiver is still in hand, so this send cannot fail
        let _ = tx.send(initial);
        subscribers.by_id.insert(
            id,
            Subscriber {
                record: record.clone(),
                tx,
            },
        );

        debug!(subscription = %id, record_id = record.id(), "Subscription opened");
        Ok(Subscription::new(id, rx))
    }

    fn cancel(&self, subscription: SubscriptionId) -> StoreResult<()> {
        let removed = self.subscribers.lock()?.by_id.remove(&subscription);
        if removed.is_some() {
            debug!(subscription = %subscription, "Subscription cancelled");
        }
        Ok(())
    }

    fn apply_partial_update(&self, record: &RecordRef, patch: &PatientPatch) -> StoreResult<()> {
        let db = self.db.lock()?;
        if !db.update_patient_record(record.owner(), record.id(), patch)? {
            return Err(StoreError::Rejected(format!(
                "no record {} owned by {}",
                record.id(),
                record.owner()
            )));
        }
        debug!(record_id = record.id(), "Patient record updated");
        self.notify(&db, record)
    }

    fn create_record(&self, owner: &DoctorId, record: &NewPatientRecord) -> StoreResult<RecordRef> {
        let patient = PatientRecord {
            id: uuid::Uuid::new_v4().to_string(),
            doctor_id: owner.clone(),
            fields: record.fields.clone(),
            created_at: record.created_at,
            last_visit_date: record.last_visit_date,
        };

        self.db.lock()?.insert_patient_record(&patient)?;
        info!(record_id = %patient.id, doctor_id = %owner, "Patient record created");
        Ok(RecordRef::new(patient.id, patient.doctor_id))
    }
}
