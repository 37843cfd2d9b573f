//! Record store contract consumed by patient record sessions.
//!
//! A store offers four things: a point lookup scoped by owner and record id,
//! a live subscription that pushes the current document on every change, a
//! partial-update write, and record creation. [`SqliteRecordStore`] is the
//! bundled implementation.

mod sqlite;

pub use sqlite::SqliteRecordStore;

use std::fmt;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

use thiserror::Error;

use crate::db::DbError;
use crate::models::{DoctorId, NewPatientRecord, PatientPatch, PatientRecord};

/// Store errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend unreachable or failed (surfaced verbatim)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the write
    #[error("Write rejected: {0}")]
    Rejected(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        StoreError::Unavailable(format!("Lock poisoned: {}", e))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reference to a record the owner has been authorized for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
    id: String,
    owner: DoctorId,
}

impl RecordRef {
    pub fn new(id: impl Into<String>, owner: DoctorId) -> Self {
        Self {
            id: id.into(),
            owner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &DoctorId {
        &self.owner
    }
}

/// Identity of one live subscription. Never reused by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A change pushed through a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    /// Current state of the document
    Snapshot(PatientRecord),
    /// The document no longer exists
    Deleted,
}

/// Receiving end of a live subscription.
///
/// The first event is the document's state at subscribe time. Events keep
/// arriving until the store is told to cancel the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: Receiver<RecordEvent>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, events: Receiver<RecordEvent>) -> Self {
        Self { id, events }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next buffered event, without blocking.
    ///
    /// Returns `None` when nothing is buffered or the store has dropped the sender.
    pub fn try_next(&self) -> Option<RecordEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Document store holding patient records.
pub trait RecordStore {
    /// Point lookup scoped by owner and record id.
    ///
    /// A record owned by someone else is reported exactly like a missing one.
    fn find_owned_record(&self, owner: &DoctorId, record_id: &str)
        -> StoreResult<Option<RecordRef>>;

    /// Open a live subscription on one document.
    fn subscribe(&self, record: &RecordRef) -> StoreResult<Subscription>;

    /// Stop a subscription. Unknown or already-cancelled ids are a no-op.
    fn cancel(&self, subscription: SubscriptionId) -> StoreResult<()>;

    /// Write the fields carried by `patch` to the document.
    fn apply_partial_update(&self, record: &RecordRef, patch: &PatientPatch) -> StoreResult<()>;

    /// Create a new document owned by `owner`.
    fn create_record(&self, owner: &DoctorId, record: &NewPatientRecord) -> StoreResult<RecordRef>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn find_owned_record(
        &self,
        owner: &DoctorId,
        record_id: &str,
    ) -> StoreResult<Option<RecordRef>> {
        (**self).find_owned_record(owner, record_id)
    }

    fn subscribe(&self, record: &RecordRef) -> StoreResult<Subscription> {
        (**self).subscribe(record)
    }

    fn cancel(&self, subscription: SubscriptionId) -> StoreResult<()> {
        (**self).cancel(subscription)
    }

    fn apply_partial_update(&self, record: &RecordRef, patch: &PatientPatch) -> StoreResult<()> {
        (**self).apply_partial_update(record, patch)
    }

    fn create_record(&self, owner: &DoctorId, record: &NewPatientRecord) -> StoreResult<RecordRef> {
        (**self).create_record(owner, record)
    }
}
