//! Patient record session: search, live sync and editing of one record.
//!
//! ```text
//!   Idle ──search──▶ Searching ──miss──▶ NotFound
//!                        │
//!                       hit
//!                        ▼
//!                     Viewing ◀──cancel / submit ok──▶ Editing
//! ```
//!
//! A search from any state supersedes the previous one. Pushes from a
//! superseded or cancelled subscription are ignored by comparing
//! subscription ids.

mod buffer;
mod intake;

pub use buffer::EditBuffer;
pub use intake::create_patient;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::identity::IdentityProvider;
use crate::models::{
    stamp_now, EditableField, FieldName, PatientFields, PatientPatch, PatientRecord, UnknownField,
};
use crate::store::{RecordEvent, RecordRef, RecordStore, StoreError, Subscription, SubscriptionId};

/// Session errors. All of them leave the session in a well-defined state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("No authenticated doctor")]
    Unauthenticated,

    #[error("No patient record is resolved")]
    NoActiveRecord,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        state: SessionState,
        operation: &'static str,
    },

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Session has been disposed")]
    Disposed,
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::StoreUnavailable(e.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Where a session is in its workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    /// No search performed
    Idle,
    /// Scoped lookup in flight
    Searching,
    /// Last search matched no owned record, or the record was deleted
    NotFound,
    /// Subscription active, edit mode off
    Viewing,
    /// Subscription active, edit mode on
    Editing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::NotFound => "not found",
            SessionState::Viewing => "viewing",
            SessionState::Editing => "editing",
        };
        f.write_str(name)
    }
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(RecordRef),
    NotFound,
}

/// What `update_field` did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Applied,
    /// The name refers to a store-controlled field
    Ignored,
}

/// Search/view/edit workflow over one doctor-scoped record at a time.
///
/// Holds at most one live subscription. Dropping the session cancels it.
pub struct PatientRecordSession<S: RecordStore, P: IdentityProvider> {
    store: S,
    identity: P,
    state: SessionState,
    resolved: Option<RecordRef>,
    subscription: Option<Subscription>,
    displayed: Option<PatientRecord>,
    buffer: EditBuffer,
    disposed: bool,
}

impl<S: RecordStore, P: IdentityProvider> PatientRecordSession<S, P> {
    pub fn new(store: S, identity: P) -> Self {
        Self {
            store,
            identity,
            state: SessionState::Idle,
            resolved: None,
            subscription: None,
            displayed: None,
            buffer: EditBuffer::default(),
            disposed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_editing(&self) -> bool {
        self.state == SessionState::Editing
    }

    /// Latest record delivered by the subscription (read-only view).
    pub fn displayed(&self) -> Option<&PatientRecord> {
        self.displayed.as_ref()
    }

    /// Current contents of the shadow edit buffer.
    pub fn edit_buffer(&self) -> &PatientFields {
        self.buffer.fields()
    }

    /// Record the session is bound to, once a search has found one.
    pub fn resolved(&self) -> Option<&RecordRef> {
        self.resolved.as_ref()
    }

    pub fn active_subscription(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    /// Look up `record_id` among the current doctor's records and, on a hit,
    /// subscribe to it.
    ///
    /// The lookup happens before any subscription is opened, so a record
    /// owned by another doctor yields `NotFound` without ever being streamed.
    /// If the store fails, the session is left exactly as it was.
    pub fn search(&mut self, record_id: &str) -> SessionResult<SearchOutcome> {
        self.ensure_live()?;

        let record_id = record_id.trim();
        if record_id.is_empty() {
            return Err(SessionError::InvalidInput("please enter a patient ID".into()));
        }
        let doctor = self
            .identity
            .current_doctor_id()
            .ok_or(SessionError::Unauthenticated)?;

        let previous = self.state;
        self.state = SessionState::Searching;

        let found = match self.store.find_owned_record(&doctor, record_id) {
            Ok(found) => found,
            Err(e) => {
                warn!(record_id, error = %e, "Patient search failed");
                self.state = previous;
                return Err(e.into());
            }
        };

        let Some(record) = found else {
            self.release_subscription();
            self.clear_record();
            self.transition(SessionState::NotFound);
            return Ok(SearchOutcome::NotFound);
        };

        // Open the new channel before closing the old one so a failure here
        // leaves the previous record live.
        let subscription = match self.store.subscribe(&record) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(record_id, error = %e, "Subscribe failed");
                self.state = previous;
                return Err(e.into());
            }
        };

        self.release_subscription();
        self.clear_record();
        self.resolved = Some(record.clone());
        self.subscription = Some(subscription);
        self.transition(SessionState::Viewing);

        self.pump();
        if self.state == SessionState::NotFound {
            return Ok(SearchOutcome::NotFound);
        }
        Ok(SearchOutcome::Found(record))
    }

    /// Apply one push from the store.
    ///
    /// Returns false if the push belongs to a superseded or cancelled
    /// subscription, or arrived after `dispose`; such pushes change nothing.
    pub fn on_subscription_push(&mut self, subscription: SubscriptionId, event: RecordEvent) -> bool {
        if self.disposed || self.active_subscription() != Some(subscription) {
            trace!(subscription = %subscription, "Ignoring stale push");
            return false;
        }
        if self.check_identity().is_err() {
            return false;
        }

        match event {
            RecordEvent::Deleted => {
                debug!(subscription = %subscription, "Subscribed record deleted");
                self.release_subscription();
                self.clear_record();
                self.transition(SessionState::NotFound);
            }
            RecordEvent::Snapshot(record) => {
                if self.resolved.as_ref().map(RecordRef::id) != Some(record.id.as_str()) {
                    warn!(record_id = %record.id, "Push for a different record ignored");
                    return false;
                }
                if self.state != SessionState::Editing {
                    self.buffer.resync(&record);
                }
                self.displayed = Some(record);
            }
        }
        true
    }

    /// Apply every push buffered on the active subscription. Returns how many
    /// were applied.
    ///
    /// Every push is queued until drained here, so hosts call this whenever
    /// they render.
    pub fn pump(&mut self) -> usize {
        if self.disposed || self.check_identity().is_err() {
            return 0;
        }
        let mut applied = 0;
        loop {
            let next = self
                .subscription
                .as_ref()
                .and_then(|sub| sub.try_next().map(|event| (sub.id(), event)));
            let Some((id, event)) = next else {
                break;
            };
            if self.on_subscription_push(id, event) {
                applied += 1;
            }
        }
        applied
    }

    /// Enter edit mode, or leave it discarding unsaved edits.
    pub fn toggle_edit(&mut self) -> SessionResult<SessionState> {
        self.ensure_live()?;
        self.check_identity()?;

        match self.state {
            SessionState::Viewing => {
                let record = self.displayed.as_ref().ok_or(SessionError::NoActiveRecord)?;
                self.buffer.resync(record);
                self.transition(SessionState::Editing);
            }
            SessionState::Editing => {
                if let Some(record) = &self.displayed {
                    self.buffer.resync(record);
                }
                self.transition(SessionState::Viewing);
            }
            _ => return Err(SessionError::NoActiveRecord),
        }
        Ok(self.state)
    }

    /// Set a buffer field by its form name (`name`, `bloodPressure`, ...).
    ///
    /// Names of store-controlled fields (`id`, `doctorId`, `createdAt`,
    /// `lastVisitDate`) are accepted and ignored.
    pub fn update_field(&mut self, name: &str, value: impl Into<String>) -> SessionResult<FieldUpdate> {
        self.require_editing("update a field")?;

        let name: FieldName = name
            .parse()
            .map_err(|e: UnknownField| SessionError::InvalidInput(e.to_string()))?;
        match name {
            FieldName::Editable(field) => {
                self.buffer.set(field, value.into());
                Ok(FieldUpdate::Applied)
            }
            FieldName::Protected(field) => {
                debug!(?field, "Ignoring edit of protected field");
                Ok(FieldUpdate::Ignored)
            }
        }
    }

    /// Set a buffer field.
    pub fn set_field(&mut self, field: EditableField, value: impl Into<String>) -> SessionResult<()> {
        self.require_editing("update a field")?;
        self.buffer.set(field, value.into());
        Ok(())
    }

    /// Write the edited fields and a fresh visit timestamp to the store.
    ///
    /// On success the session returns to `Viewing`; the displayed record is
    /// refreshed by the next push, not here. On failure the session stays in
    /// `Editing` with the buffer intact.
    pub fn submit(&mut self) -> SessionResult<PatientPatch> {
        self.require_editing("submit")?;

        let record = self.resolved.clone().ok_or(SessionError::NoActiveRecord)?;
        let displayed = self.displayed.as_ref().ok_or(SessionError::NoActiveRecord)?;

        // Never behind what the store last told us
        let last_visit_date = stamp_now().max(displayed.last_visit_date);
        let patch = self.buffer.to_patch(last_visit_date);

        if let Err(e) = self.store.apply_partial_update(&record, &patch) {
            warn!(record_id = record.id(), error = %e, "Patient update failed");
            return Err(e.into());
        }

        debug!(
            record_id = record.id(),
            fields = patch.changes().count(),
            "Patient update submitted"
        );
        if let Some(displayed) = &self.displayed {
            self.buffer.resync(displayed);
        }
        self.transition(SessionState::Viewing);
        Ok(patch)
    }

    /// Create a record from an intake form and open it, the way a host
    /// redirects from the new-patient form to the record view.
    pub fn create_and_open(&mut self, form: PatientFields) -> SessionResult<SearchOutcome> {
        self.ensure_live()?;
        let record = create_patient(&self.store, &self.identity, form)?;
        self.search(record.id())
    }

    /// Cancel any live subscription. Safe to call more than once.
    pub fn dispose(&mut self) {
        if !self.disposed {
            debug!(state = %self.state, "Disposing patient record session");
        }
        self.release_subscription();
        self.disposed = true;
    }

    /// Close the resolved record if it is not owned by the doctor signed in
    /// right now.
    ///
    /// Every read and write of a resolved record goes through this, so a
    /// sign-out or a switch to another doctor ends access to the previous
    /// doctor's record. Hosts that change identity call it directly to drop
    /// the record at once. Returns `Unauthenticated` if nobody is signed in
    /// and `NoActiveRecord` if another doctor is.
    pub fn check_identity(&mut self) -> SessionResult<()> {
        let current = self.identity.current_doctor_id();
        let authorized = match &self.resolved {
            None => return Ok(()),
            Some(record) => current.as_ref() == Some(record.owner()),
        };
        if authorized {
            return Ok(());
        }

        warn!(doctor_id = ?current, "Signed-in doctor changed, closing record");
        self.release_subscription();
        self.clear_record();
        self.transition(SessionState::NotFound);
        match current {
            None => Err(SessionError::Unauthenticated),
            Some(_) => Err(SessionError::NoActiveRecord),
        }
    }

    fn ensure_live(&self) -> SessionResult<()> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    fn require_editing(&mut self, operation: &'static str) -> SessionResult<()> {
        self.ensure_live()?;
        self.check_identity()?;
        match self.state {
            SessionState::Editing => Ok(()),
            SessionState::Viewing => Err(SessionError::InvalidTransition {
                state: self.state,
                operation,
            }),
            _ => Err(SessionError::NoActiveRecord),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Session state change");
        }
        self.state = next;
    }

    fn release_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.store.cancel(subscription.id()) {
                warn!(subscription = %subscription.id(), error = %e, "Cancel failed");
            }
        }
    }

    fn clear_record(&mut self) {
        self.resolved = None;
        self.displayed = None;
        self.buffer.clear();
    }
}

impl<S: RecordStore, P: IdentityProvider> Drop for PatientRecordSession<S, P> {
    fn drop(&mut self) {
        self.release_subscription();
    }
}
