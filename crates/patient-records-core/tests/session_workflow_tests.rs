//! Patient record session workflow tests.

mod common;

use std::sync::atomic::Ordering;

use common::{admit, session_for, session_with_auth, ScriptedStore};
use patient_records_core::models::{DoctorId, EditableField, PatientFields};
use patient_records_core::store::RecordEvent;
use patient_records_core::{SearchOutcome, SessionError, SessionState};

#[test]
fn test_owned_record_edit_cancel_then_submit() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");

    assert_eq!(
        session.search(r1.id()).unwrap(),
        SearchOutcome::Found(r1.clone())
    );
    assert_eq!(session.state(), SessionState::Viewing);
    assert_eq!(session.displayed().unwrap().fields.name, "Asha");

    // Edit, then cancel: nothing is written
    session.toggle_edit().unwrap();
    session.update_field("name", "Asha K.").unwrap();
    assert_eq!(session.toggle_edit().unwrap(), SessionState::Viewing);
    session.pump();
    assert_eq!(session.displayed().unwrap().fields.name, "Asha");
    assert_eq!(session.edit_buffer().name, "Asha");
    assert!(store.written().is_empty());

    // Edit and submit
    session.toggle_edit().unwrap();
    session.update_field("name", "Asha K.").unwrap();
    session.submit().unwrap();
    assert_eq!(session.state(), SessionState::Viewing);

    let written = store.written();
    assert_eq!(written.len(), 1);
    let (target, patch) = &written[0];
    assert_eq!(target, &r1);

    let wire = serde_json::to_value(patch).unwrap();
    let keys: Vec<&str> = wire.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(wire["name"], "Asha K.");
    assert!(wire.get("lastVisitDate").is_some());

    // Not optimistic: the push carries the change
    assert_eq!(session.displayed().unwrap().fields.name, "Asha");
    assert!(session.pump() >= 1);
    assert_eq!(session.displayed().unwrap().fields.name, "Asha K.");
}

#[test]
fn test_foreign_record_is_not_found() {
    let store = ScriptedStore::new();
    let r2 = admit(&store, "doc-E", "Bilal");
    let mut session = session_for(&store, "doc-D");

    assert_eq!(session.search(r2.id()).unwrap(), SearchOutcome::NotFound);
    assert_eq!(session.state(), SessionState::NotFound);
    assert!(session.displayed().is_none());
    assert!(session.active_subscription().is_none());
    assert_eq!(store.active_subscriptions(), 0);
}

#[test]
fn test_missing_record_is_not_found() {
    let store = ScriptedStore::new();
    let mut session = session_for(&store, "doc-D");

    assert_eq!(session.search("no-such-id").unwrap(), SearchOutcome::NotFound);
    assert_eq!(session.state(), SessionState::NotFound);
}

#[test]
fn test_not_found_clears_previous_record() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");

    session.search(r1.id()).unwrap();
    assert_eq!(store.active_subscriptions(), 1);

    session.search("no-such-id").unwrap();
    assert_eq!(session.state(), SessionState::NotFound);
    assert!(session.displayed().is_none());
    assert_eq!(store.active_subscriptions(), 0);
}

#[test]
fn test_second_search_supersedes_subscription() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let r3 = admit(&store, "doc-D", "Chen");
    let mut session = session_for(&store, "doc-D");

    session.search(r1.id()).unwrap();
    let first = session.active_subscription().unwrap();

    session.search(r3.id()).unwrap();
    let second = session.active_subscription().unwrap();

    assert_ne!(first, second);
    assert_eq!(store.active_subscriptions(), 1);
    assert_eq!(session.displayed().unwrap().fields.name, "Chen");

    // A late push from the first subscription changes nothing
    let mut stale = session.displayed().unwrap().clone();
    stale.fields.name = "Asha".into();
    assert!(!session.on_subscription_push(first, RecordEvent::Snapshot(stale)));
    assert_eq!(session.displayed().unwrap().fields.name, "Chen");
}

#[test]
fn test_search_while_editing_leaves_edit_mode() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let r3 = admit(&store, "doc-D", "Chen");
    let mut session = session_for(&store, "doc-D");

    session.search(r1.id()).unwrap();
    session.toggle_edit().unwrap();
    session.update_field("name", "Asha K.").unwrap();

    session.search(r3.id()).unwrap();
    assert_eq!(session.state(), SessionState::Viewing);
    assert_eq!(session.edit_buffer().name, "Chen");
}

#[test]
fn test_push_while_editing_keeps_buffer() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut editor = session_for(&store, "doc-D");
    let mut colleague = session_for(&store, "doc-D");

    editor.search(r1.id()).unwrap();
    editor.toggle_edit().unwrap();
    editor.update_field("prescription", "Amlodipine 5mg").unwrap();

    // Someone else changes the record meanwhile
    colleague.search(r1.id()).unwrap();
    colleague.toggle_edit().unwrap();
    colleague.set_field(EditableField::Disease, "Resolved").unwrap();
    colleague.submit().unwrap();

    editor.pump();
    assert_eq!(editor.state(), SessionState::Editing);
    assert_eq!(editor.displayed().unwrap().fields.disease, "Resolved");
    assert_eq!(editor.edit_buffer().disease, "Hypertension");
    assert_eq!(editor.edit_buffer().prescription, "Amlodipine 5mg");

    // Only the field this editor touched is written
    editor.submit().unwrap();
    editor.pump();
    let shown = editor.displayed().unwrap();
    assert_eq!(shown.fields.disease, "Resolved");
    assert_eq!(shown.fields.prescription, "Amlodipine 5mg");
    assert_eq!(editor.edit_buffer(), &shown.fields);
}

#[test]
fn test_toggle_twice_leaves_buffer_equal_to_display() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");
    session.search(r1.id()).unwrap();

    session.toggle_edit().unwrap();
    session.toggle_edit().unwrap();
    assert_eq!(session.edit_buffer(), &session.displayed().unwrap().fields);
}

#[test]
fn test_submit_stamps_visit_and_keeps_protected_fields() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");
    session.search(r1.id()).unwrap();
    let before = session.displayed().unwrap().clone();

    session.toggle_edit().unwrap();
    for name in ["id", "doctorId", "createdAt", "lastVisitDate"] {
        session.update_field(name, "tampered").unwrap();
    }
    let patch = session.submit().unwrap();
    assert!(patch.is_touch_only());
    assert!(patch.last_visit_date >= before.last_visit_date);

    session.pump();
    let after = session.displayed().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.doctor_id, before.doctor_id);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.last_visit_date >= before.last_visit_date);
}

#[test]
fn test_submit_outside_edit_mode() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");

    assert_eq!(session.submit(), Err(SessionError::NoActiveRecord));

    session.search(r1.id()).unwrap();
    assert!(matches!(
        session.submit(),
        Err(SessionError::InvalidTransition {
            state: SessionState::Viewing,
            ..
        })
    ));
    assert!(store.written().is_empty());
}

#[test]
fn test_submit_failure_stays_editing() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");
    session.search(r1.id()).unwrap();
    session.toggle_edit().unwrap();
    session.update_field("age", "35").unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(session.submit(), Err(SessionError::StoreUnavailable(_))));
    assert_eq!(session.state(), SessionState::Editing);
    assert_eq!(session.edit_buffer().age, "35");
    assert_eq!(session.displayed().unwrap().fields.age, "34");

    // Caller retries once the store is back
    store.fail_writes.store(false, Ordering::SeqCst);
    session.submit().unwrap();
    session.pump();
    assert_eq!(session.displayed().unwrap().fields.age, "35");
}

#[test]
fn test_search_failure_leaves_session_unchanged() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let r3 = admit(&store, "doc-D", "Chen");
    let mut session = session_for(&store, "doc-D");
    session.search(r1.id()).unwrap();
    let subscription = session.active_subscription();

    store.fail_lookups.store(true, Ordering::SeqCst);
    assert!(matches!(
        session.search(r3.id()),
        Err(SessionError::StoreUnavailable(_))
    ));
    assert_eq!(session.state(), SessionState::Viewing);
    assert_eq!(session.active_subscription(), subscription);
    assert_eq!(session.displayed().unwrap().fields.name, "Asha");
}

#[test]
fn test_deleted_record_becomes_not_found() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");
    session.search(r1.id()).unwrap();

    assert!(store.inner.delete_record(&r1).unwrap());
    session.pump();

    assert_eq!(session.state(), SessionState::NotFound);
    assert!(session.displayed().is_none());
    assert!(session.active_subscription().is_none());
    assert_eq!(session.toggle_edit(), Err(SessionError::NoActiveRecord));
}

#[test]
fn test_push_after_dispose_is_ignored() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let mut session = session_for(&store, "doc-D");
    session.search(r1.id()).unwrap();
    let subscription = session.active_subscription().unwrap();
    let shown = session.displayed().unwrap().clone();

    session.dispose();
    assert_eq!(store.active_subscriptions(), 0);

    let mut late = shown.clone();
    late.fields.name = "Late".into();
    assert!(!session.on_subscription_push(subscription, RecordEvent::Snapshot(late)));
    assert!(!session.on_subscription_push(subscription, RecordEvent::Deleted));
    assert_eq!(session.pump(), 0);

    assert_eq!(session.state(), SessionState::Viewing);
    assert_eq!(session.displayed(), Some(&shown));
}

#[test]
fn test_create_and_open() {
    let store = ScriptedStore::new();
    let mut session = session_for(&store, "doc-D");

    let mut form = PatientFields::new("Dana", "61");
    form.prescription = "Metformin".into();
    let outcome = session.create_and_open(form).unwrap();

    assert!(matches!(outcome, SearchOutcome::Found(_)));
    let shown = session.displayed().unwrap();
    assert_eq!(shown.fields.name, "Dana");
    assert_eq!(shown.fields.prescription, "Metformin");
    assert_eq!(shown.created_at, shown.last_visit_date);
}

#[test]
fn test_create_and_open_validates_form() {
    let store = ScriptedStore::new();
    let mut session = session_for(&store, "doc-D");

    let result = session.create_and_open(PatientFields::new("Dana", ""));
    assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_switching_doctor_before_submit_writes_nothing() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let (auth, mut session) = session_with_auth(&store, "doc-D");

    session.search(r1.id()).unwrap();
    session.toggle_edit().unwrap();
    session.update_field("name", "Eve").unwrap();

    auth.sign_in(DoctorId::new("doc-E"));
    assert_eq!(session.submit(), Err(SessionError::NoActiveRecord));

    assert_eq!(session.state(), SessionState::NotFound);
    assert!(session.displayed().is_none());
    assert!(session.active_subscription().is_none());
    assert_eq!(store.active_subscriptions(), 0);
    assert!(store.written().is_empty());
    assert_eq!(session.toggle_edit(), Err(SessionError::NoActiveRecord));
}

#[test]
fn test_sign_out_before_submit_writes_nothing() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let (auth, mut session) = session_with_auth(&store, "doc-D");

    session.search(r1.id()).unwrap();
    session.toggle_edit().unwrap();
    session.update_field("name", "Mallory").unwrap();

    auth.sign_out();
    assert_eq!(session.submit(), Err(SessionError::Unauthenticated));
    assert_eq!(session.state(), SessionState::NotFound);
    assert!(store.written().is_empty());

    // Signing back in needs a fresh search
    auth.sign_in(DoctorId::new("doc-D"));
    assert_eq!(session.submit(), Err(SessionError::NoActiveRecord));
}

#[test]
fn test_sign_out_stops_live_updates() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let (auth, mut session) = session_with_auth(&store, "doc-D");
    let mut colleague = session_for(&store, "doc-D");

    session.search(r1.id()).unwrap();
    auth.sign_out();

    colleague.search(r1.id()).unwrap();
    colleague.toggle_edit().unwrap();
    colleague.set_field(EditableField::Disease, "Resolved").unwrap();
    colleague.submit().unwrap();

    assert_eq!(session.pump(), 0);
    assert_eq!(session.state(), SessionState::NotFound);
    assert!(session.displayed().is_none());
    assert!(session.active_subscription().is_none());
}

#[test]
fn test_push_for_previous_doctor_is_dropped() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let (auth, mut session) = session_with_auth(&store, "doc-D");

    session.search(r1.id()).unwrap();
    let subscription = session.active_subscription().unwrap();
    let mut pushed = session.displayed().unwrap().clone();
    pushed.fields.name = "Asha K.".into();

    auth.sign_in(DoctorId::new("doc-E"));
    assert!(!session.on_subscription_push(subscription, RecordEvent::Snapshot(pushed)));
    assert!(session.displayed().is_none());
    assert_eq!(store.active_subscriptions(), 0);
}

#[test]
fn test_same_doctor_signing_in_again_keeps_record() {
    let store = ScriptedStore::new();
    let r1 = admit(&store, "doc-D", "Asha");
    let (auth, mut session) = session_with_auth(&store, "doc-D");

    session.search(r1.id()).unwrap();
    auth.sign_in(DoctorId::new("doc-D"));

    assert_eq!(session.check_identity(), Ok(()));
    assert_eq!(session.toggle_edit().unwrap(), SessionState::Editing);
    assert_eq!(session.displayed().unwrap().fields.name, "Asha");
}
