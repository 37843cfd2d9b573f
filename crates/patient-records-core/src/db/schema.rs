//! SQLite schema definition.

/// Complete database schema for patient records.
///
/// Timestamps are stored as RFC 3339 text with fixed microsecond precision and a
/// `Z` suffix, so lexicographic order equals chronological order.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    doctor_id TEXT NOT NULL,                     -- owner, the only authorization scope
    name TEXT NOT NULL DEFAULT '',
    age TEXT NOT NULL DEFAULT '',
    blood_pressure TEXT NOT NULL DEFAULT '',
    disease TEXT NOT NULL DEFAULT '',
    prescription TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    last_visit_date TEXT NOT NULL
);

-- Every lookup is (doctor_id, id)
CREATE INDEX IF NOT EXISTS idx_patients_owner ON patients(doctor_id, id);

-- Owner and creation time never change after insert
CREATE TRIGGER IF NOT EXISTS patients_immutable_owner BEFORE UPDATE ON patients
WHEN new.doctor_id IS NOT old.doctor_id OR new.created_at IS NOT old.created_at OR new.id IS NOT old.id
BEGIN
    SELECT RAISE(ABORT, 'Patient owner, id and creation time are immutable');
END;
"#;
