//! SQLite schema definition.

/// Complete database schema. Every table is scoped by `owner_id`.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL COLLATE NOCASE,
    age INTEGER NOT NULL CHECK (age >= 0),
    medical_conditions TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    emergency_contact TEXT,                          -- JSON object {name, phone, relationship}
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_owner ON patients(owner_id, name);

-- ============================================================================
-- Medication Schedules
-- ============================================================================

CREATE TABLE IF NOT EXISTS medication_schedules (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    patient_name TEXT,
    medication_name TEXT NOT NULL,
    dosage TEXT NOT NULL,
    frequency TEXT NOT NULL
        CHECK (frequency IN ('daily', 'twice-daily', 'weekly', 'as-needed')),
    timing TEXT NOT NULL,
    instructions TEXT,
    current_stock INTEGER NOT NULL CHECK (current_stock >= 0),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'taken', 'missed')),
    last_taken TEXT,
    device_status TEXT NOT NULL DEFAULT 'online'
        CHECK (device_status IN ('online', 'offline')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_schedules_owner ON medication_schedules(owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_schedules_patient ON medication_schedules(patient_id);

-- ============================================================================
-- Activity Log (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS activity_log (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    event_type TEXT NOT NULL CHECK (event_type IN (
        'medication-dispensed', 'medication-missed', 'low-stock-alert',
        'device-status', 'schedule-updated', 'system-notification'
    )),
    status TEXT NOT NULL CHECK (status IN ('success', 'warning', 'error', 'info')),
    patient_id TEXT REFERENCES patients(id) ON DELETE CASCADE,
    patient_name TEXT,
    medication_name TEXT,
    description TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    device_id TEXT,
    stock_level INTEGER CHECK (stock_level IS NULL OR stock_level >= 0)
);

CREATE INDEX IF NOT EXISTS idx_activity_owner ON activity_log(owner_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_activity_patient ON activity_log(patient_id);

-- Entries are never edited once written
CREATE TRIGGER IF NOT EXISTS activity_log_no_update BEFORE UPDATE ON activity_log
BEGIN
    SELECT RAISE(ABORT, 'Activity log entries are append-only');
END;

-- ============================================================================
-- Devices
-- ============================================================================

CREATE TABLE IF NOT EXISTS devices (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    location TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'online' CHECK (status IN ('online', 'offline')),
    last_seen TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_devices_owner ON devices(owner_id, name);
"#;
