//! SQLite schema definition.

/// Complete database schema for dosewatch.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients & Medication Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS medications (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    generic_name TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(name);

-- ============================================================================
-- Prescriptions (UserMedication) - soft-deactivated, never deleted
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    medication_id TEXT NOT NULL REFERENCES medications(id),
    dosage TEXT NOT NULL,
    time_slots TEXT NOT NULL DEFAULT '[]',       -- JSON array of "HH:MM"
    route TEXT,
    start_date TEXT NOT NULL,                    -- YYYY-MM-DD
    end_date TEXT,
    duration_days INTEGER,
    initial_stock INTEGER NOT NULL DEFAULT 0 CHECK (initial_stock >= 0),
    current_stock INTEGER NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
    low_stock_threshold INTEGER NOT NULL DEFAULT 0 CHECK (low_stock_threshold >= 0),
    low_stock_notified INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id, active);

-- ============================================================================
-- Dose Instances (MedicationLog)
-- ============================================================================

CREATE TABLE IF NOT EXISTS dose_instances (
    id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL REFERENCES prescriptions(id),
    scheduled_at TEXT NOT NULL,                  -- YYYY-MM-DD HH:MM:SS, local time
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'taken', 'missed', 'skipped')),
    taken_at TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (prescription_id, scheduled_at)
);

CREATE INDEX IF NOT EXISTS idx_doses_status_scheduled ON dose_instances(status, scheduled_at);

-- ============================================================================
-- Interaction Alerts
-- ============================================================================

CREATE TABLE IF NOT EXISTS interaction_alerts (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    medication_1_id TEXT NOT NULL REFERENCES medications(id),
    medication_2_id TEXT NOT NULL REFERENCES medications(id),
    pair_key TEXT NOT NULL,                      -- sorted "low|high", lookups only
    severity TEXT NOT NULL
        CHECK (severity IN ('mild', 'moderate', 'severe', 'contraindicated')),
    description TEXT NOT NULL,
    recommendation TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    acknowledged_at TEXT
);

-- At most one open alert per unordered pair and patient
CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_open_pair
    ON interaction_alerts(patient_id, pair_key)
    WHERE acknowledged_at IS NULL;

CREATE INDEX IF NOT EXISTS idx_alerts_patient ON interaction_alerts(patient_id, detected_at);

-- ============================================================================
-- Notifications
-- ============================================================================

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    prescription_id TEXT REFERENCES prescriptions(id),
    dose_id TEXT REFERENCES dose_instances(id),
    alert_id TEXT REFERENCES interaction_alerts(id),
    notification_type TEXT NOT NULL
        CHECK (notification_type IN ('medication_reminder', 'low_stock', 'interaction_alert', 'system')),
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    scheduled_for TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'sent', 'failed', 'read', 'expired')),
    sent_at TEXT,
    read_at TEXT,
    failure_reason TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_notifications_due ON notifications(status, scheduled_for);

-- One live notification per dose and per alert
CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_live_dose
    ON notifications(dose_id, notification_type)
    WHERE dose_id IS NOT NULL AND status NOT IN ('expired', 'failed');

CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_live_alert
    ON notifications(alert_id, notification_type)
    WHERE alert_id IS NOT NULL AND status NOT IN ('expired', 'failed');

CREATE TABLE IF NOT EXISTS notification_preferences (
    patient_id TEXT PRIMARY KEY REFERENCES patients(id),
    medication_reminder INTEGER NOT NULL DEFAULT 1,
    low_stock INTEGER NOT NULL DEFAULT 1,
    interaction_alert INTEGER NOT NULL DEFAULT 1,
    system INTEGER NOT NULL DEFAULT 1,
    push_enabled INTEGER NOT NULL DEFAULT 1,
    whatsapp_enabled INTEGER NOT NULL DEFAULT 0,
    quiet_hours_start TEXT,                      -- HH:MM
    quiet_hours_end TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Caregivers
-- ============================================================================

CREATE TABLE IF NOT EXISTS caregiver_patients (
    id TEXT PRIMARY KEY,
    caregiver_id TEXT NOT NULL,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'active', 'revoked')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (caregiver_id, patient_id)
);

CREATE TABLE IF NOT EXISTS caregiver_permissions (
    grant_id TEXT NOT NULL REFERENCES caregiver_patients(id) ON DELETE CASCADE,
    permission_key TEXT NOT NULL,
    PRIMARY KEY (grant_id, permission_key)
);
"#;
