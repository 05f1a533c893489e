//! SQL schema for the plancare SQLite store.
//!
//! One table per document collection, plus `clinic_referrals` for the
//! clinic's referred-patient set and `accounts` for credentials. Executed once
//! at connection startup; `PRAGMA user_version` records the layout.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    uid         TEXT PRIMARY KEY,
    email       TEXT NOT NULL,
    role        TEXT NOT NULL,   -- 'patient' | 'clinic' | 'admin'
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    user_id          TEXT PRIMARY KEY,
    clinic_id        TEXT NOT NULL DEFAULT 'unassigned',
    subscription_id  TEXT,
    plan             TEXT,       -- 'A' | 'B' | 'C'
    status           TEXT,       -- absent until the first enrolment
    joined_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clinics (
    clinic_id          TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    base_fee_status    TEXT NOT NULL DEFAULT 'unpaid',
    commission_earned  INTEGER NOT NULL DEFAULT 0 CHECK (commission_earned >= 0),
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clinic_referrals (
    clinic_id   TEXT NOT NULL REFERENCES clinics(clinic_id),
    patient_id  TEXT NOT NULL,
    PRIMARY KEY (clinic_id, patient_id)
);

-- Price figures are copied from the plan at enrolment and never rewritten.
CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id    TEXT PRIMARY KEY,
    patient_id         TEXT NOT NULL,
    clinic_id          TEXT NOT NULL,
    plan               TEXT NOT NULL,
    status             TEXT NOT NULL,
    amount             INTEGER NOT NULL,
    clinic_commission  INTEGER NOT NULL,
    admin_revenue      INTEGER NOT NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    CHECK (amount = clinic_commission + admin_revenue)
);

-- Append-only.
CREATE TABLE IF NOT EXISTS activity_feed (
    activity_id  TEXT PRIMARY KEY,
    type         TEXT NOT NULL,
    patient_id   TEXT NOT NULL,
    clinic_id    TEXT NOT NULL,
    message      TEXT NOT NULL,
    timestamp    TEXT NOT NULL,
    details      TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS accounts (
    uid            TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,   -- argon2 PHC string
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS subscriptions_clinic_idx  ON subscriptions(clinic_id);
CREATE INDEX IF NOT EXISTS subscriptions_patient_idx ON subscriptions(patient_id);
CREATE INDEX IF NOT EXISTS activity_clinic_idx       ON activity_feed(clinic_id);
CREATE INDEX IF NOT EXISTS activity_timestamp_idx    ON activity_feed(timestamp);

PRAGMA user_version = 1;
";
