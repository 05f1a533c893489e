//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed nanosecond precision
//! so that they sort lexically. Enum tags are stored as their lowercase (or
//! snake_case) names. Activity details are stored as compact JSON.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use plancare_core::{
  activity::{ActivityDetails, ActivityEvent},
  profile::{Clinic, ClinicRef, Patient, Uid, UserProfile},
  role::Role,
  store::{DocRef, Precondition, WriteBatch, WriteOp},
  subscription::{Subscription, SubscriptionId},
};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_tag<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
  value.parse().map_err(|_| Error::UnknownTag { column, value: value.to_owned() })
}

fn decode_amount<T: TryFrom<i64>>(column: &'static str, value: i64) -> Result<T> {
  T::try_from(value).map_err(|_| Error::UnknownTag { column, value: value.to_string() })
}

fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

fn opt_text(s: Option<String>) -> Value { s.map_or(Value::Null, Value::Text) }

fn int(n: impl Into<i64>) -> Value { Value::Integer(n.into()) }

fn big_int(n: u64) -> Value { Value::Integer(i64::try_from(n).unwrap_or(i64::MAX)) }

// ─── Write batches ───────────────────────────────────────────────────────────

/// One statement of an encoded [`WriteBatch`], run inside the commit
/// transaction.
pub enum Step {
  /// Holds iff `sql` returns a row exactly when `expect_row` is set.
  Check {
    sql:        &'static str,
    params:     Vec<Value>,
    expect_row: bool,
  },
  /// When `must_hit` is set, touching zero rows fails the batch.
  Write {
    sql:      &'static str,
    params:   Vec<Value>,
    must_hit: bool,
  },
}

fn check(sql: &'static str, params: Vec<Value>) -> Step {
  Step::Check { sql, params, expect_row: true }
}

fn absent(sql: &'static str, params: Vec<Value>) -> Step {
  Step::Check { sql, params, expect_row: false }
}

fn write(sql: &'static str, params: Vec<Value>) -> Step {
  Step::Write { sql, params, must_hit: true }
}

fn encode_precondition(p: Precondition) -> Step {
  match p {
    Precondition::PatientSubscriptionIs { patient, expected } => check(
      "SELECT 1 FROM patients WHERE user_id = ?1 AND subscription_id IS ?2",
      vec![
        text(patient.as_str()),
        opt_text(expected.map(|id| encode_uuid(id.as_uuid()))),
      ],
    ),
    Precondition::SubscriptionStatusIs { id, expected } => check(
      "SELECT 1 FROM subscriptions WHERE subscription_id = ?1 AND status = ?2",
      vec![text(encode_uuid(id.as_uuid())), text(expected.to_string())],
    ),
    Precondition::DocumentAbsent(DocRef::User(uid)) => {
      absent("SELECT 1 FROM users WHERE uid = ?1", vec![text(uid.as_str())])
    }
    Precondition::DocumentAbsent(DocRef::Patient(uid)) => {
      absent("SELECT 1 FROM patients WHERE user_id = ?1", vec![text(uid.as_str())])
    }
    Precondition::DocumentAbsent(DocRef::Clinic(uid)) => {
      absent("SELECT 1 FROM clinics WHERE clinic_id = ?1", vec![text(uid.as_str())])
    }
  }
}

fn encode_op(op: WriteOp, steps: &mut Vec<Step>) -> Result<()> {
  let step = match op {
    WriteOp::CreateProfile(p) => write(
      "INSERT OR IGNORE INTO users (uid, email, role, created_at) VALUES (?1, ?2, ?3, ?4)",
      vec![
        text(p.uid.as_str()),
        text(p.email),
        text(p.role.to_string()),
        text(encode_dt(p.created_at)),
      ],
    ),
    WriteOp::CreatePatient(p) => write(
      "INSERT OR IGNORE INTO patients
         (user_id, clinic_id, subscription_id, plan, status, joined_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      vec![
        text(p.user_id.as_str()),
        text(String::from(p.clinic_id)),
        opt_text(p.subscription_id.map(|id| encode_uuid(id.as_uuid()))),
        opt_text(p.plan.map(|plan| plan.to_string())),
        opt_text(p.status.map(|s| s.to_string())),
        text(encode_dt(p.joined_at)),
      ],
    ),
    WriteOp::CreateClinic(c) => {
      let clinic_id = c.clinic_id.as_str().to_owned();
      steps.push(write(
        "INSERT OR IGNORE INTO clinics
           (clinic_id, name, base_fee_status, commission_earned, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        vec![
          text(clinic_id.clone()),
          text(c.name),
          text(c.base_fee_status.to_string()),
          big_int(c.commission_earned),
          text(encode_dt(c.created_at)),
        ],
      ));
      for patient in c.referred_patients {
        steps.push(Step::Write {
          sql:      "INSERT OR IGNORE INTO clinic_referrals (clinic_id, patient_id) VALUES (?1, ?2)",
          params:   vec![text(clinic_id.clone()), text(patient.as_str())],
          must_hit: false,
        });
      }
      return Ok(());
    }
    WriteOp::CreateSubscription(s) => write(
      "INSERT INTO subscriptions (
         subscription_id, patient_id, clinic_id, plan, status,
         amount, clinic_commission, admin_revenue, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      vec![
        text(encode_uuid(s.subscription_id.as_uuid())),
        text(s.patient_id.as_str()),
        text(String::from(s.clinic_id)),
        text(s.plan.to_string()),
        text(s.status.to_string()),
        int(s.amount),
        int(s.clinic_commission),
        int(s.admin_revenue),
        text(encode_dt(s.created_at)),
        text(encode_dt(s.updated_at)),
      ],
    ),
    WriteOp::AppendActivity(e) => write(
      "INSERT INTO activity_feed
         (activity_id, type, patient_id, clinic_id, message, timestamp, details)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      vec![
        text(encode_uuid(e.activity_id)),
        text(e.kind.to_string()),
        text(e.patient_id.as_str()),
        text(String::from(e.clinic_id)),
        text(e.message),
        text(encode_dt(e.timestamp)),
        text(serde_json::to_string(&e.details)?),
      ],
    ),
    WriteOp::UpdatePatient { patient, update } => write(
      "UPDATE patients SET
         subscription_id = COALESCE(?2, subscription_id),
         plan            = COALESCE(?3, plan),
         status          = COALESCE(?4, status)
       WHERE user_id = ?1",
      vec![
        text(patient.as_str()),
        opt_text(update.subscription_id.map(|id| encode_uuid(id.as_uuid()))),
        opt_text(update.plan.map(|plan| plan.to_string())),
        opt_text(update.status.map(|s| s.to_string())),
      ],
    ),
    WriteOp::UpdateSubscriptionStatus { id, status, at } => write(
      "UPDATE subscriptions SET status = ?2, updated_at = ?3 WHERE subscription_id = ?1",
      vec![text(encode_uuid(id.as_uuid())), text(status.to_string()), text(encode_dt(at))],
    ),
    WriteOp::AddReferral { clinic, patient } => {
      steps.push(check("SELECT 1 FROM clinics WHERE clinic_id = ?1", vec![text(clinic.as_str())]));
      Step::Write {
        sql:      "INSERT OR IGNORE INTO clinic_referrals (clinic_id, patient_id) VALUES (?1, ?2)",
        params:   vec![text(clinic.as_str()), text(patient.as_str())],
        must_hit: false,
      }
    }
    WriteOp::AddCommission { clinic, amount } => write(
      "UPDATE clinics SET commission_earned = commission_earned + ?2 WHERE clinic_id = ?1",
      vec![text(clinic.as_str()), big_int(amount)],
    ),
    WriteOp::SetCommission { clinic, amount } => write(
      "UPDATE clinics SET commission_earned = MAX(commission_earned, ?2) WHERE clinic_id = ?1",
      vec![text(clinic.as_str()), big_int(amount)],
    ),
  };
  steps.push(step);
  Ok(())
}

/// Flatten a batch into statements: every precondition first, then the writes
/// in order.
pub fn encode_batch(batch: WriteBatch) -> Result<Vec<Step>> {
  let mut steps: Vec<Step> = batch.preconditions.into_iter().map(encode_precondition).collect();
  for op in batch.ops {
    encode_op(op, &mut steps)?;
  }
  Ok(steps)
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawProfile {
  pub uid:        String,
  pub email:      String,
  pub role:       String,
  pub created_at: String,
}

impl RawProfile {
  pub const COLUMNS: &'static str = "uid, email, role, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uid:        row.get(0)?,
      email:      row.get(1)?,
      role:       row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_profile(self) -> Result<UserProfile> {
    Ok(UserProfile {
      uid:        Uid::new(self.uid),
      email:      self.email,
      role:       Role::from_tag(&self.role),
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawPatient {
  pub user_id:         String,
  pub clinic_id:       String,
  pub subscription_id: Option<String>,
  pub plan:            Option<String>,
  pub status:          Option<String>,
  pub joined_at:       String,
}

impl RawPatient {
  pub const COLUMNS: &'static str = "user_id, clinic_id, subscription_id, plan, status, joined_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:         row.get(0)?,
      clinic_id:       row.get(1)?,
      subscription_id: row.get(2)?,
      plan:            row.get(3)?,
      status:          row.get(4)?,
      joined_at:       row.get(5)?,
    })
  }

  pub fn into_patient(self) -> Result<Patient> {
    Ok(Patient {
      user_id:         Uid::new(self.user_id),
      clinic_id:       ClinicRef::from(self.clinic_id),
      subscription_id: self
        .subscription_id
        .as_deref()
        .map(|s| decode_uuid(s).map(SubscriptionId::from))
        .transpose()?,
      plan:            self.plan.as_deref().map(|s| decode_tag("plan", s)).transpose()?,
      status:          self.status.as_deref().map(|s| decode_tag("status", s)).transpose()?,
      joined_at:       decode_dt(&self.joined_at)?,
    })
  }
}

/// A `clinics` row; the referral set is read from `clinic_referrals`
/// separately.
pub struct RawClinic {
  pub clinic_id:         String,
  pub name:              String,
  pub base_fee_status:   String,
  pub commission_earned: i64,
  pub created_at:        String,
}

impl RawClinic {
  pub const COLUMNS: &'static str =
    "clinic_id, name, base_fee_status, commission_earned, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      clinic_id:         row.get(0)?,
      name:              row.get(1)?,
      base_fee_status:   row.get(2)?,
      commission_earned: row.get(3)?,
      created_at:        row.get(4)?,
    })
  }

  pub fn into_clinic(self, referred_patients: Vec<String>) -> Result<Clinic> {
    Ok(Clinic {
      clinic_id:         Uid::new(self.clinic_id),
      name:              self.name,
      base_fee_status:   decode_tag("base_fee_status", &self.base_fee_status)?,
      referred_patients: referred_patients.into_iter().map(Uid::new).collect(),
      commission_earned: decode_amount("commission_earned", self.commission_earned)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawSubscription {
  pub subscription_id:   String,
  pub patient_id:        String,
  pub clinic_id:         String,
  pub plan:              String,
  pub status:            String,
  pub amount:            i64,
  pub clinic_commission: i64,
  pub admin_revenue:     i64,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawSubscription {
  pub const COLUMNS: &'static str = "subscription_id, patient_id, clinic_id, plan, status, \
                                     amount, clinic_commission, admin_revenue, created_at, \
                                     updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id:   row.get(0)?,
      patient_id:        row.get(1)?,
      clinic_id:         row.get(2)?,
      plan:              row.get(3)?,
      status:            row.get(4)?,
      amount:            row.get(5)?,
      clinic_commission: row.get(6)?,
      admin_revenue:     row.get(7)?,
      created_at:        row.get(8)?,
      updated_at:        row.get(9)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id:   SubscriptionId::from(decode_uuid(&self.subscription_id)?),
      patient_id:        Uid::new(self.patient_id),
      clinic_id:         ClinicRef::from(self.clinic_id),
      plan:              decode_tag("plan", &self.plan)?,
      status:            decode_tag("status", &self.status)?,
      amount:            decode_amount("amount", self.amount)?,
      clinic_commission: decode_amount("clinic_commission", self.clinic_commission)?,
      admin_revenue:     decode_amount("admin_revenue", self.admin_revenue)?,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawActivity {
  pub activity_id: String,
  pub kind:        String,
  pub patient_id:  String,
  pub clinic_id:   String,
  pub message:     String,
  pub timestamp:   String,
  pub details:     String,
}

impl RawActivity {
  pub const COLUMNS: &'static str =
    "activity_id, type, patient_id, clinic_id, message, timestamp, details";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id: row.get(0)?,
      kind:        row.get(1)?,
      patient_id:  row.get(2)?,
      clinic_id:   row.get(3)?,
      message:     row.get(4)?,
      timestamp:   row.get(5)?,
      details:     row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<ActivityEvent> {
    let details: ActivityDetails = serde_json::from_str(&self.details)?;
    Ok(ActivityEvent {
      activity_id: decode_uuid(&self.activity_id)?,
      kind: decode_tag("type", &self.kind)?,
      patient_id: Uid::new(self.patient_id),
      clinic_id: ClinicRef::from(self.clinic_id),
      message: self.message,
      timestamp: decode_dt(&self.timestamp)?,
      details,
    })
  }
}
