//! Principals: the shared `users` profile and the role-specific records.
//!
//! Every principal has one [`UserProfile`] keyed by its identity. Patients and
//! clinics additionally own a [`Patient`] or [`Clinic`] record under the same
//! key; admins have none.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{plan::PlanId, role::Role, subscription::SubscriptionId};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The identity provider's subject id. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Uid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Uid {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

/// The clinic a patient (and therefore a subscription) is attributed to.
///
/// Stored as the clinic's identity, or the literal `"unassigned"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClinicRef {
  Assigned(Uid),
  #[default]
  Unassigned,
}

impl ClinicRef {
  pub const UNASSIGNED: &'static str = "unassigned";

  pub fn clinic(&self) -> Option<&Uid> {
    match self {
      Self::Assigned(uid) => Some(uid),
      Self::Unassigned => None,
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Assigned(uid) => uid.as_str(),
      Self::Unassigned => Self::UNASSIGNED,
    }
  }
}

impl From<String> for ClinicRef {
  fn from(s: String) -> Self {
    if s.is_empty() || s == Self::UNASSIGNED {
      Self::Unassigned
    } else {
      Self::Assigned(Uid(s))
    }
  }
}

impl From<ClinicRef> for String {
  fn from(c: ClinicRef) -> Self {
    match c {
      ClinicRef::Assigned(uid) => uid.0,
      ClinicRef::Unassigned => ClinicRef::UNASSIGNED.to_owned(),
    }
  }
}

impl From<Option<Uid>> for ClinicRef {
  fn from(uid: Option<Uid>) -> Self { uid.map_or(Self::Unassigned, Self::Assigned) }
}

impl fmt::Display for ClinicRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── users/{uid} ─────────────────────────────────────────────────────────────

/// Any authenticated principal. The role never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub uid:        Uid,
  pub email:      String,
  pub role:       Role,
  pub created_at: DateTime<Utc>,
}

// ─── patients/{uid} ──────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PatientStatus {
  Active,
  Pending,
  Cancelled,
  Suspended,
}

impl PatientStatus {
  /// Whether the patient is mid-enrolment or enrolled.
  pub fn is_open(self) -> bool { matches!(self, Self::Active | Self::Pending) }
}

/// A patient's operational record.
///
/// `status` is absent until the patient first subscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
  pub user_id:         Uid,
  #[serde(default)]
  pub clinic_id:       ClinicRef,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subscription_id: Option<SubscriptionId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plan:            Option<PlanId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status:          Option<PatientStatus>,
  pub joined_at:       DateTime<Utc>,
}

impl Patient {
  /// A freshly registered patient with no subscription.
  pub fn new(user_id: Uid, clinic_id: ClinicRef, joined_at: DateTime<Utc>) -> Self {
    Self {
      user_id,
      clinic_id,
      subscription_id: None,
      plan: None,
      status: None,
      joined_at,
    }
  }
}

/// Field updates applied to a [`Patient`]; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientUpdate {
  pub subscription_id: Option<SubscriptionId>,
  pub plan:            Option<PlanId>,
  pub status:          Option<PatientStatus>,
}

// ─── clinics/{uid} ───────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BaseFeeStatus {
  Active,
  #[default]
  Unpaid,
  Suspended,
}

/// A clinic's operational record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
  pub clinic_id:         Uid,
  pub name:              String,
  pub base_fee_status:   BaseFeeStatus,
  #[serde(default)]
  pub referred_patients: Vec<Uid>,
  /// Yen. Never decreases.
  pub commission_earned: u64,
  pub created_at:        DateTime<Utc>,
}

impl Clinic {
  pub fn new(clinic_id: Uid, name: String, created_at: DateTime<Utc>) -> Self {
    Self {
      clinic_id,
      name,
      base_fee_status: BaseFeeStatus::default(),
      referred_patients: Vec::new(),
      commission_earned: 0,
      created_at,
    }
  }
}
