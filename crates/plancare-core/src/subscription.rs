//! Subscriptions: a patient's enrolment in a plan.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  plan::{Plan, PlanId},
  profile::{ClinicRef, Uid},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }

  pub fn as_uuid(&self) -> Uuid { self.0 }
}

impl Default for SubscriptionId {
  fn default() -> Self { Self::new() }
}

impl From<Uuid> for SubscriptionId {
  fn from(id: Uuid) -> Self { Self(id) }
}

impl fmt::Display for SubscriptionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
  Pending,
  Active,
  Cancelled,
  PastDue,
}

impl SubscriptionStatus {
  /// Pending and active subscriptions block a second enrolment.
  pub fn is_open(self) -> bool { matches!(self, Self::Pending | Self::Active) }

  /// Counts toward the clinic's commission total.
  pub fn earns_commission(self) -> bool { !matches!(self, Self::Cancelled) }
}

/// A patient's enrolment in a plan.
///
/// `amount`, `clinic_commission` and `admin_revenue` are copied from the plan
/// when the subscription is created and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
  pub subscription_id:   SubscriptionId,
  pub patient_id:        Uid,
  pub clinic_id:         ClinicRef,
  pub plan:              PlanId,
  pub status:            SubscriptionStatus,
  pub amount:            u32,
  pub clinic_commission: u32,
  pub admin_revenue:     u32,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl Subscription {
  /// A pending subscription carrying a snapshot of `plan`'s figures.
  pub fn snapshot(
    patient_id: Uid,
    clinic_id: ClinicRef,
    plan: &Plan,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      subscription_id: SubscriptionId::new(),
      patient_id,
      clinic_id,
      plan: plan.id,
      status: SubscriptionStatus::Pending,
      amount: plan.total,
      clinic_commission: plan.clinic_commission,
      admin_revenue: plan.admin_revenue,
      created_at: at,
      updated_at: at,
    }
  }
}
