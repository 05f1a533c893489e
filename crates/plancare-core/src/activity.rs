//! The activity feed: append-only records of notable domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  plan::Plan,
  profile::{ClinicRef, Uid},
  subscription::Subscription,
};

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
pub enum ActivityKind {
  NewSignup,
  PaymentSuccess,
  PaymentFailed,
}

/// Display payload attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetails {
  /// Plan display name, e.g. `"プランB"`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plan:   Option<String>,
  /// Yen.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub amount: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
  pub activity_id: Uuid,
  #[serde(rename = "type")]
  pub kind:        ActivityKind,
  pub patient_id:  Uid,
  pub clinic_id:   ClinicRef,
  pub message:     String,
  pub timestamp:   DateTime<Utc>,
  pub details:     ActivityDetails,
}

impl ActivityEvent {
  fn for_subscription(
    kind: ActivityKind,
    subscription: &Subscription,
    plan_name: &str,
    message: String,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      activity_id: Uuid::new_v4(),
      kind,
      patient_id: subscription.patient_id.clone(),
      clinic_id: subscription.clinic_id.clone(),
      message,
      timestamp: at,
      details: ActivityDetails {
        plan:   Some(plan_name.to_owned()),
        amount: Some(subscription.amount),
      },
    }
  }

  /// Emitted once when a patient enrols in `plan`.
  pub fn new_signup(subscription: &Subscription, plan: &Plan, at: DateTime<Utc>) -> Self {
    Self::for_subscription(
      ActivityKind::NewSignup,
      subscription,
      &plan.name,
      format!("{}への新規申し込み（月額¥{}）", plan.name, subscription.amount),
      at,
    )
  }

  /// Emitted when the payment collaborator reports a charge.
  pub fn payment(
    succeeded: bool,
    subscription: &Subscription,
    plan_name: &str,
    at: DateTime<Utc>,
  ) -> Self {
    let (kind, message) = if succeeded {
      (ActivityKind::PaymentSuccess, format!("{plan_name}の決済が完了しました"))
    } else {
      (ActivityKind::PaymentFailed, format!("{plan_name}の決済に失敗しました"))
    };
    Self::for_subscription(kind, subscription, plan_name, message, at)
  }
}
