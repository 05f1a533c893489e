//! Payment confirmation and the commission billing pass.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
  activity::ActivityEvent,
  error::{Error, Result},
  profile::{PatientStatus, PatientUpdate, Uid},
  role::Role,
  session::Session,
  store::{BrokerageStore, CommitOutcome, Precondition, SubscriptionQuery, WriteBatch, WriteOp},
  subscription::{Subscription, SubscriptionId, SubscriptionStatus},
  workflow::Brokerage,
};

/// How often a payment is re-applied after losing a race on the subscription.
const CONFLICT_ATTEMPTS: usize = 3;

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
pub enum PaymentOutcome {
  Succeeded,
  Failed,
}

/// A charge result reported by the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotice {
  pub subscription_id: SubscriptionId,
  pub outcome:         PaymentOutcome,
}

/// The status a subscription moves to, or `None` if the notice is a
/// redelivery of one already applied.
fn next_status(
  id: SubscriptionId,
  from: SubscriptionStatus,
  outcome: PaymentOutcome,
) -> Result<Option<SubscriptionStatus>> {
  use PaymentOutcome::*;
  use SubscriptionStatus::*;

  match (from, outcome) {
    (Pending | PastDue, Succeeded) => Ok(Some(Active)),
    (Pending | Active, Failed) => Ok(Some(PastDue)),
    (Active, Succeeded) | (PastDue, Failed) => Ok(None),
    (Cancelled, _) => Err(Error::InvalidTransition { id, from, outcome }),
  }
}

impl<S: BrokerageStore + 'static> Brokerage<S> {
  /// Apply a payment notice to its subscription.
  ///
  /// A success activates the subscription and, if the patient still points at
  /// it, the patient. A failure marks the subscription past due and leaves the
  /// patient alone. Redelivered notices change nothing.
  pub async fn confirm_payment(&self, notice: PaymentNotice) -> Result<Subscription> {
    let id = notice.subscription_id;
    let step = self.settings.step;

    for _ in 0..CONFLICT_ATTEMPTS {
      let mut subscription = step
        .read("load subscription", || self.store.get_subscription(id))
        .await
        .map_err(Error::StoreUnavailable)?
        .ok_or(Error::SubscriptionNotFound(id))?;

      let Some(status) = next_status(id, subscription.status, notice.outcome)? else {
        tracing::debug!(subscription = %id, outcome = %notice.outcome, "payment notice already applied");
        return Ok(subscription);
      };

      let now = Utc::now();
      let plan_name = self
        .catalog
        .get(subscription.plan)
        .map_or_else(|| subscription.plan.to_string(), |p| p.name.clone());

      let mut batch = WriteBatch::new()
        .require(Precondition::SubscriptionStatusIs { id, expected: subscription.status })
        .write(WriteOp::UpdateSubscriptionStatus { id, status, at: now });

      if status == SubscriptionStatus::Active {
        let patient = step
          .read("load patient", || self.store.get_patient(subscription.patient_id.clone()))
          .await
          .map_err(Error::StoreUnavailable)?;
        if patient.is_some_and(|p| p.subscription_id == Some(id)) {
          batch = batch
            .require(Precondition::PatientSubscriptionIs {
              patient:  subscription.patient_id.clone(),
              expected: Some(id),
            })
            .write(WriteOp::UpdatePatient {
              patient: subscription.patient_id.clone(),
              update:  PatientUpdate {
                status: Some(PatientStatus::Active),
                ..PatientUpdate::default()
              },
            });
        }
      }

      let from = subscription.status;
      subscription.status = status;
      subscription.updated_at = now;
      let event = ActivityEvent::payment(
        notice.outcome == PaymentOutcome::Succeeded,
        &subscription,
        &plan_name,
        now,
      );
      batch = batch.write(WriteOp::AppendActivity(event));

      match self.commit(batch).await? {
        CommitOutcome::Applied => {
          tracing::info!(
            subscription = %id,
            patient = %subscription.patient_id,
            %from,
            to = %status,
            "payment recorded"
          );
          return Ok(subscription);
        }
        CommitOutcome::Conflict => {
          tracing::debug!(subscription = %id, "subscription changed underneath payment, re-reading");
        }
      }
    }

    tracing::warn!(subscription = %id, "giving up on contended payment notice");
    Err(Error::Contended(id))
  }

  /// Recompute a clinic's earned commission from its live subscriptions.
  ///
  /// The stored total only ever grows; returns the value now stored.
  pub async fn recompute_commission(&self, session: Option<&Session>, clinic: &Uid) -> Result<u64> {
    self.require_role(session, Role::Admin)?;
    let step = self.settings.step;

    let record = step
      .read("load clinic", || self.store.get_clinic(clinic.clone()))
      .await
      .map_err(Error::StoreUnavailable)?
      .ok_or_else(|| Error::ProfileNotFound(clinic.clone()))?;

    let subscriptions = step
      .read("list clinic subscriptions", || {
        self.store.list_subscriptions(SubscriptionQuery {
          clinic: Some(clinic.clone()),
          ..SubscriptionQuery::default()
        })
      })
      .await
      .map_err(Error::StoreUnavailable)?;

    let earned: u64 = subscriptions
      .iter()
      .filter(|s| s.status.earns_commission())
      .map(|s| u64::from(s.clinic_commission))
      .sum();

    if earned <= record.commission_earned {
      return Ok(record.commission_earned);
    }

    let batch = WriteBatch::new().write(WriteOp::SetCommission {
      clinic: clinic.clone(),
      amount: earned,
    });
    match self.commit(batch).await? {
      CommitOutcome::Applied => {
        tracing::info!(%clinic, from = record.commission_earned, to = earned, "commission recomputed");
        Ok(earned)
      }
      CommitOutcome::Conflict => Err(Error::ProfileNotFound(clinic.clone())),
    }
  }
}
