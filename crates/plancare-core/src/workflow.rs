//! The subscription workflow.
//!
//! [`Brokerage`] bundles the store, the plan catalog and the step policy, and
//! hosts every multi-document operation: enrolment here, sign-up in
//! [`crate::signup`], payment and commission handling in [`crate::billing`],
//! read models in [`crate::dashboard`].
//!
//! Enrolment writes the subscription, the patient update and the activity
//! event in one atomic commit. The commit is conditional on the patient's
//! `subscriptionId` still being what the duplicate check read, so two racing
//! calls for one patient cannot both succeed.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::{
  activity::ActivityEvent,
  error::{Error, Result},
  plan::PlanCatalog,
  profile::{PatientStatus, PatientUpdate, Uid},
  resolver::RoleResolver,
  role::Role,
  session::Session,
  step::StepPolicy,
  store::{BrokerageStore, CommitOutcome, Precondition, WriteBatch, WriteOp},
  subscription::Subscription,
};

/// When a clinic's `commissionEarned` grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionAccrual {
  /// Enrolment leaves the total alone; a billing pass recomputes it.
  #[default]
  Deferred,
  /// Enrolment adds the snapshot commission in the same commit.
  OnSubscribe,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowSettings {
  pub step:    StepPolicy,
  pub accrual: CommissionAccrual,
}

/// Entry point for every brokerage operation. Cheap to clone.
pub struct Brokerage<S> {
  pub(crate) store:    Arc<S>,
  pub(crate) catalog:  PlanCatalog,
  pub(crate) settings: WorkflowSettings,
}

impl<S> Clone for Brokerage<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      catalog:  self.catalog.clone(),
      settings: self.settings,
    }
  }
}

impl<S: BrokerageStore + 'static> Brokerage<S> {
  pub fn new(store: Arc<S>, catalog: PlanCatalog, settings: WorkflowSettings) -> Self {
    Self { store, catalog, settings }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn catalog(&self) -> &PlanCatalog { &self.catalog }

  pub fn settings(&self) -> WorkflowSettings { self.settings }

  pub fn resolver(&self) -> RoleResolver<S> {
    RoleResolver::new(Arc::clone(&self.store), self.settings.step)
  }

  /// Require an authenticated session holding `role`.
  pub(crate) fn require_role<'a>(
    &self,
    session: Option<&'a Session>,
    role: Role,
  ) -> Result<&'a Session> {
    let session = session.ok_or(Error::NotAuthenticated)?;
    if session.role() != role {
      return Err(Error::WrongRole(session.role()));
    }
    Ok(session)
  }

  /// Commit `batch` once under the step timeout.
  ///
  /// The commit runs on its own task: if the caller goes away, or the timeout
  /// fires, the commit still runs to completion instead of being abandoned
  /// half-way. A timeout therefore means the outcome is unknown: the batch may
  /// still land after [`Error::StoreUnavailable`] has been returned, and a
  /// retried `subscribe` then reports [`Error::AlreadySubscribed`].
  pub(crate) async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
    let store = Arc::clone(&self.store);
    let task = tokio::spawn(async move { store.commit(batch).await });

    let joined = self
      .settings
      .step
      .once(task)
      .await
      .map_err(Error::StoreUnavailable)?;

    joined.map_err(|e| Error::StoreUnavailable(crate::error::Unavailable::Backend(Box::new(e))))
  }

  /// Enrol the session's patient in `plan_id`.
  ///
  /// Fails with [`Error::AlreadySubscribed`] without writing anything if the
  /// patient already holds a pending or active subscription.
  pub async fn subscribe(&self, session: Option<&Session>, plan_id: &str) -> Result<Subscription> {
    let session = self.require_role(session, Role::Patient)?;
    let plan = self.catalog.lookup(plan_id)?;
    let uid = session.uid().clone();
    let step = self.settings.step;

    let patient = step
      .read("load patient", || self.store.get_patient(uid.clone()))
      .await
      .map_err(Error::StoreUnavailable)?
      .ok_or_else(|| Error::ProfileNotFound(uid.clone()))?;

    if patient.status.is_some_and(PatientStatus::is_open) {
      tracing::info!(patient = %uid, "rejecting enrolment: patient status is open");
      return Err(Error::AlreadySubscribed(uid));
    }
    if let Some(current) = patient.subscription_id {
      let existing = step
        .read("load current subscription", || self.store.get_subscription(current))
        .await
        .map_err(Error::StoreUnavailable)?;
      if existing.is_some_and(|s| s.status.is_open()) {
        tracing::info!(patient = %uid, subscription = %current, "rejecting enrolment: open subscription");
        return Err(Error::AlreadySubscribed(uid));
      }
    }

    let now = Utc::now();
    let subscription = Subscription::snapshot(uid.clone(), patient.clinic_id.clone(), plan, now);
    let event = ActivityEvent::new_signup(&subscription, plan, now);

    let mut batch = WriteBatch::new()
      .require(Precondition::PatientSubscriptionIs {
        patient:  uid.clone(),
        expected: patient.subscription_id,
      })
      .write(WriteOp::CreateSubscription(subscription.clone()))
      .write(WriteOp::UpdatePatient {
        patient: uid.clone(),
        update:  PatientUpdate {
          subscription_id: Some(subscription.subscription_id),
          plan:            Some(plan.id),
          status:          Some(PatientStatus::Pending),
        },
      })
      .write(WriteOp::AppendActivity(event));

    if self.settings.accrual == CommissionAccrual::OnSubscribe
      && let Some(clinic) = subscription.clinic_id.clinic()
      && self.clinic_exists(clinic).await?
    {
      batch = batch.write(WriteOp::AddCommission {
        clinic: clinic.clone(),
        amount: u64::from(subscription.clinic_commission),
      });
    }

    match self.commit(batch).await? {
      CommitOutcome::Applied => {
        tracing::info!(
          patient = %uid,
          clinic = %subscription.clinic_id,
          plan = %plan.id,
          subscription = %subscription.subscription_id,
          "created pending subscription"
        );
        Ok(subscription)
      }
      CommitOutcome::Conflict => {
        tracing::info!(patient = %uid, "enrolment lost a race with a concurrent enrolment");
        Err(Error::AlreadySubscribed(uid))
      }
    }
  }

  async fn clinic_exists(&self, clinic: &Uid) -> Result<bool> {
    let found = self
      .settings
      .step
      .read("load clinic", || self.store.get_clinic(clinic.clone()))
      .await
      .map_err(Error::StoreUnavailable)?;
    if found.is_none() {
      tracing::warn!(%clinic, "patient references a clinic with no record");
    }
    Ok(found.is_some())
  }
}
