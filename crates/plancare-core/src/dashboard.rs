//! Per-role read models.

use serde::Serialize;

use crate::{
  activity::ActivityEvent,
  error::{Error, Result},
  plan::{Plan, PlanId},
  profile::{Clinic, Patient, UserProfile},
  role::Role,
  session::Session,
  store::{ActivityQuery, BrokerageStore, SubscriptionQuery},
  subscription::{Subscription, SubscriptionStatus},
  workflow::Brokerage,
};

/// How many feed entries and subscriptions the overview pages show.
pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDashboard {
  pub profile:      UserProfile,
  pub patient:      Patient,
  pub subscription: Option<Subscription>,
  /// The catalog entry for the subscribed plan, at today's prices.
  pub plan:         Option<Plan>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicStats {
  pub total_patients:       usize,
  pub active_subscriptions: usize,
  /// Commission owed per month by active subscriptions.
  pub monthly_commission:   u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicDashboard {
  pub clinic:          Clinic,
  pub stats:           ClinicStats,
  pub subscriptions:   Vec<Subscription>,
  pub recent_activity: Vec<ActivityEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
  pub total_clinics:        usize,
  pub total_patients:       usize,
  pub active_subscriptions: usize,
  /// Billed per month across active subscriptions.
  pub monthly_revenue:      u64,
  /// The platform's share of `monthly_revenue`.
  pub platform_revenue:     u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUptake {
  pub plan:               PlanId,
  pub name:               String,
  pub active_subscribers: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
  pub stats:                SystemStats,
  pub plans:                Vec<PlanUptake>,
  pub clinics:              Vec<Clinic>,
  pub recent_subscriptions: Vec<Subscription>,
  pub recent_activity:      Vec<ActivityEvent>,
}

fn active(subscriptions: &[Subscription]) -> impl Iterator<Item = &Subscription> {
  subscriptions.iter().filter(|s| s.status == SubscriptionStatus::Active)
}

impl<S: BrokerageStore + 'static> Brokerage<S> {
  pub async fn patient_dashboard(&self, session: Option<&Session>) -> Result<PatientDashboard> {
    let session = self.require_role(session, Role::Patient)?;
    let uid = session.uid().clone();
    let step = self.settings.step;

    let patient = step
      .read("load patient", || self.store.get_patient(uid.clone()))
      .await
      .map_err(Error::StoreUnavailable)?
      .ok_or_else(|| Error::ProfileNotFound(uid.clone()))?;

    let subscription = match patient.subscription_id {
      Some(id) => step
        .read("load subscription", || self.store.get_subscription(id))
        .await
        .map_err(Error::StoreUnavailable)?,
      None => None,
    };
    let plan = patient.plan.and_then(|id| self.catalog.get(id)).cloned();

    Ok(PatientDashboard {
      profile: session.profile().clone(),
      patient,
      subscription,
      plan,
    })
  }

  pub async fn clinic_dashboard(&self, session: Option<&Session>) -> Result<ClinicDashboard> {
    let session = self.require_role(session, Role::Clinic)?;
    let uid = session.uid().clone();
    let step = self.settings.step;

    let (clinic, subscriptions, recent_activity) = tokio::try_join!(
      async {
        step
          .read("load clinic", || self.store.get_clinic(uid.clone()))
          .await
          .map_err(Error::StoreUnavailable)?
          .ok_or_else(|| Error::ProfileNotFound(uid.clone()))
      },
      async {
        step
          .read("list clinic subscriptions", || {
            self.store.list_subscriptions(SubscriptionQuery {
              clinic: Some(uid.clone()),
              ..SubscriptionQuery::default()
            })
          })
          .await
          .map_err(Error::StoreUnavailable)
      },
      async {
        step
          .read("list clinic activity", || {
            self.store.list_activity(ActivityQuery {
              clinic: Some(uid.clone()),
              limit:  Some(RECENT_LIMIT),
            })
          })
          .await
          .map_err(Error::StoreUnavailable)
      },
    )?;

    let stats = ClinicStats {
      total_patients:       clinic.referred_patients.len(),
      active_subscriptions: active(&subscriptions).count(),
      monthly_commission:   active(&subscriptions).map(|s| u64::from(s.clinic_commission)).sum(),
    };

    Ok(ClinicDashboard { clinic, stats, subscriptions, recent_activity })
  }

  pub async fn admin_dashboard(&self, session: Option<&Session>) -> Result<AdminDashboard> {
    self.require_role(session, Role::Admin)?;
    let step = self.settings.step;

    let (clinics, patients, subscriptions, recent_activity) = tokio::try_join!(
      async {
        step
          .read("list clinics", || self.store.list_clinics())
          .await
          .map_err(Error::StoreUnavailable)
      },
      async {
        step
          .read("list patients", || self.store.list_patients())
          .await
          .map_err(Error::StoreUnavailable)
      },
      async {
        step
          .read("list subscriptions", || {
            self.store.list_subscriptions(SubscriptionQuery::default())
          })
          .await
          .map_err(Error::StoreUnavailable)
      },
      async {
        step
          .read("list activity", || {
            self.store.list_activity(ActivityQuery { clinic: None, limit: Some(RECENT_LIMIT) })
          })
          .await
          .map_err(Error::StoreUnavailable)
      },
    )?;

    let stats = SystemStats {
      total_clinics:        clinics.len(),
      total_patients:       patients.len(),
      active_subscriptions: active(&subscriptions).count(),
      monthly_revenue:      active(&subscriptions).map(|s| u64::from(s.amount)).sum(),
      platform_revenue:     active(&subscriptions).map(|s| u64::from(s.admin_revenue)).sum(),
    };

    let plans = self
      .catalog
      .list_plans()
      .iter()
      .map(|plan| PlanUptake {
        plan:               plan.id,
        name:               plan.name.clone(),
        active_subscribers: active(&subscriptions).filter(|s| s.plan == plan.id).count(),
      })
      .collect();

    let recent_subscriptions = subscriptions.into_iter().take(RECENT_LIMIT).collect();

    Ok(AdminDashboard { stats, plans, clinics, recent_subscriptions, recent_activity })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::Utc;

  use super::*;
  use crate::{
    billing::{PaymentNotice, PaymentOutcome},
    plan::PlanCatalog,
    profile::{ClinicRef, PatientStatus, Uid},
    store::{WriteBatch, WriteOp},
    testing::MemoryStore,
    workflow::WorkflowSettings,
  };

  fn session(uid: &str, role: Role) -> Session {
    Session::new(UserProfile {
      uid:        Uid::from(uid),
      email:      format!("{uid}@example.com"),
      role,
      created_at: Utc::now(),
    })
  }

  async fn populated() -> (Arc<MemoryStore>, Brokerage<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let broker =
      Brokerage::new(Arc::clone(&store), PlanCatalog::standard(), WorkflowSettings::default());

    store.seed_clinic(Clinic::new(Uid::from("clinic-7"), "Seven".into(), Utc::now()));
    for (uid, clinic, plan) in [("P1", Some("clinic-7"), "B"), ("P2", Some("clinic-7"), "C"), ("P3", None, "A")] {
      store.seed_patient(Patient::new(
        Uid::from(uid),
        ClinicRef::from(clinic.map(Uid::from)),
        Utc::now(),
      ));
      if let Some(clinic) = clinic {
        store
          .commit(WriteBatch::new().write(WriteOp::AddReferral {
            clinic:  Uid::from(clinic),
            patient: Uid::from(uid),
          }))
          .await
          .unwrap();
      }
      broker.subscribe(Some(&session(uid, Role::Patient)), plan).await.unwrap();
    }
    (store, broker)
  }

  #[tokio::test]
  async fn patient_sees_own_subscription() {
    let (_store, broker) = populated().await;
    let view = broker.patient_dashboard(Some(&session("P1", Role::Patient))).await.unwrap();
    assert_eq!(view.patient.status, Some(PatientStatus::Pending));
    assert_eq!(view.subscription.as_ref().map(|s| s.amount), Some(4000));
    assert_eq!(view.plan.map(|p| p.id), Some(PlanId::B));
  }

  #[tokio::test]
  async fn clinic_sees_its_patients_only() {
    let (_store, broker) = populated().await;
    let first = broker
      .clinic_dashboard(Some(&session("clinic-7", Role::Clinic)))
      .await
      .unwrap();
    assert_eq!(first.subscriptions.len(), 2);
    assert_eq!(first.recent_activity.len(), 2);
    assert_eq!(first.stats, ClinicStats {
      total_patients:       2,
      active_subscriptions: 0,
      monthly_commission:   0,
    });

    let p1 = first.subscriptions.iter().find(|s| s.patient_id.as_str() == "P1").unwrap();
    broker
      .confirm_payment(PaymentNotice {
        subscription_id: p1.subscription_id,
        outcome:         PaymentOutcome::Succeeded,
      })
      .await
      .unwrap();

    let after = broker
      .clinic_dashboard(Some(&session("clinic-7", Role::Clinic)))
      .await
      .unwrap();
    assert_eq!(after.stats.active_subscriptions, 1);
    assert_eq!(after.stats.monthly_commission, 2500);
  }

  #[tokio::test]
  async fn admin_sees_totals() {
    let (_store, broker) = populated().await;
    let view = broker.admin_dashboard(Some(&session("root", Role::Admin))).await.unwrap();
    assert_eq!(view.stats.total_clinics, 1);
    assert_eq!(view.stats.total_patients, 3);
    assert_eq!(view.stats.active_subscriptions, 0);
    assert_eq!(view.recent_subscriptions.len(), 3);
    assert_eq!(view.recent_activity.len(), 3);
    assert_eq!(view.plans.len(), 3);
  }

  #[tokio::test]
  async fn dashboards_check_the_role() {
    let (_store, broker) = populated().await;
    let patient = session("P1", Role::Patient);
    assert!(matches!(broker.admin_dashboard(Some(&patient)).await, Err(Error::WrongRole(Role::Patient))));
    assert!(matches!(broker.clinic_dashboard(None).await, Err(Error::NotAuthenticated)));
  }
}
