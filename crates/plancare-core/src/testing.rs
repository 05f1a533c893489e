//! In-memory collaborators for unit tests.

use std::{
  collections::{BTreeMap, HashMap},
  sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use uuid::Uuid;

use crate::{
  activity::ActivityEvent,
  identity::{Identity, IdentityProvider},
  profile::{Clinic, Patient, PatientStatus, Uid, UserProfile},
  store::{
    ActivityQuery, BrokerageStore, CommitOutcome, DocRef, Precondition, SubscriptionQuery,
    WriteBatch, WriteOp,
  },
  subscription::{Subscription, SubscriptionId, SubscriptionStatus},
};

#[derive(Debug, thiserror::Error)]
#[error("memory store is failing on purpose")]
pub struct InjectedFailure;

#[derive(Debug, Clone, Default)]
struct Docs {
  users:         BTreeMap<Uid, UserProfile>,
  patients:      BTreeMap<Uid, Patient>,
  clinics:       BTreeMap<Uid, Clinic>,
  subscriptions: Vec<Subscription>,
  activity:      Vec<ActivityEvent>,
}

impl Docs {
  fn holds(&self, precondition: &Precondition) -> bool {
    match precondition {
      Precondition::PatientSubscriptionIs { patient, expected } => self
        .patients
        .get(patient)
        .is_some_and(|p| p.subscription_id == *expected),
      Precondition::SubscriptionStatusIs { id, expected } => self
        .subscriptions
        .iter()
        .any(|s| s.subscription_id == *id && s.status == *expected),
      Precondition::DocumentAbsent(DocRef::User(uid)) => !self.users.contains_key(uid),
      Precondition::DocumentAbsent(DocRef::Patient(uid)) => !self.patients.contains_key(uid),
      Precondition::DocumentAbsent(DocRef::Clinic(uid)) => !self.clinics.contains_key(uid),
    }
  }

  /// Apply one write; `false` if it missed its document.
  fn apply(&mut self, op: WriteOp) -> bool {
    match op {
      WriteOp::CreateProfile(p) => self.users.insert(p.uid.clone(), p).is_none(),
      WriteOp::CreatePatient(p) => self.patients.insert(p.user_id.clone(), p).is_none(),
      WriteOp::CreateClinic(c) => self.clinics.insert(c.clinic_id.clone(), c).is_none(),
      WriteOp::CreateSubscription(s) => {
        self.subscriptions.push(s);
        true
      }
      WriteOp::AppendActivity(e) => {
        self.activity.push(e);
        true
      }
      WriteOp::UpdatePatient { patient, update } => {
        let Some(p) = self.patients.get_mut(&patient) else { return false };
        if let Some(id) = update.subscription_id {
          p.subscription_id = Some(id);
        }
        if let Some(plan) = update.plan {
          p.plan = Some(plan);
        }
        if let Some(status) = update.status {
          p.status = Some(status);
        }
        true
      }
      WriteOp::UpdateSubscriptionStatus { id, status, at } => {
        let Some(s) = self.subscriptions.iter_mut().find(|s| s.subscription_id == id) else {
          return false;
        };
        s.status = status;
        s.updated_at = at;
        true
      }
      WriteOp::AddReferral { clinic, patient } => {
        let Some(c) = self.clinics.get_mut(&clinic) else { return false };
        if !c.referred_patients.contains(&patient) {
          c.referred_patients.push(patient);
        }
        true
      }
      WriteOp::AddCommission { clinic, amount } => {
        let Some(c) = self.clinics.get_mut(&clinic) else { return false };
        c.commission_earned += amount;
        true
      }
      WriteOp::SetCommission { clinic, amount } => {
        let Some(c) = self.clinics.get_mut(&clinic) else { return false };
        c.commission_earned = c.commission_earned.max(amount);
        true
      }
    }
  }
}

/// A [`BrokerageStore`] over in-process maps, with switches for injecting
/// failures and stalls.
#[derive(Debug, Default)]
pub struct MemoryStore {
  docs:            Mutex<Docs>,
  failing:         AtomicBool,
  failing_commits: AtomicBool,
  stalled:         AtomicBool,
  held_commits:    AtomicBool,
}

impl MemoryStore {
  pub fn seed_profile(&self, profile: UserProfile) {
    self.docs.lock().unwrap().users.insert(profile.uid.clone(), profile);
  }

  pub fn seed_patient(&self, patient: Patient) {
    self.docs.lock().unwrap().patients.insert(patient.user_id.clone(), patient);
  }

  pub fn seed_clinic(&self, clinic: Clinic) {
    self.docs.lock().unwrap().clinics.insert(clinic.clinic_id.clone(), clinic);
  }

  /// Overwrite a subscription's status and its patient's, bypassing the
  /// workflows.
  pub fn force_status(&self, id: SubscriptionId, sub: SubscriptionStatus, patient: PatientStatus) {
    let mut docs = self.docs.lock().unwrap();
    let s = docs.subscriptions.iter_mut().find(|s| s.subscription_id == id).unwrap();
    s.status = sub;
    let owner = s.patient_id.clone();
    docs.patients.get_mut(&owner).unwrap().status = Some(patient);
  }

  /// Every call fails with a backend error.
  pub fn set_failing(&self, on: bool) { self.failing.store(on, Ordering::SeqCst); }

  /// Only commits fail.
  pub fn set_failing_commits(&self, on: bool) { self.failing_commits.store(on, Ordering::SeqCst); }

  /// Every call hangs until the caller gives up.
  pub fn set_stalled(&self, on: bool) { self.stalled.store(on, Ordering::SeqCst); }

  /// Commits wait while held and apply once released.
  pub fn hold_commits(&self, on: bool) { self.held_commits.store(on, Ordering::SeqCst); }

  async fn gate(&self) -> Result<(), InjectedFailure> {
    if self.stalled.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    if self.failing.load(Ordering::SeqCst) {
      return Err(InjectedFailure);
    }
    Ok(())
  }
}

fn newest_first<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
  items.reverse();
  items.truncate(limit.unwrap_or(usize::MAX));
  items
}

impl BrokerageStore for MemoryStore {
  type Error = InjectedFailure;

  async fn get_profile(&self, uid: Uid) -> Result<Option<UserProfile>, Self::Error> {
    self.gate().await?;
    Ok(self.docs.lock().unwrap().users.get(&uid).cloned())
  }

  async fn get_patient(&self, uid: Uid) -> Result<Option<Patient>, Self::Error> {
    self.gate().await?;
    Ok(self.docs.lock().unwrap().patients.get(&uid).cloned())
  }

  async fn list_patients(&self) -> Result<Vec<Patient>, Self::Error> {
    self.gate().await?;
    Ok(self.docs.lock().unwrap().patients.values().cloned().collect())
  }

  async fn get_clinic(&self, uid: Uid) -> Result<Option<Clinic>, Self::Error> {
    self.gate().await?;
    Ok(self.docs.lock().unwrap().clinics.get(&uid).cloned())
  }

  async fn list_clinics(&self) -> Result<Vec<Clinic>, Self::Error> {
    self.gate().await?;
    Ok(self.docs.lock().unwrap().clinics.values().cloned().collect())
  }

  async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, Self::Error> {
    self.gate().await?;
    let docs = self.docs.lock().unwrap();
    Ok(docs.subscriptions.iter().find(|s| s.subscription_id == id).cloned())
  }

  async fn list_subscriptions(
    &self,
    query: SubscriptionQuery,
  ) -> Result<Vec<Subscription>, Self::Error> {
    self.gate().await?;
    let docs = self.docs.lock().unwrap();
    let matching = docs
      .subscriptions
      .iter()
      .filter(|s| query.clinic.as_ref().is_none_or(|c| s.clinic_id.clinic() == Some(c)))
      .filter(|s| query.patient.as_ref().is_none_or(|p| &s.patient_id == p))
      .cloned()
      .collect();
    Ok(newest_first(matching, query.limit))
  }

  async fn list_activity(&self, query: ActivityQuery) -> Result<Vec<ActivityEvent>, Self::Error> {
    self.gate().await?;
    let docs = self.docs.lock().unwrap();
    let matching = docs
      .activity
      .iter()
      .filter(|e| query.clinic.as_ref().is_none_or(|c| e.clinic_id.clinic() == Some(c)))
      .cloned()
      .collect();
    Ok(newest_first(matching, query.limit))
  }

  async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, Self::Error> {
    self.gate().await?;
    while self.held_commits.load(Ordering::SeqCst) {
      tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    if self.failing_commits.load(Ordering::SeqCst) {
      return Err(InjectedFailure);
    }

    let mut docs = self.docs.lock().unwrap();
    if !batch.preconditions.iter().all(|p| docs.holds(p)) {
      return Ok(CommitOutcome::Conflict);
    }
    let mut staged = docs.clone();
    for op in batch.ops {
      if !staged.apply(op) {
        return Ok(CommitOutcome::Conflict);
      }
    }
    *docs = staged;
    Ok(CommitOutcome::Applied)
  }
}

/// An [`IdentityProvider`] keyed by email, storing passwords in the clear.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
  accounts: Mutex<HashMap<String, (Identity, String)>>,
}

impl IdentityProvider for MemoryIdentity {
  type Error = InjectedFailure;

  async fn create_account(
    &self,
    email: String,
    password: String,
  ) -> Result<Option<Identity>, Self::Error> {
    let mut accounts = self.accounts.lock().unwrap();
    if accounts.contains_key(&email) {
      return Ok(None);
    }
    let identity = Identity { uid: Uid::new(Uuid::new_v4().to_string()), email: email.clone() };
    accounts.insert(email, (identity.clone(), password));
    Ok(Some(identity))
  }

  async fn verify_password(
    &self,
    email: String,
    password: String,
  ) -> Result<Option<Identity>, Self::Error> {
    let accounts = self.accounts.lock().unwrap();
    Ok(
      accounts
        .get(&email)
        .filter(|(_, stored)| *stored == password)
        .map(|(identity, _)| identity.clone()),
    )
  }
}
