//! The `BrokerageStore` trait and the write-batch types it commits.
//!
//! The trait is implemented by document-store backends (e.g.
//! `plancare-store-sqlite`). Workflows depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  activity::ActivityEvent,
  profile::{Clinic, Patient, PatientUpdate, Uid, UserProfile},
  subscription::{Subscription, SubscriptionId, SubscriptionStatus},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`BrokerageStore::list_subscriptions`]. Results are newest
/// first.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionQuery {
  pub clinic:  Option<Uid>,
  pub patient: Option<Uid>,
  pub limit:   Option<usize>,
}

/// Parameters for [`BrokerageStore::list_activity`]. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
  pub clinic: Option<Uid>,
  pub limit:  Option<usize>,
}

// ─── Write batches ───────────────────────────────────────────────────────────

/// A document addressed by collection and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocRef {
  User(Uid),
  Patient(Uid),
  Clinic(Uid),
}

/// A condition that must hold, inside the commit, for a batch to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
  /// The patient exists and its `subscriptionId` equals `expected`.
  PatientSubscriptionIs {
    patient:  Uid,
    expected: Option<SubscriptionId>,
  },
  /// The subscription exists and has status `expected`.
  SubscriptionStatusIs {
    id:       SubscriptionId,
    expected: SubscriptionStatus,
  },
  DocumentAbsent(DocRef),
}

/// One document write.
///
/// `Create*` and `Append*` insert new documents. Every other variant must hit
/// an existing document; a miss aborts the batch as a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
  CreateProfile(UserProfile),
  CreatePatient(Patient),
  CreateClinic(Clinic),
  CreateSubscription(Subscription),
  AppendActivity(ActivityEvent),
  UpdatePatient {
    patient: Uid,
    update:  PatientUpdate,
  },
  UpdateSubscriptionStatus {
    id:     SubscriptionId,
    status: SubscriptionStatus,
    at:     DateTime<Utc>,
  },
  /// Add `patient` to the clinic's referred-patient set (no-op if present).
  AddReferral {
    clinic:  Uid,
    patient: Uid,
  },
  AddCommission {
    clinic: Uid,
    amount: u64,
  },
  /// Raise `commissionEarned` to `amount`; a larger stored value is kept.
  SetCommission {
    clinic: Uid,
    amount: u64,
  },
}

/// Writes applied all-or-nothing, guarded by preconditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
  pub preconditions: Vec<Precondition>,
  pub ops:           Vec<WriteOp>,
}

impl WriteBatch {
  pub fn new() -> Self { Self::default() }

  pub fn require(mut self, precondition: Precondition) -> Self {
    self.preconditions.push(precondition);
    self
  }

  pub fn write(mut self, op: WriteOp) -> Self {
    self.ops.push(op);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  /// Every write was applied.
  Applied,
  /// A precondition failed or an update missed its document; nothing was
  /// written.
  Conflict,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the document store holding the brokerage collections.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait BrokerageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_profile(
    &self,
    uid: Uid,
  ) -> impl Future<Output = Result<Option<UserProfile>, Self::Error>> + Send + '_;

  fn get_patient(
    &self,
    uid: Uid,
  ) -> impl Future<Output = Result<Option<Patient>, Self::Error>> + Send + '_;

  fn list_patients(
    &self,
  ) -> impl Future<Output = Result<Vec<Patient>, Self::Error>> + Send + '_;

  /// Retrieve a clinic with its referred-patient set assembled.
  fn get_clinic(
    &self,
    uid: Uid,
  ) -> impl Future<Output = Result<Option<Clinic>, Self::Error>> + Send + '_;

  fn list_clinics(
    &self,
  ) -> impl Future<Output = Result<Vec<Clinic>, Self::Error>> + Send + '_;

  fn get_subscription(
    &self,
    id: SubscriptionId,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  fn list_subscriptions(
    &self,
    query: SubscriptionQuery,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + '_;

  fn list_activity(
    &self,
    query: ActivityQuery,
  ) -> impl Future<Output = Result<Vec<ActivityEvent>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Apply `batch` atomically. Preconditions are evaluated inside the same
  /// transaction as the writes.
  fn commit(
    &self,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;
}
