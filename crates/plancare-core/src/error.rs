//! Error types for `plancare-core`.

use std::time::Duration;

use thiserror::Error;

use crate::{
  billing::PaymentOutcome,
  plan::PlanId,
  profile::Uid,
  role::Role,
  subscription::{SubscriptionId, SubscriptionStatus},
};

/// Why an external collaborator could not serve a request.
#[derive(Debug, Error)]
pub enum Unavailable {
  #[error("no response within {0:?}")]
  Timeout(Duration),

  #[error("{0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("not authenticated")]
  NotAuthenticated,

  #[error("role {0} may not perform this operation")]
  WrongRole(Role),

  #[error("profile not found: {0}")]
  ProfileNotFound(Uid),

  #[error("unknown plan: {0:?}")]
  PlanNotFound(String),

  #[error("patient {0} already holds an open subscription")]
  AlreadySubscribed(Uid),

  #[error("subscription not found: {0}")]
  SubscriptionNotFound(SubscriptionId),

  #[error("subscription {id} is {from} and cannot record payment {outcome}")]
  InvalidTransition {
    id:      SubscriptionId,
    from:    SubscriptionStatus,
    outcome: PaymentOutcome,
  },

  #[error("subscription {0} kept changing while being updated")]
  Contended(SubscriptionId),

  #[error("email already registered: {0}")]
  EmailInUse(String),

  #[error("invalid sign-up: {0}")]
  InvalidSignUp(String),

  #[error("document store unavailable: {0}")]
  StoreUnavailable(#[source] Unavailable),

  #[error("identity provider unavailable: {0}")]
  ProviderUnavailable(#[source] Unavailable),
}

/// A plan table that violates the pricing invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
  #[error("plan catalog is empty")]
  Empty,

  #[error("plan {0} appears more than once")]
  Duplicate(PlanId),

  #[error("plan {0} has a zero total")]
  ZeroTotal(PlanId),

  #[error("plan {0} pays no clinic commission")]
  ZeroCommission(PlanId),

  #[error(
    "plan {id}: commission {commission} + platform cut {platform_cut} != total {total}"
  )]
  SplitMismatch {
    id:           PlanId,
    total:        u32,
    commission:   u32,
    platform_cut: u32,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
