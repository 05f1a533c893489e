//! Role resolution: identity → `users/{uid}` profile.

use std::sync::Arc;

use crate::{
  error::{Error, Result},
  identity::Identity,
  profile::{Uid, UserProfile},
  session::Session,
  step::StepPolicy,
  store::BrokerageStore,
};

/// Read-only lookup of a principal's profile and role.
pub struct RoleResolver<S> {
  store:  Arc<S>,
  policy: StepPolicy,
}

impl<S> Clone for RoleResolver<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), policy: self.policy } }
}

impl<S: BrokerageStore> RoleResolver<S> {
  pub fn new(store: Arc<S>, policy: StepPolicy) -> Self { Self { store, policy } }

  /// Look up the profile for `uid`.
  ///
  /// A missing document is [`Error::ProfileNotFound`]; a backend that fails or
  /// does not answer is [`Error::ProviderUnavailable`].
  pub async fn resolve(&self, uid: &Uid) -> Result<UserProfile> {
    self
      .policy
      .read("resolve profile", || self.store.get_profile(uid.clone()))
      .await
      .map_err(Error::ProviderUnavailable)?
      .ok_or_else(|| Error::ProfileNotFound(uid.clone()))
  }

  /// Resolve `identity` into a [`Session`].
  pub async fn session(&self, identity: &Identity) -> Result<Session> {
    let profile = self.resolve(&identity.uid).await?;
    Ok(Session::new(profile))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::Utc;

  use super::*;
  use crate::{role::Role, testing::MemoryStore};

  fn policy() -> StepPolicy {
    StepPolicy {
      timeout:      Duration::from_millis(30),
      read_retries: 0,
      backoff:      Duration::from_millis(1),
    }
  }

  #[tokio::test]
  async fn resolves_existing_profile() {
    let store = Arc::new(MemoryStore::default());
    store.seed_profile(UserProfile {
      uid:        Uid::from("c-1"),
      email:      "clinic@example.com".into(),
      role:       Role::Clinic,
      created_at: Utc::now(),
    });

    let resolver = RoleResolver::new(store, policy());
    let profile = resolver.resolve(&Uid::from("c-1")).await.unwrap();
    assert_eq!(profile.role, Role::Clinic);
  }

  #[tokio::test]
  async fn missing_profile_is_not_found() {
    let resolver = RoleResolver::new(Arc::new(MemoryStore::default()), policy());
    let err = resolver.resolve(&Uid::from("ghost")).await.unwrap_err();
    assert!(matches!(err, Error::ProfileNotFound(uid) if uid.as_str() == "ghost"));
  }

  #[tokio::test]
  async fn failing_backend_is_provider_unavailable() {
    let store = Arc::new(MemoryStore::default());
    store.set_failing(true);
    let resolver = RoleResolver::new(Arc::clone(&store), policy());
    let err = resolver.resolve(&Uid::from("anyone")).await.unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable(_)));

    store.set_failing(false);
    store.set_stalled(true);
    let err = resolver.resolve(&Uid::from("anyone")).await.unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable(crate::error::Unavailable::Timeout(_))));
  }
}
