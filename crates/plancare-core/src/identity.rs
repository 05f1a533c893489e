//! The identity provider seam and a client-side handle over it.
//!
//! The provider owns credentials; this crate only ever sees the resulting
//! [`Identity`]. [`AuthClient`] adds the "current user" notion on top: sign-in
//! and sign-out publish the new identity on a watch channel that any number of
//! consumers can subscribe to.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
  error::{Error, Result},
  profile::Uid,
  step::StepPolicy,
};

/// An authenticated subject as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub uid:   Uid,
  pub email: String,
}

/// Abstraction over an email/password identity provider.
pub trait IdentityProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Register a new account. Returns `None` if the email is already taken.
  fn create_account(
    &self,
    email: String,
    password: String,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Check a credential pair. Returns `None` if they do not match an account.
  fn verify_password(
    &self,
    email: String,
    password: String,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;
}

/// Normalise an email address the way accounts are keyed.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// A signed-in-or-not handle over an [`IdentityProvider`].
pub struct AuthClient<P> {
  provider: Arc<P>,
  policy:   StepPolicy,
  current:  watch::Sender<Option<Identity>>,
}

impl<P: IdentityProvider> AuthClient<P> {
  pub fn new(provider: Arc<P>, policy: StepPolicy) -> Self {
    let (current, _) = watch::channel(None);
    Self { provider, policy, current }
  }

  /// Create an account and sign in as it.
  pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
    let email = normalize_email(email);
    let identity = self
      .policy
      .once(self.provider.create_account(email.clone(), password.to_owned()))
      .await
      .map_err(Error::ProviderUnavailable)?
      .ok_or(Error::EmailInUse(email))?;
    self.current.send_replace(Some(identity.clone()));
    Ok(identity)
  }

  /// Sign in; a wrong password leaves the current identity unchanged.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
    let email = normalize_email(email);
    let identity = self
      .policy
      .read("verify password", || {
        self.provider.verify_password(email.clone(), password.to_owned())
      })
      .await
      .map_err(Error::ProviderUnavailable)?
      .ok_or(Error::NotAuthenticated)?;
    self.current.send_replace(Some(identity.clone()));
    Ok(identity)
  }

  pub fn sign_out(&self) { self.current.send_replace(None); }

  pub fn current(&self) -> Option<Identity> { self.current.borrow().clone() }

  /// Observe the current identity. The receiver sees every later change.
  pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> { self.current.subscribe() }
}
