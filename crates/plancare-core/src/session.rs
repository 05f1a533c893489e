//! Sessions and the tracked authentication state.
//!
//! A [`Session`] is passed explicitly to the guard and the workflows. The
//! [`track`] task keeps an [`AuthState`] up to date as the identity provider
//! reports sign-ins and sign-outs.

use serde::Serialize;
use tokio::sync::watch;

use crate::{
  error::Error,
  identity::Identity,
  profile::{Uid, UserProfile},
  resolver::RoleResolver,
  role::Role,
  store::BrokerageStore,
};

/// An authenticated identity together with its resolved profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
  profile: UserProfile,
}

impl Session {
  pub fn new(profile: UserProfile) -> Self { Self { profile } }

  pub fn uid(&self) -> &Uid { &self.profile.uid }

  pub fn email(&self) -> &str { &self.profile.email }

  pub fn role(&self) -> Role { self.profile.role }

  pub fn profile(&self) -> &UserProfile { &self.profile }
}

/// What is currently known about who is using the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
  /// A profile lookup is outstanding.
  Loading,
  Unauthenticated,
  /// The identity is valid but has no `users` document.
  ProfileMissing(Uid),
  /// The provider or the profile store could not be reached.
  ProviderUnavailable,
  Authenticated(Session),
}

impl AuthState {
  pub fn session(&self) -> Option<&Session> {
    match self {
      Self::Authenticated(session) => Some(session),
      _ => None,
    }
  }

  /// The state reached once resolution of `uid` has finished.
  pub fn from_resolution(uid: &Uid, result: Result<Session, Error>) -> Self {
    match result {
      Ok(session) => Self::Authenticated(session),
      Err(Error::ProfileNotFound(_)) => Self::ProfileMissing(uid.clone()),
      Err(e) => {
        tracing::warn!(%uid, error = %e, "role resolution failed");
        Self::ProviderUnavailable
      }
    }
  }
}

/// Follow `identities`, resolving each new identity's role.
///
/// The returned channel starts in [`AuthState::Loading`] and passes through
/// `Loading` again on every sign-in. A result for an identity that has since
/// been replaced is dropped rather than published. The task ends when the
/// identity sender is dropped or every state receiver is gone.
pub fn track<S>(
  mut identities: watch::Receiver<Option<Identity>>,
  resolver: RoleResolver<S>,
) -> watch::Receiver<AuthState>
where
  S: BrokerageStore + 'static,
{
  let (tx, rx) = watch::channel(AuthState::Loading);

  tokio::spawn(async move {
    loop {
      let identity = identities.borrow_and_update().clone();
      match identity {
        None => {
          tx.send_replace(AuthState::Unauthenticated);
        }
        Some(identity) => {
          tx.send_replace(AuthState::Loading);
          let result = resolver.session(&identity).await;
          if !identities.has_changed().unwrap_or(false) {
            tx.send_replace(AuthState::from_resolution(&identity.uid, result));
          }
        }
      }

      tokio::select! {
        changed = identities.changed() => {
          if changed.is_err() {
            break;
          }
        }
        () = tx.closed() => break,
      }
    }
  });

  rx
}
