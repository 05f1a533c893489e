//! The access guard: render, wait, or redirect.
//!
//! | state | decision |
//! |-------|----------|
//! | `Loading` | wait, never redirect |
//! | `Unauthenticated`, `ProfileMissing`, `ProviderUnavailable` | redirect to the section's sign-in |
//! | `Authenticated`, role not allowed | redirect to the role's dashboard |
//! | `Authenticated`, role allowed | render |

use tokio::sync::watch;

use crate::{
  role::{Role, Route, canonical_dashboard},
  session::{AuthState, Session},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
  /// Show a neutral waiting indicator.
  Wait,
  Render(Session),
  Redirect(Route),
}

/// The set of roles a view admits, and where anonymous visitors are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGuard {
  allowed: Vec<Role>,
  sign_in: Route,
}

impl AccessGuard {
  /// A guard admitting `allowed`, sending anonymous visitors to the patient
  /// login.
  pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
    Self {
      allowed: allowed.into_iter().collect(),
      sign_in: Route::PatientLogin,
    }
  }

  pub fn with_sign_in(mut self, route: Route) -> Self {
    self.sign_in = route;
    self
  }

  pub fn allows(&self, role: Role) -> bool {
    role != Role::Unknown && self.allowed.contains(&role)
  }

  pub fn decide(&self, state: &AuthState) -> GuardDecision {
    match state {
      AuthState::Loading => GuardDecision::Wait,
      AuthState::Unauthenticated
      | AuthState::ProfileMissing(_)
      | AuthState::ProviderUnavailable => GuardDecision::Redirect(self.sign_in),
      AuthState::Authenticated(session) if self.allows(session.role()) => {
        GuardDecision::Render(session.clone())
      }
      AuthState::Authenticated(session) => {
        GuardDecision::Redirect(canonical_dashboard(session.role()))
      }
    }
  }
}

/// Re-evaluates a guard whenever the auth state or the guard itself changes.
pub struct GuardWatch {
  auth:  watch::Receiver<AuthState>,
  guard: watch::Receiver<AccessGuard>,
}

impl GuardWatch {
  pub fn new(auth: watch::Receiver<AuthState>, guard: watch::Receiver<AccessGuard>) -> Self {
    Self { auth, guard }
  }

  /// The decision for the values currently held.
  pub fn decision(&self) -> GuardDecision { self.guard.borrow().decide(&self.auth.borrow()) }

  /// Wait for either input to change and return the new decision. Returns
  /// `None` once either sender has gone away.
  pub async fn changed(&mut self) -> Option<GuardDecision> {
    tokio::select! {
      changed = self.auth.changed() => changed.ok()?,
      changed = self.guard.changed() => changed.ok()?,
    }
    self.auth.borrow_and_update();
    self.guard.borrow_and_update();
    Some(self.decision())
  }
}
