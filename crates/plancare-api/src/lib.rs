//! JSON HTTP API for the plancare brokerage.
//!
//! Exposes an axum [`Router`] backed by any [`BrokerageStore`] and
//! [`IdentityProvider`]. Callers authenticate with HTTP Basic credentials on
//! every request; TLS and transport concerns are the caller's responsibility.
//!
//! | Method | Path | Access |
//! |--------|------|--------|
//! | `GET`  | `/plans` | public |
//! | `POST` | `/accounts` | public |
//! | `GET`  | `/auth/:section/login` | public |
//! | `GET`  | `/me` | authenticated |
//! | `GET`  | `/patient/dashboard` | patient, guarded |
//! | `GET`  | `/clinic/dashboard` | clinic, guarded |
//! | `GET`  | `/admin/dashboard` | admin, guarded |
//! | `POST` | `/patient/subscription` | patient |
//! | `POST` | `/payments/webhook` | webhook secret |
//! | `POST` | `/admin/clinics/:id/commission` | admin |
//! | `POST` | `/admin/repair/:uid` | admin |

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod error;
pub mod payments;
pub mod subscriptions;
pub mod views;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use plancare_core::{Brokerage, identity::IdentityProvider, store::BrokerageStore};

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, P> {
  pub brokerage:      Brokerage<S>,
  pub identity:       Arc<P>,
  /// Shared secret expected in `X-Webhook-Secret`. Empty disables the webhook.
  pub webhook_secret: Arc<str>,
}

impl<S, P> Clone for AppState<S, P> {
  fn clone(&self) -> Self {
    Self {
      brokerage:      self.brokerage.clone(),
      identity:       Arc::clone(&self.identity),
      webhook_secret: Arc::clone(&self.webhook_secret),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S, P>(state: AppState<S, P>) -> Router
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  Router::new()
    // Public
    .route("/plans", get(accounts::list_plans::<S, P>))
    .route("/accounts", post(accounts::sign_up::<S, P>))
    .route("/auth/{section}/login", get(accounts::sign_in))
    .route("/me", get(accounts::me))
    // Guarded views
    .route("/patient/dashboard", get(views::patient::<S, P>))
    .route("/clinic/dashboard", get(views::clinic::<S, P>))
    .route("/admin/dashboard", get(views::admin::<S, P>))
    // Workflows
    .route("/patient/subscription", post(subscriptions::create::<S, P>))
    .route("/payments/webhook", post(payments::webhook::<S, P>))
    .route("/admin/clinics/{id}/commission", post(admin::recompute_commission::<S, P>))
    .route("/admin/repair/{uid}", post(admin::repair::<S, P>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
