//! Handlers for the plan catalog, sign-up, sign-in and `/me`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/plans` | Public |
//! | `POST` | `/accounts` | Body: `{"role":"patient","email":…,"password":…,"clinicId":…}` |
//! | `GET`  | `/auth/:section/login` | 303 to the caller's dashboard, or 401 |
//! | `GET`  | `/me` | The caller's profile |

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::StatusCode,
  response::{IntoResponse, Redirect},
};
use plancare_core::{
  identity::IdentityProvider,
  plan::Plan,
  role::{Section, canonical_dashboard},
  session::{AuthState, Session},
  signup::NewAccount,
  store::BrokerageStore,
};

use crate::{
  AppState,
  auth::{CurrentAuth, require_session},
  error::ApiError,
};

/// `GET /plans`
pub async fn list_plans<S, P>(State(state): State<AppState<S, P>>) -> Json<Vec<Plan>>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  Json(state.brokerage.catalog().list_plans().to_vec())
}

/// `POST /accounts`
pub async fn sign_up<S, P>(
  State(state): State<AppState<S, P>>,
  account: Result<Json<NewAccount>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let Json(account) = account?;
  let session = state.brokerage.sign_up(state.identity.as_ref(), account).await?;
  Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /auth/:section/login`
///
/// The sign-in entry point for a section: valid credentials are sent on to
/// their role's dashboard, anything else gets a Basic challenge.
pub async fn sign_in(
  Path(section): Path<Section>,
  CurrentAuth(auth): CurrentAuth,
) -> Result<Redirect, ApiError> {
  match auth {
    AuthState::Authenticated(session) => {
      tracing::info!(uid = %session.uid(), role = %session.role(), %section, "signed in");
      Ok(Redirect::to(canonical_dashboard(session.role()).path()))
    }
    AuthState::ProviderUnavailable => Err(ApiError::AuthUnavailable),
    _ => Err(ApiError::Unauthorized { realm: section_realm(section) }),
  }
}

fn section_realm(section: Section) -> &'static str {
  match section {
    Section::Patient => "patient",
    Section::Clinic => "clinic",
    Section::Admin => "admin",
  }
}

/// `GET /me`
pub async fn me(CurrentAuth(auth): CurrentAuth) -> Result<Json<Session>, ApiError> {
  require_session(&auth).cloned().map(Json)
}
