//! HTTP Basic credentials → [`AuthState`], and the guard helpers built on it.

use std::convert::Infallible;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use plancare_core::{
  Error as CoreError,
  guard::{AccessGuard, GuardDecision},
  identity::{IdentityProvider, normalize_email},
  role::{Role, Section},
  session::{AuthState, Session},
  store::BrokerageStore,
};

use crate::{AppState, error::ApiError};

/// The caller's authentication state, resolved once per request.
///
/// Never rejects: missing or wrong credentials yield
/// [`AuthState::Unauthenticated`] and handlers decide what that means.
pub struct CurrentAuth(pub AuthState);

/// Decode an `Authorization: Basic …` header into `(email, password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let encoded = value.strip_prefix("Basic ")?;
  let decoded = B64.decode(encoded).ok()?;
  let creds = String::from_utf8(decoded).ok()?;
  let (email, password) = creds.split_once(':')?;
  Some((normalize_email(email), password.to_owned()))
}

/// Verify the request's credentials and resolve the caller's profile.
pub async fn authenticate<S, P>(headers: &HeaderMap, state: &AppState<S, P>) -> AuthState
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let Some((email, password)) = basic_credentials(headers) else {
    return AuthState::Unauthenticated;
  };

  let verified = state
    .brokerage
    .settings()
    .step
    .read("verify password", || {
      state.identity.verify_password(email.clone(), password.clone())
    })
    .await;

  let identity = match verified {
    Ok(Some(identity)) => identity,
    Ok(None) => {
      tracing::debug!(%email, "rejected credentials");
      return AuthState::Unauthenticated;
    }
    Err(e) => {
      tracing::warn!(error = %e, "identity provider unavailable");
      return AuthState::ProviderUnavailable;
    }
  };

  let result = state.brokerage.resolver().session(&identity).await;
  AuthState::from_resolution(&identity.uid, result)
}

impl<S, P> FromRequestParts<AppState<S, P>> for CurrentAuth
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, P>,
  ) -> Result<Self, Self::Rejection> {
    Ok(CurrentAuth(authenticate(&parts.headers, state).await))
  }
}

/// Run the access guard for a view in `section` admitting only `role`.
pub fn admit(auth: &AuthState, role: Role, section: Section) -> Result<Session, ApiError> {
  let guard = AccessGuard::new([role]).with_sign_in(section.sign_in());
  match guard.decide(auth) {
    GuardDecision::Render(session) => Ok(session),
    GuardDecision::Redirect(route) => {
      tracing::debug!(to = route.path(), "guard redirect");
      Err(ApiError::Redirect(route))
    }
    // A per-request state is always resolved; treat anything else as an outage.
    GuardDecision::Wait => Err(ApiError::AuthUnavailable),
  }
}

/// Require an authenticated caller for a JSON endpoint.
pub fn require_session(auth: &AuthState) -> Result<&Session, ApiError> {
  match auth {
    AuthState::Authenticated(session) => Ok(session),
    AuthState::ProfileMissing(uid) => Err(CoreError::ProfileNotFound(uid.clone()).into()),
    AuthState::ProviderUnavailable | AuthState::Loading => Err(ApiError::AuthUnavailable),
    AuthState::Unauthenticated => Err(ApiError::Unauthorized { realm: "plancare" }),
  }
}

/// Like [`require_session`], additionally requiring `role`.
pub fn require_role(auth: &AuthState, role: Role) -> Result<&Session, ApiError> {
  let session = require_session(auth)?;
  if session.role() != role {
    return Err(CoreError::WrongRole(session.role()).into());
  }
  Ok(session)
}
