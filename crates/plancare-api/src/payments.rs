//! `POST /payments/webhook`: charge results from the payment collaborator.
//!
//! Authenticated by a shared secret in the `X-Webhook-Secret` header rather
//! than by user credentials.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::HeaderMap,
};
use plancare_core::{
  billing::PaymentNotice, identity::IdentityProvider, store::BrokerageStore,
  subscription::Subscription,
};

use crate::{AppState, error::ApiError};

pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `POST /payments/webhook`: body `{"subscriptionId":…,"outcome":"succeeded"}`
pub async fn webhook<S, P>(
  State(state): State<AppState<S, P>>,
  headers: HeaderMap,
  notice: Result<Json<PaymentNotice>, JsonRejection>,
) -> Result<Json<Subscription>, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let presented = headers.get(SECRET_HEADER).map(|v| v.as_bytes()).unwrap_or_default();
  if state.webhook_secret.is_empty() || !constant_time_eq(presented, state.webhook_secret.as_bytes())
  {
    tracing::warn!("payment webhook called with a bad secret");
    return Err(ApiError::Forbidden);
  }

  let Json(notice) = notice?;
  let subscription = state.brokerage.confirm_payment(notice).await?;
  Ok(Json(subscription))
}

#[cfg(test)]
mod tests {
  use super::constant_time_eq;

  #[test]
  fn compares_whole_secrets() {
    assert!(constant_time_eq(b"s3cret", b"s3cret"));
    assert!(!constant_time_eq(b"s3cret", b"s3creT"));
    assert!(!constant_time_eq(b"s3cret", b"s3cre"));
    assert!(!constant_time_eq(b"", b"x"));
  }
}
