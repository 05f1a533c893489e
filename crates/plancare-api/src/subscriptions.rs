//! `POST /patient/subscription`: enrol the caller in a plan.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::StatusCode,
  response::IntoResponse,
};
use plancare_core::{identity::IdentityProvider, store::BrokerageStore};
use serde::Deserialize;

use crate::{
  AppState,
  auth::{CurrentAuth, require_session},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
  pub plan: String,
}

/// `POST /patient/subscription`: body `{"plan":"B"}`
pub async fn create<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentAuth(auth): CurrentAuth,
  body: Result<Json<SubscribeBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let session = require_session(&auth)?;
  let Json(body) = body?;
  let subscription = state.brokerage.subscribe(Some(session), &body.plan).await?;
  Ok((StatusCode::CREATED, Json(subscription)))
}
