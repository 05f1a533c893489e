//! Admin maintenance endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/admin/clinics/:id/commission` | Recompute `commissionEarned` |
//! | `POST` | `/admin/repair/:uid` | Complete a half-finished sign-up |

use axum::{
  Json,
  extract::{Path, State},
};
use plancare_core::{
  identity::IdentityProvider,
  profile::Uid,
  role::Role,
  store::BrokerageStore,
};
use serde::Serialize;

use crate::{
  AppState,
  auth::{CurrentAuth, require_role},
  error::ApiError,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionBody {
  pub clinic_id:         Uid,
  pub commission_earned: u64,
}

#[derive(Debug, Serialize)]
pub struct RepairBody {
  pub uid:      Uid,
  pub repaired: bool,
}

/// `POST /admin/clinics/:id/commission`
pub async fn recompute_commission<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentAuth(auth): CurrentAuth,
  Path(id): Path<String>,
) -> Result<Json<CommissionBody>, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let admin = require_role(&auth, Role::Admin)?;
  let clinic_id = Uid::new(id);
  let commission_earned = state.brokerage.recompute_commission(Some(admin), &clinic_id).await?;
  Ok(Json(CommissionBody { clinic_id, commission_earned }))
}

/// `POST /admin/repair/:uid`
pub async fn repair<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentAuth(auth): CurrentAuth,
  Path(uid): Path<String>,
) -> Result<Json<RepairBody>, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let admin = require_role(&auth, Role::Admin)?;
  let uid = Uid::new(uid);
  let repaired = state.brokerage.repair_sign_up(&uid).await?;
  tracing::info!(admin = %admin.uid(), %uid, repaired, "sign-up repair requested");
  Ok(Json(RepairBody { uid, repaired }))
}
