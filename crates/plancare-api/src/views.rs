//! Guarded dashboard views.
//!
//! Each view admits one role. Anonymous callers are redirected (303) to the
//! section's sign-in route; callers with another role are redirected to their
//! own dashboard.

use axum::{Json, extract::State};
use plancare_core::{
  dashboard::{AdminDashboard, ClinicDashboard, PatientDashboard},
  identity::IdentityProvider,
  role::{Role, Section},
  store::BrokerageStore,
};

use crate::{
  AppState,
  auth::{CurrentAuth, admit},
  error::ApiError,
};

/// `GET /patient/dashboard`
pub async fn patient<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentAuth(auth): CurrentAuth,
) -> Result<Json<PatientDashboard>, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let session = admit(&auth, Role::Patient, Section::Patient)?;
  Ok(Json(state.brokerage.patient_dashboard(Some(&session)).await?))
}

/// `GET /clinic/dashboard`
pub async fn clinic<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentAuth(auth): CurrentAuth,
) -> Result<Json<ClinicDashboard>, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let session = admit(&auth, Role::Clinic, Section::Clinic)?;
  Ok(Json(state.brokerage.clinic_dashboard(Some(&session)).await?))
}

/// `GET /admin/dashboard`
pub async fn admin<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentAuth(auth): CurrentAuth,
) -> Result<Json<AdminDashboard>, ApiError>
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  let session = admit(&auth, Role::Admin, Section::Admin)?;
  Ok(Json(state.brokerage.admin_dashboard(Some(&session)).await?))
}
