//! Router tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{HeaderMap, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use plancare_core::{
  Brokerage, WorkflowSettings,
  identity::{Identity, IdentityProvider},
  plan::PlanCatalog,
};
use plancare_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::*;

const SECRET: &str = "whsec-test";

async fn make_state() -> (SqliteStore, AppState<SqliteStore, SqliteStore>) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let state = AppState {
    brokerage:      Brokerage::new(
      Arc::new(store.clone()),
      PlanCatalog::standard(),
      WorkflowSettings::default(),
    ),
    identity:       Arc::new(store.clone()),
    webhook_secret: Arc::from(SECRET),
  };
  (store, state)
}

struct Reply {
  status:  StatusCode,
  headers: HeaderMap,
  body:    Value,
}

async fn send<P: IdentityProvider + 'static>(
  state: &AppState<SqliteStore, P>,
  method: &str,
  uri: &str,
  creds: Option<(&str, &str)>,
  extra: Vec<(&str, &str)>,
  body: Option<Value>,
) -> Reply {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some((user, pass)) = creds {
    builder = builder.header(
      header::AUTHORIZATION,
      format!("Basic {}", B64.encode(format!("{user}:{pass}"))),
    );
  }
  for (k, v) in extra {
    builder = builder.header(k, v);
  }
  let req = match body {
    Some(json) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };

  let resp = router(state.clone()).oneshot(req).await.unwrap();
  let status = resp.status();
  let headers = resp.headers().clone();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  Reply { status, headers, body }
}

/// Register a clinic and one patient referred by it. Returns the clinic uid.
async fn register(state: &AppState<SqliteStore, SqliteStore>) -> String {
  let clinic = send(
    state,
    "POST",
    "/accounts",
    None,
    vec![],
    Some(json!({
      "role": "clinic",
      "email": "clinic@example.com",
      "password": "clinic-pass",
      "clinicName": "Sakura Clinic",
    })),
  )
  .await;
  assert_eq!(clinic.status, StatusCode::CREATED, "{}", clinic.body);
  let clinic_id = clinic.body["profile"]["uid"].as_str().unwrap().to_owned();

  let patient = send(
    state,
    "POST",
    "/accounts",
    None,
    vec![],
    Some(json!({
      "role": "patient",
      "email": "pat@example.com",
      "password": "patient-pass",
      "clinicId": clinic_id,
    })),
  )
  .await;
  assert_eq!(patient.status, StatusCode::CREATED, "{}", patient.body);
  clinic_id
}

const PATIENT: Option<(&str, &str)> = Some(("pat@example.com", "patient-pass"));
const CLINIC: Option<(&str, &str)> = Some(("clinic@example.com", "clinic-pass"));
const ADMIN: Option<(&str, &str)> = Some(("root@example.com", "admin-pass"));

// ── Public ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn plans_are_public() {
  let (_store, state) = make_state().await;
  let reply = send(&state, "GET", "/plans", None, vec![], None).await;
  assert_eq!(reply.status, StatusCode::OK);
  let plans = reply.body.as_array().unwrap();
  assert_eq!(plans.len(), 3);
  assert_eq!(plans[1]["id"], "B");
  assert_eq!(plans[1]["total"], 4000);
  assert_eq!(plans[1]["clinicCommission"], 2500);
}

#[tokio::test]
async fn sign_up_errors_are_localized() {
  let (_store, state) = make_state().await;
  register(&state).await;

  let dup = send(
    &state,
    "POST",
    "/accounts",
    None,
    vec![],
    Some(json!({ "role": "patient", "email": "PAT@example.com", "password": "another-pass" })),
  )
  .await;
  assert_eq!(dup.status, StatusCode::CONFLICT);
  assert_eq!(dup.body["message"], "このメールアドレスはすでに登録されています");

  let short = send(
    &state,
    "POST",
    "/accounts",
    None,
    vec![],
    Some(json!({ "role": "patient", "email": "new@example.com", "password": "123" })),
  )
  .await;
  assert_eq!(short.status, StatusCode::BAD_REQUEST);

  let admin = send(
    &state,
    "POST",
    "/accounts",
    None,
    vec![],
    Some(json!({ "role": "admin", "email": "boss@example.com", "password": "boss-pass" })),
  )
  .await;
  assert_eq!(admin.status, StatusCode::BAD_REQUEST);
  assert_eq!(admin.body["message"], "リクエストが不正です");
}

// ── Authentication and guards ─────────────────────────────────────────────────

#[tokio::test]
async fn me_requires_valid_credentials() {
  let (_store, state) = make_state().await;
  register(&state).await;

  let me = send(&state, "GET", "/me", PATIENT, vec![], None).await;
  assert_eq!(me.status, StatusCode::OK);
  assert_eq!(me.body["profile"]["role"], "patient");
  assert_eq!(me.body["profile"]["email"], "pat@example.com");

  let wrong = send(&state, "GET", "/me", Some(("pat@example.com", "nope")), vec![], None).await;
  assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
  assert!(wrong.headers.contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn anonymous_clinic_view_redirects_to_sign_in() {
  let (_store, state) = make_state().await;
  let reply = send(&state, "GET", "/clinic/dashboard", None, vec![], None).await;
  assert_eq!(reply.status, StatusCode::SEE_OTHER);
  assert_eq!(reply.headers[header::LOCATION], "/auth/clinic/login");
  assert_eq!(reply.body, Value::Null);
}

#[tokio::test]
async fn wrong_role_is_sent_to_own_dashboard() {
  let (_store, state) = make_state().await;
  register(&state).await;

  let reply = send(&state, "GET", "/admin/dashboard", PATIENT, vec![], None).await;
  assert_eq!(reply.status, StatusCode::SEE_OTHER);
  assert_eq!(reply.headers[header::LOCATION], "/patient/dashboard");

  let reply = send(&state, "GET", "/patient/dashboard", CLINIC, vec![], None).await;
  assert_eq!(reply.headers[header::LOCATION], "/clinic/dashboard");
}

#[tokio::test]
async fn sign_in_entry_redirects_by_role() {
  let (_store, state) = make_state().await;
  register(&state).await;

  let reply = send(&state, "GET", "/auth/patient/login", CLINIC, vec![], None).await;
  assert_eq!(reply.status, StatusCode::SEE_OTHER);
  assert_eq!(reply.headers[header::LOCATION], "/clinic/dashboard");

  let reply = send(&state, "GET", "/auth/admin/login", None, vec![], None).await;
  assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
  assert_eq!(reply.headers[header::WWW_AUTHENTICATE], "Basic realm=\"admin\"");
}

/// An identity provider that never answers.
struct Offline;

#[derive(Debug, thiserror::Error)]
#[error("identity provider offline")]
struct OfflineError;

impl IdentityProvider for Offline {
  type Error = OfflineError;

  async fn create_account(&self, _: String, _: String) -> Result<Option<Identity>, OfflineError> {
    Err(OfflineError)
  }

  async fn verify_password(&self, _: String, _: String) -> Result<Option<Identity>, OfflineError> {
    Err(OfflineError)
  }
}

#[tokio::test]
async fn provider_outage_is_not_a_sign_in_prompt() {
  let (_store, state) = make_state().await;
  let state = AppState {
    brokerage:      state.brokerage,
    identity:       Arc::new(Offline),
    webhook_secret: state.webhook_secret,
  };

  let me = send(&state, "GET", "/me", PATIENT, vec![], None).await;
  assert_eq!(me.status, StatusCode::SERVICE_UNAVAILABLE);

  let enrol = send(
    &state,
    "POST",
    "/patient/subscription",
    PATIENT,
    vec![],
    Some(json!({ "plan": "B" })),
  )
  .await;
  assert_eq!(enrol.status, StatusCode::SERVICE_UNAVAILABLE);
  assert!(!enrol.headers.contains_key(header::WWW_AUTHENTICATE));

  let recompute = send(&state, "POST", "/admin/clinics/c-1/commission", ADMIN, vec![], None).await;
  assert_eq!(recompute.status, StatusCode::SERVICE_UNAVAILABLE);
  assert!(!recompute.headers.contains_key(header::WWW_AUTHENTICATE));
}

// ── Workflows ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn patient_enrols_once() {
  let (_store, state) = make_state().await;
  let clinic_id = register(&state).await;

  let first = send(
    &state,
    "POST",
    "/patient/subscription",
    PATIENT,
    vec![],
    Some(json!({ "plan": "B" })),
  )
  .await;
  assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
  assert_eq!(first.body["status"], "pending");
  assert_eq!(first.body["amount"], 4000);
  assert_eq!(first.body["clinicId"], clinic_id.as_str());

  let second = send(
    &state,
    "POST",
    "/patient/subscription",
    PATIENT,
    vec![],
    Some(json!({ "plan": "A" })),
  )
  .await;
  assert_eq!(second.status, StatusCode::CONFLICT);
  assert_eq!(second.body["message"], "すでにプランに加入しています");

  let view = send(&state, "GET", "/patient/dashboard", PATIENT, vec![], None).await;
  assert_eq!(view.status, StatusCode::OK);
  assert_eq!(view.body["patient"]["status"], "pending");
  assert_eq!(view.body["plan"]["name"], "プランB");
}

#[tokio::test]
async fn enrolment_rejects_bad_plans_and_roles() {
  let (_store, state) = make_state().await;
  register(&state).await;

  let unknown = send(
    &state,
    "POST",
    "/patient/subscription",
    PATIENT,
    vec![],
    Some(json!({ "plan": "D" })),
  )
  .await;
  assert_eq!(unknown.status, StatusCode::NOT_FOUND);
  assert_eq!(unknown.body["message"], "選択されたプランが見つかりません");

  let clinic = send(
    &state,
    "POST",
    "/patient/subscription",
    CLINIC,
    vec![],
    Some(json!({ "plan": "A" })),
  )
  .await;
  assert_eq!(clinic.status, StatusCode::FORBIDDEN);

  let anonymous = send(
    &state,
    "POST",
    "/patient/subscription",
    None,
    vec![],
    Some(json!({ "plan": "A" })),
  )
  .await;
  assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_activates_and_admin_recomputes() {
  let (store, state) = make_state().await;
  let clinic_id = register(&state).await;
  state
    .brokerage
    .create_admin(&store, "root@example.com", "admin-pass")
    .await
    .unwrap();

  let sub = send(
    &state,
    "POST",
    "/patient/subscription",
    PATIENT,
    vec![],
    Some(json!({ "plan": "B" })),
  )
  .await;
  let notice = json!({ "subscriptionId": sub.body["subscriptionId"], "outcome": "succeeded" });

  let forged = send(
    &state,
    "POST",
    "/payments/webhook",
    None,
    vec![("x-webhook-secret", "guess")],
    Some(notice.clone()),
  )
  .await;
  assert_eq!(forged.status, StatusCode::FORBIDDEN);

  let paid = send(
    &state,
    "POST",
    "/payments/webhook",
    None,
    vec![("x-webhook-secret", SECRET)],
    Some(notice),
  )
  .await;
  assert_eq!(paid.status, StatusCode::OK, "{}", paid.body);
  assert_eq!(paid.body["status"], "active");

  let view = send(&state, "GET", "/clinic/dashboard", CLINIC, vec![], None).await;
  assert_eq!(view.status, StatusCode::OK);
  assert_eq!(view.body["stats"]["activeSubscriptions"], 1);
  assert_eq!(view.body["recentActivity"][0]["type"], "payment_success");

  let uri = format!("/admin/clinics/{clinic_id}/commission");
  let denied = send(&state, "POST", &uri, CLINIC, vec![], None).await;
  assert_eq!(denied.status, StatusCode::FORBIDDEN);

  let recomputed = send(&state, "POST", &uri, ADMIN, vec![], None).await;
  assert_eq!(recomputed.status, StatusCode::OK, "{}", recomputed.body);
  assert_eq!(recomputed.body["commissionEarned"], 2500);

  let totals = send(&state, "GET", "/admin/dashboard", ADMIN, vec![], None).await;
  assert_eq!(totals.body["stats"]["totalClinics"], 1);
  assert_eq!(totals.body["stats"]["monthlyRevenue"], 4000);
}

#[tokio::test]
async fn repair_is_admin_only() {
  let (store, state) = make_state().await;
  register(&state).await;
  state
    .brokerage
    .create_admin(&store, "root@example.com", "admin-pass")
    .await
    .unwrap();
  let me = send(&state, "GET", "/me", PATIENT, vec![], None).await;
  let uri = format!("/admin/repair/{}", me.body["profile"]["uid"].as_str().unwrap());

  let denied = send(&state, "POST", &uri, PATIENT, vec![], None).await;
  assert_eq!(denied.status, StatusCode::FORBIDDEN);

  let reply = send(&state, "POST", &uri, ADMIN, vec![], None).await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.body["repaired"], false);
}
