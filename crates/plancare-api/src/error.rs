//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body carries an English `error` string for logs and clients,
//! and a Japanese `message` for display. Guard redirects have no body.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Redirect, Response},
};
use plancare_core::{Error as CoreError, role::Route};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Credentials are missing or wrong; `realm` names the section.
  #[error("authentication required")]
  Unauthorized { realm: &'static str },

  /// The guard sent the caller elsewhere.
  #[error("redirect to {}", .0.path())]
  Redirect(Route),

  /// The identity provider or the profile store could not be reached while
  /// authenticating.
  #[error("authentication service unavailable")]
  AuthUnavailable,

  #[error("invalid webhook secret")]
  Forbidden,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Workflow(#[from] CoreError),
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

fn workflow_status(e: &CoreError) -> (StatusCode, &'static str) {
  match e {
    CoreError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "ログインが必要です"),
    CoreError::WrongRole(_) => (StatusCode::FORBIDDEN, "この操作を行う権限がありません"),
    CoreError::ProfileNotFound(_) => (StatusCode::NOT_FOUND, "ユーザー情報が見つかりません"),
    CoreError::PlanNotFound(_) => (StatusCode::NOT_FOUND, "選択されたプランが見つかりません"),
    CoreError::AlreadySubscribed(_) => (StatusCode::CONFLICT, "すでにプランに加入しています"),
    CoreError::SubscriptionNotFound(_) => (StatusCode::NOT_FOUND, "契約が見つかりません"),
    CoreError::InvalidTransition { .. } => {
      (StatusCode::CONFLICT, "この契約の状態では決済を反映できません")
    }
    CoreError::Contended(_) => {
      (StatusCode::CONFLICT, "他の処理と競合しました。もう一度お試しください")
    }
    CoreError::EmailInUse(_) => {
      (StatusCode::CONFLICT, "このメールアドレスはすでに登録されています")
    }
    CoreError::InvalidSignUp(_) => (StatusCode::BAD_REQUEST, "入力内容に誤りがあります"),
    CoreError::StoreUnavailable(_) => (
      StatusCode::SERVICE_UNAVAILABLE,
      "サービスに接続できません。しばらくしてから再度お試しください",
    ),
    CoreError::ProviderUnavailable(_) => (
      StatusCode::SERVICE_UNAVAILABLE,
      "認証サービスに接続できません。しばらくしてから再度お試しください",
    ),
  }
}

fn challenge(realm: &str) -> HeaderValue {
  HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
    .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"plancare\""))
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Redirect(route) => return Redirect::to(route.path()).into_response(),
      ApiError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "ログインが必要です"),
      ApiError::AuthUnavailable => (
        StatusCode::SERVICE_UNAVAILABLE,
        "認証サービスに接続できません。しばらくしてから再度お試しください",
      ),
      ApiError::Forbidden => (StatusCode::FORBIDDEN, "アクセスが拒否されました"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "リクエストが不正です"),
      ApiError::Workflow(e) => workflow_status(e),
    };

    if status.is_server_error() {
      tracing::warn!(error = %self, "request failed");
    }

    let mut res = (status, Json(json!({ "error": self.to_string(), "message": message })))
      .into_response();
    match self {
      ApiError::Unauthorized { realm } => {
        res.headers_mut().insert(header::WWW_AUTHENTICATE, challenge(realm));
      }
      ApiError::Workflow(CoreError::NotAuthenticated) => {
        res.headers_mut().insert(header::WWW_AUTHENTICATE, challenge("plancare"));
      }
      _ => {}
    }
    res
  }
}
