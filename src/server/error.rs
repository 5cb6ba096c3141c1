//! HTTP mapping of the error taxonomy.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;

use crate::backup::BackupError;
use crate::error::Error;

/// JSON error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ApiError {
  #[serde(skip)]
  status: StatusCode,
  /// Machine-readable error code
  error: &'static str,
  message: String,
}

impl ApiError {
  pub fn status_code(&self) -> StatusCode {
    self.status
  }
}

impl From<Error> for ApiError {
  fn from(err: Error) -> Self {
    let (status, code) = match &err {
      Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
      Error::FetchFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_FAILED"),
      Error::MalformedUpstreamRecord(_) => {
        (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_UPSTREAM_RECORD")
      }
      Error::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
      Error::Backup(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BACKUP_ERROR"),
    };

    if status.is_server_error() {
      tracing::error!(error = %err, "request failed");
    }

    Self {
      status,
      error: code,
      message: err.to_string(),
    }
  }
}

impl From<BackupError> for ApiError {
  fn from(err: BackupError) -> Self {
    Error::from(err).into()
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status;
    (status, Json(self)).into_response()
  }
}
