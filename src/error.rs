use axum::{
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("Database error: {0}")]
  Database(#[from] sea_orm::DbErr),

  #[error("{0}")]
  Validation(String),

  #[error("{0} not found")]
  NotFound(&'static str),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  InvalidState(String),

  #[error("{0}")]
  Forbidden(String),

  #[error("Upstream failure: {0}")]
  Upstream(String),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub fn conflict(msg: impl Into<String>) -> Self {
    Self::Conflict(msg.into())
  }

  pub fn invalid_state(msg: impl Into<String>) -> Self {
    Self::InvalidState(msg.into())
  }

  pub fn forbidden(msg: impl Into<String>) -> Self {
    Self::Forbidden(msg.into())
  }

  pub fn upstream(msg: impl Into<String>) -> Self {
    Self::Upstream(msg.into())
  }

  /// Stable machine-readable code.
  pub fn kind(&self) -> &'static str {
    match self {
      Error::Database(_) => "internal",
      Error::Validation(_) => "validation_error",
      Error::NotFound(_) => "not_found",
      Error::Conflict(_) => "conflict",
      Error::InvalidState(_) => "invalid_state",
      Error::Forbidden(_) => "forbidden",
      Error::Upstream(_) => "upstream_failure",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
      Error::Validation(_) => StatusCode::BAD_REQUEST,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::Conflict(_) | Error::InvalidState(_) => StatusCode::CONFLICT,
      Error::Forbidden(_) => StatusCode::FORBIDDEN,
      Error::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl From<JsonRejection> for Error {
  fn from(rejection: JsonRejection) -> Self {
    Self::Validation(rejection.body_text())
  }
}

impl From<PathRejection> for Error {
  fn from(rejection: PathRejection) -> Self {
    Self::Validation(rejection.body_text())
  }
}

impl From<QueryRejection> for Error {
  fn from(rejection: QueryRejection) -> Self {
    Self::Validation(rejection.body_text())
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let message = match &self {
      Error::Database(err) => {
        tracing::error!("Database error: {err}");
        "Internal error".to_string()
      }
      other => other.to_string(),
    };

    let body = json::json!({
      "success": false,
      "error": self.kind(),
      "message": message,
    });

    (self.status(), axum::Json(body)).into_response()
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_are_stable() {
    assert_eq!(Error::validation("bad").kind(), "validation_error");
    assert_eq!(Error::NotFound("Car").kind(), "not_found");
    assert_eq!(Error::conflict("taken").kind(), "conflict");
    assert_eq!(Error::invalid_state("nope").kind(), "invalid_state");
    assert_eq!(Error::forbidden("no").kind(), "forbidden");
    assert_eq!(Error::upstream("down").kind(), "upstream_failure");
    assert_eq!(Error::from(sea_orm::DbErr::Custom("x".into())).kind(), "internal");
  }

  #[test]
  fn database_errors_are_opaque() {
    let response = Error::from(sea_orm::DbErr::Custom("secret".into())).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = Error::NotFound("Reservation").into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }
}
