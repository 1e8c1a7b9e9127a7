use std::fmt::{Display, Formatter};

use async_graphql::ErrorExtensions;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound { message: String },
    InvalidPayload { message: String },
    StoreUnavailable { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &'static str, msg: S) -> Error {
        Error::InternalError {
            kind,
            message: msg.into(),
        }
    }

    /// Machine readable code placed in `extensions.code` of GraphQL errors.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidPayload { .. } => "INVALID_PAYLOAD",
            Error::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Error::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound { message } => write!(f, "not found: {}", message),
            Error::InvalidPayload { message } => write!(f, "invalid payload: {}", message),
            Error::StoreUnavailable { message } => write!(f, "store unavailable: {}", message),
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<Error> for async_graphql::Error {
    fn from(err: Error) -> Self {
        let code = err.code();
        async_graphql::Error::new(err.to_string()).extend_with(|_, ext| ext.set("code", code))
    }
}

/// SQLSTATE raised by Postgres when a `~` pattern does not compile.
const INVALID_REGULAR_EXPRESSION: &str = "2201B";

/// Database errors caused by what the client sent rather than by the store.
fn from_sqlstate(code: Option<&str>, message: &str) -> Option<Error> {
    match code? {
        INVALID_REGULAR_EXPRESSION => Some(Error::InvalidPayload {
            message: format!("invalid search pattern: {}", message),
        }),
        _ => None,
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match err {
            sqlx::Error::Database(db) => {
                from_sqlstate(db.code().as_deref(), db.message()).unwrap_or(Self::InternalError {
                    kind: "DatabaseError",
                    message,
                })
            }
            sqlx::Error::RowNotFound => Self::NotFound { message },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::StoreUnavailable { message },
            _ => Self::InternalError {
                kind: "DatabaseError",
                message,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError {
            kind: "SerializationError",
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPayload {
            message: format!("invalid search pattern: {}", err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError {
            kind: "Unknown",
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_error_tag() {
        let value = serde_json::to_value(Error::not_found("student `x`")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "error": "NotFound", "message": "student `x`" })
        );
    }

    #[test]
    fn graphql_error_carries_code() {
        let err: async_graphql::Error = Error::invalid("bad field").into();
        assert_eq!(err.message, "invalid payload: bad field");
        let ext = serde_json::to_value(&err.extensions).unwrap();
        assert_eq!(ext["code"], "INVALID_PAYLOAD");
    }

    #[test]
    fn pool_timeouts_are_unavailability() {
        let err = Error::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn bad_regex_from_postgres_is_invalid_payload() {
        let err = from_sqlstate(Some("2201B"), "invalid regular expression: parentheses () not balanced")
            .unwrap();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(from_sqlstate(Some("23505"), "duplicate key").is_none());
        assert!(from_sqlstate(None, "no code").is_none());
    }
}
