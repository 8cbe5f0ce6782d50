use std::sync::OnceLock;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::auth::Role;
use crate::response::response_timestamp;

const DANGLING_REFERENCE_MESSAGE: &str =
    "Referenced record does not exist or is still referenced by other records";

static EXPOSE_INTERNAL_DETAILS: OnceLock<bool> = OnceLock::new();

/// Called once at startup; outside production the detail of `Internal`
/// errors is echoed back to the caller.
pub fn expose_internal_details(enabled: bool) {
    let _ = EXPOSE_INTERNAL_DETAILS.set(enabled);
}

fn internal_details_exposed() -> bool {
    EXPOSE_INTERNAL_DETAILS.get().copied().unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Insufficient permissions: requires {required:?}, caller is {actual}")]
    InsufficientPermissions { required: Vec<Role>, actual: Role },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::Validation {
            message: "Validation failed".to_string(),
            errors,
        }
    }

    pub fn field(field: &str, message: &str) -> Self {
        Self::validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateEntry(_) => StatusCode::CONFLICT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DanglingReference(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTimestamp(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the `{ success: false, message, errors?, timestamp }` body.
    pub fn to_body(&self, expose_internal: bool) -> ErrorBody {
        let (message, errors) = match self {
            AppError::Validation { message, errors } => {
                (message.clone(), (!errors.is_empty()).then(|| errors.clone()))
            }
            AppError::InsufficientPermissions { required, actual } => {
                let required_list = join_roles(required);
                (
                    format!(
                        "Insufficient permissions. Required roles: {}. Current role: {}",
                        required_list, actual
                    ),
                    Some(vec![FieldError::new("role", format!("Requires one of: {}", required_list))
                        .with_value(actual.as_str())]),
                )
            }
            AppError::Internal(detail) if expose_internal => (detail.clone(), None),
            AppError::Internal(_) => ("Internal server error".to_string(), None),
            AppError::AuthenticationRequired(msg)
            | AppError::InvalidCredential(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::DuplicateEntry(msg)
            | AppError::Conflict(msg)
            | AppError::DanglingReference(msg)
            | AppError::InvalidTimestamp(msg)
            | AppError::BadRequest(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::MethodNotAllowed(msg) => (msg.clone(), None),
        };

        let stack = match self {
            AppError::Internal(_) if expose_internal => Some(format!("{:?}", self)),
            _ => None,
        };

        ErrorBody {
            success: false,
            message,
            errors,
            timestamp: response_timestamp(),
            stack,
        }
    }
}

fn join_roles(roles: &[Role]) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self);
        } else {
            tracing::warn!("Rejected request: {}: {}", status, self);
        }

        let body = self.to_body(internal_details_exposed());
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => AppError::DuplicateEntry(match db_err.constraint() {
                    Some(constraint) => {
                        format!("A record with the same value already exists ({})", constraint)
                    }
                    None => "A record with the same value already exists".to_string(),
                }),
                Some("23503") => {
                    AppError::DanglingReference(DANGLING_REFERENCE_MESSAGE.to_string())
                }
                Some("23502") | Some("23514") | Some("22P02") | Some("22007") | Some("22008") => {
                    AppError::BadRequest(db_err.message().to_string())
                }
                _ => AppError::Internal(format!("Database error: {}", db_err)),
            },
            _ => AppError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge("Request body exceeds the upload limit".to_string());
        }
        AppError::Validation {
            message: format!("Invalid request body: {}", rejection.body_text()),
            errors: Vec::new(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation {
            message: format!("Invalid query parameters: {}", rejection.body_text()),
            errors: Vec::new(),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation {
            message: format!("Invalid path parameter: {}", rejection.body_text()),
            errors: Vec::new(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("Serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::field("email", "required").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AuthenticationRequired("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::DuplicateEntry("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::DanglingReference("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::MethodNotAllowed("x".into()).status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_insufficient_permissions_body_names_roles() {
        let err = AppError::InsufficientPermissions {
            required: vec![Role::Admin, Role::Doctor],
            actual: Role::Receptionist,
        };
        let body = err.to_body(false);
        assert!(!body.success);
        assert!(body.message.contains("admin, doctor"));
        assert!(body.message.contains("receptionist"));
        let errors = body.errors.unwrap();
        assert_eq!(errors[0].value, Some(Value::from("receptionist")));
    }

    #[test]
    fn test_internal_detail_hidden_in_production() {
        let err = AppError::Internal("connection reset".into());
        let hidden = err.to_body(false);
        assert_eq!(hidden.message, "Internal server error");
        assert!(hidden.stack.is_none());

        let exposed = err.to_body(true);
        assert_eq!(exposed.message, "connection reset");
        assert!(exposed.stack.is_some());
    }

    #[test]
    fn test_validation_body_omits_empty_errors() {
        let err = AppError::Validation { message: "Invalid request body".into(), errors: vec![] };
        let json = serde_json::to_value(err.to_body(false)).unwrap();
        assert!(json.get("errors").is_none());
        assert_eq!(json["success"], false);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert_matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_));
    }
}
