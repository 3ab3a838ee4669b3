// src/middleware/error_handler.rs - Unified error taxonomy (spec.md §7) and
// ETSI error envelope shaping.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// A single `{param: reason}` entry in the `details` array of the envelope.
pub type Detail = (String, String);

#[derive(Error, Debug)]
pub enum KmeError {
    #[error("invalid request")]
    InvalidRequest(Vec<Detail>),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("unauthorized")]
    Unauthorized(String),

    #[error("keys not found")]
    NotFound(Vec<Detail>),

    #[error("mandatory extension unsupported")]
    ExtensionUnsupported(Vec<String>),

    #[error("key pool exhausted")]
    Exhausted { recovery_hint: String },

    #[error("insufficient keys: {available} available, {requested} requested")]
    Insufficient { available: u64, requested: u64 },

    #[error("key integrity check failed")]
    IntegrityError,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal service error: {0}")]
    ServiceUnavailable(String),
}

impl KmeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::NotFound(_) | Self::ExtensionUnsupported(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthenticationFailed(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Exhausted { .. }
            | Self::Insufficient { .. }
            | Self::IntegrityError
            | Self::StorageUnavailable(_)
            | Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ExtensionUnsupported(_) => "EXTENSION_UNSUPPORTED",
            Self::Exhausted { .. } => "KEY_EXHAUSTION",
            Self::Insufficient { .. } => "INSUFFICIENT_KEYS",
            Self::IntegrityError => "INTEGRITY_ERROR",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Validation/authz failures are expected traffic; integrity failures and
    /// unexpected internal errors are security- or operator-relevant.
    fn should_log_as_error(&self) -> bool {
        matches!(
            self,
            Self::IntegrityError | Self::StorageUnavailable(_) | Self::ServiceUnavailable(_)
        )
    }

    fn details(&self) -> Vec<Detail> {
        match self {
            Self::InvalidRequest(d) | Self::NotFound(d) => d.clone(),
            Self::ExtensionUnsupported(names) => names
                .iter()
                .map(|n| (n.clone(), "mandatory extension not supported".to_string()))
                .collect(),
            Self::Insufficient { available, requested } => vec![
                ("available".to_string(), available.to_string()),
                ("requested".to_string(), requested.to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for KmeError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4();
        let status = self.status_code();

        if self.should_log_as_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = self.error_code(),
                error = %self,
                "key management error"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = self.error_code(),
                error = %self,
                "request rejected"
            );
        }

        let details: Vec<_> = self
            .details()
            .into_iter()
            .map(|(param, reason)| json!({ param: reason }))
            .collect();

        let body = Json(json!({
            "message": self.to_string(),
            "details": details,
            "error_code": self.error_code(),
            "request_id": request_id,
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<kme_storage::StorageError> for KmeError {
    fn from(err: kme_storage::StorageError) -> Self {
        use kme_storage::StorageError;
        match err {
            StorageError::NotFound => Self::NotFound(vec![]),
            StorageError::Unauthorized => {
                Self::Unauthorized("requester is not authorized for this key".to_string())
            }
            StorageError::IntegrityError => Self::IntegrityError,
            StorageError::DuplicateKeyId(id) => {
                Self::InvalidRequest(vec![("key_id".to_string(), format!("duplicate id {id}"))])
            }
            StorageError::InvalidArgument(msg) => {
                Self::InvalidRequest(vec![("request".to_string(), msg)])
            }
            StorageError::Unavailable(e) => Self::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<kme_auth::AuthError> for KmeError {
    fn from(err: kme_auth::AuthError) -> Self {
        use kme_auth::AuthError;
        match err {
            // Identity could not be established at all.
            AuthError::MissingCertificate
            | AuthError::MalformedCertificate(_)
            | AuthError::InvalidCommonName
            | AuthError::UnknownSae(_)
            | AuthError::InvalidSaeStatus(_) => Self::AuthenticationFailed(err.to_string()),
            // Identity was established but the SAE is not permitted to act
            // (spec.md §4.8 status gate / fingerprint mismatch).
            AuthError::FingerprintMismatch | AuthError::SaeNotActive { .. } => {
                Self::Unauthorized(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_expected_status_codes() {
        assert_eq!(
            KmeError::InvalidRequest(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            KmeError::AuthenticationFailed("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            KmeError::Exhausted { recovery_hint: "retry".into() }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(KmeError::NotFound(vec![]).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn exhaustion_error_code_matches_spec_scenario() {
        assert_eq!(
            KmeError::Exhausted { recovery_hint: "retry in 5m".into() }.error_code(),
            "KEY_EXHAUSTION"
        );
    }

    #[test]
    fn insufficient_details_surface_counts() {
        let err = KmeError::Insufficient { available: 3, requested: 10 };
        let details = err.details();
        assert!(details.iter().any(|(k, v)| k == "available" && v == "3"));
        assert!(details.iter().any(|(k, v)| k == "requested" && v == "10"));
    }
}
