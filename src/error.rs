// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Domain error taxonomy and its HTTP mapping.
//!
//! Layer errors (`CryptoError`, `StorageError`) fold into [`CloakError`];
//! handlers turn that into an [`ApiError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::crypto::CryptoError;
use crate::storage::StorageError;

/// Errors surfaced by the submission pipeline and the admin operations.
#[derive(Debug, thiserror::Error)]
pub enum CloakError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("crypto provider unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("not found: {0}")]
    StorageNotFound(String),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("{0}")]
    InvalidStateTransition(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

pub type CloakResult<T> = Result<T, CloakError>;

impl CloakError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CloakError::InvalidInput(_) => "invalid_input",
            CloakError::CryptoUnavailable(_) => "crypto_unavailable",
            CloakError::KeyDerivationFailed(_) => "key_derivation_failed",
            CloakError::EncryptionFailed(_) => "encryption_failed",
            CloakError::DecryptionFailed(_) => "decryption_failed",
            CloakError::StorageNotFound(_) => "not_found",
            CloakError::StorageWriteFailed(_) => "storage_write_failed",
            CloakError::InvalidStateTransition(_) => "invalid_state_transition",
            CloakError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl From<CryptoError> for CloakError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Unavailable(msg) => CloakError::CryptoUnavailable(msg),
            CryptoError::InvalidInput(msg) => CloakError::InvalidInput(msg),
            CryptoError::KeyDerivation(msg) => CloakError::KeyDerivationFailed(msg),
            CryptoError::Encryption(msg) => CloakError::EncryptionFailed(msg),
            CryptoError::Decryption(msg) => CloakError::DecryptionFailed(msg.to_string()),
        }
    }
}

impl From<StorageError> for CloakError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => CloakError::StorageNotFound(msg),
            StorageError::InvalidReference(r) => {
                CloakError::InvalidInput(format!("invalid storage reference {r}"))
            }
            e @ StorageError::InvalidStateTransition { .. } => {
                CloakError::InvalidStateTransition(e.to_string())
            }
            e @ StorageError::PermissionDenied { .. } => CloakError::Unauthorized(e.to_string()),
            e => CloakError::StorageWriteFailed(e.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "invalid_input", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<CloakError> for ApiError {
    fn from(e: CloakError) -> Self {
        let status = match &e {
            CloakError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CloakError::Unauthorized(_) => StatusCode::FORBIDDEN,
            CloakError::StorageNotFound(_) => StatusCode::NOT_FOUND,
            CloakError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            CloakError::CryptoUnavailable(_)
            | CloakError::KeyDerivationFailed(_)
            | CloakError::EncryptionFailed(_)
            | CloakError::DecryptionFailed(_)
            | CloakError::StorageWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Server-side failures are logged in full and reported generically
        let message = if status.is_server_error() {
            tracing::error!(error = %e, error_code = e.code(), "Request failed");
            "internal error".to_string()
        } else {
            e.to_string()
        };

        Self::new(status, e.code(), message)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        CloakError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.error_code, "invalid_input");
    }

    #[test]
    fn domain_errors_map_to_status() {
        let cases = [
            (CloakError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (CloakError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (CloakError::StorageNotFound("x".into()), StatusCode::NOT_FOUND),
            (CloakError::InvalidStateTransition("x".into()), StatusCode::CONFLICT),
            (CloakError::DecryptionFailed("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (CloakError::StorageWriteFailed("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn storage_errors_fold_into_taxonomy() {
        let err: CloakError = StorageError::PermissionDenied {
            user_id: "u".into(),
            resource: "r".into(),
        }
        .into();
        assert!(matches!(err, CloakError::Unauthorized(_)));

        let err: CloakError = StorageError::Timeout("store blob").into();
        assert!(matches!(err, CloakError::StorageWriteFailed(_)));

        let err: CloakError = StorageError::InvalidReference("gridfs:1".into()).into();
        assert!(matches!(err, CloakError::InvalidInput(_)));
    }

    #[test]
    fn crypto_errors_fold_into_taxonomy() {
        let err: CloakError = CryptoError::Decryption("bad tag").into();
        assert!(matches!(err, CloakError::DecryptionFailed(_)));
        assert_eq!(err.code(), "decryption_failed");

        let err: CloakError = CryptoError::Unavailable("no rng".into()).into();
        assert!(matches!(err, CloakError::CryptoUnavailable(_)));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"invalid_input"}"#);
    }

    #[tokio::test]
    async fn server_errors_do_not_leak_details() {
        let response = ApiError::from(CloakError::DecryptionFailed("tag mismatch".into())).into_response();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(!body.contains("tag mismatch"));
        assert!(body.contains("decryption_failed"));
    }
}
