// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the admin principal.
//!
//! Use the `Admin` extractor in handlers to require an admin token:
//!
//! ```rust,ignore
//! async fn my_handler(Admin(principal): Admin) -> impl IntoResponse {
//!     // principal is AdminPrincipal
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, Validation};

use super::{AdminClaims, AdminPrincipal, AuthError, ADMIN_ROLE};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for a verified admin principal.
pub struct Admin(pub AdminPrincipal);

impl FromRequestParts<AppState> for Admin {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let principal = verify_token(token, &state.auth_config)?;
        Ok(Admin(principal))
    }
}

/// Verify an HS256 admin token and extract the principal.
pub fn verify_token(token: &str, auth_config: &AuthConfig) -> Result<AdminPrincipal, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let token_data = decode::<AdminClaims>(token, auth_config.decoding_key(), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })?;

    let claims = token_data.claims;
    if claims.role.as_deref() != Some(ADMIN_ROLE) {
        return Err(AuthError::InsufficientPermissions);
    }
    if claims.sub.trim().is_empty() {
        return Err(AuthError::MalformedToken);
    }

    Ok(AdminPrincipal {
        principal_id: claims.sub,
        expires_at: claims.exp,
    })
}
