// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request authentication and authorization errors.

use axum::{
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::random::RandomError;
use crate::session::SessionStoreError;

/// Path of the user-visible login failure page.
pub const LOGIN_ERROR_PATH: &str = "/login-error";

/// Authentication error type.
///
/// Every variant is terminal for the request that produced it. Messages are
/// fixed strings: provider responses, key material and internal details are
/// logged, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token or session cookie present
    MissingCredentials,
    /// Authorization header is not `Bearer <token>`
    InvalidAuthHeader,
    /// Token could not be decoded
    MalformedToken,
    /// Token references a key id absent from the signing key set
    UnknownKey,
    /// Key refresh failed while looking up the token's key id
    KeyUnavailable,
    /// Signature does not verify, or the declared algorithm does not match the key
    SignatureInvalid,
    /// `iss` differs from the configured issuer
    IssuerMismatch,
    /// `aud` does not contain the expected audience
    AudienceMismatch,
    /// `exp` is in the past
    Expired,
    /// `nbf` is in the future
    NotYetValid,
    /// Role claim path absent while a role check is required
    ClaimMissing,
    /// Principal lacks the required role
    Forbidden,
    /// Callback `state` does not match the pending login
    StateMismatch,
    /// Authorization code exchange failed
    ExchangeFailed,
    /// Refresh token rejected; the session was destroyed
    RefreshFailed,
    /// Anti-forgery token missing or invalid
    CsrfMismatch,
    /// Session unknown or expired
    SessionExpired,
    /// Unexpected failure inside the gateway
    Internal,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnknownKey => "unknown_key",
            AuthError::KeyUnavailable => "key_unavailable",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::Expired => "token_expired",
            AuthError::NotYetValid => "token_not_yet_valid",
            AuthError::ClaimMissing => "claim_missing",
            AuthError::Forbidden => "forbidden",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::ExchangeFailed => "exchange_failed",
            AuthError::RefreshFailed => "refresh_failed",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::SessionExpired => "session_expired",
            AuthError::Internal => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// Login failures are answered with a redirect to the error page, see
    /// [`AuthError::is_login_failure`].
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::UnknownKey
            | AuthError::KeyUnavailable
            | AuthError::SignatureInvalid
            | AuthError::IssuerMismatch
            | AuthError::AudienceMismatch
            | AuthError::Expired
            | AuthError::NotYetValid
            | AuthError::ClaimMissing
            | AuthError::RefreshFailed
            | AuthError::SessionExpired => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden | AuthError::CsrfMismatch => StatusCode::FORBIDDEN,
            AuthError::StateMismatch | AuthError::ExchangeFailed => StatusCode::FOUND,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors of the login callback, surfaced as a redirect instead of a body.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, AuthError::StateMismatch | AuthError::ExchangeFailed)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "Authentication is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::UnknownKey => write!(f, "Token was signed with an unknown key"),
            AuthError::KeyUnavailable => write!(f, "Signing keys are currently unavailable"),
            AuthError::SignatureInvalid => write!(f, "Token signature is invalid"),
            AuthError::IssuerMismatch => write!(f, "Token issuer is invalid"),
            AuthError::AudienceMismatch => write!(f, "Token audience is invalid"),
            AuthError::Expired => write!(f, "Token has expired"),
            AuthError::NotYetValid => write!(f, "Token is not yet valid"),
            AuthError::ClaimMissing => write!(f, "Token does not carry the role claim"),
            AuthError::Forbidden => write!(f, "Insufficient permissions for this resource"),
            AuthError::StateMismatch => write!(f, "Login state does not match"),
            AuthError::ExchangeFailed => write!(f, "Login could not be completed"),
            AuthError::RefreshFailed => write!(f, "Session could not be refreshed"),
            AuthError::CsrfMismatch => write!(f, "Anti-forgery token is missing or invalid"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
            AuthError::Internal => write!(f, "Internal authentication error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<SessionStoreError> for AuthError {
    fn from(e: SessionStoreError) -> Self {
        error!(error = %e, "Session store failure");
        AuthError::Internal
    }
}

impl From<RandomError> for AuthError {
    fn from(e: RandomError) -> Self {
        error!(error = %e, "Random generator failure");
        AuthError::Internal
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_login_failure() {
            let location = format!("{LOGIN_ERROR_PATH}?reason={}", self.error_code());
            return (StatusCode::FOUND, [(LOCATION, location)]).into_response();
        }

        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
