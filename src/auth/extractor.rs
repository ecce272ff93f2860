// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated principals.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(principal): Auth) -> impl IntoResponse {
//!     // principal is a verified Principal
//! }
//! ```

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use super::claims::Principal;
use super::error::AuthError;
use super::roles::{ADMIN_ROLE, USER_ROLE};
use crate::session::Session;
use crate::state::AppState;

/// Extractor for authenticated principals.
///
/// Uses the principal placed in the request extensions by the bearer or
/// session middleware; otherwise validates the `Authorization: Bearer`
/// header itself.
pub struct Auth(pub Principal);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
            return Ok(Auth(principal));
        }

        let token = bearer_token(parts)?;
        let principal = state.validator.validate(token).await?;
        Ok(Auth(principal))
    }
}

/// Extract the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// A role name usable as a [`RequireRole`] parameter.
pub trait RequiredRole: Send + Sync + 'static {
    const NAME: &'static str;
}

pub struct UserRole;

impl RequiredRole for UserRole {
    const NAME: &'static str = USER_ROLE;
}

pub struct AdminRole;

impl RequiredRole for AdminRole {
    const NAME: &'static str = ADMIN_ROLE;
}

/// Extractor that requires a specific role.
///
/// # Example
///
/// ```rust,ignore
/// async fn admin_only(RequireRole(principal, _): RequireRole<AdminRole>) -> impl IntoResponse {
///     // Only admins can reach here
/// }
/// ```
pub struct RequireRole<R: RequiredRole>(pub Principal, pub PhantomData<R>);

impl<R: RequiredRole> FromRequestParts<AppState> for RequireRole<R> {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(principal) = Auth::from_request_parts(parts, state).await?;

        let decision = state.evaluator.authorize(&principal, R::NAME);
        if !decision.is_allowed() {
            debug!(
                subject = %principal.subject,
                required_role = R::NAME,
                outcome = ?decision.outcome,
                "Authorization denied"
            );
        }
        decision.into_result()?;

        Ok(RequireRole(principal, PhantomData))
    }
}

/// The browser session attached by the session middleware.
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(CurrentSession)
            .ok_or(AuthError::SessionExpired)
    }
}
