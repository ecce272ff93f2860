// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer-token endpoints under `/api`.

use std::collections::BTreeSet;

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::claims::{CredentialKind, Principal};
use crate::auth::extractor::{AdminRole, RequireRole, UserRole};
use crate::auth::Auth;

/// Identity and roles of the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrincipalResponse {
    /// Subject (`sub`) of the verified token
    pub subject: String,
    pub display_name: String,
    /// Roles at the configured claim path; absent when the claim is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<BTreeSet<String>>,
    pub credential: CredentialKind,
}

impl From<Principal> for PrincipalResponse {
    fn from(principal: Principal) -> Self {
        Self {
            subject: principal.subject,
            display_name: principal.display_name,
            roles: principal.roles,
            credential: principal.credential,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GreetResponse {
    pub message: String,
    pub subject: String,
}

/// Greet any caller with a valid token.
pub async fn greet(Auth(principal): Auth) -> Json<GreetResponse> {
    Json(GreetResponse {
        message: format!("Hello, {}!", principal.display_name),
        subject: principal.subject,
    })
}

/// Requires the `user` role.
pub async fn user(RequireRole(principal, _): RequireRole<UserRole>) -> Json<PrincipalResponse> {
    Json(principal.into())
}

/// Requires the `admin` role.
pub async fn admin(RequireRole(principal, _): RequireRole<AdminRole>) -> Json<PrincipalResponse> {
    Json(principal.into())
}
