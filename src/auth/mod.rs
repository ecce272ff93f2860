// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token verification and role checks against an OIDC provider.
//!
//! ## Auth Flow
//!
//! 1. A client sends `Authorization: Bearer <JWT>`, or a browser presents the
//!    `gw_session` cookie
//! 2. The gateway:
//!    - Verifies the JWT against the provider JWKS (`exp`, `nbf`, `iss`,
//!      key id, algorithm, signature, optional `aud`)
//!    - Extracts:
//!      - `sub` → principal subject
//!      - roles at the configured claim path (default `realm_access/roles`)
//! 3. Handlers ask the [`AuthorizationEvaluator`] for a role decision
//!
//! ## Security
//!
//! - Expired tokens are rejected before any key lookup
//! - An unknown key id triggers at most one coalesced JWKS refresh
//! - The header algorithm must match the algorithm of the published key

pub mod claims;
pub mod csrf;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod roles;
pub mod validator;

pub use claims::{ClaimPath, ClaimSet, CredentialKind, Principal};
pub use csrf::{CsrfGuard, CSRF_FIELD};
pub use error::AuthError;
pub use extractor::{Auth, CurrentSession};
pub use jwks::{KeySetFetcher, SigningKeySet};
pub use roles::{AuthorizationDecision, AuthorizationEvaluator, ADMIN_ROLE, USER_ROLE};
pub use validator::{IssuerPolicy, JwtValidator};
