// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OIDC Gateway - Authentication / Authorization Front Door
//!
//! Verifies bearer tokens issued by an OpenID Connect provider and runs the
//! Authorization Code flow with server-side sessions for browser clients.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers and router (Axum)
//! - `auth` - JWKS retrieval, token verification, role checks, CSRF
//! - `oauth2` - Authorization Code flow against the provider
//! - `session` - Server-side session store and sweeper
//! - `bootstrap` - Ordered startup sequence

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod oauth2;
pub mod random;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;
