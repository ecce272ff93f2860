// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # OAuth2 / OIDC Session Flow
//!
//! Browser login against the provider using the Authorization Code flow.
//! Only enabled when a client id and secret are configured; bearer-only
//! deployments never construct these types.

pub mod client;
pub mod flow;

pub use client::{ProviderClient, ProviderError, TokenResponse};
pub use flow::{CallbackParams, CompletedLogin, LoginRedirect, LogoutOutcome, OAuth2Flow, UserinfoError};
