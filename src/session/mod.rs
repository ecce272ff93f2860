// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Browser Sessions
//!
//! Server-side session state for the Authorization Code flow. The browser
//! only holds the opaque session id in the `gw_session` cookie; tokens and
//! the CSRF secret stay in the store.

pub mod store;
pub mod sweeper;
pub mod types;

pub use store::{InMemorySessionStore, SessionStore, SessionStoreError};
pub use sweeper::SessionSweeper;
pub use types::{AuthenticatedSession, PendingLogin, Session, SessionId, TokenBundle};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "gw_session";
