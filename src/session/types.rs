// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-side browser session state.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::auth::claims::Principal;
use crate::random::{random_bytes, random_token, RandomError};

/// Length in bytes of session ids and CSRF secrets.
const SECRET_LEN: usize = 32;

/// Opaque session identifier (32 random bytes, base64url) carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn generate() -> Result<Self, RandomError> {
        random_token::<SECRET_LEN>().map(Self)
    }

    /// Parse a cookie value, rejecting anything that could not have been minted here.
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = value.len() == 43
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    /// Only a prefix is printed so ids can be logged without exposing them.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}…", &self.0[..8.min(self.0.len())])
    }
}

/// Login started by this browser and not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    /// Same-origin path to return to after login
    pub return_to: String,
}

/// Tokens issued by the provider for an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBundle {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenBundle {
    /// Whether the access token is expired or expires within `skew`.
    pub fn needs_refresh(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        now >= self
            .expires_at
            .checked_sub_signed(to_delta(skew))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub tokens: TokenBundle,
    pub principal: Principal,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub pending_login: Option<PendingLogin>,
    pub auth: Option<AuthenticatedSession>,
    /// HMAC key for anti-forgery tokens; never leaves the server
    pub csrf_secret: [u8; SECRET_LEN],
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub idle_expires_at: DateTime<Utc>,
    pub absolute_expires_at: DateTime<Utc>,
    idle_timeout: Duration,
}

impl Session {
    /// Create an empty session with a fresh id and CSRF secret.
    pub fn new(idle_timeout: Duration, absolute_timeout: Duration) -> Result<Self, RandomError> {
        let now = Utc::now();
        let absolute_expires_at = add(now, absolute_timeout);
        Ok(Self {
            id: SessionId::generate()?,
            pending_login: None,
            auth: None,
            csrf_secret: random_bytes::<SECRET_LEN>()?,
            created_at: now,
            last_accessed: now,
            idle_expires_at: add(now, idle_timeout).min(absolute_expires_at),
            absolute_expires_at,
            idle_timeout,
        })
    }

    /// Copy of this session under a new id and CSRF secret.
    ///
    /// Used when a login completes so that an id known before authentication
    /// is never valid afterwards.
    pub fn rotate(&self) -> Result<Self, RandomError> {
        Ok(Self {
            id: SessionId::generate()?,
            csrf_secret: random_bytes::<SECRET_LEN>()?,
            ..self.clone()
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.idle_expires_at || now >= self.absolute_expires_at
    }

    /// Record an access, extending the idle deadline up to the absolute one.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.idle_expires_at = add(now, self.idle_timeout).min(self.absolute_expires_at);
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.auth.as_ref().map(|auth| &auth.principal)
    }

    pub fn tokens(&self) -> Option<&TokenBundle> {
        self.auth.as_ref().map(|auth| &auth.tokens)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    at.checked_add_signed(to_delta(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
