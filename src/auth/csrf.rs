// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Anti-forgery tokens for session-authenticated form posts.
//!
//! A token is `timestamp.nonce.mac` where `mac` is HMAC-SHA256 over
//! `timestamp.nonce` keyed with the session's CSRF secret. Tokens are bound to
//! one session and expire after the configured TTL.

use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::AuthError;
use crate::random::random_token;
use crate::session::Session;

/// Name of the hidden form field and of the cookie carrying the token.
pub const CSRF_FIELD: &str = "X-XSRF-TOKEN";

/// Tolerance for tokens stamped slightly in the future by a skewed clock.
const FUTURE_TOLERANCE_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct CsrfGuard {
    ttl: Duration,
}

impl CsrfGuard {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Issue a token bound to `session`.
    pub fn issue(&self, session: &Session) -> Result<String, AuthError> {
        self.issue_at(session, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, session: &Session, timestamp: i64) -> Result<String, AuthError> {
        let nonce = random_token::<16>().map_err(|_| AuthError::Internal)?;
        let payload = format!("{timestamp}.{nonce}");
        let mut mac =
            HmacSha256::new_from_slice(&session.csrf_secret).map_err(|_| AuthError::Internal)?;
        mac.update(payload.as_bytes());
        let tag = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        Ok(format!("{payload}.{tag}"))
    }

    /// Check a supplied token against `session` in constant time.
    pub fn verify(&self, session: &Session, supplied: &str) -> bool {
        let mut parts = supplied.split('.');
        let (Some(timestamp), Some(nonce), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        let Ok(issued_at) = timestamp.parse::<i64>() else {
            return false;
        };
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_sub(issued_at) > ttl || issued_at > now + FUTURE_TOLERANCE_SECS {
            return false;
        }

        let Ok(tag) = Base64UrlUnpadded::decode_vec(tag) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&session.csrf_secret) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(nonce.as_bytes());
        mac.verify_slice(&tag).is_ok()
    }

    /// Verify or fail with [`AuthError::CsrfMismatch`].
    pub fn require(&self, session: &Session, supplied: Option<&str>) -> Result<(), AuthError> {
        match supplied {
            Some(token) if self.verify(session, token) => Ok(()),
            _ => Err(AuthError::CsrfMismatch),
        }
    }
}
