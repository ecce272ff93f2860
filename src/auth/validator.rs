// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! Checks run in a fixed order so that cheap rejections never cost a key
//! refresh:
//!
//! 1. Parse header and claims without trusting them
//! 2. `exp` / `nbf` with leeway
//! 3. Exact `iss`
//! 4. Key lookup by `kid` (one coalesced refresh on a miss)
//! 5. Header `alg` must equal the key's algorithm
//! 6. Signature and registered claims via `jsonwebtoken`
//! 7. Role extraction from the configured claim path

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde_json::Value;
use tracing::debug;

use super::claims::{ClaimPath, ClaimSet, CredentialKind, Principal};
use super::error::AuthError;
use super::jwks::{KeyFetchError, KeySetFetcher, SigningKeySet};

/// A compact JWS split into its untrusted parts.
#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    header: Header,
    claims: ClaimSet,
}

impl Token {
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let header = decode_header(raw).map_err(|_| AuthError::MalformedToken)?;

        let mut segments = raw.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(AuthError::MalformedToken),
        };
        let bytes = Base64UrlUnpadded::decode_vec(payload).map_err(|_| AuthError::MalformedToken)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)?;
        let claims = ClaimSet::from_value(value).ok_or(AuthError::MalformedToken)?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// Claims as sent, before any verification.
    pub fn unverified_claims(&self) -> &ClaimSet {
        &self.claims
    }
}

/// What a token must satisfy to be accepted.
#[derive(Debug, Clone)]
pub struct IssuerPolicy {
    pub issuer: String,
    pub audience: Option<String>,
    /// Clock skew tolerance in seconds.
    pub leeway: u64,
    pub role_claim_path: ClaimPath,
    pub require_role_claim: bool,
}

impl IssuerPolicy {
    /// Same policy, requiring `aud` to contain `audience`.
    pub fn for_audience(&self, audience: &str) -> Self {
        Self {
            audience: Some(audience.to_string()),
            ..self.clone()
        }
    }
}

/// Verify a parsed token against a key set without any network access.
pub fn verify(token: &Token, keys: &SigningKeySet, policy: &IssuerPolicy) -> Result<Principal, AuthError> {
    check_unverified(token, policy)?;

    let kid = token.kid().ok_or(AuthError::UnknownKey)?;
    let key = keys.get(kid).ok_or(AuthError::UnknownKey)?;

    if token.algorithm() != key.algorithm {
        debug!(
            kid,
            token_alg = ?token.algorithm(),
            key_alg = ?key.algorithm,
            "Token algorithm does not match key"
        );
        return Err(AuthError::SignatureInvalid);
    }

    let mut validation = Validation::new(key.algorithm);
    validation.leeway = policy.leeway;
    validation.validate_nbf = true;
    validation.set_issuer(&[&policy.issuer]);
    match &policy.audience {
        Some(audience) => {
            validation.set_audience(&[audience]);
            validation.set_required_spec_claims(&["exp", "aud"]);
        }
        None => validation.validate_aud = false,
    }

    let data = decode::<Value>(token.raw(), &key.decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::SignatureInvalid,
            ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
            ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => AuthError::AudienceMismatch,
            _ => {
                debug!(error = %e, "Token rejected during signature verification");
                AuthError::MalformedToken
            }
        }
    })?;

    let claims = ClaimSet::from_value(data.claims).ok_or(AuthError::MalformedToken)?;
    let principal = Principal::from_claims(claims, &policy.role_claim_path, CredentialKind::Bearer)
        .ok_or(AuthError::MalformedToken)?;

    if policy.require_role_claim && principal.roles.is_none() {
        return Err(AuthError::ClaimMissing);
    }

    Ok(principal)
}

/// Temporal and issuer checks on claims that are not yet trusted.
fn check_unverified(token: &Token, policy: &IssuerPolicy) -> Result<(), AuthError> {
    let claims = token.unverified_claims();
    let now = chrono::Utc::now().timestamp();
    let leeway = i64::try_from(policy.leeway).unwrap_or(i64::MAX);

    let exp = claims.get_timestamp("exp").ok_or(AuthError::MalformedToken)?;
    if exp.saturating_add(leeway) < now {
        return Err(AuthError::Expired);
    }
    if let Some(nbf) = claims.get_timestamp("nbf") {
        if nbf > now.saturating_add(leeway) {
            return Err(AuthError::NotYetValid);
        }
    }

    if claims.get_str("iss") != Some(policy.issuer.as_str()) {
        return Err(AuthError::IssuerMismatch);
    }
    Ok(())
}

/// Verifies bearer tokens against the published provider keys.
pub struct JwtValidator {
    keys: Arc<KeySetFetcher>,
    policy: IssuerPolicy,
}

impl JwtValidator {
    pub fn new(keys: Arc<KeySetFetcher>, policy: IssuerPolicy) -> Self {
        Self { keys, policy }
    }

    pub fn policy(&self) -> &IssuerPolicy {
        &self.policy
    }

    /// Validate a raw bearer token under the configured policy.
    pub async fn validate(&self, raw: &str) -> Result<Principal, AuthError> {
        self.validate_with(raw, &self.policy).await
    }

    /// Validate a raw token under an explicit policy.
    ///
    /// An unknown `kid` triggers at most one refresh of the key set.
    pub async fn validate_with(&self, raw: &str, policy: &IssuerPolicy) -> Result<Principal, AuthError> {
        let token = Token::parse(raw)?;
        let snapshot = self.keys.current().await;

        match verify(&token, &snapshot.keys, policy) {
            Err(AuthError::UnknownKey) if token.kid().is_some() => {
                debug!(kid = ?token.kid(), "Unknown signing key, refreshing key set");
                match self.keys.refresh_after(snapshot.generation).await {
                    Ok(fresh) => verify(&token, &fresh.keys, policy),
                    Err(KeyFetchError::Throttled) => Err(AuthError::UnknownKey),
                    Err(_) => Err(AuthError::KeyUnavailable),
                }
            }
            result => result,
        }
    }
}
