// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and publication.
//!
//! ## Security
//!
//! - Keys are fetched once at startup; a failure there aborts startup
//! - Afterwards a refresh happens only when a token names an unknown `kid`
//! - Refreshes are coalesced and limited to one per `min_refresh_interval`
//! - A failed refresh keeps the previously published key set
//! - Keys marked `use: enc` are ignored; one malformed signing key rejects the
//!   whole document

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum KeyFetchError {
    #[error("JWKS request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("JWKS endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("JWKS document is invalid: {0}")]
    InvalidDocument(String),

    #[error("JWKS key {kid:?} is unusable: {reason}")]
    InvalidKey { kid: Option<String>, reason: String },

    #[error("JWKS document contains no signing keys")]
    Empty,

    #[error("key refresh attempted within the minimum refresh interval")]
    Throttled,
}

/// A provider public key usable for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub decoding_key: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the provider's signing keys, indexed by `kid`.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, SigningKey>,
}

impl SigningKeySet {
    /// Build a key set from a JWKS document.
    pub fn from_jwks(document: &Value) -> Result<Self, KeyFetchError> {
        let entries = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| KeyFetchError::InvalidDocument("missing 'keys' array".to_string()))?;

        let mut keys = HashMap::new();
        for entry in entries {
            if entry.get("use").and_then(Value::as_str) == Some("enc") {
                debug!(kid = ?entry.get("kid"), "Skipping encryption key");
                continue;
            }

            let jwk: Jwk = serde_json::from_value(entry.clone()).map_err(|e| {
                KeyFetchError::InvalidKey {
                    kid: entry.get("kid").and_then(Value::as_str).map(str::to_string),
                    reason: e.to_string(),
                }
            })?;
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }

            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWKS key without kid");
                continue;
            };

            let key = jwk_to_signing_key(kid.clone(), &jwk)?;
            keys.entry(kid).or_insert(key);
        }

        if keys.is_empty() {
            return Err(KeyFetchError::Empty);
        }
        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Published key set together with the generation it was published at.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    pub keys: Arc<SigningKeySet>,
    pub generation: u64,
}

/// Point-in-time view of the fetcher for health reporting.
#[derive(Debug, Clone, Copy)]
pub struct KeySetStatus {
    pub key_count: usize,
    pub generation: u64,
    pub last_refresh_failed: bool,
}

/// Retrieves the provider JWKS and publishes it as a [`SigningKeySet`].
pub struct KeySetFetcher {
    jwks_uri: String,
    http: reqwest::Client,
    min_refresh_interval: Duration,
    published: RwLock<Arc<SigningKeySet>>,
    generation: AtomicU64,
    /// Serializes refreshes; holds the time of the last network attempt.
    refresh_gate: Mutex<Option<Instant>>,
    last_refresh_failed: AtomicBool,
}

impl KeySetFetcher {
    /// Fetch the initial key set and build the fetcher around it.
    pub async fn bootstrap(
        jwks_uri: impl Into<String>,
        http: reqwest::Client,
        min_refresh_interval: Duration,
    ) -> Result<Self, KeyFetchError> {
        let jwks_uri = jwks_uri.into();
        let initial = Self::fetch(&http, &jwks_uri).await?;
        info!(jwks_uri = %jwks_uri, keys = initial.len(), "Signing keys loaded");
        Ok(Self::with_initial(jwks_uri, http, min_refresh_interval, initial))
    }

    /// Build a fetcher around an already fetched key set.
    pub fn with_initial(
        jwks_uri: impl Into<String>,
        http: reqwest::Client,
        min_refresh_interval: Duration,
        initial: SigningKeySet,
    ) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            http,
            min_refresh_interval,
            published: RwLock::new(Arc::new(initial)),
            generation: AtomicU64::new(0),
            refresh_gate: Mutex::new(None),
            last_refresh_failed: AtomicBool::new(false),
        }
    }

    /// Retrieve and parse a JWKS document.
    pub async fn fetch(http: &reqwest::Client, jwks_uri: &str) -> Result<SigningKeySet, KeyFetchError> {
        let response = http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| KeyFetchError::Request {
                url: jwks_uri.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status {
                url: jwks_uri.to_string(),
                status: response.status().as_u16(),
            });
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| KeyFetchError::InvalidDocument(e.to_string()))?;

        SigningKeySet::from_jwks(&document)
    }

    /// Currently published key set.
    pub async fn current(&self) -> KeySnapshot {
        let keys = self.published.read().await;
        KeySnapshot {
            keys: Arc::clone(&keys),
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Refresh the key set unless it changed since `observed_generation`.
    ///
    /// Callers that queued behind another refresh get the newly published set
    /// without a second fetch. Returns [`KeyFetchError::Throttled`] when the
    /// last attempt was less than `min_refresh_interval` ago.
    pub async fn refresh_after(&self, observed_generation: u64) -> Result<KeySnapshot, KeyFetchError> {
        let mut last_attempt = self.refresh_gate.lock().await;

        let snapshot = self.current().await;
        if snapshot.generation != observed_generation {
            debug!(generation = snapshot.generation, "Key set already refreshed");
            return Ok(snapshot);
        }

        if let Some(at) = *last_attempt {
            if at.elapsed() < self.min_refresh_interval {
                debug!("Key refresh throttled");
                return Err(KeyFetchError::Throttled);
            }
        }
        *last_attempt = Some(Instant::now());

        match Self::fetch(&self.http, &self.jwks_uri).await {
            Ok(fresh) => {
                let key_count = fresh.len();
                let keys = Arc::new(fresh);
                {
                    let mut published = self.published.write().await;
                    *published = Arc::clone(&keys);
                    self.generation.fetch_add(1, Ordering::AcqRel);
                }
                self.last_refresh_failed.store(false, Ordering::Release);
                let generation = self.generation.load(Ordering::Acquire);
                info!(keys = key_count, generation, "Signing keys refreshed");
                Ok(KeySnapshot { keys, generation })
            }
            Err(e) => {
                self.last_refresh_failed.store(true, Ordering::Release);
                warn!(error = %e, "Signing key refresh failed, keeping previous key set");
                Err(e)
            }
        }
    }

    /// Refresh now, subject to the same throttling as on-demand refreshes.
    pub async fn refresh(&self) -> Result<KeySnapshot, KeyFetchError> {
        let generation = self.generation.load(Ordering::Acquire);
        self.refresh_after(generation).await
    }

    pub async fn status(&self) -> KeySetStatus {
        let snapshot = self.current().await;
        KeySetStatus {
            key_count: snapshot.keys.len(),
            generation: snapshot.generation,
            last_refresh_failed: self.last_refresh_failed.load(Ordering::Acquire),
        }
    }
}

/// Convert a JWK to a signing key, resolving its algorithm.
fn jwk_to_signing_key(kid: String, jwk: &Jwk) -> Result<SigningKey, KeyFetchError> {
    let invalid = |reason: String| KeyFetchError::InvalidKey {
        kid: Some(kid.clone()),
        reason,
    };

    let declared = jwk.common.key_algorithm;
    let algorithm = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => match declared {
            None | Some(KeyAlgorithm::RS256) => Algorithm::RS256,
            Some(KeyAlgorithm::RS384) => Algorithm::RS384,
            Some(KeyAlgorithm::RS512) => Algorithm::RS512,
            Some(KeyAlgorithm::PS256) => Algorithm::PS256,
            Some(KeyAlgorithm::PS384) => Algorithm::PS384,
            Some(KeyAlgorithm::PS512) => Algorithm::PS512,
            Some(other) => return Err(invalid(format!("RSA key declares {other:?}"))),
        },
        AlgorithmParameters::EllipticCurve(ec) => match (declared, &ec.curve) {
            (None | Some(KeyAlgorithm::ES256), EllipticCurve::P256) => Algorithm::ES256,
            (None | Some(KeyAlgorithm::ES384), EllipticCurve::P384) => Algorithm::ES384,
            (alg, curve) => {
                return Err(invalid(format!("unsupported EC key {alg:?} on {curve:?}")))
            }
        },
        AlgorithmParameters::OctetKeyPair(okp) => match (declared, &okp.curve) {
            (None | Some(KeyAlgorithm::EdDSA), EllipticCurve::Ed25519) => Algorithm::EdDSA,
            (alg, curve) => {
                return Err(invalid(format!("unsupported OKP key {alg:?} on {curve:?}")))
            }
        },
        _ => return Err(invalid("unsupported key type".to_string())),
    };

    let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| invalid(e.to_string()))?;

    Ok(SigningKey {
        kid,
        algorithm,
        decoding_key,
    })
}
