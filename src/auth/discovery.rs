// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect provider discovery.

use serde::Deserialize;
use tracing::info;

/// Path of the discovery document relative to the issuer.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// JWKS location used by Keycloak-compatible providers when nothing else is known.
pub const FALLBACK_JWKS_SUFFIX: &str = "/protocol/openid-connect/certs";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("discovery endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("discovery document is invalid: {0}")]
    InvalidDocument(String),

    #[error("discovery document issuer {actual} does not match configured issuer {expected}")]
    IssuerMismatch { expected: String, actual: String },
}

/// Provider endpoints from `.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
}

/// Fetch and check the provider's discovery document.
pub async fn discover(http: &reqwest::Client, issuer: &str) -> Result<ProviderMetadata, DiscoveryError> {
    let url = format!("{}{DISCOVERY_PATH}", issuer.trim_end_matches('/'));

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| DiscoveryError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(DiscoveryError::Status {
            url,
            status: response.status().as_u16(),
        });
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| DiscoveryError::InvalidDocument(e.to_string()))?;

    if metadata.issuer != issuer {
        return Err(DiscoveryError::IssuerMismatch {
            expected: issuer.to_string(),
            actual: metadata.issuer,
        });
    }

    info!(
        issuer = %metadata.issuer,
        revocation = metadata.revocation_endpoint.is_some(),
        end_session = metadata.end_session_endpoint.is_some(),
        "Provider metadata discovered"
    );
    Ok(metadata)
}

/// JWKS location: explicit configuration, then discovery, then the issuer suffix.
pub fn resolve_jwks_uri(
    issuer: &str,
    configured: Option<&str>,
    metadata: Option<&ProviderMetadata>,
) -> String {
    configured
        .map(str::to_string)
        .or_else(|| metadata.map(|m| m.jwks_uri.clone()))
        .unwrap_or_else(|| format!("{}{FALLBACK_JWKS_SUFFIX}", issuer.trim_end_matches('/')))
}
