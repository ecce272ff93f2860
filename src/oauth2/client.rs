// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP calls to the provider's token, userinfo, revocation and end-session endpoints.
//!
//! Client authentication uses `client_secret_post`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::auth::discovery::ProviderMetadata;
use crate::config::OAuth2ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{endpoint} request failed: {reason}")]
    Request { endpoint: &'static str, reason: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("{endpoint} response was invalid: {reason}")]
    InvalidResponse { endpoint: &'static str, reason: String },

    #[error("provider does not advertise a {0} endpoint")]
    Unsupported(&'static str),
}

impl ProviderError {
    /// Whether the provider rejected the presented access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Status { status: 401, .. })
    }
}

/// Token endpoint response (RFC 6749 section 5.1).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Provider endpoints bound to this gateway's client registration.
pub struct ProviderClient {
    http: reqwest::Client,
    metadata: ProviderMetadata,
    client: OAuth2ClientConfig,
}

impl ProviderClient {
    pub fn new(http: reqwest::Client, metadata: ProviderMetadata, client: OAuth2ClientConfig) -> Self {
        Self {
            http,
            metadata,
            client,
        }
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn client_config(&self) -> &OAuth2ClientConfig {
        &self.client
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        let mut form = self.client_form();
        form.insert("grant_type", "authorization_code".to_string());
        form.insert("code", code.to_string());
        form.insert("redirect_uri", self.client.redirect_uri());
        self.token_request(form).await
    }

    /// Redeem a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        let mut form = self.client_form();
        form.insert("grant_type", "refresh_token".to_string());
        form.insert("refresh_token", refresh_token.to_string());
        self.token_request(form).await
    }

    /// Call the userinfo endpoint with a bearer access token.
    pub async fn userinfo(&self, access_token: &str) -> Result<Value, ProviderError> {
        const ENDPOINT: &str = "userinfo";
        let url = self
            .metadata
            .userinfo_endpoint
            .as_deref()
            .ok_or(ProviderError::Unsupported(ENDPOINT))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                endpoint: ENDPOINT,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint: ENDPOINT,
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| ProviderError::InvalidResponse {
            endpoint: ENDPOINT,
            reason: e.to_string(),
        })
    }

    pub fn supports_revocation(&self) -> bool {
        self.metadata.revocation_endpoint.is_some()
    }

    /// Revoke a token (RFC 7009).
    pub async fn revoke(&self, token: &str, token_type_hint: &str) -> Result<(), ProviderError> {
        const ENDPOINT: &str = "revocation";
        let url = self
            .metadata
            .revocation_endpoint
            .as_deref()
            .ok_or(ProviderError::Unsupported(ENDPOINT))?;

        let mut form = self.client_form();
        form.insert("token", token.to_string());
        form.insert("token_type_hint", token_type_hint.to_string());
        self.post_form(ENDPOINT, url, &form).await.map(|_| ())
    }

    /// Back-channel logout at the end-session endpoint using the refresh token.
    pub async fn end_session(&self, refresh_token: &str) -> Result<(), ProviderError> {
        const ENDPOINT: &str = "end-session";
        let url = self
            .metadata
            .end_session_endpoint
            .as_deref()
            .ok_or(ProviderError::Unsupported(ENDPOINT))?;

        let mut form = self.client_form();
        form.insert("refresh_token", refresh_token.to_string());
        self.post_form(ENDPOINT, url, &form).await.map(|_| ())
    }

    fn client_form(&self) -> HashMap<&'static str, String> {
        let mut form = HashMap::new();
        form.insert("client_id", self.client.client_id.clone());
        form.insert("client_secret", self.client.client_secret.clone());
        form
    }

    async fn token_request(
        &self,
        form: HashMap<&'static str, String>,
    ) -> Result<TokenResponse, ProviderError> {
        const ENDPOINT: &str = "token";
        let response = self
            .post_form(ENDPOINT, &self.metadata.token_endpoint, &form)
            .await?;

        let tokens: TokenResponse = response.json().await.map_err(|e| ProviderError::InvalidResponse {
            endpoint: ENDPOINT,
            reason: e.to_string(),
        })?;

        if tokens.access_token.trim().is_empty() {
            return Err(ProviderError::InvalidResponse {
                endpoint: ENDPOINT,
                reason: "token response did not include access_token".to_string(),
            });
        }
        Ok(tokens)
    }

    async fn post_form(
        &self,
        endpoint: &'static str,
        url: &str,
        form: &HashMap<&'static str, String>,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                endpoint,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}
