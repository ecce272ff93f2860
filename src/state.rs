// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::jwks::KeySetFetcher;
use crate::auth::roles::AuthorizationEvaluator;
use crate::auth::validator::{IssuerPolicy, JwtValidator};
use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::oauth2::OAuth2Flow;
use crate::session::SessionStore;

/// Services shared by every request, built once during bootstrap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub keys: Arc<KeySetFetcher>,
    pub validator: Arc<JwtValidator>,
    pub evaluator: Arc<AuthorizationEvaluator>,
    pub sessions: Arc<dyn SessionStore>,
    /// Present only when a client registration is configured
    pub flow: Option<Arc<OAuth2Flow>>,
}

impl AppState {
    pub fn new(config: GatewayConfig, keys: Arc<KeySetFetcher>, sessions: Arc<dyn SessionStore>) -> Self {
        let validator = Arc::new(JwtValidator::new(Arc::clone(&keys), issuer_policy(&config)));
        let evaluator = Arc::new(AuthorizationEvaluator::new(config.role_claim_path.clone()));
        Self {
            config: Arc::new(config),
            keys,
            validator,
            evaluator,
            sessions,
            flow: None,
        }
    }

    pub fn with_flow(mut self, flow: OAuth2Flow) -> Self {
        self.flow = Some(Arc::new(flow));
        self
    }

    /// The session flow, for handlers that are only routed when it exists.
    pub fn flow(&self) -> Result<&Arc<OAuth2Flow>, ApiError> {
        self.flow
            .as_ref()
            .ok_or_else(|| ApiError::not_found("Session login is not configured"))
    }
}

/// Bearer token policy derived from the gateway configuration.
pub fn issuer_policy(config: &GatewayConfig) -> IssuerPolicy {
    IssuerPolicy {
        issuer: config.issuer.clone(),
        audience: config.audience.clone(),
        leeway: config.clock_skew.as_secs(),
        role_claim_path: config.role_claim_path.clone(),
        require_role_claim: config.require_role_claim,
    }
}
