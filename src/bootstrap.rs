// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup sequence.
//!
//! ```text
//! load-config → discovery → key-fetch → build-services → attach-routes → listen
//! ```
//!
//! Steps run in order; the first failure aborts the rest and is reported as
//! a [`BootstrapError`] naming the step. Discovery runs only when session
//! login is configured.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::router;
use crate::auth::discovery::{discover, resolve_jwks_uri, ProviderMetadata};
use crate::auth::jwks::KeySetFetcher;
use crate::config::GatewayConfig;
use crate::oauth2::{OAuth2Flow, ProviderClient};
use crate::session::{InMemorySessionStore, SessionStore, SessionSweeper};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    LoadConfig,
    Discovery,
    KeyFetch,
    BuildServices,
    AttachRoutes,
    Listen,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapStep::LoadConfig => "load-config",
            BootstrapStep::Discovery => "discovery",
            BootstrapStep::KeyFetch => "key-fetch",
            BootstrapStep::BuildServices => "build-services",
            BootstrapStep::AttachRoutes => "attach-routes",
            BootstrapStep::Listen => "listen",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("bootstrap step `{step}` failed: {source}")]
pub struct BootstrapError {
    pub step: BootstrapStep,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl BootstrapError {
    fn at(step: BootstrapStep, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// A fully wired gateway, bound but not yet serving.
pub struct Gateway {
    pub state: AppState,
    pub router: Router,
    pub listener: TcpListener,
    pub sweeper: Option<SessionSweeper>,
}

impl Gateway {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is cancelled, running the session sweeper alongside.
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let sweeper = self.sweeper.map(|sweeper| tokio::spawn(sweeper.run(shutdown.child_token())));

        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        if let Some(handle) = sweeper {
            let _ = handle.await;
        }
        result
    }
}

/// Run the steps after `load-config` for an already loaded configuration.
pub async fn bootstrap(config: GatewayConfig) -> Result<Gateway, BootstrapError> {
    let http = reqwest::Client::builder()
        .timeout(config.provider_timeout)
        .build()
        .map_err(|e| BootstrapError::at(BootstrapStep::LoadConfig, e))?;

    // discovery
    let metadata: Option<ProviderMetadata> = if config.sessions_enabled() {
        let metadata = discover(&http, &config.issuer)
            .await
            .map_err(|e| BootstrapError::at(BootstrapStep::Discovery, e))?;
        info!(issuer = %metadata.issuer, "Provider metadata discovered");
        Some(metadata)
    } else {
        info!("Session login not configured, skipping discovery");
        None
    };

    // key-fetch
    let jwks_uri = resolve_jwks_uri(&config.issuer, config.jwks_url.as_deref(), metadata.as_ref());
    let keys = KeySetFetcher::bootstrap(jwks_uri, http.clone(), config.key_refresh_min_interval)
        .await
        .map_err(|e| BootstrapError::at(BootstrapStep::KeyFetch, e))?;

    // build-services
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.session.capacity));
    let oauth2 = config.oauth2.clone();
    let session_config = config.session.clone();
    let bind_addr = config.bind_addr;
    let mut state = AppState::new(config, Arc::new(keys), Arc::clone(&sessions));
    let mut sweeper = None;

    if let Some(client) = oauth2 {
        let metadata = metadata.ok_or_else(|| {
            BootstrapError::at(BootstrapStep::BuildServices, "provider metadata was not discovered")
        })?;
        let provider = ProviderClient::new(http, metadata, client);
        let flow = OAuth2Flow::new(
            provider,
            Arc::clone(&state.validator),
            Arc::clone(&sessions),
            session_config.clone(),
        );
        state = state.with_flow(flow);
        sweeper = Some(SessionSweeper::new(sessions, session_config.sweep_interval));
    }

    // attach-routes
    let router = router(state.clone());

    // listen
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| BootstrapError::at(BootstrapStep::Listen, e))?;
    info!(
        addr = %listener.local_addr().unwrap_or(bind_addr),
        sessions = state.flow.is_some(),
        "Gateway listening (docs at /docs)"
    );

    Ok(Gateway {
        state,
        router,
        listener,
        sweeper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CLIENT_ID_ENV, CLIENT_SECRET_ENV, HOST_ENV, ISSUER_URL_ENV, JWKS_URL_ENV, PORT_ENV};
    use crate::testing::{jwks, rsa_jwk, SIGNING_JWK_N};
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(vars: &[(&str, String)]) -> GatewayConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .chain([
                (HOST_ENV.to_string(), "127.0.0.1".to_string()),
                (PORT_ENV.to_string(), "0".to_string()),
            ])
            .collect();
        GatewayConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    #[test]
    fn steps_have_stable_names() {
        let names: Vec<String> = [
            BootstrapStep::LoadConfig,
            BootstrapStep::Discovery,
            BootstrapStep::KeyFetch,
            BootstrapStep::BuildServices,
            BootstrapStep::AttachRoutes,
            BootstrapStep::Listen,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            names,
            ["load-config", "discovery", "key-fetch", "build-services", "attach-routes", "listen"]
        );
    }

    #[tokio::test]
    async fn bearer_only_uses_provider_certs_suffix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/realms/demo/protocol/openid-connect/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)])))
            .expect(1)
            .mount(&server)
            .await;

        let issuer = format!("{}/realms/demo", server.uri());
        let gateway = bootstrap(config(&[(ISSUER_URL_ENV, issuer)])).await.unwrap();
        assert!(gateway.state.flow.is_none());
        assert!(gateway.sweeper.is_none());
        assert_eq!(gateway.state.keys.status().await.key_count, 1);
    }

    #[tokio::test]
    async fn key_fetch_failure_names_the_step() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let vars = [
            (ISSUER_URL_ENV, server.uri()),
            (JWKS_URL_ENV, format!("{}/certs", server.uri())),
        ];
        let err = bootstrap(config(&vars)).await.err().unwrap();
        assert_eq!(err.step, BootstrapStep::KeyFetch);
        assert!(err.to_string().starts_with("bootstrap step `key-fetch` failed"));
    }

    #[tokio::test]
    async fn discovery_failure_names_the_step() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": "https://someone-else.example.com",
                "authorization_endpoint": "https://someone-else.example.com/auth",
                "token_endpoint": "https://someone-else.example.com/token",
                "jwks_uri": "https://someone-else.example.com/certs"
            })))
            .mount(&server)
            .await;

        let vars = [
            (ISSUER_URL_ENV, server.uri()),
            (CLIENT_ID_ENV, "gateway".to_string()),
            (CLIENT_SECRET_ENV, "s3cret".to_string()),
        ];
        let err = bootstrap(config(&vars)).await.err().unwrap();
        assert_eq!(err.step, BootstrapStep::Discovery);
    }

    #[test]
    fn invalid_environment_fails_load_config() {
        // GATEWAY_ISSUER_URL is required and absent from a clean lookup.
        let err = GatewayConfig::from_lookup(|_| None)
            .map_err(|e| BootstrapError::at(BootstrapStep::LoadConfig, e))
            .err()
            .unwrap();
        assert_eq!(err.step, BootstrapStep::LoadConfig);
    }
}
