// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization Code flow with server-side sessions.
//!
//! ## Lifecycle
//!
//! 1. `start_login`: store `state` + `nonce` in a pending-login session and
//!    redirect to the authorization endpoint
//! 2. `handle_callback`: check `state` before any token call, exchange the
//!    code, verify the ID token (`aud`, `nonce`) and mint a new session id
//! 3. `ensure_fresh` / `refresh_session`: single-flight refresh per session;
//!    a rejected refresh ends the session
//! 4. `logout`: CSRF check, local session removal, then best-effort provider
//!    notification

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use super::client::{ProviderClient, ProviderError, TokenResponse};
use crate::auth::claims::{CredentialKind, Principal};
use crate::auth::csrf::CsrfGuard;
use crate::auth::validator::{IssuerPolicy, JwtValidator, Token};
use crate::auth::AuthError;
use crate::config::SessionConfig;
use crate::random::random_token;
use crate::session::{AuthenticatedSession, PendingLogin, Session, SessionId, SessionStore, TokenBundle};

/// Where the browser lands after login when no usable return path was given.
pub const DEFAULT_RETURN_PATH: &str = "/protected/";

/// Access token lifetime assumed when the provider states none.
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 300;

/// Query parameters of the authorization callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub session_id: SessionId,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session_id: SessionId,
    pub return_to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Local session removed and the provider acknowledged the logout
    Complete,
    /// Local session removed; the provider could not be notified
    LocalOnly,
}

impl LogoutOutcome {
    pub fn redirect_path(&self) -> &'static str {
        match self {
            LogoutOutcome::Complete => "/?logout=true",
            LogoutOutcome::LocalOnly => "/?logout=local",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserinfoError {
    #[error("{0}")]
    Session(AuthError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct OAuth2Flow {
    provider: ProviderClient,
    validator: Arc<JwtValidator>,
    sessions: Arc<dyn SessionStore>,
    csrf: CsrfGuard,
    session_config: SessionConfig,
    refresh_locks: StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl OAuth2Flow {
    pub fn new(
        provider: ProviderClient,
        validator: Arc<JwtValidator>,
        sessions: Arc<dyn SessionStore>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            validator,
            sessions,
            csrf: CsrfGuard::new(session_config.csrf_ttl),
            session_config,
            refresh_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    pub fn callback_path(&self) -> &str {
        &self.provider.client_config().callback_path
    }

    /// Begin a login, reusing `existing` when it is not yet authenticated.
    pub async fn start_login(
        &self,
        existing: Option<Session>,
        return_to: Option<&str>,
    ) -> Result<LoginRedirect, AuthError> {
        let mut session = match existing {
            Some(session) if !session.is_authenticated() => session,
            _ => Session::new(
                self.session_config.idle_timeout,
                self.session_config.absolute_timeout,
            )?,
        };

        let pending = PendingLogin {
            state: random_token::<32>()?,
            nonce: random_token::<32>()?,
            return_to: sanitize_return_to(return_to),
        };
        let location = self.authorization_url(&pending)?;

        debug!(session = %session.id, return_to = %pending.return_to, "Starting login");
        session.pending_login = Some(pending);
        let session_id = session.id.clone();
        self.sessions.put(session)?;

        Ok(LoginRedirect {
            session_id,
            location,
        })
    }

    fn authorization_url(&self, pending: &PendingLogin) -> Result<String, AuthError> {
        let client = self.provider.client_config();
        let mut url = Url::parse(&self.provider.metadata().authorization_endpoint).map_err(|e| {
            error!(error = %e, "Authorization endpoint is not a valid URL");
            AuthError::Internal
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &client.client_id)
            .append_pair("redirect_uri", &client.redirect_uri())
            .append_pair("scope", &client.scope())
            .append_pair("state", &pending.state)
            .append_pair("nonce", &pending.nonce);
        Ok(url.into())
    }

    /// Complete a login from the authorization callback.
    ///
    /// A missing pending login or a `state` mismatch fails before the token
    /// endpoint is contacted.
    pub async fn handle_callback(
        &self,
        session_id: Option<&SessionId>,
        params: &CallbackParams,
    ) -> Result<CompletedLogin, AuthError> {
        let session = match session_id {
            Some(id) => self.sessions.get(id)?,
            None => None,
        };
        let Some(mut session) = session else {
            warn!("Login callback without a session");
            return Err(AuthError::StateMismatch);
        };
        let Some(pending) = session.pending_login.clone() else {
            warn!(session = %session.id, "Login callback without a pending login");
            return Err(AuthError::StateMismatch);
        };
        if params.state.as_deref() != Some(pending.state.as_str()) {
            warn!(session = %session.id, "Login callback state mismatch");
            return Err(AuthError::StateMismatch);
        }

        // The pending login is single-use.
        session.pending_login = None;
        self.sessions.put(session.clone())?;

        if let Some(error) = &params.error {
            warn!(
                error = %error,
                description = ?params.error_description,
                "Provider rejected the login"
            );
            return Err(AuthError::ExchangeFailed);
        }
        let Some(code) = params.code.as_deref().filter(|code| !code.is_empty()) else {
            warn!("Login callback without a code");
            return Err(AuthError::ExchangeFailed);
        };

        let tokens = self.provider.exchange_code(code).await.map_err(|e| {
            warn!(error = %e, "Authorization code exchange failed");
            AuthError::ExchangeFailed
        })?;

        let Some(id_token) = tokens.id_token.clone() else {
            warn!("Token response did not include an ID token");
            return Err(AuthError::ExchangeFailed);
        };
        let id_policy = self
            .validator
            .policy()
            .for_audience(&self.provider.client_config().client_id);
        let id_principal = self
            .validator
            .validate_with(&id_token, &id_policy)
            .await
            .map_err(|e| {
                warn!(error = %e, "ID token rejected");
                AuthError::ExchangeFailed
            })?;
        if id_principal.claims.get_str("nonce") != Some(pending.nonce.as_str()) {
            warn!("ID token nonce mismatch");
            return Err(AuthError::ExchangeFailed);
        }

        let now = Utc::now();
        let principal = self.session_principal(&tokens.access_token, id_principal).await;
        let bundle = TokenBundle {
            access_token: tokens.access_token.clone(),
            id_token: Some(id_token),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: token_expiry(&tokens, now),
        };

        let mut authenticated = session.rotate()?;
        authenticated.auth = Some(AuthenticatedSession {
            tokens: bundle,
            principal,
        });
        authenticated.touch(now);
        self.sessions.delete(&session.id)?;
        self.sessions.put(authenticated.clone())?;

        info!(
            subject = %authenticated.principal().map(|p| p.subject.as_str()).unwrap_or_default(),
            session = %authenticated.id,
            "Login completed"
        );
        Ok(CompletedLogin {
            session_id: authenticated.id,
            return_to: pending.return_to,
        })
    }

    /// Principal for a session: roles from the access token when it is a
    /// verifiable JWT, otherwise `fallback`.
    async fn session_principal(&self, access_token: &str, fallback: Principal) -> Principal {
        match self
            .validator
            .validate_with(access_token, &self.access_token_policy())
            .await
        {
            Ok(principal) => principal,
            Err(e) => {
                debug!(error = %e, "Access token not verifiable, keeping previous claims");
                fallback
            }
        }
        .with_credential(CredentialKind::Session)
    }

    fn access_token_policy(&self) -> IssuerPolicy {
        IssuerPolicy {
            audience: None,
            ..self.validator.policy().clone()
        }
    }

    /// Return `session`, refreshing its tokens first when they are close to expiry.
    pub async fn ensure_fresh(&self, session: Session) -> Result<Session, AuthError> {
        let Some(tokens) = session.tokens() else {
            return Err(AuthError::SessionExpired);
        };
        if !tokens.needs_refresh(self.session_config.refresh_skew, Utc::now()) {
            return Ok(session);
        }
        let observed = tokens.access_token.clone();
        self.refresh_session(&session.id, &observed).await
    }

    /// Refresh the tokens of session `id`, serialized per session.
    ///
    /// If the stored access token no longer equals `observed_access_token`,
    /// another request already refreshed and the stored session is returned
    /// without a provider call. A rejected refresh deletes the session.
    pub async fn refresh_session(
        &self,
        id: &SessionId,
        observed_access_token: &str,
    ) -> Result<Session, AuthError> {
        let lock = self.refresh_lock(id);
        let _guard = lock.lock().await;

        let Some(current) = self.sessions.get(id)? else {
            return Err(AuthError::SessionExpired);
        };
        let Some(auth) = current.auth.clone() else {
            return Err(AuthError::SessionExpired);
        };
        if auth.tokens.access_token != observed_access_token {
            debug!(session = %id, "Session already refreshed");
            return Ok(current);
        }

        let Some(refresh_token) = auth.tokens.refresh_token.clone() else {
            warn!(session = %id, "Access token expired and no refresh token, ending session");
            self.sessions.delete(id)?;
            return Err(AuthError::RefreshFailed);
        };

        let tokens = match self.provider.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(session = %id, error = %e, "Token refresh failed, ending session");
                self.sessions.delete(id)?;
                return Err(AuthError::RefreshFailed);
            }
        };

        let now = Utc::now();
        let principal = self
            .session_principal(&tokens.access_token, auth.principal.clone())
            .await;
        let bundle = TokenBundle {
            access_token: tokens.access_token.clone(),
            id_token: tokens.id_token.clone().or(auth.tokens.id_token),
            refresh_token: tokens.refresh_token.clone().or(Some(refresh_token)),
            expires_at: token_expiry(&tokens, now),
        };

        // The sweeper may have purged the session during the provider call.
        let Some(mut latest) = self.sessions.get(id)? else {
            return Err(AuthError::SessionExpired);
        };
        latest.auth = Some(AuthenticatedSession {
            tokens: bundle,
            principal,
        });
        self.sessions.put(latest.clone())?;

        info!(session = %id, "Session tokens refreshed");
        Ok(latest)
    }

    fn refresh_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    /// Call the userinfo endpoint with the session's access token.
    ///
    /// A `401` leads to one refresh and one retry.
    pub async fn userinfo(&self, session: Session) -> Result<Value, UserinfoError> {
        let session = self.ensure_fresh(session).await.map_err(UserinfoError::Session)?;
        let access_token = session
            .tokens()
            .map(|tokens| tokens.access_token.clone())
            .ok_or(UserinfoError::Session(AuthError::SessionExpired))?;

        match self.provider.userinfo(&access_token).await {
            Err(e) if e.is_unauthorized() => {
                debug!(session = %session.id, "Userinfo rejected the access token, refreshing");
                let refreshed = self
                    .refresh_session(&session.id, &access_token)
                    .await
                    .map_err(UserinfoError::Session)?;
                let retry_token = refreshed
                    .tokens()
                    .map(|tokens| tokens.access_token.clone())
                    .ok_or(UserinfoError::Session(AuthError::SessionExpired))?;
                Ok(self.provider.userinfo(&retry_token).await?)
            }
            result => Ok(result?),
        }
    }

    /// End a session after verifying the anti-forgery token.
    ///
    /// Nothing happens when the token does not verify. Otherwise the local
    /// session is removed before the provider is notified, and a provider
    /// failure never restores it.
    pub async fn logout(
        &self,
        session: &Session,
        csrf_token: Option<&str>,
    ) -> Result<LogoutOutcome, AuthError> {
        self.csrf.require(session, csrf_token).inspect_err(|_| {
            warn!(session = %session.id, "Logout rejected: anti-forgery token mismatch");
        })?;

        // Serialised with refresh so a refresh in flight cannot restore the session.
        let lock = self.refresh_lock(&session.id);
        let latest = {
            let _guard = lock.lock().await;
            let latest = self.sessions.get(&session.id)?;
            self.sessions.delete(&session.id)?;
            latest
        };
        info!(session = %session.id, "Session ended");

        let tokens = latest.as_ref().unwrap_or(session).tokens();
        let Some(refresh_token) = tokens.and_then(|t| t.refresh_token.as_deref()) else {
            return Ok(LogoutOutcome::Complete);
        };

        let notified = if self.provider.supports_revocation() {
            self.provider.revoke(refresh_token, "refresh_token").await
        } else if self.provider.metadata().end_session_endpoint.is_some() {
            self.provider.end_session(refresh_token).await
        } else {
            return Ok(LogoutOutcome::Complete);
        };

        match notified {
            Ok(()) => Ok(LogoutOutcome::Complete),
            Err(e) => {
                warn!(error = %e, "Provider logout failed, local session already ended");
                Ok(LogoutOutcome::LocalOnly)
            }
        }
    }
}

/// Accept only same-origin relative paths.
pub fn sanitize_return_to(return_to: Option<&str>) -> String {
    match return_to {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => DEFAULT_RETURN_PATH.to_string(),
    }
}

/// Access token expiry from `expires_in`, then the token's own `exp`.
fn token_expiry(tokens: &TokenResponse, now: DateTime<Utc>) -> DateTime<Utc> {
    let lifetime = tokens
        .expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .map(TimeDelta::seconds);
    if let Some(expiry) = lifetime.and_then(|lifetime| now.checked_add_signed(lifetime)) {
        return expiry;
    }

    Token::parse(&tokens.access_token)
        .ok()
        .and_then(|token| token.unverified_claims().get_timestamp("exp"))
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
        .unwrap_or_else(|| now + TimeDelta::seconds(FALLBACK_TOKEN_LIFETIME_SECS))
}
