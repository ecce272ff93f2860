// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Two layers, both installed with `from_fn_with_state`:
//!
//! - [`bearer_auth`] validates `Authorization: Bearer` for `/api` routes
//! - [`session_auth`] resolves the `gw_session` cookie for `/protected`
//!   routes, refreshing tokens near expiry and starting a login otherwise
//!
//! Both put the verified [`Principal`] into the request extensions, where the
//! [`Auth`](super::Auth) extractor picks it up.

use axum::{
    extract::{Request, State},
    http::{header::LOCATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use super::claims::Principal;
use super::error::AuthError;
use super::extractor::bearer_token;
use crate::oauth2::OAuth2Flow;
use crate::session::{Session, SessionId, SESSION_COOKIE};
use crate::state::AppState;

/// Bearer token middleware.
pub async fn bearer_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let principal = match authenticate_bearer(&parts, &state).await {
        Ok(principal) => principal,
        Err(e) => {
            debug!(error_code = e.error_code(), path = %parts.uri.path(), "Bearer authentication failed");
            return e.into_response();
        }
    };

    parts.extensions.insert(principal);
    next.run(Request::from_parts(parts, body)).await
}

async fn authenticate_bearer(parts: &Parts, state: &AppState) -> Result<Principal, AuthError> {
    let token = bearer_token(parts)?;
    state.validator.validate(token).await
}

/// Session cookie middleware.
///
/// Requests without an authenticated session, or whose refresh failed, are
/// redirected to the provider with the requested path remembered.
pub async fn session_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let flow = match state.flow() {
        Ok(flow) => flow.clone(),
        Err(e) => return e.into_response(),
    };
    let return_to = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string());

    let session = match session_from_jar(&flow, &jar) {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    let session = match session {
        Some(session) if session.is_authenticated() => session,
        pending => return login_redirect(&flow, jar, pending, return_to.as_deref()).await,
    };

    let session = match flow.ensure_fresh(session).await {
        Ok(session) => session,
        Err(AuthError::RefreshFailed | AuthError::SessionExpired) => {
            return login_redirect(&flow, jar, None, return_to.as_deref()).await;
        }
        Err(e) => return e.into_response(),
    };

    if let Some(principal) = session.principal().cloned() {
        request.extensions_mut().insert(principal);
    }
    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Look up and touch the session named by the cookie, if any.
pub fn session_from_jar(flow: &OAuth2Flow, jar: &CookieJar) -> Result<Option<Session>, AuthError> {
    let Some(id) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionId::parse(cookie.value()))
    else {
        return Ok(None);
    };
    Ok(flow.sessions().touch(&id)?)
}

async fn login_redirect(
    flow: &OAuth2Flow,
    jar: CookieJar,
    existing: Option<Session>,
    return_to: Option<&str>,
) -> Response {
    match flow.start_login(existing, return_to).await {
        Ok(redirect) => {
            let cookie = session_cookie(&redirect.session_id, flow.session_config().secure_cookies);
            (jar.add(cookie), found(&redirect.location)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// The `gw_session` cookie carrying `id`.
pub fn session_cookie(id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .build()
}

/// A `302 Found` redirect.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}
