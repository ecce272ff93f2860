// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login callback, logout and the pages around them.

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use tracing::debug;

use super::protected::escape_html;
use crate::auth::csrf::CSRF_FIELD;
use crate::auth::middleware::{found, session_cookie, session_from_jar};
use crate::auth::AuthError;
use crate::error::HandlerError;
use crate::oauth2::CallbackParams;
use crate::session::{SessionId, SESSION_COOKIE};
use crate::state::AppState;

/// Authorization callback: verify `state`, exchange the code and start the
/// authenticated session under a fresh id.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, HandlerError> {
    let flow = state.flow()?;
    let session_id = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionId::parse(cookie.value()));

    let completed = flow.handle_callback(session_id.as_ref(), &params).await?;
    let cookie = session_cookie(&completed.session_id, flow.session_config().secure_cookies);
    Ok((jar.add(cookie), found(&completed.return_to)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    #[serde(rename = "X-XSRF-TOKEN")]
    pub csrf_token: Option<String>,
}

/// End the session. The anti-forgery field is checked before anything else.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LogoutForm>,
) -> Result<Response, HandlerError> {
    let flow = state.flow()?;
    let session = session_from_jar(flow, &jar)?.ok_or(AuthError::SessionExpired)?;

    let outcome = flow.logout(&session, form.csrf_token.as_deref()).await?;
    let jar = jar
        .remove(Cookie::build(SESSION_COOKIE).path("/"))
        .remove(Cookie::build(CSRF_FIELD).path("/"));
    Ok((jar, found(outcome.redirect_path())).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginErrorQuery {
    pub reason: Option<String>,
}

/// User-visible login failure page.
pub async fn login_error(Query(query): Query<LoginErrorQuery>) -> Html<String> {
    let reason = query
        .reason
        .filter(|r| !r.is_empty() && r.len() <= 64 && r.chars().all(|c| c.is_ascii_lowercase() || c == '_'))
        .unwrap_or_else(|| "unknown".to_string());
    debug!(reason = %reason, "Rendering login error page");

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Login failed</title></head>
<body>
<h1>Login failed</h1>
<p>The login could not be completed (<code>{reason}</code>).</p>
<p><a href="/protected/">Try again</a></p>
</body>
</html>
"#,
        reason = escape_html(&reason),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HomeQuery {
    pub logout: Option<String>,
}

/// Public landing page, also the target after logout.
pub async fn home(Query(query): Query<HomeQuery>) -> Html<String> {
    let notice = match query.logout.as_deref() {
        Some("true") => "<p>You have been logged out.</p>\n",
        Some("local") => {
            "<p>You have been logged out here, but the identity provider could not be notified.</p>\n"
        }
        _ => "",
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>OIDC Gateway</title></head>
<body>
{notice}<p><a href="/protected/">Log in</a></p>
</body>
</html>
"#
    ))
}
