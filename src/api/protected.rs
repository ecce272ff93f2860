// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session-authenticated pages under `/protected`.

use axum::{
    extract::State,
    response::Html,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::Value;

use crate::auth::claims::Principal;
use crate::auth::csrf::CSRF_FIELD;
use crate::auth::extractor::{AdminRole, CurrentSession, RequireRole, UserRole};
use crate::auth::roles::{ADMIN_ROLE, USER_ROLE};
use crate::auth::AuthError;
use crate::error::HandlerError;
use crate::state::AppState;

/// Landing page with the logout form.
///
/// The anti-forgery token goes into the hidden form field and a readable
/// cookie; the secret it is derived from stays in the session.
pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentSession(session): CurrentSession,
) -> Result<(CookieJar, Html<String>), HandlerError> {
    let flow = state.flow()?;
    let principal = session.principal().ok_or(AuthError::SessionExpired)?;
    let token = flow.csrf().issue(&session)?;

    let cookie = Cookie::build((CSRF_FIELD, token.clone()))
        .same_site(SameSite::Lax)
        .secure(flow.session_config().secure_cookies)
        .path("/")
        .build();

    Ok((jar.add(cookie), Html(render_index(principal, &token))))
}

pub async fn user(RequireRole(principal, _): RequireRole<UserRole>) -> Html<String> {
    Html(render_role_page(&principal, USER_ROLE))
}

pub async fn admin(RequireRole(principal, _): RequireRole<AdminRole>) -> Html<String> {
    Html(render_role_page(&principal, ADMIN_ROLE))
}

/// Provider userinfo fetched with the session's access token.
pub async fn userinfo(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<Value>, HandlerError> {
    let flow = state.flow()?;
    Ok(Json(flow.userinfo(session).await?))
}

fn render_index(principal: &Principal, csrf_token: &str) -> String {
    let roles = principal
        .roles
        .as_ref()
        .map(|roles| roles.iter().map(|r| escape_html(r)).collect::<Vec<_>>().join(", "))
        .unwrap_or_else(|| "none".to_string());

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Protected</title></head>
<body>
<h1>Hello, {name}</h1>
<p>Roles: {roles}</p>
<ul>
<li><a href="/protected/user">User page</a></li>
<li><a href="/protected/admin">Admin page</a></li>
<li><a href="/protected/userinfo">Userinfo</a></li>
</ul>
<form method="post" action="/logout">
<input type="hidden" name="{field}" value="{token}">
<button type="submit">Logout</button>
</form>
</body>
</html>
"#,
        name = escape_html(&principal.display_name),
        field = CSRF_FIELD,
        token = escape_html(csrf_token),
    )
}

fn render_role_page(principal: &Principal, role: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{role}</title></head>
<body>
<h1>Hello, {name}</h1>
<p>You hold the <code>{role}</code> role.</p>
<p><a href="/protected/">Back</a></p>
</body>
</html>
"#,
        name = escape_html(&principal.display_name),
    )
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
