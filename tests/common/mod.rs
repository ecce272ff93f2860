// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures: a mock identity provider and a bootstrapped gateway.

#![allow(dead_code)]

use std::collections::HashMap;

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use oidc_gateway::bootstrap::{bootstrap, Gateway};
use oidc_gateway::config::GatewayConfig;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "gateway";
pub const CLIENT_SECRET: &str = "s3cret";
pub const REALM_PATH: &str = "/realms/demo";

pub const SIGNING_KEY_PEM: &[u8] = include_bytes!("../fixtures/signing_key.pem");
pub const ROTATED_KEY_PEM: &[u8] = include_bytes!("../fixtures/rotated_key.pem");
pub const SIGNING_JWK_N: &str = "yRE6rHuNR0QbHO3H3Kt2pOKGVhQqGZXInOduQNxXzuKlvQTLUTv4l4sggh5_CYYi_cvI-SXVT9kPWSKXxJXBXd_4LkvcPuUakBoAkfh-eiFVMh2VrUyWyj3MFl0HTVF9KwRXLAcwkREiS3npThHRyIxuy0ZMeZfxVL5arMhw1SRELB8HoGfG_AtH89BIE9jDBHZ9dLelK9a184zAf8LwoPLxvJb3Il5nncqPcSfKDDodMFBIMc4lQzDKL5gvmiXLXB1AGLm8KBjfE8s3L5xqi-yUod-j8MtvIj812dkS4QMiRVN_by2h3ZY8LYVGrqZXZTcgn2ujn8uKjXLZVD5TdQ";
pub const ROTATED_JWK_N: &str = "ujhT2EIqpUnFS6Kb2sL5Xo5cLkjkefWSvw63ugz2U2RxgnNKrEopgpP2l-uMAZ9UsIW3zGHECj1DzgFnPm0G8sUhkb0YOlPv8EY3d5TwXsB3E9yO1HRnmLmZN7tBN2MWcOUYR-gX1rhS6WMP2GbssOB3P5jjEWA3uTP8YcvLjgR3GbKl3n83NPePXA8rsqy0qJQXjf-tnoZmOMSCQWteDqSqdr2MUPofEzWTKS5C0AH6vg4JlVOUm91o_6oohIHlJjTwgYjBysV3IL0PEV4PCmUgU2l5OkQ4hGRqYwGVih7iJ60Q78mPvtPFRVjiox81COg3P_MiHRBwSEB3IOc2gQ";

/// A wiremock server standing in for a Keycloak-style realm.
pub struct Idp {
    pub server: MockServer,
    pub issuer: String,
}

impl Idp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = format!("{}{REALM_PATH}", server.uri());
        Self { server, issuer }
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/protocol/openid-connect/{name}", self.issuer)
    }

    pub fn endpoint_path(&self, name: &str) -> String {
        format!("{REALM_PATH}/protocol/openid-connect/{name}")
    }

    /// Serve the discovery document, with or without a revocation endpoint.
    pub async fn mount_discovery(&self, revocation: bool) {
        let mut document = json!({
            "issuer": self.issuer,
            "authorization_endpoint": self.endpoint("auth"),
            "token_endpoint": self.endpoint("token"),
            "userinfo_endpoint": self.endpoint("userinfo"),
            "jwks_uri": self.endpoint("certs"),
            "end_session_endpoint": self.endpoint("logout"),
        });
        if revocation {
            document["revocation_endpoint"] = json!(self.endpoint("revoke"));
        }
        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/.well-known/openid-configuration")))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` at the certs endpoint, expecting `calls` fetches when given.
    pub async fn mount_certs(&self, keys: Value, calls: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(self.endpoint_path("certs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys));
        match calls {
            Some(n) => mock.expect(n).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }

    /// Answer one token request of `grant` with `body`.
    pub async fn mount_token_once(&self, grant: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(self.endpoint_path("token")))
            .and(body_string_contains(format!("grant_type={grant}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    pub fn claims(&self, sub: &str, roles: &[&str]) -> Value {
        json!({
            "sub": sub,
            "iss": self.issuer,
            "iat": now(),
            "exp": now() + 300,
            "preferred_username": sub,
            "realm_access": { "roles": roles },
        })
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": n, "e": "AQAB"})
}

pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

pub fn mint_with(pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

pub fn mint(kid: &str, claims: &Value) -> String {
    mint_with(SIGNING_KEY_PEM, kid, claims)
}

pub fn config(idp: &Idp, sessions: bool) -> GatewayConfig {
    let mut vars = HashMap::from([
        ("HOST", "127.0.0.1".to_string()),
        ("PORT", "0".to_string()),
        ("GATEWAY_ISSUER_URL", idp.issuer.clone()),
        ("GATEWAY_PUBLIC_URL", "http://gateway.test".to_string()),
    ]);
    if sessions {
        vars.insert("GATEWAY_CLIENT_ID", CLIENT_ID.to_string());
        vars.insert("GATEWAY_CLIENT_SECRET", CLIENT_SECRET.to_string());
    }
    GatewayConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

pub async fn gateway(idp: &Idp, sessions: bool) -> Gateway {
    bootstrap(config(idp, sessions)).await.unwrap()
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().uri(uri)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response) -> String {
    response.headers()[LOCATION].to_str().unwrap().to_string()
}

/// Value of cookie `name` from the response's `Set-Cookie` headers.
pub fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn with_session(builder: axum::http::request::Builder, session: &str) -> axum::http::request::Builder {
    builder.header(COOKIE, format!("gw_session={session}"))
}

/// A login started at `/protected/` and parked at the provider.
pub struct PendingLogin {
    pub cookie: String,
    pub state: String,
    pub nonce: String,
}

/// Request a protected page without a session and follow nothing.
pub async fn begin_login(app: &Router) -> PendingLogin {
    let response = send(app, get("/protected/").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let cookie = set_cookie(&response, "gw_session").unwrap();

    let authorize = Url::parse(&location(&response)).unwrap();
    let query: HashMap<_, _> = authorize.query_pairs().into_owned().collect();
    PendingLogin {
        cookie,
        state: query["state"].clone(),
        nonce: query["nonce"].clone(),
    }
}

/// Answer the code exchange with `id_claims` as the ID token and hit the callback.
pub async fn complete_login(
    app: &Router,
    idp: &Idp,
    pending: &PendingLogin,
    id_claims: Value,
    roles: &[&str],
    expires_in: u64,
) -> Response {
    idp.mount_token_once(
        "authorization_code",
        json!({
            "access_token": mint("k1", &idp.claims("alice", roles)),
            "token_type": "Bearer",
            "expires_in": expires_in,
            "refresh_token": "rt-1",
            "id_token": mint("k1", &id_claims),
        }),
    )
    .await;

    let callback = format!("/callback?code=abc&state={}", pending.state);
    send(
        app,
        with_session(get(&callback), &pending.cookie).body(Body::empty()).unwrap(),
    )
    .await
}

/// ID token claims for `alice` as issued to this gateway.
pub fn id_claims(idp: &Idp, pending: &PendingLogin, roles: &[&str]) -> Value {
    let mut claims = idp.claims("alice", roles);
    claims["aud"] = json!(CLIENT_ID);
    claims["nonce"] = json!(pending.nonce);
    claims
}

/// Drive a browser login and return the authenticated session cookie.
pub async fn login(app: &Router, idp: &Idp, roles: &[&str], expires_in: u64) -> String {
    let pending = begin_login(app).await;
    let claims = id_claims(idp, &pending, roles);
    let response = complete_login(app, idp, &pending, claims, roles, expires_in).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/protected/");

    let session = set_cookie(&response, "gw_session").unwrap();
    assert_ne!(session, pending.cookie);
    session
}

/// Extract the anti-forgery token from the `/protected/` page.
pub fn csrf_token(page: &str) -> String {
    let marker = r#"name="X-XSRF-TOKEN" value=""#;
    let start = page.find(marker).unwrap() + marker.len();
    let end = page[start..].find('"').unwrap();
    page[start..start + end].to_string()
}
