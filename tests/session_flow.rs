// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Browser login, refresh and logout through the full router.

mod common;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
};
use common::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

fn logout_request(session: &str, token: Option<&str>) -> Request<Body> {
    let body = match token {
        Some(token) => format!("X-XSRF-TOKEN={token}"),
        None => String::new(),
    };
    with_session(Request::builder().method("POST").uri("/logout"), session)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn login_rotates_session_and_enforces_roles() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    let gateway = gateway(&idp, true).await;
    let app = gateway.router;

    let session = login(&app, &idp, &["user"], 300).await;

    let page = send(&app, with_session(get("/protected/"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(set_cookie(&page, "X-XSRF-TOKEN").is_some());
    let html = body_string(page).await;
    assert!(html.contains("Hello, alice"));
    assert!(!csrf_token(&html).is_empty());

    let user = send(&app, with_session(get("/protected/user"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(user.status(), StatusCode::OK);

    let admin = send(&app, with_session(get("/protected/admin"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(admin.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unauthenticated_request_remembers_requested_path() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    let app = gateway(&idp, true).await.router;

    let response = send(&app, get("/protected/user").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with(&idp.endpoint("auth")));
    assert!(target.contains("response_type=code"));
    assert!(target.contains("redirect_uri=http%3A%2F%2Fgateway.test%2Fcallback"));
}

#[tokio::test]
async fn state_mismatch_makes_no_token_call() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    Mock::given(method("POST"))
        .and(path(idp.endpoint_path("token")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&idp.server)
        .await;
    let app = gateway(&idp, true).await.router;

    let response = send(&app, get("/protected/").body(Body::empty()).unwrap()).await;
    let pending = set_cookie(&response, "gw_session").unwrap();

    let forged = send(
        &app,
        with_session(get("/callback?code=abc&state=forged"), &pending)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(forged.status(), StatusCode::FOUND);
    assert_eq!(location(&forged), "/login-error?reason=state_mismatch");

    let no_cookie = send(&app, get("/callback?code=abc&state=forged").body(Body::empty()).unwrap()).await;
    assert_eq!(location(&no_cookie), "/login-error?reason=state_mismatch");
}

#[tokio::test]
async fn id_token_for_another_audience_is_refused() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    let app = gateway(&idp, true).await.router;

    for aud in [None, Some(json!("another-client")), Some(json!(["account"]))] {
        let pending = begin_login(&app).await;
        let mut claims = id_claims(&idp, &pending, &["user"]);
        match aud {
            Some(aud) => claims["aud"] = aud,
            None => {
                claims.as_object_mut().unwrap().remove("aud");
            }
        }

        let response = complete_login(&app, &idp, &pending, claims, &["user"], 300).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login-error?reason=exchange_failed");
        assert!(set_cookie(&response, "gw_session").is_none());

        // The pre-login session never became authenticated.
        let page = send(&app, with_session(get("/protected/user"), &pending.cookie).body(Body::empty()).unwrap()).await;
        assert_eq!(page.status(), StatusCode::FOUND);
        assert!(location(&page).starts_with(&idp.endpoint("auth")));
    }
}

#[tokio::test]
async fn logout_without_csrf_keeps_session() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    Mock::given(method("POST"))
        .and(path(idp.endpoint_path("revoke")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&idp.server)
        .await;
    let app = gateway(&idp, true).await.router;
    let session = login(&app, &idp, &["user"], 300).await;

    let missing = send(&app, logout_request(&session, None)).await;
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);
    let forged = send(&app, logout_request(&session, Some("1700000000.abc.def"))).await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);

    let still_there = send(&app, with_session(get("/protected/user"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(still_there.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_with_csrf_revokes_and_ends_session() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    Mock::given(method("POST"))
        .and(path(idp.endpoint_path("revoke")))
        .and(body_string_contains("token=rt-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&idp.server)
        .await;
    let app = gateway(&idp, true).await.router;
    let session = login(&app, &idp, &["user"], 300).await;

    let page = send(&app, with_session(get("/protected/"), &session).body(Body::empty()).unwrap()).await;
    let token = csrf_token(&body_string(page).await);

    let response = send(&app, logout_request(&session, Some(&token))).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/?logout=true");

    let after = send(&app, with_session(get("/protected/user"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(after.status(), StatusCode::FOUND);
    assert!(location(&after).starts_with(&idp.endpoint("auth")));
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    let app = gateway(&idp, true).await.router;

    // Inside the refresh window from the start.
    let session = login(&app, &idp, &["user"], 5).await;

    Mock::given(method("POST"))
        .and(path(idp.endpoint_path("token")))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": mint("k1", &idp.claims("alice", &["user"])),
            "expires_in": 300,
            "refresh_token": "rt-2",
        })))
        .expect(1)
        .mount(&idp.server)
        .await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            send(&app, with_session(get("/protected/user"), &session).body(Body::empty()).unwrap())
                .await
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
}

#[tokio::test]
async fn rejected_refresh_forces_new_login() {
    let idp = Idp::start().await;
    idp.mount_discovery(true).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    let app = gateway(&idp, true).await.router;
    let session = login(&app, &idp, &["user"], 5).await;

    Mock::given(method("POST"))
        .and(path(idp.endpoint_path("token")))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&idp.server)
        .await;

    let response = send(&app, with_session(get("/protected/user"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with(&idp.endpoint("auth")));
    assert_ne!(set_cookie(&response, "gw_session").unwrap(), session);
}

#[tokio::test]
async fn userinfo_is_called_with_session_access_token() {
    let idp = Idp::start().await;
    idp.mount_discovery(false).await;
    idp.mount_certs(jwks(&[rsa_jwk("k1", SIGNING_JWK_N)]), None).await;
    Mock::given(method("GET"))
        .and(path(idp.endpoint_path("userinfo")))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "alice", "email": "alice@example.com"})))
        .expect(1)
        .mount(&idp.server)
        .await;
    let app = gateway(&idp, true).await.router;
    let session = login(&app, &idp, &["user"], 300).await;

    let response = send(&app, with_session(get("/protected/userinfo"), &session).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["email"], "alice@example.com");
}
