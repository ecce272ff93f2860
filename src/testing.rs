// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token and key fixtures shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::claims::ClaimPath;
use crate::auth::jwks::{KeySetFetcher, SigningKeySet};
use crate::auth::validator::IssuerPolicy;
use crate::config::{GatewayConfig, ISSUER_URL_ENV};
use crate::session::InMemorySessionStore;
use crate::state::AppState;

pub const ISSUER: &str = "https://idp.example.com/realms/demo";

pub const SIGNING_KEY_PEM: &[u8] = include_bytes!("../tests/fixtures/signing_key.pem");
pub const ROTATED_KEY_PEM: &[u8] = include_bytes!("../tests/fixtures/rotated_key.pem");

pub const SIGNING_JWK_N: &str = "yRE6rHuNR0QbHO3H3Kt2pOKGVhQqGZXInOduQNxXzuKlvQTLUTv4l4sggh5_CYYi_cvI-SXVT9kPWSKXxJXBXd_4LkvcPuUakBoAkfh-eiFVMh2VrUyWyj3MFl0HTVF9KwRXLAcwkREiS3npThHRyIxuy0ZMeZfxVL5arMhw1SRELB8HoGfG_AtH89BIE9jDBHZ9dLelK9a184zAf8LwoPLxvJb3Il5nncqPcSfKDDodMFBIMc4lQzDKL5gvmiXLXB1AGLm8KBjfE8s3L5xqi-yUod-j8MtvIj812dkS4QMiRVN_by2h3ZY8LYVGrqZXZTcgn2ujn8uKjXLZVD5TdQ";
pub const ROTATED_JWK_N: &str = "ujhT2EIqpUnFS6Kb2sL5Xo5cLkjkefWSvw63ugz2U2RxgnNKrEopgpP2l-uMAZ9UsIW3zGHECj1DzgFnPm0G8sUhkb0YOlPv8EY3d5TwXsB3E9yO1HRnmLmZN7tBN2MWcOUYR-gX1rhS6WMP2GbssOB3P5jjEWA3uTP8YcvLjgR3GbKl3n83NPePXA8rsqy0qJQXjf-tnoZmOMSCQWteDqSqdr2MUPofEzWTKS5C0AH6vg4JlVOUm91o_6oohIHlJjTwgYjBysV3IL0PEV4PCmUgU2l5OkQ4hGRqYwGVih7iJ60Q78mPvtPFRVjiox81COg3P_MiHRBwSEB3IOc2gQ";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": n, "e": "AQAB"})
}

pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

pub fn keyset(kid: &str) -> SigningKeySet {
    SigningKeySet::from_jwks(&jwks(&[rsa_jwk(kid, SIGNING_JWK_N)])).unwrap()
}

pub fn policy() -> IssuerPolicy {
    IssuerPolicy {
        issuer: ISSUER.to_string(),
        audience: None,
        leeway: 30,
        role_claim_path: ClaimPath::parse("realm_access/roles").unwrap(),
        require_role_claim: false,
    }
}

/// Claims of a token valid for the next five minutes with the given roles.
pub fn user_claims(sub: &str, roles: &[&str]) -> Value {
    json!({
        "sub": sub,
        "iss": ISSUER,
        "iat": now(),
        "exp": now() + 300,
        "preferred_username": sub,
        "realm_access": { "roles": roles },
    })
}

pub fn mint_with(pem: &[u8], kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

pub fn mint(kid: &str, claims: &Value) -> String {
    mint_with(SIGNING_KEY_PEM, Some(kid), claims)
}

/// Bearer-only configuration for [`ISSUER`].
pub fn config() -> GatewayConfig {
    GatewayConfig::from_lookup(|name| (name == ISSUER_URL_ENV).then(|| ISSUER.to_string())).unwrap()
}

/// State with key `k1` published and an unreachable JWKS endpoint.
pub fn app_state() -> AppState {
    let keys = KeySetFetcher::with_initial(
        "http://127.0.0.1:9/certs",
        reqwest::Client::new(),
        Duration::from_secs(10),
        keyset("k1"),
    );
    AppState::new(config(), Arc::new(keys), Arc::new(InMemorySessionStore::new(16)))
}
