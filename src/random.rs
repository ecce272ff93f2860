// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unguessable values: session ids, OAuth2 `state` / `nonce`, CSRF material.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};

#[derive(Debug, thiserror::Error)]
#[error("system random generator failed")]
pub struct RandomError;

pub fn random_bytes<const N: usize>() -> Result<[u8; N], RandomError> {
    let mut buf = [0u8; N];
    SystemRandom::new().fill(&mut buf).map_err(|_| RandomError)?;
    Ok(buf)
}

/// `N` random bytes as unpadded base64url.
pub fn random_token<const N: usize>() -> Result<String, RandomError> {
    Ok(Base64UrlUnpadded::encode_string(&random_bytes::<N>()?))
}
