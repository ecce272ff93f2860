// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated principal representation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Path into a claim document, e.g. `realm_access/roles` or `resource_access.app.roles`.
///
/// Segments are separated by `/` when the path contains one, otherwise by `.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPath {
    raw: String,
    segments: Vec<String>,
}

impl ClaimPath {
    pub fn parse(raw: &str) -> Option<Self> {
        let separator = if raw.contains('/') { '/' } else { '.' };
        let segments: Vec<String> = raw.split(separator).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl std::fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Claims of a token as an untyped JSON object.
///
/// Lookups return `None` for absent or non-object intermediate values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    /// Build a claim set from a decoded JSON value; non-objects are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Numeric date claim (`exp`, `nbf`, `iat`) in seconds since the epoch.
    pub fn get_timestamp(&self, name: &str) -> Option<i64> {
        let value = self.0.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
    }

    pub fn lookup(&self, path: &ClaimPath) -> Option<&Value> {
        let mut segments = path.segments();
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Role names found at `path`.
    ///
    /// Accepts a JSON array of strings or a single space-separated string.
    /// Returns `None` when the claim is absent or of another type.
    pub fn roles_at(&self, path: &ClaimPath) -> Option<BTreeSet<String>> {
        match self.lookup(path)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(joined) => Some(joined.split_whitespace().map(str::to_string).collect()),
            _ => None,
        }
    }
}

/// Kind of credential a principal was authenticated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// `Authorization: Bearer` header
    Bearer,
    /// Server-side session cookie
    Session,
}

/// Authenticated caller, produced only by successful token verification.
///
/// This is the primary type handlers receive to represent the caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Principal {
    /// `sub` claim
    pub subject: String,

    /// `preferred_username`, then `name`, then `sub`
    pub display_name: String,

    /// Roles found at the configured claim path; `None` when the claim is absent
    #[schema(value_type = Option<Vec<String>>)]
    pub roles: Option<BTreeSet<String>>,

    /// Verified claims (not serialized)
    #[serde(skip)]
    pub claims: ClaimSet,

    pub credential: CredentialKind,
}

impl Principal {
    /// Build a principal from verified claims.
    ///
    /// Returns `None` when the token has no `sub`.
    pub fn from_claims(
        claims: ClaimSet,
        role_claim_path: &ClaimPath,
        credential: CredentialKind,
    ) -> Option<Self> {
        let subject = claims.get_str("sub")?.to_string();
        let display_name = claims
            .get_str("preferred_username")
            .or_else(|| claims.get_str("name"))
            .unwrap_or(&subject)
            .to_string();
        let roles = claims.roles_at(role_claim_path);

        Some(Self {
            subject,
            display_name,
            roles,
            claims,
            credential,
        })
    }

    /// Exact, case-sensitive role membership.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.as_ref().is_some_and(|roles| roles.contains(role))
    }

    /// Same principal re-tagged as coming from a browser session.
    pub fn with_credential(mut self, credential: CredentialKind) -> Self {
        self.credential = credential;
        self
    }
}
