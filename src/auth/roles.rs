// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-based authorization.
//!
//! Roles are opaque strings taken from the configured claim path. Membership
//! is exact and case-sensitive; there is no role hierarchy.

use serde::Serialize;

use super::claims::{ClaimPath, Principal};
use super::error::AuthError;

/// Role required by `/api/user` and `/protected/user`.
pub const USER_ROLE: &str = "user";

/// Role required by `/api/admin` and `/protected/admin`.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The principal carries no role claim at the configured path
    ClaimMissing,
    /// The role claim does not contain the required role
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Deny(DenyReason),
}

/// Result of evaluating one role requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub outcome: Outcome,
    pub required_role: String,
    pub claim_path: String,
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    pub fn into_result(self) -> Result<(), AuthError> {
        match self.outcome {
            Outcome::Allow => Ok(()),
            Outcome::Deny(DenyReason::ClaimMissing) => Err(AuthError::ClaimMissing),
            Outcome::Deny(DenyReason::Forbidden) => Err(AuthError::Forbidden),
        }
    }
}

/// Evaluates role requirements against a principal.
#[derive(Debug, Clone)]
pub struct AuthorizationEvaluator {
    claim_path: ClaimPath,
}

impl AuthorizationEvaluator {
    pub fn new(claim_path: ClaimPath) -> Self {
        Self { claim_path }
    }

    pub fn authorize(&self, principal: &Principal, required_role: &str) -> AuthorizationDecision {
        let outcome = match &principal.roles {
            None => Outcome::Deny(DenyReason::ClaimMissing),
            Some(roles) if roles.contains(required_role) => Outcome::Allow,
            Some(_) => Outcome::Deny(DenyReason::Forbidden),
        };

        AuthorizationDecision {
            outcome,
            required_role: required_role.to_string(),
            claim_path: self.claim_path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{ClaimSet, CredentialKind};
    use serde_json::json;

    fn evaluator() -> AuthorizationEvaluator {
        AuthorizationEvaluator::new(ClaimPath::parse("realm_access/roles").unwrap())
    }

    fn principal(claims: serde_json::Value) -> Principal {
        Principal::from_claims(
            ClaimSet::from_value(claims).unwrap(),
            &ClaimPath::parse("realm_access/roles").unwrap(),
            CredentialKind::Bearer,
        )
        .unwrap()
    }

    #[test]
    fn user_role_allows_user_and_forbids_admin() {
        let p = principal(json!({"sub": "u1", "realm_access": {"roles": ["user"]}}));

        let decision = evaluator().authorize(&p, USER_ROLE);
        assert!(decision.is_allowed());
        assert_eq!(decision.claim_path, "realm_access/roles");

        let decision = evaluator().authorize(&p, ADMIN_ROLE);
        assert_eq!(decision.outcome, Outcome::Deny(DenyReason::Forbidden));
        assert_eq!(decision.into_result(), Err(AuthError::Forbidden));
    }

    #[test]
    fn absent_claim_is_claim_missing() {
        let p = principal(json!({"sub": "u1"}));
        let decision = evaluator().authorize(&p, USER_ROLE);
        assert_eq!(decision.outcome, Outcome::Deny(DenyReason::ClaimMissing));
        assert_eq!(decision.into_result(), Err(AuthError::ClaimMissing));
    }

    #[test]
    fn empty_role_list_is_forbidden() {
        let p = principal(json!({"sub": "u1", "realm_access": {"roles": []}}));
        assert_eq!(
            evaluator().authorize(&p, USER_ROLE).outcome,
            Outcome::Deny(DenyReason::Forbidden)
        );
    }

    #[test]
    fn authorize_is_deterministic() {
        let p = principal(json!({"sub": "u1", "realm_access": {"roles": ["admin", "user"]}}));
        let first = evaluator().authorize(&p, ADMIN_ROLE);
        for _ in 0..10 {
            assert_eq!(evaluator().authorize(&p, ADMIN_ROLE), first);
        }
    }

    #[test]
    fn membership_is_case_sensitive() {
        let p = principal(json!({"sub": "u1", "realm_access": {"roles": ["Admin"]}}));
        assert!(!evaluator().authorize(&p, ADMIN_ROLE).is_allowed());
    }
}
