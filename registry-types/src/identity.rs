//! `UserContext` (spec §4.C9) and the narrow seam that decodes it from an
//! inbound request. The identity provider itself is an external
//! collaborator (spec §1/§6.4); the core only consumes what it issues.

use crate::error::GatewayError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The closed permission vocabulary of spec §4.C9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    PublishAgent,
    ToggleService,
    ModifyService,
    Rate,
    View,
    Admin,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::PublishAgent => "publish_agent",
            Permission::ToggleService => "toggle_service",
            Permission::ModifyService => "modify_service",
            Permission::Rate => "rate",
            Permission::View => "view",
            Permission::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    pub username: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub is_admin: bool,
    /// permission -> entity names (or the sentinel `"all"`) the user may act on.
    #[serde(default)]
    pub ui_permissions: BTreeMap<String, Vec<String>>,
    /// Agent paths this user may reach, or the sentinel `"all"`.
    #[serde(default)]
    pub accessible_agents: Vec<String>,
}

impl UserContext {
    /// `is_admin` or owns every entity (used by §4.C9 rule 1).
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Whether this user may act on `entity_name` under `permission`.
    pub fn allows(&self, permission: Permission, entity_name: &str) -> bool {
        if self.is_admin {
            return true;
        }
        self.ui_permissions
            .get(permission.as_str())
            .map(|names| names.iter().any(|n| n == "all" || n == entity_name))
            .unwrap_or(false)
    }

    /// §4.C9 rule 2: agent visibility gate via `accessible_agents`.
    pub fn can_reach_agent(&self, path: &str) -> bool {
        self.is_admin
            || self.accessible_agents.iter().any(|p| p == "all" || p == path)
    }
}

/// Decodes a `UserContext` from request headers. The production
/// implementation decodes the unverified JSON claims segment of a bearer
/// JWT issued by the external identity provider — signature verification
/// happens upstream, at the identity provider / reverse proxy boundary
/// (spec §1 explicitly scopes that out of the core).
pub trait IdentityExtractor: Send + Sync {
    fn decode(&self, authorization_header: Option<&str>) -> Result<UserContext, GatewayError>;
}

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    #[serde(default)]
    username: String,
    #[serde(default)]
    groups: BTreeSet<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    ui_permissions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    accessible_agents: Vec<String>,
}

/// Default [`IdentityExtractor`]: decodes the base64url JSON payload segment
/// of a `Bearer` JWT (no signature check — see trait docs).
#[derive(Debug, Default, Clone, Copy)]
pub struct BearerClaimsExtractor;

impl IdentityExtractor for BearerClaimsExtractor {
    fn decode(&self, authorization_header: Option<&str>) -> Result<UserContext, GatewayError> {
        let header = authorization_header
            .ok_or_else(|| GatewayError::forbidden("missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| GatewayError::forbidden("Authorization header is not a bearer token"))?;

        let payload_segment = token
            .split('.')
            .nth(1)
            .ok_or_else(|| GatewayError::forbidden("malformed bearer token"))?;

        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload_segment)
            .map_err(|e| GatewayError::forbidden(format!("malformed bearer token: {e}")))?;

        let claims: Claims = serde_json::from_slice(&decoded)
            .map_err(|e| GatewayError::forbidden(format!("malformed token claims: {e}")))?;

        let is_admin = claims.scopes.iter().any(|s| s == "admin");

        Ok(UserContext {
            username: claims.username,
            groups: claims.groups,
            is_admin,
            ui_permissions: claims.ui_permissions,
            accessible_agents: claims.accessible_agents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(claims: serde_json::Value) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("Bearer {header}.{payload}.sig")
    }

    #[test]
    fn decodes_claims_from_bearer_token() {
        let token = make_token(serde_json::json!({
            "username": "alice",
            "groups": ["eng"],
            "scopes": ["admin"],
        }));
        let ctx = BearerClaimsExtractor.decode(Some(&token)).unwrap();
        assert_eq!(ctx.username, "alice");
        assert!(ctx.is_admin);
        assert!(ctx.groups.contains("eng"));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(BearerClaimsExtractor.decode(None).is_err());
    }

    #[test]
    fn allows_respects_all_sentinel() {
        let mut ctx = UserContext::default();
        ctx.ui_permissions
            .insert("toggle_service".to_string(), vec!["all".to_string()]);
        assert!(ctx.allows(Permission::ToggleService, "/anything"));
        assert!(!ctx.allows(Permission::Rate, "/anything"));
    }
}
