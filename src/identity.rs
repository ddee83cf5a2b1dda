// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decodes the `x-rh-identity` tenant-identity header into a typed [`Principal`].
//!
//! Wire shape is the one the upstream gateway actually emits — see
//! `identity.type`, `identity.org_id`, `identity.user.user_id`,
//! `identity.system.cn` — base64(JSON) in a single header.

use std::collections::HashSet;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::GatewayError;

pub const IDENTITY_HEADER: &str = "x-rh-identity";

/// A single scope a route may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Authenticated,
    User,
    System,
}

pub type ScopeSet = HashSet<ScopeKind>;

/// The authenticated caller, decoded from the identity header.
#[derive(Debug, Clone)]
pub enum Principal {
    Unauthenticated,
    User { user_id: String, org_id: String, extras: serde_json::Value },
    System { cn: String, org_id: String, extras: serde_json::Value },
}

impl Principal {
    pub fn scopes(&self) -> ScopeSet {
        match self {
            Self::Unauthenticated => ScopeSet::new(),
            Self::User { .. } => [ScopeKind::Authenticated, ScopeKind::User].into_iter().collect(),
            Self::System { .. } => [ScopeKind::Authenticated, ScopeKind::System].into_iter().collect(),
        }
    }
}

// -- Wire format --------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdentityDoc {
    identity: IdentityInner,
}

#[derive(Debug, Deserialize)]
struct IdentityInner {
    #[serde(rename = "type")]
    ty: String,
    org_id: String,
    #[serde(default)]
    user: Option<UserInner>,
    #[serde(default)]
    system: Option<SystemInner>,
    #[serde(flatten)]
    extras: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UserInner {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct SystemInner {
    cn: String,
}

/// Decode the `x-rh-identity` header. Absence yields `Unauthenticated`;
/// presence with malformed/incomplete content is an error (spec.md §4.1).
pub fn decode_identity(headers: &HeaderMap) -> Result<Principal, GatewayError> {
    let Some(raw) = headers.get(IDENTITY_HEADER) else {
        return Ok(Principal::Unauthenticated);
    };

    let raw = raw.to_str().map_err(|_| GatewayError::Unauthorized)?;
    let decoded = BASE64.decode(raw.as_bytes()).map_err(|_| GatewayError::Unauthorized)?;
    let doc: IdentityDoc =
        serde_json::from_slice(&decoded).map_err(|_| GatewayError::Unauthorized)?;

    match doc.identity.ty.as_str() {
        "User" => {
            let user = doc.identity.user.ok_or(GatewayError::Unauthorized)?;
            Ok(Principal::User {
                user_id: user.user_id,
                org_id: doc.identity.org_id,
                extras: doc.identity.extras,
            })
        }
        "System" => {
            let system = doc.identity.system.ok_or(GatewayError::Unauthorized)?;
            Ok(Principal::System {
                cn: system.cn,
                org_id: doc.identity.org_id,
                extras: doc.identity.extras,
            })
        }
        _ => Err(GatewayError::Unauthorized),
    }
}

/// Synthetic principal used when `FAKE_AUTHENTICATION=yes` and the public API
/// URL is local-loopback HTTPS. Never reachable otherwise — see
/// `crate::config::GatewayConfig::fake_auth_enabled`.
pub fn fake_principal() -> Principal {
    Principal::User {
        user_id: "0".to_owned(),
        org_id: "0".to_owned(),
        extras: serde_json::Value::Null,
    }
}

/// Resolve the effective principal for a request: the test-only bypass, if
/// enabled, otherwise the decoded identity header.
pub fn resolve_principal(
    headers: &HeaderMap,
    fake_auth_enabled: bool,
) -> Result<Principal, GatewayError> {
    if fake_auth_enabled {
        tracing::warn!("FAKE_AUTHENTICATION active — serving a synthetic user principal");
        return Ok(fake_principal());
    }
    decode_identity(headers)
}

/// Axum extractor that enforces a route's required scopes.
///
/// Usage: declare a newtype per route shape, e.g. `RequireUser`, or use
/// `Authenticated<const SCOPES: ...>`-style helpers via [`with_scopes`].
pub struct AuthenticatedPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Principal>() {
            Some(p) => Ok(Self(p.clone())),
            None => Err(GatewayError::Unauthorized.to_response("missing principal")),
        }
    }
}

/// Check that `have` satisfies every scope in `required`; used by route
/// handlers after pulling the principal out of request extensions.
pub fn require_scopes(have: &ScopeSet, required: &[ScopeKind]) -> Result<(), GatewayError> {
    if required.iter().all(|s| have.contains(s)) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn header_for(json: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = BASE64.encode(json.as_bytes());
        headers.insert(IDENTITY_HEADER, HeaderValue::from_str(&encoded).unwrap());
        headers
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let headers = HeaderMap::new();
        let principal = decode_identity(&headers).unwrap();
        assert!(matches!(principal, Principal::Unauthenticated));
        assert!(principal.scopes().is_empty());
    }

    #[test]
    fn user_identity_decodes_with_user_scope() {
        let headers = header_for(
            r#"{"identity":{"type":"User","org_id":"42","user":{"user_id":"7"}}}"#,
        );
        let principal = decode_identity(&headers).unwrap();
        match principal {
            Principal::User { user_id, org_id, .. } => {
                assert_eq!(user_id, "7");
                assert_eq!(org_id, "42");
            }
            _ => panic!("expected User principal"),
        }
        let scopes = principal.scopes();
        assert!(scopes.contains(&ScopeKind::Authenticated));
        assert!(scopes.contains(&ScopeKind::User));
        assert!(!scopes.contains(&ScopeKind::System));
    }

    #[test]
    fn system_identity_decodes_with_system_scope() {
        let headers = header_for(
            r#"{"identity":{"type":"System","org_id":"42","system":{"cn":"c1ad0ff6-e1f0-4ad9-bc6f-82e7ee383ee4"}}}"#,
        );
        let principal = decode_identity(&headers).unwrap();
        let scopes = principal.scopes();
        assert!(scopes.contains(&ScopeKind::System));
        assert!(!scopes.contains(&ScopeKind::User));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let headers = header_for(r#"{"identity":{"type":"Robot","org_id":"42"}}"#);
        assert!(decode_identity(&headers).is_err());
    }

    #[test]
    fn user_missing_user_block_is_rejected() {
        let headers = header_for(r#"{"identity":{"type":"User","org_id":"42"}}"#);
        assert!(decode_identity(&headers).is_err());
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("not-base64!!"));
        assert!(decode_identity(&headers).is_err());
    }

    #[test]
    fn require_scopes_rejects_missing_scope() {
        let have: ScopeSet = [ScopeKind::Authenticated, ScopeKind::System].into_iter().collect();
        assert!(require_scopes(&have, &[ScopeKind::Authenticated]).is_ok());
        assert!(require_scopes(&have, &[ScopeKind::User]).is_err());
    }
}
