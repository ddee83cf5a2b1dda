// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control API handlers: ping, session creation, status, wait-running
//! (spec.md §4.4).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{backend_verbatim, GatewayError};
use crate::identity::{require_scopes, AuthenticatedPrincipal, ScopeKind};
use crate::provisioner::{self, ProvisionError};
use crate::state::GatewayState;

#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub id: String,
}

/// `GET .../ping` — no auth required.
pub async fn ping() -> &'static str {
    "pong"
}

/// `POST .../sessions/new` — requires `authenticated, user`.
pub async fn new_session(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> Response {
    if let Err(e) = require_scopes(&principal.scopes(), &[ScopeKind::Authenticated, ScopeKind::User]) {
        return e.to_response("sessions/new requires a user identity");
    }

    match provisioner::provision_session(state.backend.as_ref(), &state.registry, &state.config).await
    {
        Ok(id) => Json(NewSessionResponse { id }).into_response(),
        // Backend failures forward the orchestrator's own status + body
        // byte-for-byte (spec.md §4.3); only the provisioner's own failure
        // modes (DNS timeout, registry insert) use the JSON error envelope.
        Err(ProvisionError::Backend(e)) => backend_verbatim(e.status, e.body),
        Err(ProvisionError::DnsTimeout) => {
            GatewayError::Internal.to_response("session container did not resolve in time")
        }
        Err(ProvisionError::RegistryInsert) => {
            GatewayError::Internal.to_response("failed to register session")
        }
    }
}

/// `GET .../sessions/{id}/status` — requires `authenticated`.
pub async fn session_status(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = require_scopes(&principal.scopes(), &[ScopeKind::Authenticated]) {
        return e.to_response("status requires an authenticated identity");
    }

    match state.registry.get(&id).await {
        Some(session) => session.status.as_str().into_response(),
        None => GatewayError::NotFound.to_response("unknown session"),
    }
}

/// `GET .../sessions/{id}/wait-running` — requires `authenticated`; blocks
/// until the session reaches `running`, or 404 if unknown.
pub async fn wait_running(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = require_scopes(&principal.scopes(), &[ScopeKind::Authenticated]) {
        return e.to_response("wait-running requires an authenticated identity");
    }

    let waiter = match state.registry.wait_running(&id).await {
        Ok(w) => w,
        Err(_) => return GatewayError::NotFound.to_response("unknown session"),
    };

    match waiter.wait().await {
        Ok(()) => "running".into_response(),
        Err(_) => GatewayError::Internal.to_response("wait-running failed"),
    }
}
