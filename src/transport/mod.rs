// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport: router assembly, identity middleware, and the
//! three route surfaces (control API, HTTP proxy, WebSocket proxy).

pub mod control;
pub mod header_fix;
pub mod proxy_http;
pub mod proxy_ws;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{BROWSER_WS_PREFIX, CONTROL_API_PREFIX, HOST_WS_PREFIX};
use crate::identity;
use crate::state::GatewayState;

/// Build the axum `Router` with every route surface wired, mirroring the
/// teacher's `transport/mod.rs::build_router` layering (routes, then auth
/// middleware, then CORS).
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let header_fix_enabled = state.config.header_fix_enabled;

    let mut router = Router::new()
        .route(&format!("{CONTROL_API_PREFIX}/ping"), get(control::ping))
        .route(&format!("{CONTROL_API_PREFIX}/sessions/new"), post(control::new_session))
        .route(&format!("{CONTROL_API_PREFIX}/sessions/{{id}}/status"), get(control::session_status))
        .route(
            &format!("{CONTROL_API_PREFIX}/sessions/{{id}}/wait-running"),
            get(control::wait_running),
        )
        .route(&format!("{BROWSER_WS_PREFIX}/sessions/{{id}}/web/{{*rest}}"), get(browser_route))
        .route(&format!("{HOST_WS_PREFIX}/sessions/{{id}}/ws"), get(proxy_ws::host_bridge))
        .layer(middleware::from_fn_with_state(state.clone(), identity_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    if header_fix_enabled {
        router = router.layer(middleware::from_fn(header_fix::fix_connection_header));
    }

    router
}

/// The browser console route serves both plain HTTP and WebSocket-upgrade
/// requests on the same path (spec.md §4.5, §4.6): dispatch on the
/// `Upgrade` header.
async fn browser_route(
    state: axum::extract::State<Arc<GatewayState>>,
    path: axum::extract::Path<(String, String)>,
    headers: axum::http::HeaderMap,
    ws: Option<axum::extract::WebSocketUpgrade>,
    req: Request<Body>,
) -> Response {
    use axum::response::IntoResponse;

    let wants_upgrade = headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if wants_upgrade {
        if let Some(ws) = ws {
            return proxy_ws::browser_console(state, path, headers, ws).await;
        }
    }

    proxy_http::proxy(state, path, req.method().clone(), req).await
}

/// Resolve the caller's [`identity::Principal`] once per request and stash
/// it in request extensions, same mechanism as the teacher's
/// `transport/auth.rs::auth_layer`, generalized from bearer-token checking
/// to identity-header decoding plus the test-only bypass.
async fn identity_layer(
    axum::extract::State(state): axum::extract::State<Arc<GatewayState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match identity::resolve_principal(req.headers(), state.config.fake_auth_enabled()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => e.to_response("invalid identity header"),
    }
}
