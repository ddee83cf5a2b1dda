// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP reverse proxy into a session container's console-HTTP port
//! (spec.md §4.5).
//!
//! Extends the teacher's `upstream/client.rs` single-shot JSON pattern to
//! streaming bytes: the session console serves arbitrary HTML/asset bytes,
//! not JSON RPC, so the body is piped through rather than buffered.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::config::CONSOLE_HTTP_PORT;
use crate::error::not_found_text;
use crate::placeholders::{CLOSED_HTML, WAITING_HTML};
use crate::registry::SessionStatus;
use crate::state::GatewayState;

/// `GET|HEAD /wss/<browser-prefix>/sessions/{id}/web/{*rest}`
pub async fn proxy(
    State(state): State<Arc<GatewayState>>,
    Path((id, rest)): Path<(String, String)>,
    method: Method,
    req: axum::http::Request<Body>,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(session) = state.registry.get(&id).await else {
        return not_found_text("unknown session");
    };

    match session.status {
        SessionStatus::Closed => return Html(CLOSED_HTML).into_response(),
        SessionStatus::WaitTarget => return Html(WAITING_HTML).into_response(),
        SessionStatus::Running => {}
    }

    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let upstream_url = format!("http://{}:{CONSOLE_HTTP_PORT}/{rest}{query}", session.address);

    let client = reqwest::Client::new();
    let mut builder = client.request(reqwest::Method::from(method), &upstream_url);
    for (name, value) in req.headers() {
        if name == axum::http::header::HOST {
            continue;
        }
        builder = builder.header(name, value);
    }

    let upstream_response = match builder.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(session_id = %id, err = %e, "upstream console request failed");
            state.registry.transition(&id, SessionStatus::Closed).await;
            return Html(CLOSED_HTML).into_response();
        }
    };

    let status = upstream_response.status();
    let mut response = Response::builder().status(status.as_u16());
    for (name, value) in upstream_response.headers() {
        response = response.header(name, value);
    }
    let body = Body::from_stream(upstream_response.bytes_stream());
    response
        .body(body)
        .unwrap_or_else(|_| (StatusCode::BAD_GATEWAY, "upstream response had an invalid header").into_response())
}
