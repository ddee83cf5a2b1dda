// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket reverse proxy: one-to-one bidirectional bridge between a
//! downstream (browser or host-agent) connection and the session
//! container's WebSocket port (spec.md §4.6, §5, §9).
//!
//! Grounded in two teacher files read together: `transport/ws.rs` for the
//! downstream upgrade/lookup shape, and `upstream/bridge.rs` for the
//! upstream `tokio_tungstenite::connect_async` half. Unlike the teacher's
//! one-upstream-to-many-downstream fan-out, spec.md wants a strict
//! one-to-one bridge, so this is a single `run_bridge` function spawning
//! exactly two forwarding tasks joined on a shared cancellation scope.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::header::{HeaderValue, ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_util::sync::CancellationToken;

use crate::config::{BRIDGE_PORT, CONSOLE_HTTP_PORT};
use crate::registry::SessionStatus;
use crate::state::GatewayState;

const UNKNOWN_SESSION_CLOSE: u16 = 404;

/// `GET /wss/<host-prefix>/sessions/{id}/ws` — host-side bridge. First open
/// transitions `wait_target -> running`; close transitions to `closed`.
pub async fn host_bridge(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, id, BRIDGE_PORT, "ws".to_owned(), headers, ws, true).await
}

/// `GET /wss/<browser-prefix>/sessions/{id}/web/{*rest}` (WebSocket
/// upgrade) — browser-side console. Only transitions to `closed` on close.
pub async fn browser_console(
    State(state): State<Arc<GatewayState>>,
    Path((id, rest)): Path<(String, String)>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, id, CONSOLE_HTTP_PORT, rest, headers, ws, false).await
}

async fn upgrade(
    state: Arc<GatewayState>,
    id: String,
    upstream_port: u16,
    upstream_path: String,
    headers: HeaderMap,
    mut ws: WebSocketUpgrade,
    transition_on_open: bool,
) -> Response {
    let Some(session) = state.registry.get(&id).await else {
        return close_with_code(ws, UNKNOWN_SESSION_CLOSE, "unknown session");
    };

    let origin = headers.get(ORIGIN).cloned();

    // Accept whichever protocol the client offers; we're a transparent
    // bridge, the session container decides what it actually speaks.
    if let Some(requested) = headers.get(SEC_WEBSOCKET_PROTOCOL) {
        if let Ok(list) = requested.to_str() {
            let protocols: Vec<String> = list.split(',').map(|p| p.trim().to_owned()).collect();
            ws = ws.protocols(protocols);
        }
    }

    ws.on_upgrade(move |socket| {
        let selected_protocol = socket.protocol().cloned();
        run_bridge(
            socket,
            state,
            id,
            session.address,
            upstream_port,
            upstream_path,
            origin,
            selected_protocol,
            transition_on_open,
        )
    })
}

fn close_with_code(ws: WebSocketUpgrade, code: u16, reason: &'static str) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (mut sink, _) = socket.split();
        let _ = sink
            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
            .await;
    })
    .into_response()
}

/// Bridge a single downstream WebSocket to a single upstream WebSocket.
/// Spawns upstream<->downstream forwarding on one cancellation scope:
/// first side to end cancels the other (spec.md §5).
async fn run_bridge(
    downstream: WebSocket,
    state: Arc<GatewayState>,
    session_id: String,
    address: IpAddr,
    upstream_port: u16,
    upstream_path: String,
    origin: Option<HeaderValue>,
    selected_protocol: Option<HeaderValue>,
    transition_on_open: bool,
) {
    let upstream_url = format!("ws://{address}:{upstream_port}/{upstream_path}");

    let mut request = match upstream_url.as_str().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(session_id = %session_id, err = %e, "invalid upstream bridge url");
            state.registry.transition(&session_id, SessionStatus::Closed).await;
            return;
        }
    };
    if let Some(origin) = origin {
        request.headers_mut().insert(ORIGIN, origin);
    }
    if let Some(protocol) = selected_protocol {
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }

    let connect_result = tokio_tungstenite::connect_async(request).await;
    let Ok((upstream, _)) = connect_result else {
        tracing::warn!(session_id = %session_id, url = %upstream_url, "upstream bridge connect failed");
        state.registry.transition(&session_id, SessionStatus::Closed).await;
        return;
    };

    if transition_on_open {
        let registry = state.registry.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            registry.transition(&id, SessionStatus::Running).await;
        });
    }

    let (mut down_tx, mut down_rx) = downstream.split();
    let (mut up_tx, mut up_rx) = upstream.split();
    let cancel = CancellationToken::new();

    let upstream_to_downstream = {
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = up_rx.next() => {
                        match msg {
                            Some(Ok(TungsteniteMessage::Text(text))) => {
                                if down_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(TungsteniteMessage::Binary(data))) => {
                                if down_tx.send(Message::Binary(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(TungsteniteMessage::Close(frame))) => {
                                let local = frame.map(|f| CloseFrame { code: f.code.into(), reason: f.reason.to_string().into() });
                                let _ = down_tx.send(Message::Close(local)).await;
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break,
                        }
                    }
                }
            }
            cancel.cancel();
        }
    };

    let downstream_to_upstream = {
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = down_rx.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if up_tx.send(TungsteniteMessage::Text(text.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                if up_tx.send(TungsteniteMessage::Binary(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let code = frame.as_ref().map(|f| f.code).unwrap_or(1000);
                                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                                let _ = up_tx
                                    .send(TungsteniteMessage::Close(Some(TungsteniteCloseFrame {
                                        code: CloseCode::from(code),
                                        reason: reason.into(),
                                    })))
                                    .await;
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break,
                        }
                    }
                }
            }
            cancel.cancel();
        }
    };

    tokio::join!(upstream_to_downstream, downstream_to_upstream);
    state.registry.transition(&session_id, SessionStatus::Closed).await;
}
