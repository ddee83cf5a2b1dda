// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway's control API and reverse proxy.
//!
//! Uses `axum_test::TestServer` — no real TCP needed. A fake [`Backend`]
//! stands in for the container orchestrator so these tests never touch a
//! real Docker/Podman socket or cluster.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use webconsole_mux::config::GatewayConfig;
use webconsole_mux::provisioner::{Backend, BackendError};
use webconsole_mux::registry::{Registry, SessionStatus};
use webconsole_mux::state::GatewayState;
use webconsole_mux::transport::build_router;

/// Backend stub: every `create_and_start` call succeeds immediately
/// without touching any real orchestrator.
struct FakeBackend;

#[async_trait]
impl Backend for FakeBackend {
    async fn create_and_start(&self, _session_id: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        api_url: "https://localhost:8443".into(),
        redis_host: "unused".into(),
        redis_port: 6379,
        session_instance_domain: String::new(),
        fake_authentication: String::new(),
        header_fix_enabled: true,
        dns_retries: 30,
    }
}

fn test_state() -> Arc<GatewayState> {
    let registry = Registry::spawn(None);
    Arc::new(GatewayState::new(registry, test_config(), Arc::new(FakeBackend)))
}

fn test_server(state: Arc<GatewayState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

fn identity_header(ty: &str, user_or_system_block: &str) -> String {
    let json = format!(r#"{{"identity":{{"type":"{ty}","org_id":"42",{user_or_system_block}}}}}"#);
    BASE64.encode(json.as_bytes())
}

fn user_identity() -> String {
    identity_header("User", r#""user":{"user_id":"7"}"#)
}

fn system_identity() -> String {
    identity_header("System", r#""system":{"cn":"c1ad0ff6-e1f0-4ad9-bc6f-82e7ee383ee4"}"#)
}

#[tokio::test]
async fn ping_requires_no_identity() {
    let server = test_server(test_state());
    let resp = server.get("/api/webconsole/v1/ping").await;
    resp.assert_status_ok();
    resp.assert_text("pong");
}

#[tokio::test]
async fn create_then_status() {
    let server = test_server(test_state());

    let resp = server
        .post("/api/webconsole/v1/sessions/new")
        .add_header("x-rh-identity", user_identity())
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let id = body["id"].as_str().expect("response has an id field").to_owned();
    assert!(!id.is_empty());

    let resp = server
        .get(&format!("/api/webconsole/v1/sessions/{id}/status"))
        .add_header("x-rh-identity", user_identity())
        .await;
    resp.assert_status_ok();
    resp.assert_text("wait_target");
}

#[tokio::test]
async fn missing_identity_header_is_unauthorized() {
    let server = test_server(test_state());
    let resp = server.post("/api/webconsole/v1/sessions/new").await;
    resp.assert_status_unauthorized();
}

#[tokio::test]
async fn system_identity_cannot_create_sessions() {
    let server = test_server(test_state());
    let resp = server
        .post("/api/webconsole/v1/sessions/new")
        .add_header("x-rh-identity", system_identity())
        .await;
    resp.assert_status_unauthorized();
}

#[tokio::test]
async fn system_identity_can_read_status() {
    let state = test_state();
    let address = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
    state.registry.insert("known-session", address).await.expect("insert should succeed");

    let server = test_server(state);
    let resp = server
        .get("/api/webconsole/v1/sessions/known-session/status")
        .add_header("x-rh-identity", system_identity())
        .await;
    resp.assert_status_ok();
    resp.assert_text("wait_target");
}

#[tokio::test]
async fn unknown_session_status_is_404() {
    let server = test_server(test_state());
    let resp = server
        .get("/api/webconsole/v1/sessions/00000000-0000-0000-0000-000000000000/status")
        .add_header("x-rh-identity", user_identity())
        .await;
    resp.assert_status_not_found();
}

#[tokio::test]
async fn wait_running_resolves_once_transitioned() {
    let state = test_state();
    let address = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6));
    state.registry.insert("racey-session", address).await.expect("insert should succeed");

    let registry = state.registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        registry.transition("racey-session", SessionStatus::Running).await;
    });

    let server = test_server(state);
    let resp = server
        .get("/api/webconsole/v1/sessions/racey-session/wait-running")
        .add_header("x-rh-identity", user_identity())
        .await;
    resp.assert_status_ok();
}

#[tokio::test]
async fn wait_running_unknown_session_is_404() {
    let server = test_server(test_state());
    let resp = server
        .get("/api/webconsole/v1/sessions/nope/wait-running")
        .add_header("x-rh-identity", user_identity())
        .await;
    resp.assert_status_not_found();
}
