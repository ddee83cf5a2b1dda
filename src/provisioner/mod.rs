// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session provisioner: talks to the configured backend to start a session
//! container, resolves its address, and registers it (spec.md §4.3, §4.9).

pub mod cluster;
pub mod local;

use std::net::IpAddr;
use std::path::Path;

use crate::config::GatewayConfig;
use crate::registry::Registry;

/// Path probed to decide whether the cluster backend is in play (spec.md
/// §4.8): a service-account directory is only mounted inside a cluster pod.
const CLUSTER_SA_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
/// Local container engine's Unix socket, matching `PODMAN_SOCKET` in
/// `examples/original_source/appservice/multiplexer.py`.
const PODMAN_SOCKET: &str = "/run/podman/podman.sock";

/// The two capability-set operations every backend implements (design
/// notes §9: "Model as an interface with two capability-set operations").
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Create and start a session container for `session_id`. On success,
    /// the container is running but its address isn't known until DNS
    /// resolves `session-<id>[<domain>]`.
    async fn create_and_start(&self, session_id: &str) -> Result<(), BackendError>;
}

/// Backend create/start failure: status + body forwarded verbatim (spec.md
/// §4.3, §4.10).
pub struct BackendError {
    pub status: u16,
    pub body: String,
}

/// Probe the filesystem once at startup to pick a backend (spec.md §4.8).
pub async fn detect_backend(config: &GatewayConfig) -> anyhow::Result<Box<dyn Backend>> {
    if Path::new(CLUSTER_SA_DIR).is_dir() {
        tracing::info!("cluster service-account directory found, using cluster backend");
        return Ok(Box::new(cluster::ClusterBackend::new(config).await?));
    }
    if Path::new(PODMAN_SOCKET).exists() {
        tracing::info!(socket = PODMAN_SOCKET, "using local container backend");
        return Ok(Box::new(local::LocalBackend::new(config)));
    }
    anyhow::bail!("no backend detected: neither {CLUSTER_SA_DIR} nor {PODMAN_SOCKET} exist")
}

/// Failure modes of [`provision_session`]. Unlike [`crate::error::GatewayError`],
/// `Backend` carries the orchestrator's own status+body so callers can
/// forward it verbatim instead of collapsing it into a fixed envelope
/// (spec.md §4.3: "the backend's status code and body are forwarded
/// verbatim").
pub enum ProvisionError {
    /// Backend create/start failed; status and body are the backend's own.
    Backend(BackendError),
    /// DNS resolution of `session-<id>` timed out; no registry entry was
    /// created and the container may be leaked (spec.md §4.10, Open
    /// Question (b)).
    DnsTimeout,
    /// The registry rejected the insert (duplicate id); effectively
    /// unreachable given random UUIDs, surfaced as a plain 500.
    RegistryInsert,
}

/// Full provisioner flow for `POST .../sessions/new` (spec.md §4.3, §4.9):
/// create+start, resolve DNS with bounded retries, insert into the registry.
pub async fn provision_session(
    backend: &dyn Backend,
    registry: &Registry,
    config: &GatewayConfig,
) -> Result<String, ProvisionError> {
    let session_id = uuid::Uuid::new_v4().to_string();

    if let Err(e) = backend.create_and_start(&session_id).await {
        tracing::warn!(session_id = %session_id, status = e.status, "backend create/start failed");
        return Err(ProvisionError::Backend(e));
    }

    let address = match resolve_session_address(&session_id, config).await {
        Some(addr) => addr,
        None => {
            tracing::warn!(
                session_id = %session_id,
                "DNS resolution timed out; container may be leaked"
            );
            return Err(ProvisionError::DnsTimeout);
        }
    };

    match registry.insert(&session_id, address).await {
        Ok(()) => Ok(session_id),
        Err(_) => Err(ProvisionError::RegistryInsert),
    }
}

/// Resolve `session-<id>[<domain>]` via DNS with bounded one-second-spaced
/// retries (spec.md §4.3: "up to ~30 one-second retries").
async fn resolve_session_address(session_id: &str, config: &GatewayConfig) -> Option<IpAddr> {
    let host = format!("session-{session_id}{}", config.session_instance_domain);
    let lookup_target = format!("{host}:0");

    for attempt in 1..=config.dns_retries {
        match tokio::net::lookup_host(&lookup_target).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    return Some(addr.ip());
                }
            }
            Err(e) => {
                tracing::debug!(host = %host, attempt, err = %e, "DNS resolution attempt failed");
            }
        }
        tokio::time::sleep(config.dns_retry_interval()).await;
    }
    None
}

/// Container/pod name for a session, shared by both backends.
pub fn container_name(session_id: &str) -> String {
    format!("session-{session_id}")
}

/// Environment variables stamped into every session container (spec.md §6).
pub fn session_env(session_id: &str, config: &GatewayConfig) -> Vec<(String, String)> {
    vec![
        ("API_URL".to_owned(), config.api_url.clone()),
        (
            "SESSION_ROUTE_PREFIX".to_owned(),
            format!("{}/sessions/{session_id}", crate::config::BROWSER_WS_PREFIX),
        ),
        ("SESSION_ID".to_owned(), session_id.to_owned()),
    ]
}

/// Command run inside the session container, matching the original
/// multiplexer's cockpit-ws invocation
/// (`examples/original_source/appservice/multiplexer.py`), generalized to
/// the session-id-scoped URL root this gateway uses.
pub fn container_command(session_id: &str) -> Vec<String> {
    vec![
        "sh".to_owned(),
        "-exc".to_owned(),
        format!(
            "printf '[Webservice]\nUrlRoot={}/sessions/{session_id}/\n' > /etc/cockpit/cockpit.conf; \
             exec /usr/libexec/cockpit-ws --for-tls-proxy --local-session=socat-session.sh",
            crate::config::BROWSER_WS_PREFIX
        ),
    ]
}
