// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Edge session multiplexer for the interactive remote-administration web
//! console: authenticates tenant traffic, provisions and tracks per-session
//! containers across replicas, and reverse-proxies HTTP/WebSocket traffic
//! into them from both the browser side and the target-host-agent side.

pub mod bus;
pub mod config;
pub mod error;
pub mod identity;
pub mod placeholders;
pub mod provisioner;
pub mod registry;
pub mod startup;
pub mod state;
pub mod transport;

pub use config::GatewayConfig;

/// Run the gateway to completion.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    startup::run(config).await
}
