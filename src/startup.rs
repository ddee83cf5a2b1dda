// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup sequence (spec.md §4.8): detect backend, connect to the bus,
//! reconcile the registry, spawn the bus-watcher, bind the listener.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::bus::Bus;
use crate::config::GatewayConfig;
use crate::provisioner;
use crate::registry::{self, Registry};
use crate::state::GatewayState;
use crate::transport;

/// Run the gateway to completion (until the listener is closed or a fatal
/// startup error occurs).
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let backend = provisioner::detect_backend(&config).await?;

    let redis_url = config.redis_url();
    let bus = Bus::connect_with_retry(&redis_url).await?;
    // Subscribe once up front so a broken channel fails startup fast, same
    // as every other fatal precondition in this function; `watch_bus` owns
    // resubscribing for the rest of the process's life.
    bus.subscribe(&redis_url).await?;

    let registry = Registry::spawn(Some(bus.clone()));

    match bus.load_table().await? {
        Some(table_json) => {
            registry.replace_table(registry::decode_table(&table_json)).await;
            tracing::info!("reconciled session table from bus store");
        }
        None => tracing::info!("no persisted session table found, starting empty"),
    }

    tokio::spawn(watch_bus(registry.clone(), bus.clone(), redis_url.clone()));

    let state = Arc::new(GatewayState::new(registry, config.clone(), Arc::from(backend)));
    let router = transport::build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(host = %config.host, port = config.port, "gateway listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(err = %e, "failed to install ctrl-c handler");
    }
}

/// Bus-watcher task: consumes the pub/sub stream with a ~1s bounded wait per
/// message, feeding every table blob into the registry. Never returns — on
/// subscribe failure or a dropped stream it backs off and resubscribes, so a
/// transient Redis disconnect never permanently stops this replica from
/// seeing cross-replica updates again (spec.md §4.10: "the watcher keeps
/// retrying; local state continues to serve").
async fn watch_bus(registry: Registry, bus: Bus, redis_url: String) {
    let mut backoff = Duration::from_millis(200);
    loop {
        let pubsub = match bus.subscribe(&redis_url).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(err = %e, ?backoff, "bus resubscribe failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(10));
                continue;
            }
        };
        backoff = Duration::from_millis(200);

        let mut messages = pubsub.into_on_message();
        loop {
            match tokio::time::timeout(Duration::from_secs(1), messages.next()).await {
                Ok(Some(msg)) => match msg.get_payload::<String>() {
                    Ok(payload) => registry.replace_table(registry::decode_table(&payload)).await,
                    Err(e) => tracing::warn!(err = %e, "bus message had a non-string payload"),
                },
                Ok(None) => {
                    tracing::warn!("bus subscription stream ended, resubscribing");
                    break;
                }
                Err(_) => {} // bounded-wait timeout, loop and poll again
            }
        }
    }
}
