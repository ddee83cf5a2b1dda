// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed pub/sub bus and key-value store for cross-replica session
//! table synchronization (spec.md §4.2, §4.8, glossary: "Bus").
//!
//! Grounded directly in `examples/original_source/appservice/multiplexer.py`:
//! the same Redis instance is both the `"sessions"` pub/sub channel and the
//! `"sessions"` key holding the last-known table.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const SESSIONS_KEY: &str = "sessions";
const SESSIONS_CHANNEL: &str = "sessions";

/// Handle to the shared Redis bus/store. Cheap to clone (wraps a
/// multiplexed connection).
#[derive(Clone)]
pub struct Bus {
    manager: ConnectionManager,
}

impl Bus {
    /// Connect with up to 10 retries using quadratic backoff (spec.md §4.8).
    /// Fatal (returns `Err`) if every attempt fails — startup treats that as
    /// a process-exit condition (spec.md §4.10).
    pub async fn connect_with_retry(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match client.get_connection_manager().await {
                Ok(manager) => return Ok(Self { manager }),
                Err(e) if attempt >= 10 => {
                    return Err(anyhow::anyhow!("bus unreachable after {attempt} attempts: {e}"))
                }
                Err(e) => {
                    let backoff = Duration::from_millis(200 * (attempt as u64).pow(2));
                    tracing::warn!(attempt, err = %e, ?backoff, "bus connect failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Publish the table, then persist it to the store key. Order matches
    /// `multiplexer.py`'s `REDIS.set(...); REDIS.publish(...)` pairing,
    /// reversed here only in which call is visible first to this replica —
    /// both must happen for every mutation (spec.md invariant 2).
    pub async fn publish_and_store(&self, table_json: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(SESSIONS_KEY, table_json).await?;
        conn.publish::<_, _, ()>(SESSIONS_CHANNEL, table_json).await?;
        Ok(())
    }

    /// Load the persisted table at startup (spec.md §4.8). Absence or
    /// malformed JSON yields `None`; the caller treats that as an empty
    /// table.
    pub async fn load_table(&self) -> anyhow::Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(SESSIONS_KEY).await?;
        Ok(value)
    }

    /// Subscribe to the `"sessions"` channel. Returns a fresh pub/sub
    /// connection the watcher task owns exclusively (spec.md §4.8).
    pub async fn subscribe(&self, redis_url: &str) -> anyhow::Result<redis::aio::PubSub> {
        let client = redis::Client::open(redis_url)?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(SESSIONS_CHANNEL).await?;
        Ok(pubsub)
    }
}
