// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: the authoritative in-memory session table, run as a
//! single-writer actor task (spec.md §4.2, §9).
//!
//! Modeled the same way the teacher's `upstream/bridge.rs::run_loop` owns its
//! `clients`/`pending` maps: one task holds the real state, every caller
//! talks to it through a channel. That keeps "the registry is the only
//! writer" (spec.md invariant 2) true by construction instead of by
//! convention.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::bus::Bus;

/// A session's lifecycle status. Ordering encodes the monotonic transition
/// graph `wait_target < running < closed` (spec.md §3 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    WaitTarget,
    Running,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitTarget => "wait_target",
            Self::Running => "running",
            Self::Closed => "closed",
        }
    }
}

/// A single session record.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub address: IpAddr,
    pub status: SessionStatus,
    pub created_at: Instant,
}

/// Wire shape for one session within the shared table, matching spec.md §6:
/// `{"<id>": {"ip": "...", "status": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireSession {
    ip: String,
    status: String,
}

fn parse_status(s: &str) -> Option<SessionStatus> {
    match s {
        "wait_target" => Some(SessionStatus::WaitTarget),
        "running" => Some(SessionStatus::Running),
        "closed" => Some(SessionStatus::Closed),
        _ => None,
    }
}

fn serialize_table(table: &HashMap<String, Session>) -> String {
    let wire: HashMap<&str, WireSession> = table
        .iter()
        .map(|(id, s)| {
            (id.as_str(), WireSession { ip: s.address.to_string(), status: s.status.as_str().to_owned() })
        })
        .collect();
    serde_json::to_string(&wire).unwrap_or_else(|_| "{}".to_owned())
}

/// Parse an incoming table blob. Malformed JSON yields an empty table
/// (spec.md §4.8: "empty if absent or malformed JSON").
fn parse_table(json: &str) -> HashMap<String, Session> {
    let wire: HashMap<String, WireSession> = match serde_json::from_str(json) {
        Ok(w) => w,
        Err(_) => return HashMap::new(),
    };
    wire.into_iter()
        .filter_map(|(id, w)| {
            let address = w.ip.parse().ok()?;
            let status = parse_status(&w.status)?;
            let session = Session { id: id.clone(), address, status, created_at: Instant::now() };
            Some((id, session))
        })
        .collect()
}

#[derive(Debug)]
pub enum RegistryError {
    AlreadyExists,
    Unknown,
}

enum Command {
    Snapshot { resp: oneshot::Sender<HashMap<String, Session>> },
    Get { id: String, resp: oneshot::Sender<Option<Session>> },
    Insert { id: String, address: IpAddr, resp: oneshot::Sender<Result<(), RegistryError>> },
    Transition { id: String, status: SessionStatus },
    WaitRunning {
        id: String,
        resp: oneshot::Sender<Result<(Option<u64>, oneshot::Receiver<()>), RegistryError>>,
    },
    CancelWait { id: String, waiter: u64 },
    ReplaceTable { table: HashMap<String, Session> },
}

/// Clone-able handle to the registry actor.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::Sender<Command>,
}

impl Registry {
    /// Spawn the registry actor and return a handle to it.
    ///
    /// `bus` is used to publish-then-store the table on every real mutation
    /// (spec.md §4.2). Pass `None` in tests that don't care about bus
    /// fan-out.
    pub fn spawn(bus: Option<Bus>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run(rx, bus));
        Self { tx }
    }

    pub async fn snapshot(&self) -> HashMap<String, Session> {
        let (resp, rx) = oneshot::channel();
        if self.tx.send(Command::Snapshot { resp }).await.is_err() {
            return HashMap::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(Command::Get { id: id.to_owned(), resp }).await.ok()?;
        rx.await.ok().flatten()
    }

    pub async fn insert(&self, id: &str, address: IpAddr) -> Result<(), RegistryError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(Command::Insert { id: id.to_owned(), address, resp })
            .await
            .map_err(|_| RegistryError::Unknown)?;
        rx.await.map_err(|_| RegistryError::Unknown)?
    }

    /// Enforces monotonicity; no-op if `status` isn't a forward move
    /// (spec.md §4.2).
    pub async fn transition(&self, id: &str, status: SessionStatus) {
        let _ = self.tx.send(Command::Transition { id: id.to_owned(), status }).await;
    }

    /// Feed a freshly received bus table blob in. Last-writer-wins.
    pub async fn replace_table(&self, table: HashMap<String, Session>) {
        let _ = self.tx.send(Command::ReplaceTable { table }).await;
    }

    /// Resolve once the session first reaches `running`; resolves
    /// immediately if it's already there. Errors if the session is unknown.
    ///
    /// The returned future is a [`WaitRunning`] guard: dropping it before
    /// completion tells the registry to forget the waiter, so an aborted
    /// HTTP request never leaks an entry in the wait-set (spec.md §5).
    pub async fn wait_running(&self, id: &str) -> Result<WaitRunning, RegistryError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(Command::WaitRunning { id: id.to_owned(), resp })
            .await
            .map_err(|_| RegistryError::Unknown)?;
        let (waiter_id, receiver) = rx.await.map_err(|_| RegistryError::Unknown)??;
        Ok(WaitRunning {
            id: id.to_owned(),
            receiver: Some(receiver),
            tx: self.tx.clone(),
            waiter_id,
        })
    }
}

/// Future-ish guard returned by [`Registry::wait_running`]. Exposes `.await`
/// via [`WaitRunning::wait`]; cancels its wait-set entry on drop if not yet
/// resolved.
pub struct WaitRunning {
    id: String,
    receiver: Option<oneshot::Receiver<()>>,
    tx: mpsc::Sender<Command>,
    waiter_id: Option<u64>,
}

impl WaitRunning {
    pub async fn wait(mut self) -> Result<(), RegistryError> {
        match self.receiver.take() {
            Some(rx) => {
                let result = rx.await.map_err(|_| RegistryError::Unknown);
                self.waiter_id = None; // resolved: nothing left to cancel
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for WaitRunning {
    fn drop(&mut self) {
        if let (Some(waiter_id), true) = (self.waiter_id, self.receiver.is_some()) {
            let tx = self.tx.clone();
            let id = self.id.clone();
            tokio::spawn(async move {
                let _ = tx.send(Command::CancelWait { id, waiter: waiter_id }).await;
            });
        }
    }
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

async fn run(mut rx: mpsc::Receiver<Command>, bus: Option<Bus>) {
    let mut table: HashMap<String, Session> = HashMap::new();
    let mut wait_set: HashMap<String, Vec<Waiter>> = HashMap::new();
    let mut next_waiter_id: u64 = 0;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Snapshot { resp } => {
                let _ = resp.send(table.clone());
            }
            Command::Get { id, resp } => {
                let _ = resp.send(table.get(&id).cloned());
            }
            Command::Insert { id, address, resp } => {
                if table.contains_key(&id) {
                    let _ = resp.send(Err(RegistryError::AlreadyExists));
                    continue;
                }
                table.insert(
                    id.clone(),
                    Session { id, address, status: SessionStatus::WaitTarget, created_at: Instant::now() },
                );
                publish(&bus, &table).await;
                let _ = resp.send(Ok(()));
            }
            Command::Transition { id, status } => {
                let Some(session) = table.get_mut(&id) else { continue };
                if status <= session.status {
                    continue;
                }
                session.status = status;
                if status == SessionStatus::Running {
                    resolve_waiters(&mut wait_set, &id);
                }
                if status == SessionStatus::Closed {
                    wait_set.remove(&id);
                }
                publish(&bus, &table).await;
            }
            Command::WaitRunning { id, resp } => {
                let Some(session) = table.get(&id) else {
                    let _ = resp.send(Err(RegistryError::Unknown));
                    continue;
                };
                if session.status >= SessionStatus::Running {
                    let (tx, rx) = oneshot::channel();
                    let _ = tx.send(());
                    let _ = resp.send(Ok((None, rx)));
                    continue;
                }
                let (tx, rx) = oneshot::channel();
                next_waiter_id += 1;
                let waiter_id = next_waiter_id;
                wait_set.entry(id).or_default().push(Waiter { id: waiter_id, tx });
                let _ = resp.send(Ok((Some(waiter_id), rx)));
            }
            Command::CancelWait { id, waiter } => {
                if let Some(list) = wait_set.get_mut(&id) {
                    list.retain(|w| w.id != waiter);
                    if list.is_empty() {
                        wait_set.remove(&id);
                    }
                }
            }
            Command::ReplaceTable { table: incoming } => {
                table = incoming;
                let running: Vec<String> = table
                    .iter()
                    .filter(|(_, s)| s.status >= SessionStatus::Running)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in running {
                    resolve_waiters(&mut wait_set, &id);
                }
            }
        }
    }
}

fn resolve_waiters(wait_set: &mut HashMap<String, Vec<Waiter>>, id: &str) {
    if let Some(waiters) = wait_set.remove(id) {
        for waiter in waiters {
            let _ = waiter.tx.send(());
        }
    }
}

async fn publish(bus: &Option<Bus>, table: &HashMap<String, Session>) {
    let Some(bus) = bus else { return };
    let json = serialize_table(table);
    if let Err(e) = bus.publish_and_store(&json).await {
        tracing::warn!(err = %e, "failed to publish session table to bus");
    }
}

/// Parse a table blob received over the bus, for the watcher task to feed
/// into [`Registry::replace_table`].
pub fn decode_table(json: &str) -> HashMap<String, Session> {
    parse_table(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    #[tokio::test]
    async fn insert_then_get_reads_wait_target() {
        let registry = Registry::spawn(None);
        registry.insert("abc", addr()).await.unwrap();
        let session = registry.get("abc").await.unwrap();
        assert_eq!(session.status, SessionStatus::WaitTarget);
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let registry = Registry::spawn(None);
        registry.insert("abc", addr()).await.unwrap();
        let err = registry.insert("abc", addr()).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists));
    }

    #[tokio::test]
    async fn transition_is_monotonic() {
        let registry = Registry::spawn(None);
        registry.insert("abc", addr()).await.unwrap();
        registry.transition("abc", SessionStatus::Closed).await;
        registry.transition("abc", SessionStatus::Running).await; // no-op: reverse edge
        let session = registry.get("abc").await.unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn wait_running_resolves_on_transition() {
        let registry = Registry::spawn(None);
        registry.insert("abc", addr()).await.unwrap();
        let waiter = registry.wait_running("abc").await.unwrap();
        let registry2 = registry.clone();
        tokio::spawn(async move {
            registry2.transition("abc", SessionStatus::Running).await;
        });
        waiter.wait().await.unwrap();
        let session = registry.get("abc").await.unwrap();
        assert_eq!(session.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn wait_running_resolves_immediately_if_already_running() {
        let registry = Registry::spawn(None);
        registry.insert("abc", addr()).await.unwrap();
        registry.transition("abc", SessionStatus::Running).await;
        let waiter = registry.wait_running("abc").await.unwrap();
        waiter.wait().await.unwrap();
    }

    #[tokio::test]
    async fn wait_running_unknown_session_errors() {
        let registry = Registry::spawn(None);
        assert!(registry.wait_running("nope").await.is_err());
    }

    #[tokio::test]
    async fn replace_table_resolves_pending_waiters() {
        let registry = Registry::spawn(None);
        registry.insert("abc", addr()).await.unwrap();
        let waiter = registry.wait_running("abc").await.unwrap();

        let mut incoming = HashMap::new();
        incoming.insert(
            "abc".to_owned(),
            Session {
                id: "abc".to_owned(),
                address: addr(),
                status: SessionStatus::Running,
                created_at: Instant::now(),
            },
        );
        registry.replace_table(incoming).await;
        waiter.wait().await.unwrap();
    }

    #[test]
    fn wire_round_trip_preserves_status_and_address() {
        let mut table = HashMap::new();
        table.insert(
            "abc".to_owned(),
            Session { id: "abc".to_owned(), address: addr(), status: SessionStatus::Running, created_at: Instant::now() },
        );
        let json = serialize_table(&table);
        let parsed = parse_table(&json);
        let session = parsed.get("abc").unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.address, addr());
    }

    #[test]
    fn malformed_json_yields_empty_table() {
        assert!(parse_table("not json").is_empty());
    }
}
