//! Connection registry
//!
//! Owns the two pieces of shared state the relay has: the set of accepted
//! connections and the table binding client identifiers to them. Every
//! operation takes the single lock, does synchronous work only (channel
//! sends never block) and releases it, so the two maps can never be observed
//! out of step with each other.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, Mutex};

use crate::error::{Result, SignalError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one accepted connection, unique for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side handle to one connection's outbound queue
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: UnboundedSender<Message>,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(tx: UnboundedSender<Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            tx,
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a text frame. Fails once the connection's writer has gone away.
    fn send(&self, text: &str) -> bool {
        self.tx.send(Message::Text(text.to_string())).is_ok()
    }
}

/// A registered client as reported by `/api/peers`
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: String,
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub active: usize,
    pub clients: Vec<PeerInfo>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Every accepted connection, registered or not
    active: HashMap<ConnectionId, ConnectionHandle>,
    /// Client identifier → connection
    clients: HashMap<String, ConnectionId>,
}

impl RegistryState {
    fn remove(&mut self, conn: ConnectionId) -> bool {
        let was_active = self.active.remove(&conn).is_some();
        let bound_before = self.clients.len();
        self.clients.retain(|client_id, bound| {
            if *bound == conn {
                tracing::info!(client_id = %client_id, connection_id = %conn, "Client removed");
                false
            } else {
                true
            }
        });
        was_active || self.clients.len() != bound_before
    }
}

/// Shared registry handle. Cloning is cheap and every clone sees the same state.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly accepted connection to the active set
    pub async fn accept(&self, handle: ConnectionHandle) -> ConnectionId {
        let conn = handle.id();
        let mut state = self.state.lock().await;
        state.active.insert(conn, handle);
        crate::log_registry_operation!("accept", conn, state.active.len());
        conn
    }

    /// Bind `client_id` to `conn`, replacing any earlier binding of either
    pub async fn register(&self, client_id: &str, conn: ConnectionId) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.active.contains_key(&conn) {
            return Err(SignalError::ConnectionNotActive(conn));
        }

        state
            .clients
            .retain(|existing, bound| *bound != conn || existing == client_id);

        if let Some(previous) = state.clients.insert(client_id.to_string(), conn) {
            if previous != conn {
                tracing::warn!(
                    client_id = %client_id,
                    previous_connection = %previous,
                    connection_id = %conn,
                    "Client identifier re-registered, previous connection is no longer addressable"
                );
            }
        }

        crate::log_registry_operation!("register", conn, state.active.len(), client_id);
        Ok(())
    }

    /// Unicast to a registered client. Returns whether the message was queued.
    pub async fn send_to(&self, client_id: &str, message: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(conn) = state.clients.get(client_id).copied() else {
            tracing::debug!(client_id = %client_id, "Client not found, message dropped");
            return false;
        };

        let delivered = state
            .active
            .get(&conn)
            .is_some_and(|handle| handle.send(message));

        if delivered {
            tracing::debug!(client_id = %client_id, connection_id = %conn, "Sent message to client");
        } else {
            tracing::warn!(
                client_id = %client_id,
                connection_id = %conn,
                "Send to client failed, removing connection"
            );
            state.remove(conn);
        }

        delivered
    }

    /// Fan `message` out to every active connection except `exclude`.
    ///
    /// A failed send never stops delivery to the remaining recipients; failed
    /// connections are pruned once the pass is over. Returns the number of
    /// connections the message was queued for.
    pub async fn broadcast(&self, message: &str, exclude: ConnectionId) -> usize {
        let mut state = self.state.lock().await;
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (conn, handle) in state.active.iter() {
            if *conn == exclude {
                continue;
            }
            if handle.send(message) {
                delivered += 1;
            } else {
                failed.push(*conn);
            }
        }

        for conn in failed {
            tracing::warn!(connection_id = %conn, "Broadcast send failed, removing connection");
            state.remove(conn);
        }

        tracing::debug!(
            sender = %exclude,
            recipients = delivered,
            "Broadcasted message"
        );
        delivered
    }

    /// Forget `conn` entirely. Safe to call any number of times.
    pub async fn disconnect(&self, conn: ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.remove(conn);
        if removed {
            crate::log_registry_operation!("disconnect", conn, state.active.len());
        }
        removed
    }

    pub async fn contains(&self, conn: ConnectionId) -> bool {
        self.state.lock().await.active.contains_key(&conn)
    }

    pub async fn lookup(&self, client_id: &str) -> Option<ConnectionId> {
        self.state.lock().await.clients.get(client_id).copied()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock().await;
        let mut clients: Vec<PeerInfo> = state
            .clients
            .iter()
            .filter_map(|(client_id, conn)| {
                state.active.get(conn).map(|handle| PeerInfo {
                    id: client_id.clone(),
                    connection_id: *conn,
                    connected_at: handle.connected_at(),
                })
            })
            .collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));

        RegistrySnapshot {
            active: state.active.len(),
            clients,
        }
    }
}
