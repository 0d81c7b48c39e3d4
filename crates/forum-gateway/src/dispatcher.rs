use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use forum_types::events::GatewayEvent;

/// Identifies one live WebSocket connection.
pub type ConnectionId = Uuid;

/// Named group that receives moderation notifications.
pub const ADMIN_GROUP: &str = "admin";

/// Who an event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Connection(ConnectionId),
    Group(String),
}

/// Push transport for the gateway: fan-out to every client, targeted sends
/// to one connection, and named subscription groups.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events. Every connection subscribes.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-connection targeted send channels
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<GatewayEvent>>>,

    /// Group name -> member connections
    groups: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
                groups: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a targeted channel for a new connection. Returns (conn_id, receiver).
    pub async fn register_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection's targeted channel and every group membership it held.
    pub async fn unregister_connection(&self, conn_id: ConnectionId) {
        self.inner.connections.write().await.remove(&conn_id);
        let mut groups = self.inner.groups.write().await;
        for members in groups.values_mut() {
            members.remove(&conn_id);
        }
        groups.retain(|_, members| !members.is_empty());
    }

    /// Send a targeted event. Returns false if the connection is gone.
    pub async fn send_to_connection(&self, conn_id: ConnectionId, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn join_group(&self, group: &str, conn_id: ConnectionId) {
        self.inner
            .groups
            .write()
            .await
            .entry(group.to_string())
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave_group(&self, group: &str, conn_id: ConnectionId) {
        let mut groups = self.inner.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.remove(&conn_id);
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }

    /// Send to every member of a group. Returns how many connections it reached.
    pub async fn send_to_group(&self, group: &str, event: GatewayEvent) -> usize {
        let members: Vec<ConnectionId> = match self.inner.groups.read().await.get(group) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let connections = self.inner.connections.read().await;
        members
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn deliver(&self, audience: Audience, event: GatewayEvent) {
        match audience {
            Audience::All => self.broadcast(event),
            Audience::Connection(conn_id) => {
                self.send_to_connection(conn_id, event).await;
            }
            Audience::Group(group) => {
                self.send_to_group(&group, event).await;
            }
        }
    }
}
