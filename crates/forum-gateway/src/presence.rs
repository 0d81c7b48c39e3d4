use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use forum_types::events::PresentUser;

use crate::dispatcher::ConnectionId;

#[derive(Debug, Clone)]
struct PresenceEntry {
    conn_id: ConnectionId,
    handle: String,
}

/// Who is in the chat right now, and on which connection.
///
/// One lock guards the whole map, so join, leave and lookup are
/// linearizable: a lookup never returns a connection whose leave has
/// already completed. At most one entry exists per username; a second
/// join from a new connection replaces the first.
/// Result of a join: the present set afterwards, and the connection that
/// previously held this username, if a different one did.
#[derive(Debug)]
pub struct Joined {
    pub present: Vec<PresentUser>,
    pub displaced: Option<ConnectionId>,
}

#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<String, PresenceEntry>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `username`. The present set is sorted
    /// by username.
    pub async fn join(&self, username: &str, handle: &str, conn_id: ConnectionId) -> Joined {
        let mut entries = self.entries.write().await;
        let displaced = entries
            .insert(
                username.to_string(),
                PresenceEntry {
                    conn_id,
                    handle: handle.to_string(),
                },
            )
            .map(|previous| previous.conn_id)
            .filter(|previous| *previous != conn_id);
        if let Some(previous) = displaced {
            info!("{} rejoined, replacing connection {}", username, previous);
        }
        Joined {
            present: snapshot(&entries),
            displaced,
        }
    }

    /// Remove whichever entry is owned by `conn_id`. A connection that never
    /// joined, or whose entry was replaced by a newer one, removes nothing.
    pub async fn leave(&self, conn_id: ConnectionId) -> Option<PresentUser> {
        let mut entries = self.entries.write().await;
        let username = entries
            .iter()
            .find(|(_, entry)| entry.conn_id == conn_id)
            .map(|(username, _)| username.clone())?;

        entries.remove(&username).map(|entry| PresentUser {
            username,
            handle: entry.handle,
        })
    }

    pub async fn lookup(&self, username: &str) -> Option<ConnectionId> {
        self.entries.read().await.get(username).map(|entry| entry.conn_id)
    }

    pub async fn present(&self) -> Vec<PresentUser> {
        snapshot(&*self.entries.read().await)
    }
}

fn snapshot(entries: &HashMap<String, PresenceEntry>) -> Vec<PresentUser> {
    let mut users: Vec<PresentUser> = entries
        .iter()
        .map(|(username, entry)| PresentUser {
            username: username.clone(),
            handle: entry.handle.clone(),
        })
        .collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));
    users
}
