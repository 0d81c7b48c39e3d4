use tokio::sync::{broadcast, mpsc, mpsc::error::TryRecvError};

use forum_types::events::GatewayEvent;

use crate::dispatcher::{ConnectionId, Dispatcher};

/// A fake gateway connection: the same two receivers a real socket drains.
pub struct TestClient {
    pub conn_id: ConnectionId,
    targeted: mpsc::UnboundedReceiver<GatewayEvent>,
    broadcast: broadcast::Receiver<GatewayEvent>,
}

impl TestClient {
    pub async fn connect(dispatcher: &Dispatcher) -> Self {
        let (conn_id, targeted) = dispatcher.register_connection().await;
        Self {
            conn_id,
            targeted,
            broadcast: dispatcher.subscribe(),
        }
    }

    /// Everything delivered so far: broadcasts first, then targeted events.
    pub fn drain(&mut self) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.broadcast.try_recv() {
            events.push(event);
        }
        while let Ok(event) = self.targeted.try_recv() {
            events.push(event);
        }
        events
    }

    /// Whether the dispatcher has dropped this connection's targeted channel,
    /// which ends a real socket's send loop. Pending events are discarded.
    pub fn is_closed(&mut self) -> bool {
        loop {
            match self.targeted.try_recv() {
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }
}
