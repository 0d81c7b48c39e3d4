use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use forum_core::{accounts, store};
use forum_db::Database;
use forum_types::error::{ForumError, ForumResult};
use forum_types::events::{AdminNotificationKind, ChatMessage, GatewayEvent};
use forum_types::models::{Message, MessageState};

use crate::blocking;
use crate::dispatcher::{ADMIN_GROUP, Audience, ConnectionId, Dispatcher};
use crate::presence::PresenceRegistry;

pub const PENDING_NOTICE: &str = "Your message is awaiting validation by an administrator.";

/// A message submitted by a student over the gateway.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender_username: String,
    pub content: String,
    /// Present for private messages.
    pub recipient_username: Option<String>,
    /// The connection the request arrived on. Receives the sender's copy.
    pub origin: ConnectionId,
}

#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The sender is approved; the message went out immediately.
    Delivered(Message),
    /// The message is held in the moderation queue.
    Pending(Message),
}

impl SendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            Self::Delivered(m) | Self::Pending(m) => m,
        }
    }
}

/// Decides, per message, whether it is delivered now or held for an admin,
/// and performs the delivery.
///
/// Storage runs on the blocking pool and completes before any push is
/// issued, so a failed write never produces a delivery.
#[derive(Clone)]
pub struct Distributor {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    presence: PresenceRegistry,
}

impl Distributor {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, presence: PresenceRegistry) -> Self {
        Self {
            db,
            dispatcher,
            presence,
        }
    }

    pub async fn send(&self, req: SendRequest) -> ForumResult<SendOutcome> {
        let db = self.db.clone();
        let sender_username = req.sender_username.clone();
        let recipient_username = req.recipient_username.clone();
        let content = req.content.clone();

        let message = blocking(move || {
            let sender = accounts::find(&db, &sender_username)?
                .ok_or_else(|| ForumError::NotFound(format!("unknown account {}", sender_username)))?;

            // An unknown recipient still yields a stored private message; it
            // just cannot be delivered live.
            let recipient = match recipient_username.as_deref() {
                Some(username) => accounts::find(&db, username)?,
                None => None,
            };

            store::append(
                &db,
                &sender,
                recipient_username.as_deref(),
                recipient.as_ref(),
                &content,
                sender.approved,
            )
        })
        .await?;

        if message.state() == MessageState::Validated {
            self.deliver(&message, Some(req.origin)).await;
            info!("Message {} from {} distributed automatically", message.id, message.sender_username);
            return Ok(SendOutcome::Delivered(message));
        }

        self.dispatcher
            .deliver(
                Audience::Connection(req.origin),
                GatewayEvent::MessagePendingValidation {
                    message_id: message.id,
                    notice: PENDING_NOTICE.to_string(),
                },
            )
            .await;
        self.dispatcher
            .deliver(
                Audience::Group(ADMIN_GROUP.to_string()),
                GatewayEvent::AdminNotification {
                    kind: AdminNotificationKind::NewPendingMessage,
                    message: ChatMessage::from(&message),
                },
            )
            .await;
        info!("Message {} from {} awaiting validation", message.id, message.sender_username);
        Ok(SendOutcome::Pending(message))
    }

    /// Admin decision: validate and deliver under the same rule as an
    /// auto-validated message.
    pub async fn validate(&self, message_id: Uuid, admin_id: Uuid) -> ForumResult<Message> {
        let db = self.db.clone();
        let message = blocking(move || store::validate(&db, message_id, admin_id)).await?;
        self.deliver(&message, None).await;
        Ok(message)
    }

    /// Admin decision: delete. Nobody is notified.
    pub async fn reject(&self, message_id: Uuid) -> ForumResult<()> {
        let db = self.db.clone();
        blocking(move || store::reject(&db, message_id)).await
    }

    /// Public messages go to every client. Private messages go to the
    /// sender and, if online, the resolved recipient; nobody else.
    async fn deliver(&self, message: &Message, origin: Option<ConnectionId>) {
        let event = GatewayEvent::NewMessage(ChatMessage::from(message));

        if !message.private {
            self.dispatcher.deliver(Audience::All, event).await;
            return;
        }

        let sender_conn = match origin {
            Some(conn) => Some(conn),
            None => self.presence.lookup(&message.sender_username).await,
        };
        let recipient_conn = match message.resolved_recipient() {
            Some(username) => self.presence.lookup(username).await,
            None => None,
        };

        let mut targets: Vec<ConnectionId> = sender_conn.into_iter().collect();
        if let Some(conn) = recipient_conn {
            if !targets.contains(&conn) {
                targets.push(conn);
            }
        }
        for conn in targets {
            self.dispatcher
                .deliver(Audience::Connection(conn), event.clone())
                .await;
        }
    }
}
