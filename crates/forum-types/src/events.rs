use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Role;
use crate::models::Message;

/// A present identity as shown to chat clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentUser {
    pub username: String,
    pub handle: String,
}

/// The client-facing shape of a message pushed over the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub from: String,
    pub from_username: String,
    pub to: Option<String>,
    pub to_username: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_private: bool,
}

impl From<&Message> for ChatMessage {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            from: m.sender_handle.clone(),
            from_username: m.sender_username.clone(),
            to: m.recipient_handle.clone(),
            to_username: m.recipient_username.clone(),
            content: m.content.clone(),
            timestamp: m.created_at,
            is_private: m.private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminNotificationKind {
    NewPendingMessage,
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Sent once when the socket is accepted
    Connected { message: String },

    /// Server confirms successful identification
    Ready { username: String, role: Role },

    /// A student joined the chat; carries the full present set
    UserConnected {
        username: String,
        handle: String,
        connected_users: Vec<PresentUser>,
    },

    /// A student left the chat or dropped their connection
    UserDisconnected { username: String, handle: String },

    /// A validated message, delivered under the public/private rule
    NewMessage(ChatMessage),

    /// Tells a sender their message is held for moderation
    MessagePendingValidation { message_id: Uuid, notice: String },

    /// Pushed to the admin notification channel
    AdminNotification {
        kind: AdminNotificationKind,
        message: ChatMessage,
    },

    /// A command from this connection failed
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Enter the chat presence set
    JoinChat,

    /// Leave the presence set without closing the socket
    LeaveChat,

    /// Post a message; `to_username` makes it private
    SendMessage {
        content: String,
        #[serde(default)]
        to_username: Option<String>,
    },

    /// Subscribe to moderation notifications (admins only)
    JoinAdminChannel,

    LeaveAdminChannel,
}
