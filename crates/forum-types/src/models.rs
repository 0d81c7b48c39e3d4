use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered student. The two gates are independent columns, but
/// `approved` is only ever set on an account that is already `active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub handle: String,
    pub last_name: String,
    pub first_name: String,
    pub active: bool,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// An account together with its stored credential hash. Never serialized.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub account: Account,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    pub last_name: String,
    pub first_name: String,
    pub created_at: DateTime<Utc>,
}

/// Where a message sits in the moderation lifecycle. Rejected messages are
/// deleted, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Pending,
    Validated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub sender_handle: String,
    /// `None` for public messages, and for private messages whose recipient
    /// could not be resolved to an account.
    pub recipient_id: Option<Uuid>,
    /// The identity the sender addressed. Present iff the message is private.
    pub recipient_username: Option<String>,
    pub recipient_handle: Option<String>,
    pub content: String,
    pub validated: bool,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<Uuid>,
}

impl Message {
    pub fn state(&self) -> MessageState {
        if self.validated {
            MessageState::Validated
        } else {
            MessageState::Pending
        }
    }

    /// The username a private message may be pushed to besides its sender.
    /// Only a recipient resolved to an account at send time qualifies; the
    /// addressed name alone grants nothing.
    pub fn resolved_recipient(&self) -> Option<&str> {
        self.recipient_id?;
        self.recipient_username.as_deref()
    }
}

/// A message awaiting moderation, with the sender's name joined in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    #[serde(flatten)]
    pub message: Message,
    pub sender_last_name: String,
    pub sender_first_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoginAction {
    Login,
    Logout,
}

impl LoginAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
        }
    }
}

impl std::str::FromStr for LoginAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOGIN" => Ok(Self::Login),
            "LOGOUT" => Ok(Self::Logout),
            other => Err(anyhow::anyhow!("unknown login action: {}", other)),
        }
    }
}

/// One row of the append-only login audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRecord {
    pub id: i64,
    pub account_id: Uuid,
    pub username: String,
    pub handle: String,
    pub action: LoginAction,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_accounts: u64,
    pub active_accounts: u64,
    pub approved_accounts: u64,
    pub total_messages: u64,
    pub validated_messages: u64,
    pub pending_messages: u64,
}
