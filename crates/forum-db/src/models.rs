/// Database row types. These map directly to SQLite rows and are converted
/// into forum-types models at the crate boundary.
use anyhow::{Context, Result};
use uuid::Uuid;

use forum_types::models::{
    Account, AccountCredentials, Admin, LoginRecord, Message, PendingMessage,
};

use crate::parse_timestamp;

pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub handle: String,
    pub password: String,
    pub last_name: String,
    pub first_name: String,
    pub active: bool,
    pub approved: bool,
    pub created_at: String,
}

pub struct AdminRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub last_name: String,
    pub first_name: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_handle: String,
    pub sender_last_name: String,
    pub sender_first_name: String,
    pub recipient_id: Option<String>,
    pub recipient_username: Option<String>,
    pub recipient_handle: Option<String>,
    pub content: String,
    pub validated: bool,
    pub private: bool,
    pub created_at: String,
    pub validated_at: Option<String>,
    pub validated_by: Option<String>,
}

pub struct LoginRow {
    pub id: i64,
    pub account_id: String,
    pub username: String,
    pub handle: String,
    pub action: String,
    pub created_at: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

/// Fields of a new message, as handed to `Database::insert_message`.
pub struct NewMessage<'a> {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub recipient_username: Option<&'a str>,
    pub content: &'a str,
    pub validated: bool,
}

/// Outcome of a gated account update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateUpdate {
    Updated,
    NotFound,
    /// Approval requested on an account that is not active yet.
    NotActive,
}

/// Outcome of marking a message validated.
pub enum ValidateOutcome {
    Validated(MessageRow),
    AlreadyValidated,
    NotFound,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("Corrupt {} '{}'", what, raw))
}

fn parse_opt_id(raw: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    raw.map(|r| parse_id(r, what)).transpose()
}

impl TryFrom<AccountRow> for AccountCredentials {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(AccountCredentials {
            account: Account {
                id: parse_id(&row.id, "account id")?,
                username: row.username,
                handle: row.handle,
                last_name: row.last_name,
                first_name: row.first_name,
                active: row.active,
                approved: row.approved,
                created_at: parse_timestamp(&row.created_at)?,
            },
            password_hash: row.password,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        AccountCredentials::try_from(row).map(|c| c.account)
    }
}

impl AdminRow {
    pub fn into_admin(self) -> Result<(Admin, String)> {
        let admin = Admin {
            id: parse_id(&self.id, "admin id")?,
            username: self.username,
            last_name: self.last_name,
            first_name: self.first_name,
            created_at: parse_timestamp(&self.created_at)?,
        };
        Ok((admin, self.password))
    }
}

impl TryFrom<MessageRow> for PendingMessage {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let sender_last_name = row.sender_last_name.clone();
        let sender_first_name = row.sender_first_name.clone();
        Ok(PendingMessage {
            message: Message::try_from(row)?,
            sender_last_name,
            sender_first_name,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id, "message id")?,
            sender_id: parse_id(&row.sender_id, "sender id")?,
            sender_username: row.sender_username,
            sender_handle: row.sender_handle,
            recipient_id: parse_opt_id(row.recipient_id.as_deref(), "recipient id")?,
            recipient_username: row.recipient_username,
            recipient_handle: row.recipient_handle,
            content: row.content,
            validated: row.validated,
            private: row.private,
            created_at: parse_timestamp(&row.created_at)?,
            validated_at: row.validated_at.as_deref().map(parse_timestamp).transpose()?,
            validated_by: parse_opt_id(row.validated_by.as_deref(), "validator id")?,
        })
    }
}

impl TryFrom<LoginRow> for LoginRecord {
    type Error = anyhow::Error;

    fn try_from(row: LoginRow) -> Result<Self> {
        Ok(LoginRecord {
            id: row.id,
            account_id: parse_id(&row.account_id, "account id")?,
            username: row.username,
            handle: row.handle,
            action: row.action.parse()?,
            created_at: parse_timestamp(&row.created_at)?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            session_id: parse_opt_id(row.session_id.as_deref(), "session id")?,
        })
    }
}

/// One login/logout event, as handed to `Database::insert_login_event`.
pub struct LoginEvent<'a> {
    pub account_id: Uuid,
    pub username: &'a str,
    pub handle: &'a str,
    pub action: forum_types::models::LoginAction,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub session_id: Option<Uuid>,
}
