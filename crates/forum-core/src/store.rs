use forum_db::Database;
use forum_db::models::{NewMessage, ValidateOutcome};
use forum_types::error::{ForumError, ForumResult};
use forum_types::models::{Account, Message, PendingMessage, Stats};
use tracing::info;
use uuid::Uuid;

use crate::required;

pub const MAX_CONTENT_LEN: usize = 4000;

/// Persist a new message. Auto-validated messages carry no validator or
/// validation time; only an explicit admin decision stamps those.
///
/// `recipient_username` marks the message private. `recipient` is the
/// resolved account, absent when that username is unknown.
pub fn append(
    db: &Database,
    sender: &Account,
    recipient_username: Option<&str>,
    recipient: Option<&Account>,
    content: &str,
    auto_validate: bool,
) -> ForumResult<Message> {
    let content = required(content, "content")?;
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ForumError::Validation(format!(
            "content exceeds {} characters",
            MAX_CONTENT_LEN
        )));
    }

    let id = Uuid::new_v4();
    db.insert_message(&NewMessage {
        id,
        sender_id: sender.id,
        recipient_id: recipient.map(|r| r.id),
        recipient_username,
        content,
        validated: auto_validate,
    })?;

    get(db, id)
}

pub fn get(db: &Database, id: Uuid) -> ForumResult<Message> {
    let row = db
        .get_message(id)?
        .ok_or_else(|| ForumError::NotFound(format!("unknown message {}", id)))?;
    Ok(Message::try_from(row)?)
}

/// Move a pending message to validated and return it as now stored.
/// Re-validating is refused with `Conflict` so it is never delivered twice.
pub fn validate(db: &Database, id: Uuid, admin_id: Uuid) -> ForumResult<Message> {
    match db.validate_message(id, admin_id)? {
        ValidateOutcome::Validated(row) => {
            info!("Message {} validated by {}", id, admin_id);
            Ok(Message::try_from(row)?)
        }
        ValidateOutcome::AlreadyValidated => {
            Err(ForumError::Conflict(format!("message {} is already validated", id)))
        }
        ValidateOutcome::NotFound => Err(ForumError::NotFound(format!("unknown message {}", id))),
    }
}

/// Permanently delete a message.
pub fn reject(db: &Database, id: Uuid) -> ForumResult<()> {
    if !db.delete_message(id)? {
        return Err(ForumError::NotFound(format!("unknown message {}", id)));
    }
    info!("Message {} rejected and deleted", id);
    Ok(())
}

fn collect(rows: Vec<forum_db::models::MessageRow>) -> ForumResult<Vec<Message>> {
    rows.into_iter()
        .map(Message::try_from)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ForumError::Internal)
}

/// Validated messages, newest first.
pub fn list_validated(db: &Database, limit: u32) -> ForumResult<Vec<Message>> {
    collect(db.list_validated_messages(limit)?)
}

/// Validated messages readable by `username`, newest first.
pub fn list_validated_for(db: &Database, username: &str, limit: u32) -> ForumResult<Vec<Message>> {
    collect(db.list_validated_messages_for(username, limit)?)
}

/// The moderation queue, newest first, with sender names joined in.
pub fn list_pending(db: &Database) -> ForumResult<Vec<PendingMessage>> {
    db.list_pending_messages()?
        .into_iter()
        .map(PendingMessage::try_from)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ForumError::Internal)
}

pub fn stats(db: &Database) -> ForumResult<Stats> {
    Ok(db.stats()?)
}
