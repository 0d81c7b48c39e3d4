use crate::models::{
    AccountRow, AdminRow, GateUpdate, LoginEvent, LoginRow, MessageRow, NewMessage, ValidateOutcome,
};
use crate::{Database, timestamp};
use anyhow::Result;
use chrono::Utc;
use forum_types::models::Stats;
use rusqlite::{Connection, Row};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str =
    "id, username, handle, password, last_name, first_name, active, approved, created_at";

// Sender is always joined; recipient only when it resolved to an account.
const MESSAGE_SELECT: &str =
    "SELECT m.id, m.sender_id, s.username, s.handle, s.last_name, s.first_name,
            m.recipient_id, m.recipient_username, r.handle,
            m.content, m.validated, m.private, m.created_at, m.validated_at, m.validated_by
     FROM messages m
     JOIN accounts s ON m.sender_id = s.id
     LEFT JOIN accounts r ON m.recipient_id = r.id";

impl Database {
    // -- Accounts --

    pub fn create_account(
        &self,
        id: Uuid,
        username: &str,
        handle: &str,
        password_hash: &str,
        last_name: &str,
        first_name: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, username, handle, password, last_name, first_name, active, approved, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)",
                rusqlite::params![
                    id.to_string(),
                    username,
                    handle,
                    password_hash,
                    last_name,
                    first_name,
                    timestamp(Utc::now())
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "username", username))
    }

    pub fn get_account_by_id(&self, id: Uuid) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id", &id.to_string()))
    }

    pub fn activate_account(&self, username: &str) -> Result<GateUpdate> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE accounts SET active = 1 WHERE username = ?1", [username])?;
            Ok(if n == 0 { GateUpdate::NotFound } else { GateUpdate::Updated })
        })
    }

    /// Sets `approved` only on an active account. The check and the update
    /// run under one lock, so `approved` can never be set on an inactive row.
    pub fn approve_account(&self, username: &str) -> Result<GateUpdate> {
        self.with_conn(|conn| {
            let active: Option<bool> = conn
                .query_row("SELECT active FROM accounts WHERE username = ?1", [username], |row| {
                    row.get(0)
                })
                .optional()?;

            match active {
                None => Ok(GateUpdate::NotFound),
                Some(false) => Ok(GateUpdate::NotActive),
                Some(true) => {
                    conn.execute(
                        "UPDATE accounts SET approved = 1 WHERE username = ?1 AND active = 1",
                        [username],
                    )?;
                    Ok(GateUpdate::Updated)
                }
            }
        })
    }

    pub fn list_inactive_accounts(&self) -> Result<Vec<AccountRow>> {
        self.with_conn(|conn| {
            query_accounts(conn, "WHERE active = 0 ORDER BY created_at DESC, rowid DESC")
        })
    }

    pub fn list_unapproved_accounts(&self) -> Result<Vec<AccountRow>> {
        self.with_conn(|conn| {
            query_accounts(
                conn,
                "WHERE active = 1 AND approved = 0 ORDER BY created_at DESC, rowid DESC",
            )
        })
    }

    pub fn list_active_accounts(&self) -> Result<Vec<AccountRow>> {
        self.with_conn(|conn| query_accounts(conn, "WHERE active = 1 ORDER BY handle ASC"))
    }

    // -- Admins --

    pub fn create_admin(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        last_name: &str,
        first_name: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admins (id, username, password, last_name, first_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    username,
                    password_hash,
                    last_name,
                    first_name,
                    timestamp(Utc::now())
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, last_name, first_name, created_at
                 FROM admins WHERE username = ?1",
                [username],
                |row| {
                    Ok(AdminRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        last_name: row.get(3)?,
                        first_name: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, recipient_username, content, validated, private, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id.to_string(),
                    msg.sender_id.to_string(),
                    msg.recipient_id.map(|id| id.to_string()),
                    msg.recipient_username,
                    msg.content,
                    msg.validated,
                    msg.recipient_username.is_some(),
                    timestamp(Utc::now())
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, &id.to_string()))
    }

    /// Marks a pending message validated and returns the updated row. The
    /// read, the update and the re-read happen in one transaction.
    pub fn validate_message(&self, id: Uuid, admin_id: Uuid) -> Result<ValidateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = id.to_string();

            let validated: Option<bool> = tx
                .query_row("SELECT validated FROM messages WHERE id = ?1", [&id], |row| row.get(0))
                .optional()?;

            let outcome = match validated {
                None => ValidateOutcome::NotFound,
                Some(true) => ValidateOutcome::AlreadyValidated,
                Some(false) => {
                    tx.execute(
                        "UPDATE messages SET validated = 1, validated_at = ?2, validated_by = ?3 WHERE id = ?1",
                        rusqlite::params![id, timestamp(Utc::now()), admin_id.to_string()],
                    )?;
                    match query_message(&tx, &id)? {
                        Some(row) => ValidateOutcome::Validated(row),
                        None => ValidateOutcome::NotFound,
                    }
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Deletes a message. Returns false if it did not exist.
    pub fn delete_message(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    pub fn list_validated_messages(&self, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.validated = 1 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?1",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Validated messages `username` may read: every public message plus the
    /// private ones they sent or that were addressed to their account when sent.
    /// `recipient_username` is display-only; a private message to a name that was
    /// unknown at send time never becomes readable by a later registrant.
    pub fn list_validated_messages_for(&self, username: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.validated = 1
                   AND (m.private = 0 OR s.username = ?1 OR r.username = ?1)
                 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?2",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![username, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_pending_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.validated = 0 ORDER BY m.created_at DESC, m.rowid DESC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Login history --

    pub fn insert_login_event(&self, event: &LoginEvent<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO login_history (account_id, username, handle, action, created_at, ip_address, user_agent, session_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    event.account_id.to_string(),
                    event.username,
                    event.handle,
                    event.action.as_str(),
                    timestamp(Utc::now()),
                    event.ip_address,
                    event.user_agent,
                    event.session_id.map(|s| s.to_string()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_login_history(&self, username: Option<&str>, limit: u32) -> Result<Vec<LoginRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, username, handle, action, created_at, ip_address, user_agent, session_id
                 FROM login_history
                 WHERE ?1 IS NULL OR username = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![username, limit], |row| {
                    Ok(LoginRow {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        username: row.get(2)?,
                        handle: row.get(3)?,
                        action: row.get(4)?,
                        created_at: row.get(5)?,
                        ip_address: row.get(6)?,
                        user_agent: row.get(7)?,
                        session_id: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Stats --

    pub fn stats(&self) -> Result<Stats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM accounts),
                    (SELECT COUNT(*) FROM accounts WHERE active = 1),
                    (SELECT COUNT(*) FROM accounts WHERE approved = 1),
                    (SELECT COUNT(*) FROM messages),
                    (SELECT COUNT(*) FROM messages WHERE validated = 1),
                    (SELECT COUNT(*) FROM messages WHERE validated = 0)",
                [],
                |row| {
                    Ok(Stats {
                        total_accounts: row.get::<_, i64>(0)? as u64,
                        active_accounts: row.get::<_, i64>(1)? as u64,
                        approved_accounts: row.get::<_, i64>(2)? as u64,
                        total_messages: row.get::<_, i64>(3)? as u64,
                        validated_messages: row.get::<_, i64>(4)? as u64,
                        pending_messages: row.get::<_, i64>(5)? as u64,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        username: row.get(1)?,
        handle: row.get(2)?,
        password: row.get(3)?,
        last_name: row.get(4)?,
        first_name: row.get(5)?,
        active: row.get(6)?,
        approved: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_account(conn: &Connection, column: &str, value: &str) -> Result<Option<AccountRow>> {
    let sql = format!("SELECT {} FROM accounts WHERE {} = ?1", ACCOUNT_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], account_from_row).optional()
}

fn query_accounts(conn: &Connection, clause: &str) -> Result<Vec<AccountRow>> {
    let sql = format!("SELECT {} FROM accounts {}", ACCOUNT_COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], account_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        sender_handle: row.get(3)?,
        sender_last_name: row.get(4)?,
        sender_first_name: row.get(5)?,
        recipient_id: row.get(6)?,
        recipient_username: row.get(7)?,
        recipient_handle: row.get(8)?,
        content: row.get(9)?,
        validated: row.get(10)?,
        private: row.get(11)?,
        created_at: row.get(12)?,
        validated_at: row.get(13)?,
        validated_by: row.get(14)?,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], message_from_row).optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
