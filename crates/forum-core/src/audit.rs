use forum_db::Database;
use forum_db::models::LoginEvent;
use forum_types::error::{ForumError, ForumResult};
use forum_types::models::{Account, LoginAction, LoginRecord};
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Where a login or logout came from.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Append a login/logout entry. The trail is never updated or pruned.
pub fn record(
    db: &Database,
    account: &Account,
    action: LoginAction,
    origin: &Origin,
    session_id: Option<Uuid>,
) -> ForumResult<()> {
    db.insert_login_event(&LoginEvent {
        account_id: account.id,
        username: &account.username,
        handle: &account.handle,
        action,
        ip_address: origin.ip_address.as_deref(),
        user_agent: origin.user_agent.as_deref(),
        session_id,
    })?;
    info!("{} recorded for {}", action.as_str(), account.username);
    Ok(())
}

/// Newest-first audit entries, optionally for one username.
pub fn history(db: &Database, username: Option<&str>, limit: u32) -> ForumResult<Vec<LoginRecord>> {
    db.list_login_history(username, limit)?
        .into_iter()
        .map(LoginRecord::try_from)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ForumError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{self, Registration};

    #[test]
    fn records_round_trip_through_history() {
        let db = Database::open_in_memory().unwrap();
        accounts::register(
            &db,
            &Registration {
                username: "etudiant1",
                handle: "pseudo1",
                password_hash: "h",
                last_name: "Alami",
                first_name: "Ahmed",
            },
        )
        .unwrap();
        let account = accounts::get(&db, "etudiant1").unwrap();
        let origin = Origin {
            ip_address: Some("10.0.0.7".into()),
            user_agent: Some("curl/8.0".into()),
        };
        let sid = Uuid::new_v4();

        record(&db, &account, LoginAction::Login, &origin, Some(sid)).unwrap();
        record(&db, &account, LoginAction::Logout, &origin, Some(sid)).unwrap();

        let entries = history(&db, Some("etudiant1"), DEFAULT_HISTORY_LIMIT).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, LoginAction::Logout);
        assert_eq!(entries[1].session_id, Some(sid));
        assert_eq!(entries[1].ip_address.as_deref(), Some("10.0.0.7"));
        assert!(history(&db, Some("someone-else"), 10).unwrap().is_empty());
    }
}
