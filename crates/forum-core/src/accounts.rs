use forum_crypto::password::verify_password;
use forum_db::Database;
use forum_db::models::GateUpdate;
use forum_types::error::{ForumError, ForumResult};
use forum_types::models::{Account, AccountCredentials};
use tracing::info;
use uuid::Uuid;

use crate::required;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;

/// Profile fields for a new account. The password is already hashed.
pub struct Registration<'a> {
    pub username: &'a str,
    pub handle: &'a str,
    pub password_hash: &'a str,
    pub last_name: &'a str,
    pub first_name: &'a str,
}

/// Create an inactive, unapproved account.
pub fn register(db: &Database, reg: &Registration<'_>) -> ForumResult<Uuid> {
    let username = required(reg.username, "username")?;
    let handle = required(reg.handle, "handle")?;
    let last_name = required(reg.last_name, "last_name")?;
    let first_name = required(reg.first_name, "first_name")?;
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username.chars().count()) {
        return Err(ForumError::Validation(format!(
            "username must be {}-{} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }

    let id = Uuid::new_v4();
    db.create_account(id, username, handle, reg.password_hash, last_name, first_name)
        .map_err(|e| match forum_db::unique_violation(&e).as_deref() {
            Some("accounts.username") => ForumError::Conflict("username already exists".into()),
            Some("accounts.handle") => ForumError::Conflict("handle already exists".into()),
            Some(_) => ForumError::Conflict("account already exists".into()),
            None => ForumError::Internal(e),
        })?;

    info!("Account {} ({}) registered, awaiting activation", username, id);
    Ok(id)
}

pub fn find(db: &Database, username: &str) -> ForumResult<Option<Account>> {
    db.get_account_by_username(username)?
        .map(Account::try_from)
        .transpose()
        .map_err(ForumError::Internal)
}

pub fn get(db: &Database, username: &str) -> ForumResult<Account> {
    find(db, username)?.ok_or_else(|| ForumError::NotFound(format!("unknown account {}", username)))
}

/// First gate: the account may log in. Re-activating is a no-op.
pub fn activate(db: &Database, username: &str) -> ForumResult<()> {
    let username = required(username, "username")?;
    match db.activate_account(username)? {
        GateUpdate::Updated => {
            info!("Account {} activated", username);
            Ok(())
        }
        GateUpdate::NotFound | GateUpdate::NotActive => {
            Err(ForumError::NotFound(format!("unknown account {}", username)))
        }
    }
}

/// Second gate: the account's messages skip moderation. Requires the first.
pub fn approve(db: &Database, username: &str) -> ForumResult<()> {
    let username = required(username, "username")?;
    match db.approve_account(username)? {
        GateUpdate::Updated => {
            info!("Account {} approved, messages now distribute automatically", username);
            Ok(())
        }
        GateUpdate::NotFound => Err(ForumError::NotFound(format!("unknown account {}", username))),
        GateUpdate::NotActive => Err(ForumError::PreconditionFailed(
            "account must be activated before it can be approved".into(),
        )),
    }
}

/// Check credentials. Unknown usernames and wrong passwords are
/// indistinguishable to the caller.
pub fn authenticate(db: &Database, username: &str, password: &str) -> ForumResult<Account> {
    let username = required(username, "username")?;
    required(password, "password")?;

    let creds: AccountCredentials = db
        .get_account_by_username(username)?
        .map(AccountCredentials::try_from)
        .transpose()?
        .ok_or_else(|| ForumError::Unauthorized("invalid credentials".into()))?;

    if !verify_password(password, &creds.password_hash)? {
        return Err(ForumError::Unauthorized("invalid credentials".into()));
    }

    if !creds.account.active {
        return Err(ForumError::Forbidden(
            "account is not activated yet, contact an administrator".into(),
        ));
    }

    Ok(creds.account)
}

fn collect(rows: Vec<forum_db::models::AccountRow>) -> ForumResult<Vec<Account>> {
    rows.into_iter()
        .map(Account::try_from)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ForumError::Internal)
}

/// Accounts waiting for the first gate, newest first.
pub fn pending_activation(db: &Database) -> ForumResult<Vec<Account>> {
    collect(db.list_inactive_accounts()?)
}

/// Active accounts waiting for the second gate, newest first.
pub fn pending_approval(db: &Database) -> ForumResult<Vec<Account>> {
    collect(db.list_unapproved_accounts()?)
}

/// All active accounts, ordered by handle.
pub fn active(db: &Database) -> ForumResult<Vec<Account>> {
    collect(db.list_active_accounts()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_crypto::password::hash_password;

    fn reg<'a>(username: &'a str, handle: &'a str, hash: &'a str) -> Registration<'a> {
        Registration {
            username,
            handle,
            password_hash: hash,
            last_name: "Alami",
            first_name: "Ahmed",
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let db = Database::open_in_memory().unwrap();
        register(&db, &reg("etudiant1", "pseudo1", "h")).unwrap();

        let err = register(&db, &reg("etudiant1", "other", "h")).unwrap_err();
        assert!(matches!(err, ForumError::Conflict(ref m) if m.contains("username")));

        let err = register(&db, &reg("etudiant2", "pseudo1", "h")).unwrap_err();
        assert!(matches!(err, ForumError::Conflict(ref m) if m.contains("handle")));
    }

    #[test]
    fn register_requires_fields() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            register(&db, &reg("etudiant1", "  ", "h")),
            Err(ForumError::Validation(_))
        ));
        assert!(matches!(
            register(&db, &reg("ab", "pseudo", "h")),
            Err(ForumError::Validation(_))
        ));
    }

    #[test]
    fn activate_is_idempotent_and_checks_existence() {
        let db = Database::open_in_memory().unwrap();
        register(&db, &reg("etudiant1", "pseudo1", "h")).unwrap();
        activate(&db, "etudiant1").unwrap();
        activate(&db, "etudiant1").unwrap();
        assert!(get(&db, "etudiant1").unwrap().active);
        assert!(matches!(activate(&db, "ghost"), Err(ForumError::NotFound(_))));
    }

    #[test]
    fn approve_before_activate_is_a_precondition_failure() {
        let db = Database::open_in_memory().unwrap();
        register(&db, &reg("etudiant3", "pseudo3", "h")).unwrap();

        let err = approve(&db, "etudiant3").unwrap_err();
        assert!(matches!(err, ForumError::PreconditionFailed(_)));
        assert!(!get(&db, "etudiant3").unwrap().approved);

        activate(&db, "etudiant3").unwrap();
        approve(&db, "etudiant3").unwrap();
        approve(&db, "etudiant3").unwrap();
        let account = get(&db, "etudiant3").unwrap();
        assert!(account.active && account.approved);
    }

    #[test]
    fn authenticate_checks_password_then_gate() {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password("password123").unwrap();
        register(&db, &reg("etudiant1", "pseudo1", &hash)).unwrap();

        assert!(matches!(
            authenticate(&db, "etudiant1", "wrong-pass"),
            Err(ForumError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&db, "nobody", "password123"),
            Err(ForumError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&db, "etudiant1", "password123"),
            Err(ForumError::Forbidden(_))
        ));

        activate(&db, "etudiant1").unwrap();
        let account = authenticate(&db, "etudiant1", "password123").unwrap();
        assert_eq!(account.handle, "pseudo1");
    }

    #[test]
    fn gate_views() {
        let db = Database::open_in_memory().unwrap();
        register(&db, &reg("inactive", "p1", "h")).unwrap();
        register(&db, &reg("active", "p2", "h")).unwrap();
        activate(&db, "active").unwrap();

        assert_eq!(pending_activation(&db).unwrap()[0].username, "inactive");
        assert_eq!(pending_approval(&db).unwrap()[0].username, "active");
        assert_eq!(active(&db).unwrap().len(), 1);
    }
}
