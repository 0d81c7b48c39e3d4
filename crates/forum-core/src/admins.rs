use forum_crypto::password::{hash_password, verify_password};
use forum_db::Database;
use forum_types::error::{ForumError, ForumResult};
use forum_types::models::Admin;
use tracing::info;
use uuid::Uuid;

use crate::required;

pub fn authenticate(db: &Database, username: &str, password: &str) -> ForumResult<Admin> {
    let username = required(username, "username")?;
    required(password, "password")?;

    let (admin, hash) = db
        .get_admin_by_username(username)?
        .map(|row| row.into_admin())
        .transpose()?
        .ok_or_else(|| ForumError::Unauthorized("invalid credentials".into()))?;

    if !verify_password(password, &hash)? {
        return Err(ForumError::Unauthorized("invalid credentials".into()));
    }

    Ok(admin)
}

/// Create the bootstrap administrator unless one with that username exists.
/// Returns true when an account was created.
pub fn ensure(db: &Database, username: &str, password: &str) -> ForumResult<bool> {
    let username = required(username, "username")?;
    if db.get_admin_by_username(username)?.is_some() {
        return Ok(false);
    }

    let hash = hash_password(required(password, "password")?)?;
    db.create_admin(Uuid::new_v4(), username, &hash, "Admin", "System")?;
    info!("Bootstrap administrator {} created", username);
    Ok(true)
}
