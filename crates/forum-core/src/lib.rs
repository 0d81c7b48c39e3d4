//! Account gating and message moderation rules over the forum database.
//!
//! Every function here is synchronous and runs a short critical section on
//! the database connection. Async callers should use `spawn_blocking`.

pub mod accounts;
pub mod admins;
pub mod audit;
pub mod store;

use forum_types::error::ForumError;

/// Trim and require a non-empty value.
pub(crate) fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, ForumError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ForumError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}
