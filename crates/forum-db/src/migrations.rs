use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                handle      TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                first_name  TEXT NOT NULL,
                active      INTEGER NOT NULL DEFAULT 0,
                approved    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE admins (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                first_name  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE messages (
                id                  TEXT PRIMARY KEY,
                sender_id           TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                recipient_id        TEXT REFERENCES accounts(id) ON DELETE CASCADE,
                recipient_username  TEXT,
                content             TEXT NOT NULL,
                validated           INTEGER NOT NULL DEFAULT 0,
                private             INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                validated_at        TEXT,
                validated_by        TEXT REFERENCES admins(id) ON DELETE SET NULL
            );

            CREATE INDEX idx_messages_validated
                ON messages(validated, created_at);

            CREATE TABLE login_history (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id  TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                username    TEXT NOT NULL,
                handle      TEXT NOT NULL,
                action      TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                ip_address  TEXT,
                user_agent  TEXT,
                session_id  TEXT
            );

            CREATE INDEX idx_login_history_username
                ON login_history(username, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
