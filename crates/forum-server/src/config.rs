use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub admin_username: String,
    /// Bootstrap administrator password; no admin is created when unset.
    pub admin_password: Option<String>,
    pub feed_limit_max: u32,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = var_or("FORUM_PORT", "5000")
            .parse()
            .context("FORUM_PORT must be a port number")?;
        let ttl_hours: i64 = var_or("FORUM_TOKEN_TTL_HOURS", "24")
            .parse()
            .context("FORUM_TOKEN_TTL_HOURS must be an integer")?;
        let feed_limit_max = var_or("FORUM_FEED_LIMIT_MAX", "200")
            .parse()
            .context("FORUM_FEED_LIMIT_MAX must be an integer")?;

        Ok(Self {
            host: var_or("FORUM_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var_or("FORUM_DB_PATH", "forum.db")),
            jwt_secret: var_or("FORUM_JWT_SECRET", DEV_JWT_SECRET),
            token_ttl: chrono::Duration::hours(ttl_hours),
            admin_username: var_or("FORUM_ADMIN_USERNAME", "admin"),
            admin_password: std::env::var("FORUM_ADMIN_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            feed_limit_max,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
