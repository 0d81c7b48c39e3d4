mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use forum_api::{AppStateInner, router};
use forum_core::admins;
use forum_db::Database;

use crate::config::{Config, DEV_JWT_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "forum=debug,forum_gateway=debug,forum_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == DEV_JWT_SECRET {
        warn!("FORUM_JWT_SECRET is not set, using the development secret");
    }

    let db = Arc::new(Database::open(&config.db_path)?);

    match &config.admin_password {
        Some(password) => {
            if !admins::ensure(&db, &config.admin_username, password)? {
                info!("Administrator {} already exists", config.admin_username);
            }
        }
        None => info!("FORUM_ADMIN_PASSWORD not set, skipping admin bootstrap"),
    }

    let state = Arc::new(AppStateInner::new(
        db,
        &config.jwt_secret,
        config.token_ttl,
        config.feed_limit_max,
    ));

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Forum server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
