pub mod admin;
pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
};

use forum_db::Database;
use forum_gateway::connection::{self, GatewayContext};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub gateway: GatewayContext,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub feed_limit_max: u32,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, jwt_secret: &str, token_ttl: chrono::Duration, feed_limit_max: u32) -> Self {
        Self {
            gateway: GatewayContext::new(db.clone(), jwt_secret),
            db,
            jwt_secret: jwt_secret.to_string(),
            token_ttl,
            feed_limit_max,
        }
    }
}

/// All forum routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/admin/login", post(admin::login));

    let student_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/messages", get(messages::get_messages))
        .layer(axum_mw::from_fn_with_state(state.clone(), middleware::require_student));

    let admin_routes = Router::new()
        .route("/admin/stats", get(admin::stats))
        .route("/admin/pending_accounts", get(admin::pending_accounts))
        .route("/admin/unapproved_accounts", get(admin::unapproved_accounts))
        .route("/admin/users", get(admin::users))
        .route("/admin/activate", post(admin::activate))
        .route("/admin/approve", post(admin::approve))
        .route("/admin/pending_messages", get(admin::pending_messages))
        .route("/admin/messages", get(admin::validated_messages))
        .route("/admin/validate_message", post(admin::validate_message))
        .route("/admin/reject_message", post(admin::reject_message))
        .route("/admin/login_history", get(admin::login_history))
        .layer(axum_mw::from_fn_with_state(state.clone(), middleware::require_admin));

    Router::new()
        .merge(public_routes)
        .merge(student_routes)
        .merge(admin_routes)
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let ctx = state.gateway.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}
