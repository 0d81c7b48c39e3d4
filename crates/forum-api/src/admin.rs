use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use forum_core::{accounts, admins, audit, store};
use forum_crypto::token::create_token;
use forum_gateway::blocking;
use forum_types::api::{
    AccountActionRequest, ActionResponse, AdminLoginResponse, Claims, LoginRequest,
    MessageActionRequest, Role,
};
use forum_types::error::ForumError;

use crate::AppState;
use crate::error::ApiResult;
use crate::messages::FeedQuery;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub username: Option<String>,
    pub limit: Option<u32>,
}

fn message_id(req: &MessageActionRequest) -> Result<Uuid, ForumError> {
    req.message_id
        .ok_or_else(|| ForumError::Validation("message_id is required".into()))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let admin = blocking(move || admins::authenticate(&db, &req.username, &req.password)).await?;

    let token = create_token(
        &state.jwt_secret,
        admin.id,
        &admin.username,
        Role::Admin,
        Uuid::new_v4(),
        state.token_ttl,
    )?;

    info!("Admin {} logged in", admin.username);
    Ok(Json(AdminLoginResponse { admin, token }))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    Ok(Json(blocking(move || store::stats(&db)).await?))
}

pub async fn pending_accounts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    Ok(Json(blocking(move || accounts::pending_activation(&db)).await?))
}

pub async fn unapproved_accounts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    Ok(Json(blocking(move || accounts::pending_approval(&db)).await?))
}

pub async fn users(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    Ok(Json(blocking(move || accounts::active(&db)).await?))
}

/// Step one: the student may log in, but their messages are still moderated.
pub async fn activate(
    State(state): State<AppState>,
    Json(req): Json<AccountActionRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let username = req.username.clone();
    blocking(move || accounts::activate(&db, &req.username)).await?;
    Ok(Json(ActionResponse::new(format!(
        "Account {} activated. Messages still require validation.",
        username
    ))))
}

/// Step two: the student's messages are distributed without moderation.
pub async fn approve(
    State(state): State<AppState>,
    Json(req): Json<AccountActionRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let username = req.username.clone();
    blocking(move || accounts::approve(&db, &req.username)).await?;
    Ok(Json(ActionResponse::new(format!(
        "Account {} approved. Messages are now distributed automatically.",
        username
    ))))
}

pub async fn pending_messages(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    Ok(Json(blocking(move || store::list_pending(&db)).await?))
}

pub async fn validated_messages(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let limit = query.clamped(state.feed_limit_max);
    Ok(Json(blocking(move || store::list_validated(&db, limit)).await?))
}

pub async fn validate_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MessageActionRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = message_id(&req)?;
    state.gateway.distributor.validate(id, claims.sub).await?;
    Ok(Json(ActionResponse::new("Message validated and distributed")))
}

pub async fn reject_message(
    State(state): State<AppState>,
    Json(req): Json<MessageActionRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = message_id(&req)?;
    state.gateway.distributor.reject(id).await?;
    Ok(Json(ActionResponse::new("Message rejected")))
}

pub async fn login_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let limit = query
        .limit
        .unwrap_or(audit::DEFAULT_HISTORY_LIMIT)
        .min(state.feed_limit_max);
    let records = blocking(move || audit::history(&db, query.username.as_deref(), limit)).await?;
    Ok(Json(records))
}
