use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use forum_core::accounts::{self, Registration};
use forum_core::audit;
use forum_crypto::password::hash_password;
use forum_crypto::token::create_token;
use forum_gateway::blocking;
use forum_types::api::{
    ActionResponse, Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, Role,
};
use forum_types::error::ForumError;
use forum_types::models::LoginAction;

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::ClientOrigin;

pub const PASSWORD_MIN_LEN: usize = 8;

/// Register a student. The account starts inactive until an admin activates it.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ForumError::Validation(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_LEN
        ))
        .into());
    }

    let db = state.db.clone();
    let account_id = blocking(move || {
        // Argon2 is deliberately slow; keep it off the async workers too.
        let password_hash = hash_password(&req.password)?;
        accounts::register(
            &db,
            &Registration {
                username: &req.username,
                handle: &req.handle,
                password_hash: &password_hash,
                last_name: &req.last_name,
                first_name: &req.first_name,
            },
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            account_id,
            status: "inactive".into(),
            message: "Registration complete. An administrator will activate your account.".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let session_id = Uuid::new_v4();
    let account = blocking(move || {
        let account = accounts::authenticate(&db, &req.username, &req.password)?;
        audit::record(&db, &account, LoginAction::Login, &origin, Some(session_id))?;
        Ok(account)
    })
    .await?;

    let token = create_token(
        &state.jwt_secret,
        account.id,
        &account.username,
        Role::Student,
        session_id,
        state.token_ttl,
    )?;

    info!("{} logged in (session {})", account.username, session_id);
    Ok(Json(LoginResponse {
        account,
        session_id,
        token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientOrigin(origin): ClientOrigin,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let username = claims.username.clone();
    blocking(move || {
        let account = accounts::get(&db, &claims.username)?;
        audit::record(&db, &account, LoginAction::Logout, &origin, Some(claims.sid))
    })
    .await?;

    info!("{} logged out", username);
    Ok(Json(ActionResponse::new("Logged out")))
}
