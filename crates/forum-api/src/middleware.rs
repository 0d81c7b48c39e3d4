use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, UserAgent, authorization::Bearer};

use forum_core::audit::Origin;
use forum_crypto::token::decode_token;
use forum_types::api::{Claims, Role};
use forum_types::error::ForumError;

use crate::AppState;
use crate::error::ApiError;

fn authorize(state: &AppState, req: &Request, role: Role) -> Result<Claims, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| ForumError::Unauthorized("missing bearer token".into()))?;

    let claims = decode_token(&state.jwt_secret, bearer.token())
        .map_err(|_| ForumError::Unauthorized("invalid or expired token".into()))?;

    if claims.role != role {
        return Err(ForumError::Forbidden("insufficient role".into()).into());
    }
    Ok(claims)
}

/// Validate a student JWT and expose its claims to the handler.
pub async fn require_student(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = authorize(&state, &req, Role::Student)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Validate an admin JWT and expose its claims to the handler.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = authorize(&state, &req, Role::Admin)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Network origin and client descriptor of a request, for the login audit.
/// The peer address is only known when the server was started with connect info.
pub struct ClientOrigin(pub Origin);

impl<S: Send + Sync> FromRequestParts<S> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let user_agent = parts
            .headers
            .typed_get::<UserAgent>()
            .map(|ua| ua.as_str().to_string());

        Ok(ClientOrigin(Origin {
            ip_address,
            user_agent,
        }))
    }
}
