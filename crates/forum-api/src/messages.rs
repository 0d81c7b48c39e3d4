use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use forum_core::store;
use forum_gateway::blocking;
use forum_types::api::Claims;

use crate::AppState;
use crate::error::ApiResult;

pub const DEFAULT_FEED_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
}

impl FeedQuery {
    pub fn clamped(&self, max: u32) -> u32 {
        self.limit.unwrap_or(DEFAULT_FEED_LIMIT).min(max)
    }
}

/// Validated messages the caller may read, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let limit = query.clamped(state.feed_limit_max);
    let messages =
        blocking(move || store::list_validated_for(&db, &claims.username, limit)).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_limit_defaults_and_clamps() {
        assert_eq!(FeedQuery { limit: None }.clamped(200), DEFAULT_FEED_LIMIT);
        assert_eq!(FeedQuery { limit: Some(5) }.clamped(200), 5);
        assert_eq!(FeedQuery { limit: Some(10_000) }.clamped(200), 200);
    }
}
