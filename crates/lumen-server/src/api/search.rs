use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use lumen_shared::constants::{SEARCH_POST_LIMIT, SEARCH_USER_LIMIT};
use lumen_shared::views::SearchResults;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Case-insensitive substring search over usernames and captions.
pub async fn search(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>, ServerError> {
    let needle = query.q.trim();
    if needle.is_empty() {
        return Ok(Json(SearchResults::default()));
    }

    let db = state.db.lock().await;
    Ok(Json(SearchResults {
        users: db.search_users(needle, SEARCH_USER_LIMIT)?,
        posts: db.search_posts(needle, SEARCH_POST_LIMIT)?,
    }))
}
