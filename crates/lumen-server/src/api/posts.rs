use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};

use lumen_shared::constants::{EXPLORE_LIMIT, MAX_CAPTION_LENGTH, MAX_COMMENT_LENGTH};
use lumen_shared::types::{PostId, UserId};
use lumen_shared::views::PostView;
use lumen_store::{NotificationKind, PostFilter, StoreError};

use super::{parse_id, AppState};
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Deserialize)]
pub struct ListQuery {
    author_id: Option<String>,
    #[serde(default)]
    following_only: bool,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    image_url: String,
    #[serde(default)]
    caption: String,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    text: String,
}

fn post_not_found(e: StoreError) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound("Post not found".into()),
        other => other.into(),
    }
}

pub async fn list_posts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PostView>>, ServerError> {
    let filter = match query.author_id.as_deref().filter(|id| !id.is_empty()) {
        Some(raw) => PostFilter::Author(parse_id::<UserId>(raw, "author")?),
        None if query.following_only => PostFilter::FollowedBy(auth.user_id),
        None => PostFilter::All,
    };

    let posts = state.db.lock().await.list_posts(filter)?;
    Ok(Json(posts))
}

pub async fn explore(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<PostView>>, ServerError> {
    let posts = state.db.lock().await.explore_posts(EXPLORE_LIMIT)?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<PostView>, ServerError> {
    let id: PostId = parse_id(&raw_id, "post")?;
    let post = state.db.lock().await.post_view(id).map_err(post_not_found)?;
    Ok(Json(post))
}

pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostView>), ServerError> {
    let image_url = req.image_url.trim();
    if image_url.is_empty() {
        return Err(ServerError::BadRequest("Image URL required".into()));
    }
    let caption = req.caption.trim();
    if caption.chars().count() > MAX_CAPTION_LENGTH {
        return Err(ServerError::BadRequest(format!(
            "Caption exceeds {MAX_CAPTION_LENGTH} characters"
        )));
    }

    let db = state.db.lock().await;
    let post = db.create_post(auth.user_id, image_url, caption)?;
    let view = db.post_view(post.id)?;

    info!(post = %post.id.short(), author = %auth.user_id.short(), "Post created");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<PostView>, ServerError> {
    let id: PostId = parse_id(&raw_id, "post")?;

    let (liked, author) = {
        let mut db = state.db.lock().await;
        let author = db.get_post(id).map_err(post_not_found)?.author_id;
        (db.toggle_like(id, auth.user_id).map_err(post_not_found)?, author)
    };
    debug!(post = %id.short(), user = %auth.user_id.short(), liked, "Like toggled");

    if liked {
        state
            .fanout
            .notify(author, auth.user_id, NotificationKind::Like { post_id: id })
            .await;
    }

    let post = state.db.lock().await.post_view(id)?;
    Ok(Json(post))
}

pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<PostView>), ServerError> {
    let id: PostId = parse_id(&raw_id, "post")?;
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ServerError::BadRequest("Text required".into()));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ServerError::BadRequest(format!(
            "Comment exceeds {MAX_COMMENT_LENGTH} characters"
        )));
    }

    let author = {
        let db = state.db.lock().await;
        let author = db.get_post(id).map_err(post_not_found)?.author_id;
        db.add_comment(id, auth.user_id, text).map_err(post_not_found)?;
        author
    };

    state
        .fanout
        .notify(author, auth.user_id, NotificationKind::Comment { post_id: id })
        .await;

    let post = state.db.lock().await.post_view(id)?;
    Ok((StatusCode::CREATED, Json(post)))
}
