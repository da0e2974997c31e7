//! Follow endpoints

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
};

use super::PaginationParams;
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::Page;
use crate::error::AppError;
use crate::service::{FollowService, FollowStatus, FollowUserView};

/// Routes:
/// - POST/DELETE /users/:id/follow
/// - GET /users/:id/follow-status
/// - GET /users/:id/followers
/// - GET /users/:id/following
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/users/:id/follow", post(follow).delete(unfollow))
        .route("/users/:id/follow-status", get(follow_status))
        .route("/users/:id/followers", get(list_followers))
        .route("/users/:id/following", get(list_following))
}

/// POST /api/users/:id/follow
async fn follow(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<FollowStatus>, AppError> {
    let status = FollowService::new(state.db.clone())
        .follow(&principal, id)
        .await?;
    Ok(Json(status))
}

/// DELETE /api/users/:id/follow
async fn unfollow(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<FollowStatus>, AppError> {
    let status = FollowService::new(state.db.clone())
        .unfollow(&principal, id)
        .await?;
    Ok(Json(status))
}

/// GET /api/users/:id/follow-status
async fn follow_status(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<FollowStatus>, AppError> {
    let status = FollowService::new(state.db.clone())
        .status(id, viewer.as_ref())
        .await?;
    Ok(Json(status))
}

/// GET /api/users/:id/followers
async fn list_followers(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<FollowUserView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let followers = FollowService::new(state.db.clone())
        .list_followers(id, viewer.as_ref(), page)
        .await?;
    Ok(Json(followers))
}

/// GET /api/users/:id/following
async fn list_following(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<FollowUserView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let following = FollowService::new(state.db.clone())
        .list_following(id, page)
        .await?;
    Ok(Json(following))
}
