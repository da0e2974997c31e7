//! Comment endpoints

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;

use super::PaginationParams;
use super::threads::UpdateContentRequest;
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::Page;
use crate::error::AppError;
use crate::service::{CommentService, CommentView, LikeStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub thread_id: i64,
    pub parent_id: Option<i64>,
}

pub fn comments_router() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_comment))
        .route(
            "/comments/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .route("/comments/:id/replies", get(list_replies))
        .route(
            "/comments/:id/like",
            post(like_comment).delete(unlike_comment),
        )
}

fn comment_service(state: &AppState) -> CommentService {
    CommentService::new(state.db.clone())
}

async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let comment = comment_service(&state)
        .create(
            &principal,
            &request.content,
            request.thread_id,
            request.parent_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_comment(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<CommentView>, AppError> {
    Ok(Json(comment_service(&state).get(id, viewer.as_ref()).await?))
}

async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateContentRequest>,
) -> Result<Json<CommentView>, AppError> {
    let comment = comment_service(&state)
        .update(id, &request.content, &principal)
        .await?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    comment_service(&state).delete(id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_replies(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<CommentView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let replies = comment_service(&state)
        .list_replies(id, viewer.as_ref(), page)
        .await?;
    Ok(Json(replies))
}

async fn like_comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeStatus>, AppError> {
    Ok(Json(comment_service(&state).like(id, &principal).await?))
}

async fn unlike_comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeStatus>, AppError> {
    Ok(Json(comment_service(&state).unlike(id, &principal).await?))
}
