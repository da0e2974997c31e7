//! Thread endpoints

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use super::PaginationParams;
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::Page;
use crate::error::AppError;
use crate::service::{
    CommentService, CommentView, LikeStatus, MediaUpload, ThreadService, ThreadView,
};

/// Upper bound for a whole multipart thread request
const MAX_MEDIA_REQUEST_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    pub content: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    pub content: String,
}

/// Routes:
/// - POST /threads
/// - POST /threads/media
/// - GET/PUT/DELETE /threads/:id
/// - GET /threads/:id/replies
/// - POST/DELETE /threads/:id/like
/// - GET /threads/:id/comments
pub fn threads_router() -> Router<AppState> {
    Router::new()
        .route("/threads", post(create_thread))
        .route(
            "/threads/media",
            post(create_thread_with_media).layer(
                ServiceBuilder::new()
                    .layer(DefaultBodyLimit::disable())
                    .layer(RequestBodyLimitLayer::new(MAX_MEDIA_REQUEST_BYTES)),
            ),
        )
        .route(
            "/threads/:id",
            get(get_thread).put(update_thread).delete(delete_thread),
        )
        .route("/threads/:id/replies", get(get_replies))
        .route("/threads/:id/like", post(like_thread).delete(unlike_thread))
        .route("/threads/:id/comments", get(list_thread_comments))
}

fn thread_service(state: &AppState) -> ThreadService {
    ThreadService::new(state.db.clone(), state.blobs.clone())
}

/// POST /api/threads
async fn create_thread(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(request): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ThreadView>), AppError> {
    let thread = thread_service(&state)
        .create(&principal, &request.content, request.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// POST /api/threads/media
///
/// Multipart fields: `content`, optional `parentId`, and any number of `media` files.
async fn create_thread_with_media(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ThreadView>), AppError> {
    let mut content: Option<String> = None;
    let mut parent_id: Option<i64> = None;
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "content" => {
                content = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read content: {}", e))
                })?);
            }
            "parentId" => {
                let raw = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read parentId: {}", e))
                })?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    parent_id = Some(raw.parse().map_err(|_| {
                        AppError::Validation(format!("Invalid parentId: {}", raw))
                    })?);
                }
            }
            "media" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {}", e)))?;
                uploads.push(MediaUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let content = content.ok_or(AppError::Validation("Content is required".to_string()))?;
    let thread = thread_service(&state)
        .create_with_media(&principal, &content, parent_id, uploads)
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// GET /api/threads/:id
async fn get_thread(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<ThreadView>, AppError> {
    let thread = thread_service(&state).get(id, viewer.as_ref()).await?;
    Ok(Json(thread))
}

/// PUT /api/threads/:id
async fn update_thread(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateContentRequest>,
) -> Result<Json<ThreadView>, AppError> {
    let thread = thread_service(&state)
        .update(id, &request.content, &principal)
        .await?;
    Ok(Json(thread))
}

/// DELETE /api/threads/:id
async fn delete_thread(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    thread_service(&state).delete(id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/threads/:id/replies
async fn get_replies(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<ThreadView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let replies = thread_service(&state)
        .replies(id, viewer.as_ref(), page)
        .await?;
    Ok(Json(replies))
}

/// POST /api/threads/:id/like
async fn like_thread(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeStatus>, AppError> {
    Ok(Json(thread_service(&state).like(id, &principal).await?))
}

/// DELETE /api/threads/:id/like
async fn unlike_thread(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeStatus>, AppError> {
    Ok(Json(thread_service(&state).unlike(id, &principal).await?))
}

/// GET /api/threads/:id/comments
async fn list_thread_comments(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<CommentView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let comments = CommentService::new(state.db.clone())
        .list_top_level(id, viewer.as_ref(), page)
        .await?;
    Ok(Json(comments))
}
