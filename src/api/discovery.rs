//! Feed, timeline, hashtag, trending and search endpoints

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use serde::Deserialize;

use super::PaginationParams;
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::{Page, PageRequest};
use crate::error::AppError;
use crate::service::{DiscoveryService, HashtagView, SearchResults, ThreadView, WindowedPage};

#[derive(Debug, Deserialize)]
pub struct TimeframeParams {
    pub timeframe: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub fn discovery_router() -> Router<AppState> {
    Router::new()
        .route("/feed", get(feed))
        .route("/timeline", get(public_timeline))
        .route("/profiles/:username/threads", get(threads_by_user))
        .route("/hashtags/:name/threads", get(threads_by_hashtag))
        .route("/trending/hashtags", get(trending_hashtags))
        .route("/trending/threads", get(trending_threads))
        .route("/search", get(search))
}

/// GET /api/feed
async fn feed(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<ThreadView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let feed = DiscoveryService::new(state.db.clone())
        .feed(&principal, page)
        .await?;
    Ok(Json(feed))
}

/// GET /api/timeline
async fn public_timeline(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<ThreadView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let timeline = DiscoveryService::new(state.db.clone())
        .public_timeline(viewer.as_ref(), page)
        .await?;
    Ok(Json(timeline))
}

/// GET /api/profiles/:username/threads
async fn threads_by_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Page<ThreadView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let threads = DiscoveryService::new(state.db.clone())
        .threads_by_user(&username, viewer.as_ref(), page)
        .await?;
    Ok(Json(threads))
}

/// GET /api/hashtags/:name/threads
async fn threads_by_hashtag(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(name): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<WindowedPage<ThreadView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let threads = DiscoveryService::new(state.db.clone())
        .threads_by_hashtag(&name, viewer.as_ref(), page)
        .await?;
    Ok(Json(threads))
}

/// GET /api/trending/hashtags?timeframe=24h|week|month
async fn trending_hashtags(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(params): Query<TimeframeParams>,
) -> Result<Json<WindowedPage<HashtagView>>, AppError> {
    let page = pagination.resolve_with_default(
        &state.config.pagination,
        PageRequest::DEFAULT_TRENDING_HASHTAG_SIZE,
    );
    let trending = DiscoveryService::new(state.db.clone())
        .trending_hashtags(params.timeframe.as_deref(), page)
        .await?;
    Ok(Json(trending))
}

/// GET /api/trending/threads?timeframe=24h|week|month
async fn trending_threads(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(pagination): Query<PaginationParams>,
    Query(params): Query<TimeframeParams>,
) -> Result<Json<WindowedPage<ThreadView>>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let trending = DiscoveryService::new(state.db.clone())
        .trending_threads(params.timeframe.as_deref(), viewer.as_ref(), page)
        .await?;
    Ok(Json(trending))
}

/// GET /api/search?q=
async fn search(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(pagination): Query<PaginationParams>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, AppError> {
    let page = pagination.resolve(&state.config.pagination);
    let query = params.q.unwrap_or_default();
    let results = DiscoveryService::new(state.db.clone())
        .search(&query, viewer.as_ref(), page)
        .await?;
    Ok(Json(results))
}
