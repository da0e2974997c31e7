//! API layer
//!
//! Thin HTTP handlers mapping JSON and multipart requests onto the services:
//! - Threads and media uploads
//! - Comments
//! - Follows
//! - Feed, timelines, trending and search
//! - Metrics (Prometheus)

mod comments;
mod discovery;
pub mod metrics;
mod threads;
mod users;

use axum::Router;
use serde::Deserialize;

use crate::AppState;
use crate::config::PaginationConfig;
use crate::data::PageRequest;

pub use metrics::{metrics_router, track_http_metrics};

/// `page` / `size` query parameters shared by every listing
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PaginationParams {
    /// Resolve against configured limits, falling back to the default size
    pub fn resolve(&self, config: &PaginationConfig) -> PageRequest {
        self.resolve_with_default(config, config.default_size)
    }

    /// Resolve with an endpoint-specific default size
    pub fn resolve_with_default(&self, config: &PaginationConfig, default_size: u32) -> PageRequest {
        let max_size = config.max_size.max(1);
        PageRequest {
            page: self.page.unwrap_or(0),
            size: self.size.unwrap_or(default_size).clamp(1, max_size),
        }
    }
}

/// Create the `/api` router
///
/// Routes:
/// - /threads, /threads/media, /threads/:id[/replies|/like|/comments]
/// - /comments, /comments/:id[/replies|/like]
/// - /users/:id/follow, /follow-status, /followers, /following
/// - /profiles/:username/threads, /feed, /timeline
/// - /hashtags/:name/threads, /trending/hashtags, /trending/threads, /search
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(threads::threads_router())
        .merge(comments::comments_router())
        .merge(users::users_router())
        .merge(discovery::discovery_router())
}
