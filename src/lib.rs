//! Threadline - content graph and discovery engine for a short-form social platform
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Threads, comments, follows                               │
//! │  - Feed, trending, hashtag listings, search                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Hashtag extraction                                       │
//! │  - Content store, social graph, discovery                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - Blob storage (local filesystem or R2)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Database layer
//! - `storage`: Media blob storage
//! - `auth`: Bearer token identity
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request. Holds no mutable in-memory state;
/// everything durable lives in the database and blob store.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Media blob storage
    pub blobs: Arc<dyn storage::BlobStore>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Build the configured blob store
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        let blobs = storage::build_blob_store(&config.storage).await?;
        tracing::info!(backend = ?config.storage.backend, "Blob storage initialized");

        tracing::info!("Application state initialized successfully");
        Ok(Self::from_parts(config, Arc::new(db), blobs))
    }

    /// Assemble state from already-initialized parts
    pub fn from_parts(
        config: config::AppConfig,
        db: Arc<data::Database>,
        blobs: Arc<dyn storage::BlobStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            blobs,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower::ServiceBuilder;
    use tower_http::{
        compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
    };

    let mut router = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest(
            "/api",
            api::api_router().route_layer(middleware::from_fn(api::track_http_metrics)),
        );

    let storage = &state.config.storage;
    if storage.backend == config::StorageBackend::Local {
        router = router.nest_service(
            &storage.local.public_path,
            ServeDir::new(&storage.local.root),
        );
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
