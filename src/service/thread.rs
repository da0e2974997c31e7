//! Thread service
//!
//! Handles thread operations including create (with or without media),
//! fetch, edit, soft delete, likes, and reply listings.

use std::sync::Arc;

use crate::auth::{Principal, ensure_author};
use crate::data::{
    Database, MediaType, NewMedia, NewThread, Page, PageRequest, ThreadFilter, ThreadOrder,
};
use crate::error::AppError;
use crate::metrics::{
    BLOB_DELETE_FAILURES_TOTAL, LIKES_TOTAL, MEDIA_BYTES_UPLOADED, MEDIA_UPLOADS_TOTAL,
    THREADS_CREATED_TOTAL,
};
use crate::storage::BlobStore;

use super::projection::{LikeStatus, ThreadView, thread_page, thread_view};
use super::{MAX_THREAD_CHARS, hashtag, validate_content};

/// One attachment received alongside thread content
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Thread service
pub struct ThreadService {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
}

impl ThreadService {
    pub fn new(db: Arc<Database>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Create a thread, or a reply when `parent_id` is set
    ///
    /// # Errors
    /// - `Validation` for blank or oversized content
    /// - `NotFound` when the parent is absent or soft-deleted
    ///
    /// # Side Effects
    /// Hashtags in `content` are created or incremented in the same transaction.
    pub async fn create(
        &self,
        author: &Principal,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<ThreadView, AppError> {
        self.create_with_media(author, content, parent_id, Vec::new())
            .await
    }

    /// Create a thread and attach each non-empty upload as media
    ///
    /// Blobs are written before the database transaction. If any upload or
    /// the transaction fails, blobs already written for this request are
    /// deleted best-effort and no thread is created.
    pub async fn create_with_media(
        &self,
        author: &Principal,
        content: &str,
        parent_id: Option<i64>,
        uploads: Vec<MediaUpload>,
    ) -> Result<ThreadView, AppError> {
        validate_content(content, MAX_THREAD_CHARS)?;

        if let Some(parent_id) = parent_id {
            if self.db.get_live_thread(parent_id).await?.is_none() {
                return Err(AppError::not_found("Thread", parent_id));
            }
        }

        let media = self.store_uploads(uploads).await?;
        let tags = hashtag::extract(content);
        tracing::debug!(tags = ?tags, "Extracted hashtags");

        let new_thread = NewThread {
            content: content.to_string(),
            user_id: author.user_id,
            parent_id,
        };
        let thread = match self.db.insert_thread(&new_thread, &tags, &media).await {
            Ok(thread) => thread,
            Err(error) => {
                self.discard_blobs(media.iter().map(|m| m.media_url.as_str()))
                    .await;
                return Err(error);
            }
        };

        THREADS_CREATED_TOTAL.inc();
        tracing::info!(
            thread_id = thread.id,
            user_id = author.user_id,
            media = media.len(),
            "Thread created"
        );

        thread_view(&self.db, thread, Some(author.user_id)).await
    }

    /// Fetch a live thread, counting one view
    pub async fn get(&self, id: i64, viewer: Option<&Principal>) -> Result<ThreadView, AppError> {
        let thread = self
            .db
            .increment_thread_views(id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", id))?;

        thread_view(&self.db, thread, viewer.map(|p| p.user_id)).await
    }

    /// Replace a thread's content and hashtag set
    ///
    /// Soft-deleted threads can still be edited by their author.
    pub async fn update(
        &self,
        id: i64,
        content: &str,
        actor: &Principal,
    ) -> Result<ThreadView, AppError> {
        let thread = self
            .db
            .get_thread(id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", id))?;
        ensure_author(actor, thread.user_id, "thread")?;
        validate_content(content, MAX_THREAD_CHARS)?;

        let tags = hashtag::extract(content);
        let updated = self.db.update_thread_content(id, content, &tags).await?;
        tracing::info!(thread_id = id, "Thread updated");

        thread_view(&self.db, updated, Some(actor.user_id)).await
    }

    /// Soft-delete a thread and purge its media
    ///
    /// Replies are left untouched. Blob deletion failures are logged and
    /// never fail the operation.
    pub async fn delete(&self, id: i64, actor: &Principal) -> Result<(), AppError> {
        let thread = self
            .db
            .get_thread(id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", id))?;
        ensure_author(actor, thread.user_id, "thread")?;

        let purged = self.db.soft_delete_thread(id).await?;
        self.discard_blobs(purged.iter().map(|m| m.media_url.as_str()))
            .await;

        tracing::info!(thread_id = id, media = purged.len(), "Thread deleted");
        Ok(())
    }

    // =========================================================================
    // Likes
    // =========================================================================

    pub async fn like(&self, id: i64, actor: &Principal) -> Result<LikeStatus, AppError> {
        self.require_live(id).await?;

        if self.db.insert_like(actor.user_id, id).await? {
            LIKES_TOTAL.with_label_values(&["thread"]).inc();
        }
        let like_count = self.db.count_thread_likes(id).await?;

        Ok(LikeStatus {
            liked: true,
            like_count,
        })
    }

    pub async fn unlike(&self, id: i64, actor: &Principal) -> Result<LikeStatus, AppError> {
        self.require_live(id).await?;

        self.db.delete_like(actor.user_id, id).await?;
        let like_count = self.db.count_thread_likes(id).await?;

        Ok(LikeStatus {
            liked: false,
            like_count,
        })
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// Live direct replies, newest first
    ///
    /// Only an absent parent is an error; a soft-deleted parent still lists
    /// its replies.
    pub async fn replies(
        &self,
        id: i64,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<ThreadView>, AppError> {
        if self.db.get_thread(id).await?.is_none() {
            return Err(AppError::not_found("Thread", id));
        }

        let rows = self
            .db
            .list_threads(
                &ThreadFilter::Replies { parent_id: id },
                ThreadOrder::Newest,
                page,
            )
            .await?;
        thread_page(&self.db, rows, page, viewer.map(|p| p.user_id)).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_live(&self, id: i64) -> Result<(), AppError> {
        match self.db.get_live_thread(id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("Thread", id)),
        }
    }

    async fn store_uploads(&self, uploads: Vec<MediaUpload>) -> Result<Vec<NewMedia>, AppError> {
        let mut stored: Vec<NewMedia> = Vec::with_capacity(uploads.len());

        for upload in uploads {
            if upload.bytes.is_empty() {
                continue;
            }

            let media_type = MediaType::from_filename(&upload.file_name);
            let size = upload.bytes.len();
            match self.blobs.store(upload.bytes, &upload.file_name).await {
                Ok(media_url) => {
                    MEDIA_UPLOADS_TOTAL.inc();
                    MEDIA_BYTES_UPLOADED.inc_by(size as f64);
                    stored.push(NewMedia {
                        media_type,
                        media_url,
                        media_alt: Some(upload.file_name),
                    });
                }
                Err(error) => {
                    tracing::error!(%error, file = %upload.file_name, "Media upload failed");
                    self.discard_blobs(stored.iter().map(|m| m.media_url.as_str()))
                        .await;
                    return Err(error);
                }
            }
        }

        Ok(stored)
    }

    async fn discard_blobs<'a>(&self, urls: impl Iterator<Item = &'a str>) {
        for url in urls {
            if let Err(error) = self.blobs.delete(url).await {
                BLOB_DELETE_FAILURES_TOTAL.inc();
                tracing::warn!(%error, url, "Failed to delete media blob");
            }
        }
    }
}
