//! Comment service
//!
//! Comments hang off a thread and may reply to another comment of the
//! same thread.

use std::sync::Arc;

use crate::auth::{Principal, ensure_author};
use crate::data::{Comment, Database, NewComment, Page, PageRequest};
use crate::error::AppError;
use crate::metrics::LIKES_TOTAL;

use super::projection::{CommentView, LikeStatus, comment_page, comment_view_of};
use super::{MAX_COMMENT_CHARS, validate_content};

/// Comment service
pub struct CommentService {
    db: Arc<Database>,
}

impl CommentService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a comment on a live thread
    ///
    /// # Errors
    /// - `NotFound` when the thread or the parent comment is absent or deleted
    /// - `Validation` when the parent comment belongs to another thread
    pub async fn create(
        &self,
        author: &Principal,
        content: &str,
        thread_id: i64,
        parent_id: Option<i64>,
    ) -> Result<CommentView, AppError> {
        validate_content(content, MAX_COMMENT_CHARS)?;

        if self.db.get_live_thread(thread_id).await?.is_none() {
            return Err(AppError::not_found("Thread", thread_id));
        }
        if let Some(parent_id) = parent_id {
            let parent = self.require_live(parent_id).await?;
            if parent.thread_id != thread_id {
                return Err(AppError::Validation(
                    "Parent comment belongs to a different thread".to_string(),
                ));
            }
        }

        let comment = self
            .db
            .insert_comment(&NewComment {
                content: content.to_string(),
                user_id: author.user_id,
                thread_id,
                parent_id,
            })
            .await?;
        tracing::info!(comment_id = comment.id, thread_id, "Comment created");

        comment_view_of(&self.db, comment, Some(author.user_id)).await
    }

    pub async fn get(&self, id: i64, viewer: Option<&Principal>) -> Result<CommentView, AppError> {
        let comment = self.require_live(id).await?;
        comment_view_of(&self.db, comment, viewer.map(|p| p.user_id)).await
    }

    pub async fn update(
        &self,
        id: i64,
        content: &str,
        actor: &Principal,
    ) -> Result<CommentView, AppError> {
        let comment = self.require_existing(id).await?;
        ensure_author(actor, comment.user_id, "comment")?;
        validate_content(content, MAX_COMMENT_CHARS)?;

        let updated = self
            .db
            .update_comment_content(id, content)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))?;

        comment_view_of(&self.db, updated, Some(actor.user_id)).await
    }

    pub async fn delete(&self, id: i64, actor: &Principal) -> Result<(), AppError> {
        let comment = self.require_existing(id).await?;
        ensure_author(actor, comment.user_id, "comment")?;

        self.db.soft_delete_comment(id).await?;
        tracing::info!(comment_id = id, "Comment deleted");
        Ok(())
    }

    pub async fn like(&self, id: i64, actor: &Principal) -> Result<LikeStatus, AppError> {
        self.require_live(id).await?;

        if self.db.insert_comment_like(actor.user_id, id).await? {
            LIKES_TOTAL.with_label_values(&["comment"]).inc();
        }
        let like_count = self.db.count_comment_likes(id).await?;

        Ok(LikeStatus {
            liked: true,
            like_count,
        })
    }

    pub async fn unlike(&self, id: i64, actor: &Principal) -> Result<LikeStatus, AppError> {
        self.require_live(id).await?;

        self.db.delete_comment_like(actor.user_id, id).await?;
        let like_count = self.db.count_comment_likes(id).await?;

        Ok(LikeStatus {
            liked: false,
            like_count,
        })
    }

    /// Live top-level comments of a live thread, newest first
    pub async fn list_top_level(
        &self,
        thread_id: i64,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<CommentView>, AppError> {
        if self.db.get_live_thread(thread_id).await?.is_none() {
            return Err(AppError::not_found("Thread", thread_id));
        }

        let rows = self.db.list_top_level_comments(thread_id, page).await?;
        comment_page(&self.db, rows, page, viewer.map(|p| p.user_id)).await
    }

    /// Live direct replies of a live comment, newest first
    pub async fn list_replies(
        &self,
        comment_id: i64,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<CommentView>, AppError> {
        self.require_live(comment_id).await?;

        let rows = self.db.list_comment_replies(comment_id, page).await?;
        comment_page(&self.db, rows, page, viewer.map(|p| p.user_id)).await
    }

    async fn require_live(&self, id: i64) -> Result<Comment, AppError> {
        self.db
            .get_live_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))
    }

    async fn require_existing(&self, id: i64) -> Result<Comment, AppError> {
        self.db
            .get_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NewThread;
    use crate::service::test_support::{principal, test_db};
    use std::collections::BTreeSet;

    async fn thread_of(db: &Database, author: &Principal) -> i64 {
        db.insert_thread(
            &NewThread {
                content: "root".to_string(),
                user_id: author.user_id,
                parent_id: None,
            },
            &BTreeSet::new(),
            &[],
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn listing_embeds_three_most_recent_replies() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let ben = principal(&db, "ben").await;
        let thread_id = thread_of(&db, &ana).await;
        let service = CommentService::new(db);

        let parent = service.create(&ana, "parent", thread_id, None).await.unwrap();
        let mut reply_ids = Vec::new();
        for n in 0..4 {
            let reply = service
                .create(&ben, &format!("reply {}", n), thread_id, Some(parent.id))
                .await
                .unwrap();
            reply_ids.push(reply.id);
        }
        service
            .create(&ana, "nested", thread_id, Some(reply_ids[3]))
            .await
            .unwrap();

        let page = service
            .list_top_level(thread_id, Some(&ben), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);

        let listed = &page.items[0];
        assert_eq!(listed.reply_count, 4);
        let recent = listed.recent_replies.as_ref().unwrap();
        let recent_ids: Vec<i64> = recent.iter().map(|r| r.id).collect();
        assert_eq!(recent_ids, vec![reply_ids[3], reply_ids[2], reply_ids[1]]);
        assert!(recent.iter().all(|r| r.recent_replies.is_none()));
        assert_eq!(recent[0].reply_count, 1);
    }

    #[tokio::test]
    async fn create_validates_targets() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let first = thread_of(&db, &ana).await;
        let second = thread_of(&db, &ana).await;
        let service = CommentService::new(db.clone());

        let error = service.create(&ana, "hi", 999, None).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));

        let on_first = service.create(&ana, "first", first, None).await.unwrap();
        let error = service
            .create(&ana, "crossed", second, Some(on_first.id))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));

        service.delete(on_first.id, &ana).await.unwrap();
        let error = service
            .create(&ana, "late", first, Some(on_first.id))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));

        let error = service
            .create(&ana, &"x".repeat(501), first, None)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn ownership_and_soft_delete() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let ben = principal(&db, "ben").await;
        let thread_id = thread_of(&db, &ana).await;
        let service = CommentService::new(db);

        let comment = service.create(&ana, "mine", thread_id, None).await.unwrap();

        let error = service.update(comment.id, "no", &ben).await.unwrap_err();
        assert!(matches!(error, AppError::Forbidden(_)));
        let error = service.delete(comment.id, &ben).await.unwrap_err();
        assert!(matches!(error, AppError::Forbidden(_)));

        let edited = service.update(comment.id, "edited", &ana).await.unwrap();
        assert_eq!(edited.content, "edited");

        service.delete(comment.id, &ana).await.unwrap();
        let error = service.get(comment.id, None).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
        let error = service
            .list_replies(comment.id, None, PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn comment_likes_are_idempotent() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let ben = principal(&db, "ben").await;
        let thread_id = thread_of(&db, &ana).await;
        let service = CommentService::new(db);

        let comment = service.create(&ana, "like me", thread_id, None).await.unwrap();
        service.like(comment.id, &ben).await.unwrap();
        let second = service.like(comment.id, &ben).await.unwrap();
        assert_eq!(second.like_count, 1);

        let viewed = service.get(comment.id, Some(&ben)).await.unwrap();
        assert!(viewed.liked);
        assert_eq!(viewed.like_count, 1);

        let unliked = service.unlike(comment.id, &ben).await.unwrap();
        assert_eq!(unliked.like_count, 0);
        assert!(!unliked.liked);
    }
}
