//! Follow service
//!
//! Directed follow edges between users and the counts derived from them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::Principal;
use crate::data::{Database, Page, PageRequest, User};
use crate::error::AppError;
use crate::metrics::FOLLOWS_TOTAL;

use super::projection::{FollowStatus, FollowUserView};

/// Follow service
pub struct FollowService {
    db: Arc<Database>,
}

impl FollowService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Follow `target_id`; repeating the call is a no-op.
    pub async fn follow(
        &self,
        follower: &Principal,
        target_id: i64,
    ) -> Result<FollowStatus, AppError> {
        if follower.user_id == target_id {
            return Err(AppError::Validation("You cannot follow yourself".to_string()));
        }
        self.require_user(target_id).await?;

        if self.db.insert_follow(follower.user_id, target_id).await? {
            FOLLOWS_TOTAL.inc();
            tracing::info!(follower_id = follower.user_id, following_id = target_id, "Follow created");
        }

        self.status(target_id, Some(follower)).await
    }

    /// Remove the edge if present.
    pub async fn unfollow(
        &self,
        follower: &Principal,
        target_id: i64,
    ) -> Result<FollowStatus, AppError> {
        self.require_user(target_id).await?;

        if self.db.delete_follow(follower.user_id, target_id).await? {
            tracing::info!(follower_id = follower.user_id, following_id = target_id, "Follow removed");
        }

        self.status(target_id, Some(follower)).await
    }

    /// Whether `viewer` follows the target, plus the target's own counts.
    pub async fn status(
        &self,
        target_id: i64,
        viewer: Option<&Principal>,
    ) -> Result<FollowStatus, AppError> {
        self.require_user(target_id).await?;

        let following = match viewer {
            Some(viewer) => self.db.is_following(viewer.user_id, target_id).await?,
            None => false,
        };

        Ok(FollowStatus {
            following,
            follower_count: self.db.count_followers(target_id).await?,
            following_count: self.db.count_following(target_id).await?,
        })
    }

    /// Users following `user_id`; `following` says whether the viewer follows each of them.
    pub async fn list_followers(
        &self,
        user_id: i64,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<FollowUserView>, AppError> {
        self.require_user(user_id).await?;

        let (edges, total) = self.db.list_followers(user_id, page).await?;
        let followed = match viewer {
            Some(viewer) => {
                let ids: Vec<i64> = edges.iter().map(|edge| edge.user.id).collect();
                self.db.followed_among(viewer.user_id, &ids).await?
            }
            None => HashSet::new(),
        };

        let items = edges
            .into_iter()
            .map(|edge| {
                let following = followed.contains(&edge.user.id);
                FollowUserView::new(edge, following)
            })
            .collect();
        Ok(Page::new(items, page, total))
    }

    /// Users `user_id` follows; `following` is always true.
    pub async fn list_following(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Page<FollowUserView>, AppError> {
        self.require_user(user_id).await?;

        let (edges, total) = self.db.list_following(user_id, page).await?;
        let items = edges
            .into_iter()
            .map(|edge| FollowUserView::new(edge, true))
            .collect();
        Ok(Page::new(items, page, total))
    }

    async fn require_user(&self, id: i64) -> Result<User, AppError> {
        self.db
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{principal, test_db};

    #[tokio::test]
    async fn follow_is_idempotent_and_counts_target() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let ben = principal(&db, "ben").await;
        let service = FollowService::new(db);

        service.follow(&ana, ben.user_id).await.unwrap();
        let status = service.follow(&ana, ben.user_id).await.unwrap();
        assert_eq!(
            status,
            FollowStatus {
                following: true,
                follower_count: 1,
                following_count: 0,
            }
        );

        let from_ben = service.status(ben.user_id, Some(&ben)).await.unwrap();
        assert!(!from_ben.following);
        assert_eq!(from_ben.follower_count, 1);

        let anonymous = service.status(ben.user_id, None).await.unwrap();
        assert!(!anonymous.following);

        let after = service.unfollow(&ana, ben.user_id).await.unwrap();
        assert_eq!(after.follower_count, 0);
        let again = service.unfollow(&ana, ben.user_id).await.unwrap();
        assert!(!again.following);
    }

    #[tokio::test]
    async fn self_follow_and_missing_target_fail() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = FollowService::new(db);

        let error = service.follow(&ana, ana.user_id).await.unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
        assert_eq!(error.to_string(), "You cannot follow yourself");

        let error = service.follow(&ana, 999).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
        let error = service.unfollow(&ana, 999).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
        let error = service.status(999, None).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn follower_lists_report_viewer_relation() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let ben = principal(&db, "ben").await;
        let cat = principal(&db, "cat").await;
        let service = FollowService::new(db);

        service.follow(&ana, cat.user_id).await.unwrap();
        service.follow(&ben, cat.user_id).await.unwrap();
        service.follow(&ana, ben.user_id).await.unwrap();

        let followers = service
            .list_followers(cat.user_id, Some(&ana), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(followers.total_items, 2);
        let flags: Vec<(String, bool)> = followers
            .items
            .iter()
            .map(|u| (u.username.clone(), u.following))
            .collect();
        assert!(flags.contains(&("ben".to_string(), true)));
        assert!(flags.contains(&("ana".to_string(), false)));

        let anonymous = service
            .list_followers(cat.user_id, None, PageRequest::default())
            .await
            .unwrap();
        assert!(anonymous.items.iter().all(|u| !u.following));

        let following = service
            .list_following(ana.user_id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(following.total_items, 2);
        assert!(following.items.iter().all(|u| u.following));
    }
}
