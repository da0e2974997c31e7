//! Response projections
//!
//! Rows from the store are joined with authors, media, tags and live
//! counters into the shapes the API returns. Lookups are batched per page.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{
    Comment, CommentStats, Database, FollowEdgeUser, Hashtag, Media, MediaType, Page,
    PageRequest, Thread, ThreadStats, User,
};
use crate::error::AppError;

/// Recent replies embedded in every full comment projection
pub const RECENT_REPLY_LIMIT: i64 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub id: i64,
    pub media_type: MediaType,
    pub media_url: String,
    pub media_alt: Option<String>,
}

impl From<Media> for MediaView {
    fn from(media: Media) -> Self {
        Self {
            id: media.id,
            media_type: media.media_type,
            media_url: media.media_url,
            media_alt: media.media_alt,
        }
    }
}

/// Thread as seen by one viewer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub id: i64,
    pub content: String,
    pub user: UserSummary,
    pub parent_id: Option<i64>,
    pub media: Vec<MediaView>,
    pub hashtags: Vec<String>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub reply_count: i64,
    pub comment_count: i64,
    pub liked: bool,
}

/// Comment as seen by one viewer
///
/// `recent_replies` is `None` on the simplified entries nested inside
/// another comment, which bounds eager nesting to one level.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i64,
    pub content: String,
    pub user: UserSummary,
    pub thread_id: i64,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub reply_count: i64,
    pub liked: bool,
    pub recent_replies: Option<Vec<CommentView>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashtagView {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Hashtag> for HashtagView {
    fn from(hashtag: Hashtag) -> Self {
        Self {
            id: hashtag.id,
            name: hashtag.name,
            usage_count: hashtag.usage_count,
            created_at: hashtag.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    pub liked: bool,
    pub like_count: i64,
}

/// Follow relation of the viewer to a target, with the target's counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStatus {
    pub following: bool,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUserView {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: DateTime<Utc>,
    pub following: bool,
}

impl FollowUserView {
    pub(crate) fn new(edge: FollowEdgeUser, following: bool) -> Self {
        Self {
            id: edge.user.id,
            username: edge.user.username,
            display_name: edge.user.display_name,
            avatar_url: edge.user.avatar_url,
            followed_at: edge.followed_at,
            following,
        }
    }
}

/// A page tagged with the time window it was computed over
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowedPage<T> {
    #[serde(flatten)]
    pub page: Page<T>,
    pub timeframe: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub threads: Page<ThreadView>,
    pub hashtags: Page<HashtagView>,
    pub query: String,
    /// Items on the returned pages, not totals across all pages
    pub total_results: usize,
}

fn missing_author(user_id: i64) -> AppError {
    AppError::Internal(anyhow::anyhow!("author {} is missing", user_id))
}

async fn authors_of(
    db: &Database,
    user_ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, User>, AppError> {
    let mut ids: Vec<i64> = user_ids.collect();
    ids.sort_unstable();
    ids.dedup();
    db.get_users_by_ids(&ids).await
}

/// Project a batch of threads for `viewer_id`, preserving order.
pub(crate) async fn thread_views(
    db: &Database,
    threads: Vec<Thread>,
    viewer_id: Option<i64>,
) -> Result<Vec<ThreadView>, AppError> {
    if threads.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = threads.iter().map(|thread| thread.id).collect();
    let authors = authors_of(db, threads.iter().map(|thread| thread.user_id)).await?;
    let stats = db.get_thread_stats(&ids, viewer_id).await?;
    let mut media = db.get_media_for_threads(&ids).await?;
    let mut tags = db.get_hashtag_names_for_threads(&ids).await?;

    threads
        .into_iter()
        .map(|thread| -> Result<ThreadView, AppError> {
            let author = authors
                .get(&thread.user_id)
                .ok_or_else(|| missing_author(thread.user_id))?;
            let ThreadStats {
                like_count,
                reply_count,
                comment_count,
                liked,
            } = stats.get(&thread.id).copied().unwrap_or_default();

            Ok(ThreadView {
                id: thread.id,
                user: UserSummary::from(author),
                parent_id: thread.parent_id,
                media: media
                    .remove(&thread.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(MediaView::from)
                    .collect(),
                hashtags: tags.remove(&thread.id).unwrap_or_default(),
                view_count: thread.view_count,
                created_at: thread.created_at,
                updated_at: thread.updated_at,
                content: thread.content,
                like_count,
                reply_count,
                comment_count,
                liked,
            })
        })
        .collect()
}

pub(crate) async fn thread_view(
    db: &Database,
    thread: Thread,
    viewer_id: Option<i64>,
) -> Result<ThreadView, AppError> {
    let id = thread.id;
    thread_views(db, vec![thread], viewer_id)
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("thread {} vanished during projection", id)))
}

pub(crate) async fn thread_page(
    db: &Database,
    (threads, total): (Vec<Thread>, i64),
    request: PageRequest,
    viewer_id: Option<i64>,
) -> Result<Page<ThreadView>, AppError> {
    let items = thread_views(db, threads, viewer_id).await?;
    Ok(Page::new(items, request, total))
}

fn comment_view(
    comment: Comment,
    authors: &HashMap<i64, User>,
    stats: &HashMap<i64, CommentStats>,
    recent_replies: Option<Vec<CommentView>>,
) -> Result<CommentView, AppError> {
    let author = authors
        .get(&comment.user_id)
        .ok_or_else(|| missing_author(comment.user_id))?;
    let CommentStats {
        like_count,
        reply_count,
        liked,
    } = stats.get(&comment.id).copied().unwrap_or_default();

    Ok(CommentView {
        id: comment.id,
        content: comment.content,
        user: UserSummary::from(author),
        thread_id: comment.thread_id,
        parent_id: comment.parent_id,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        like_count,
        reply_count,
        liked,
        recent_replies,
    })
}

/// Project a batch of comments, each with up to three simplified recent replies.
pub(crate) async fn comment_views(
    db: &Database,
    comments: Vec<Comment>,
    viewer_id: Option<i64>,
) -> Result<Vec<CommentView>, AppError> {
    if comments.is_empty() {
        return Ok(Vec::new());
    }

    let parent_ids: Vec<i64> = comments.iter().map(|comment| comment.id).collect();
    let mut recent = db
        .recent_comment_replies(&parent_ids, RECENT_REPLY_LIMIT)
        .await?;

    let nested = recent.values().flatten();
    let all_ids: Vec<i64> = parent_ids
        .iter()
        .copied()
        .chain(nested.clone().map(|reply| reply.id))
        .collect();
    let authors = authors_of(
        db,
        comments
            .iter()
            .map(|comment| comment.user_id)
            .chain(nested.map(|reply| reply.user_id)),
    )
    .await?;
    let stats = db.get_comment_stats(&all_ids, viewer_id).await?;

    comments
        .into_iter()
        .map(|comment| -> Result<CommentView, AppError> {
            let replies = recent
                .remove(&comment.id)
                .unwrap_or_default()
                .into_iter()
                .map(|reply| comment_view(reply, &authors, &stats, None))
                .collect::<Result<Vec<_>, _>>()?;
            comment_view(comment, &authors, &stats, Some(replies))
        })
        .collect()
}

pub(crate) async fn comment_view_of(
    db: &Database,
    comment: Comment,
    viewer_id: Option<i64>,
) -> Result<CommentView, AppError> {
    let id = comment.id;
    comment_views(db, vec![comment], viewer_id)
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("comment {} vanished during projection", id)))
}

pub(crate) async fn comment_page(
    db: &Database,
    (comments, total): (Vec<Comment>, i64),
    request: PageRequest,
    viewer_id: Option<i64>,
) -> Result<Page<CommentView>, AppError> {
    let items = comment_views(db, comments, viewer_id).await?;
    Ok(Page::new(items, request, total))
}
