//! Data models
//!
//! Rust structs representing database rows and listing envelopes.
//! Identifiers are store-assigned integers; timestamps are chrono UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// User (identity reference data)
// =============================================================================

/// A registered user
///
/// Owned by the identity subsystem. The content graph only reads it
/// to resolve authors and follow targets.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    /// Comma-separated role names (e.g. "USER,ADMIN")
    pub roles: String,
    pub enabled: bool,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role_set(&self) -> Vec<String> {
        self.roles
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// Fields required to provision a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
}

// =============================================================================
// Thread
// =============================================================================

/// A top-level post or a reply to another thread
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    /// Parent thread for replies; assigned once at creation
    pub parent_id: Option<i64>,
    pub view_count: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewThread {
    pub content: String,
    pub user_id: i64,
    pub parent_id: Option<i64>,
}

/// Live counters attached to every thread projection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ThreadStats {
    pub like_count: i64,
    pub reply_count: i64,
    pub comment_count: i64,
    pub liked: bool,
}

// =============================================================================
// Media
// =============================================================================

/// Kind of attachment, derived from the uploaded file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum MediaType {
    Image,
    Video,
    Gif,
    Other,
}

impl MediaType {
    /// Map a file name to its media type by extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Self {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("jpg" | "jpeg" | "png" | "webp") => MediaType::Image,
            Some("mp4" | "avi" | "mov" | "webm") => MediaType::Video,
            Some("gif") => MediaType::Gif,
            _ => MediaType::Other,
        }
    }
}

/// Attachment belonging to a thread
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: i64,
    pub thread_id: i64,
    pub media_type: MediaType,
    pub media_url: String,
    pub media_alt: Option<String>,
    /// Order within the thread
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub media_type: MediaType,
    pub media_url: String,
    pub media_alt: Option<String>,
}

// =============================================================================
// Comment
// =============================================================================

/// A comment on a thread, optionally replying to another comment
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub thread_id: i64,
    pub parent_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub user_id: i64,
    pub thread_id: i64,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct CommentStats {
    pub like_count: i64,
    pub reply_count: i64,
    pub liked: bool,
}

// =============================================================================
// Hashtag
// =============================================================================

/// Normalized tag with its lifetime usage counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hashtag {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Follow
// =============================================================================

/// Directed follow edge
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub id: i64,
    pub follower_id: i64,
    pub following_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A user listed on a follower/following page together with when the edge was made
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FollowEdgeUser {
    #[sqlx(flatten)]
    pub user: User,
    pub followed_at: DateTime<Utc>,
}

// =============================================================================
// Pagination
// =============================================================================

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const DEFAULT_TRENDING_HASHTAG_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// One page of a listing plus the metadata needed to request further pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_items: i64) -> Self {
        let size = i64::from(request.size.max(1));
        Self {
            items,
            page: request.page,
            size: request.size,
            total_items,
            total_pages: (total_items + size - 1) / size,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    /// Transform the items while keeping the pagination metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_follows_extension() {
        assert_eq!(MediaType::from_filename("cat.JPG"), MediaType::Image);
        assert_eq!(MediaType::from_filename("cat.webp"), MediaType::Image);
        assert_eq!(MediaType::from_filename("clip.mov"), MediaType::Video);
        assert_eq!(MediaType::from_filename("loop.gif"), MediaType::Gif);
        assert_eq!(MediaType::from_filename("notes.pdf"), MediaType::Other);
        assert_eq!(MediaType::from_filename("README"), MediaType::Other);
    }

    #[test]
    fn page_request_clamps_size() {
        assert_eq!(PageRequest::new(0, 0).size, 1);
        assert_eq!(PageRequest::new(0, 500).size, PageRequest::MAX_SIZE);
        assert_eq!(PageRequest::new(3, 20).offset(), 60);
    }

    #[test]
    fn page_counts_partial_last_page() {
        let page = Page::new(vec![1, 2], PageRequest::new(2, 5), 12);
        assert_eq!(page.total_pages, 3);

        let empty: Page<i32> = Page::empty(PageRequest::default());
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn roles_split_on_commas() {
        let now = Utc::now();
        let user = User {
            id: 1,
            username: "ana".to_string(),
            email: "ana@example.com".to_string(),
            display_name: None,
            bio: None,
            avatar_url: None,
            roles: "USER, ADMIN".to_string(),
            enabled: true,
            locked: false,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(user.role_set(), vec!["USER", "ADMIN"]);
    }
}
