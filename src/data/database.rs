//! SQLite database operations
//!
//! All database access goes through this module.
//! Multi-statement writes run inside `BEGIN IMMEDIATE` transactions.
//! Writes never use `RETURNING`; rows are read back with a separate `SELECT`.
//! Uniqueness (likes, follows, hashtag names) is enforced by the schema.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use super::models::*;
use crate::error::AppError;

const ACCESS_TOKEN_HASH_PREFIX: &str = "sha256:";

fn hash_access_token(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    format!(
        "{}{}",
        ACCESS_TOKEN_HASH_PREFIX,
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Which threads a listing selects
#[derive(Debug, Clone)]
pub enum ThreadFilter {
    /// Top-level threads by users the viewer follows
    Feed { viewer_id: i64 },
    /// Every live top-level thread
    Public,
    /// Live top-level threads by one author
    ByUser { user_id: i64 },
    /// Live direct replies to a thread
    Replies { parent_id: i64 },
    /// Live top-level threads carrying a hashtag
    Hashtag { hashtag_id: i64 },
    /// Live top-level threads whose content contains the text (case-sensitive)
    ContentContains(String),
    /// Live top-level threads created strictly after the instant
    CreatedAfter(DateTime<Utc>),
}

impl ThreadFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        const LIVE_TOP_LEVEL: &str = " WHERE t.parent_id IS NULL AND t.is_deleted = 0";

        match self {
            ThreadFilter::Feed { viewer_id } => {
                builder.push(LIVE_TOP_LEVEL);
                builder.push(
                    " AND t.user_id IN (SELECT following_id FROM follows WHERE follower_id = ",
                );
                builder.push_bind(*viewer_id);
                builder.push(")");
            }
            ThreadFilter::Public => {
                builder.push(LIVE_TOP_LEVEL);
            }
            ThreadFilter::ByUser { user_id } => {
                builder.push(LIVE_TOP_LEVEL);
                builder.push(" AND t.user_id = ");
                builder.push_bind(*user_id);
            }
            ThreadFilter::Replies { parent_id } => {
                builder.push(" WHERE t.is_deleted = 0 AND t.parent_id = ");
                builder.push_bind(*parent_id);
            }
            ThreadFilter::Hashtag { hashtag_id } => {
                builder.push(LIVE_TOP_LEVEL);
                builder.push(
                    " AND t.id IN (SELECT thread_id FROM thread_hashtags WHERE hashtag_id = ",
                );
                builder.push_bind(*hashtag_id);
                builder.push(")");
            }
            ThreadFilter::ContentContains(text) => {
                builder.push(LIVE_TOP_LEVEL);
                builder.push(" AND instr(t.content, ");
                builder.push_bind(text.clone());
                builder.push(") > 0");
            }
            ThreadFilter::CreatedAfter(since) => {
                builder.push(LIVE_TOP_LEVEL);
                builder.push(" AND t.created_at > ");
                builder.push_bind(*since);
            }
        }
    }
}

/// Listing order for threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOrder {
    /// created_at descending, ties by id descending
    Newest,
    /// view_count descending, ties by id ascending
    MostViewed,
}

impl ThreadOrder {
    fn sql(self) -> &'static str {
        match self {
            ThreadOrder::Newest => " ORDER BY t.created_at DESC, t.id DESC",
            ThreadOrder::MostViewed => " ORDER BY t.view_count DESC, t.id ASC",
        }
    }
}

#[derive(sqlx::FromRow)]
struct ThreadStatsRow {
    thread_id: i64,
    #[sqlx(flatten)]
    stats: ThreadStats,
}

#[derive(sqlx::FromRow)]
struct CommentStatsRow {
    comment_id: i64,
    #[sqlx(flatten)]
    stats: CommentStats,
}

#[derive(sqlx::FromRow)]
struct ThreadTagRow {
    thread_id: i64,
    name: String,
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the SQLite file at `path`, creating it and running migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // =========================================================================
    // Users & access tokens
    // =========================================================================

    pub async fn insert_user(&self, user: &NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO users (username, email, display_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("user {} not readable after insert", id)))
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_users_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, User>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(")");

        let users = query_builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }

    /// Toggle the account flags the identity layer checks before admitting a principal.
    pub async fn set_user_flags(
        &self,
        user_id: i64,
        enabled: bool,
        locked: bool,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET enabled = ?, locked = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(locked)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store an access token for `user_id`. Only the hash is persisted.
    pub async fn insert_access_token(&self, user_id: i64, token: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO access_tokens (token_hash, user_id, created_at, revoked) VALUES (?, ?, ?, 0)",
        )
        .bind(hash_access_token(token))
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn revoke_access_token(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE token_hash = ?")
            .bind(hash_access_token(token))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Resolve a bearer token to its user, ignoring revoked tokens.
    pub async fn get_user_by_access_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM access_tokens a
            JOIN users u ON u.id = a.user_id
            WHERE a.token_hash = ? AND a.revoked = 0
            "#,
        )
        .bind(hash_access_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Insert a thread with its hashtags and media atomically.
    ///
    /// The parent is re-checked inside the transaction so a reply can never
    /// attach to a thread deleted concurrently.
    pub async fn insert_thread(
        &self,
        thread: &NewThread,
        tag_names: &BTreeSet<String>,
        media: &[NewMedia],
    ) -> Result<Thread, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Thread, AppError> = async {
            let now = Utc::now();

            if let Some(parent_id) = thread.parent_id {
                let parent_live: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM threads WHERE id = ? AND is_deleted = 0")
                        .bind(parent_id)
                        .fetch_optional(&mut *conn)
                        .await?;
                if parent_live.is_none() {
                    return Err(AppError::not_found("Thread", parent_id));
                }
            }

            let id = sqlx::query(
                r#"
                INSERT INTO threads (content, user_id, parent_id, view_count, is_deleted, created_at, updated_at)
                VALUES (?, ?, ?, 0, 0, ?, ?)
                "#,
            )
            .bind(&thread.content)
            .bind(thread.user_id)
            .bind(thread.parent_id)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

            let created = sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;

            link_hashtags(&mut conn, created.id, tag_names, now).await?;

            for (position, item) in media.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO media (thread_id, media_type, media_url, media_alt, position, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(created.id)
                .bind(item.media_type)
                .bind(&item.media_url)
                .bind(&item.media_alt)
                .bind(position as i64)
                .bind(now)
                .execute(&mut *conn)
                .await?;
            }

            Ok(created)
        }
        .await;

        match result {
            Ok(thread) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(thread)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// Get a thread by id, including soft-deleted rows.
    pub async fn get_thread(&self, id: i64) -> Result<Option<Thread>, AppError> {
        let thread = sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(thread)
    }

    /// Get a thread only if it has not been soft-deleted.
    pub async fn get_live_thread(&self, id: i64) -> Result<Option<Thread>, AppError> {
        let thread =
            sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(thread)
    }

    /// Bump the view counter and return the refreshed row.
    pub async fn increment_thread_views(&self, id: i64) -> Result<Option<Thread>, AppError> {
        let bumped = sqlx::query(
            "UPDATE threads SET view_count = view_count + 1 WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if bumped == 0 {
            return Ok(None);
        }
        self.get_thread(id).await
    }

    /// Replace a thread's content and tag set.
    ///
    /// Tags in `tag_names` are touched (created or incremented); tags that
    /// disappear from the content keep their counters.
    pub async fn update_thread_content(
        &self,
        id: i64,
        content: &str,
        tag_names: &BTreeSet<String>,
    ) -> Result<Thread, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Thread, AppError> = async {
            let now = Utc::now();

            let changed = sqlx::query("UPDATE threads SET content = ?, updated_at = ? WHERE id = ?")
                .bind(content)
                .bind(now)
                .bind(id)
                .execute(&mut *conn)
                .await?
                .rows_affected();
            if changed == 0 {
                return Err(AppError::not_found("Thread", id));
            }

            sqlx::query("DELETE FROM thread_hashtags WHERE thread_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;

            link_hashtags(&mut conn, id, tag_names, now).await?;

            let updated = sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
            Ok(updated)
        }
        .await;

        match result {
            Ok(thread) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(thread)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// Soft-delete a thread and purge its media rows.
    ///
    /// Returns the purged media so the caller can remove the blobs.
    /// Reply threads are left untouched.
    pub async fn soft_delete_thread(&self, id: i64) -> Result<Vec<Media>, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Vec<Media>, AppError> = async {
            let purged = sqlx::query_as::<_, Media>(
                "SELECT * FROM media WHERE thread_id = ? ORDER BY position ASC, id ASC",
            )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

            sqlx::query("UPDATE threads SET is_deleted = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *conn)
                .await?;

            sqlx::query("DELETE FROM media WHERE thread_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;

            Ok(purged)
        }
        .await;

        match result {
            Ok(purged) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(purged)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// List threads matching `filter` in `order`, returning the page and the total match count.
    pub async fn list_threads(
        &self,
        filter: &ThreadFilter,
        order: ThreadOrder,
        page: PageRequest,
    ) -> Result<(Vec<Thread>, i64), AppError> {
        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM threads t");
        filter.push_where(&mut count_builder);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT t.* FROM threads t");
        filter.push_where(&mut query_builder);
        query_builder.push(order.sql());
        query_builder.push(" LIMIT ");
        query_builder.push_bind(page.limit());
        query_builder.push(" OFFSET ");
        query_builder.push_bind(page.offset());

        let threads = query_builder
            .build_query_as::<Thread>()
            .fetch_all(&self.pool)
            .await?;

        Ok((threads, total))
    }

    /// Like/reply/comment counters and the viewer's like flag for a batch of threads.
    pub async fn get_thread_stats(
        &self,
        thread_ids: &[i64],
        viewer_id: Option<i64>,
    ) -> Result<HashMap<i64, ThreadStats>, AppError> {
        if thread_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                t.id AS thread_id,
                (SELECT COUNT(*) FROM likes l WHERE l.thread_id = t.id) AS like_count,
                (SELECT COUNT(*) FROM threads r WHERE r.parent_id = t.id AND r.is_deleted = 0) AS reply_count,
                (SELECT COUNT(*) FROM comments c WHERE c.thread_id = t.id AND c.is_deleted = 0) AS comment_count,
                EXISTS (SELECT 1 FROM likes v WHERE v.thread_id = t.id AND v.user_id = "#,
        );
        query_builder.push_bind(viewer_id);
        query_builder.push(") AS liked FROM threads t WHERE t.id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in thread_ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(")");

        let rows = query_builder
            .build_query_as::<ThreadStatsRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| (row.thread_id, row.stats)).collect())
    }

    /// Media for a batch of threads, in attachment order.
    pub async fn get_media_for_threads(
        &self,
        thread_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Media>>, AppError> {
        if thread_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM media WHERE thread_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in thread_ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(") ORDER BY thread_id, position ASC, id ASC");

        let rows = query_builder
            .build_query_as::<Media>()
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<Media>> = HashMap::new();
        for media in rows {
            grouped.entry(media.thread_id).or_default().push(media);
        }
        Ok(grouped)
    }

    /// Hashtag names for a batch of threads, sorted by name.
    pub async fn get_hashtag_names_for_threads(
        &self,
        thread_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<String>>, AppError> {
        if thread_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT th.thread_id, h.name FROM thread_hashtags th JOIN hashtags h ON h.id = th.hashtag_id WHERE th.thread_id IN (",
        );
        {
            let mut separated = query_builder.separated(", ");
            for id in thread_ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(") ORDER BY th.thread_id, h.name");

        let rows = query_builder
            .build_query_as::<ThreadTagRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            grouped.entry(row.thread_id).or_default().push(row.name);
        }
        Ok(grouped)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// Returns true when a new like row was created.
    pub async fn insert_like(&self, user_id: i64, thread_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO likes (user_id, thread_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(thread_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_like(&self, user_id: i64, thread_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = ? AND thread_id = ?")
            .bind(user_id)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_thread_likes(&self, thread_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO comments (content, user_id, thread_id, parent_id, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&comment.content)
        .bind(comment.user_id)
        .bind(comment.thread_id)
        .bind(comment.parent_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_comment(id).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("comment {} not readable after insert", id))
        })
    }

    /// Get a comment by id, including soft-deleted rows.
    pub async fn get_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comment)
    }

    pub async fn get_live_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let comment =
            sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(comment)
    }

    pub async fn update_comment_content(
        &self,
        id: i64,
        content: &str,
    ) -> Result<Option<Comment>, AppError> {
        let changed = sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if changed == 0 {
            return Ok(None);
        }
        self.get_comment(id).await
    }

    pub async fn soft_delete_comment(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE comments SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Live top-level comments of a thread, newest first.
    pub async fn list_top_level_comments(
        &self,
        thread_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE thread_id = ? AND parent_id IS NULL AND is_deleted = 0",
        )
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await?;

        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE thread_id = ? AND parent_id IS NULL AND is_deleted = 0
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(thread_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((comments, total))
    }

    /// Live direct replies to a comment, newest first.
    pub async fn list_comment_replies(
        &self,
        comment_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE parent_id = ? AND is_deleted = 0",
        )
        .bind(comment_id)
        .fetch_one(&self.pool)
        .await?;

        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE parent_id = ? AND is_deleted = 0
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(comment_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((comments, total))
    }

    /// Up to `per_parent` newest live replies for each parent comment.
    pub async fn recent_comment_replies(
        &self,
        parent_ids: &[i64],
        per_parent: i64,
    ) -> Result<HashMap<i64, Vec<Comment>>, AppError> {
        if parent_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT id, content, user_id, thread_id, parent_id, is_deleted, created_at, updated_at
            FROM (
                SELECT c.*, ROW_NUMBER() OVER (
                    PARTITION BY c.parent_id ORDER BY c.created_at DESC, c.id DESC
                ) AS rank_in_parent
                FROM comments c
                WHERE c.is_deleted = 0 AND c.parent_id IN ("#,
        );
        {
            let mut separated = query_builder.separated(", ");
            for id in parent_ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(")) WHERE rank_in_parent <= ");
        query_builder.push_bind(per_parent);
        query_builder.push(" ORDER BY parent_id, created_at DESC, id DESC");

        let rows = query_builder
            .build_query_as::<Comment>()
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<Comment>> = HashMap::new();
        for comment in rows {
            if let Some(parent_id) = comment.parent_id {
                grouped.entry(parent_id).or_default().push(comment);
            }
        }
        Ok(grouped)
    }

    pub async fn get_comment_stats(
        &self,
        comment_ids: &[i64],
        viewer_id: Option<i64>,
    ) -> Result<HashMap<i64, CommentStats>, AppError> {
        if comment_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                c.id AS comment_id,
                (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id) AS like_count,
                (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id AND r.is_deleted = 0) AS reply_count,
                EXISTS (SELECT 1 FROM comment_likes v WHERE v.comment_id = c.id AND v.user_id = "#,
        );
        query_builder.push_bind(viewer_id);
        query_builder.push(") AS liked FROM comments c WHERE c.id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in comment_ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(")");

        let rows = query_builder
            .build_query_as::<CommentStatsRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.comment_id, row.stats))
            .collect())
    }

    /// Returns true when a new comment like row was created.
    pub async fn insert_comment_like(&self, user_id: i64, comment_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO comment_likes (user_id, comment_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(comment_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_comment_like(&self, user_id: i64, comment_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM comment_likes WHERE user_id = ? AND comment_id = ?")
            .bind(user_id)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_comment_likes(&self, comment_id: i64) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?")
                .bind(comment_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    // =========================================================================
    // Hashtags
    // =========================================================================

    pub async fn get_hashtag_by_name(&self, name: &str) -> Result<Option<Hashtag>, AppError> {
        let hashtag = sqlx::query_as::<_, Hashtag>("SELECT * FROM hashtags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(hashtag)
    }

    /// Hashtags ranked by how many threads created at or after `since` carry them.
    ///
    /// Every thread in the window counts, replies and deleted threads included.
    pub async fn trending_hashtags(
        &self,
        since: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<(Vec<Hashtag>, i64), AppError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT th.hashtag_id)
            FROM thread_hashtags th
            JOIN threads t ON t.id = th.thread_id
            WHERE t.created_at >= ?
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let hashtags = sqlx::query_as::<_, Hashtag>(
            r#"
            SELECT h.id, h.name, h.usage_count, h.created_at
            FROM hashtags h
            JOIN thread_hashtags th ON th.hashtag_id = h.id
            JOIN threads t ON t.id = th.thread_id
            WHERE t.created_at >= ?
            GROUP BY h.id
            ORDER BY COUNT(t.id) DESC, h.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(since)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((hashtags, total))
    }

    /// Hashtags whose name contains `fragment`, most used first.
    pub async fn search_hashtags(
        &self,
        fragment: &str,
        page: PageRequest,
    ) -> Result<(Vec<Hashtag>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hashtags WHERE instr(name, ?) > 0")
            .bind(fragment)
            .fetch_one(&self.pool)
            .await?;

        let hashtags = sqlx::query_as::<_, Hashtag>(
            r#"
            SELECT * FROM hashtags
            WHERE instr(name, ?) > 0
            ORDER BY usage_count DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(fragment)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((hashtags, total))
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Returns true when a new edge was created.
    pub async fn insert_follow(&self, follower_id: i64, following_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO follows (follower_id, following_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(follower_id)
        .bind(following_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_follow(&self, follower_id: i64, following_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, follower_id: i64, following_id: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = ? AND following_id = ?)",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    pub async fn count_followers(&self, user_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE following_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn count_following(&self, user_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Users following `user_id`, most recent edge first.
    pub async fn list_followers(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<FollowEdgeUser>, i64), AppError> {
        let total = self.count_followers(user_id).await?;

        let rows = sqlx::query_as::<_, FollowEdgeUser>(
            r#"
            SELECT u.*, f.created_at AS followed_at
            FROM follows f
            JOIN users u ON u.id = f.follower_id
            WHERE f.following_id = ?
            ORDER BY f.created_at DESC, f.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Users `user_id` follows, most recent edge first.
    pub async fn list_following(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<FollowEdgeUser>, i64), AppError> {
        let total = self.count_following(user_id).await?;

        let rows = sqlx::query_as::<_, FollowEdgeUser>(
            r#"
            SELECT u.*, f.created_at AS followed_at
            FROM follows f
            JOIN users u ON u.id = f.following_id
            WHERE f.follower_id = ?
            ORDER BY f.created_at DESC, f.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Subset of `candidate_ids` that `follower_id` follows.
    pub async fn followed_among(
        &self,
        follower_id: i64,
        candidate_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        if candidate_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT following_id FROM follows WHERE follower_id = ",
        );
        query_builder.push_bind(follower_id);
        query_builder.push(" AND following_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in candidate_ids {
                separated.push_bind(*id);
            }
        }
        query_builder.push(")");

        let ids = query_builder
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    // =========================================================================
    // Test helpers
    // =========================================================================

    #[cfg(test)]
    pub(crate) async fn set_thread_created_at_for_test(
        &self,
        thread_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE threads SET created_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn set_comment_created_at_for_test(
        &self,
        comment_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE comments SET created_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Create or increment a hashtag on an open transaction.
async fn upsert_hashtag(
    conn: &mut SqliteConnection,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Hashtag, AppError> {
    sqlx::query(
        r#"
        INSERT INTO hashtags (name, usage_count, created_at) VALUES (?, 1, ?)
        ON CONFLICT(name) DO UPDATE SET usage_count = usage_count + 1
        "#,
    )
    .bind(name)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let hashtag = sqlx::query_as::<_, Hashtag>("SELECT * FROM hashtags WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(hashtag)
}

/// Touch every tag and link it to the thread.
async fn link_hashtags(
    conn: &mut SqliteConnection,
    thread_id: i64,
    tag_names: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !tag_names.is_empty() {
        tracing::debug!(thread_id, count = tag_names.len(), "Linking hashtags");
    }
    for name in tag_names {
        let hashtag = upsert_hashtag(conn, name, now).await?;
        sqlx::query("INSERT OR IGNORE INTO thread_hashtags (thread_id, hashtag_id) VALUES (?, ?)")
            .bind(thread_id)
            .bind(hashtag.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
