//! Feed and discovery
//!
//! Follow-based feed, public and per-user timelines, hashtag listings,
//! trending rankings and combined search.

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};

use crate::auth::Principal;
use crate::data::{Database, Page, PageRequest, ThreadFilter, ThreadOrder};
use crate::error::AppError;

use super::hashtag::{HashtagService, normalize_name};
use super::projection::{HashtagView, SearchResults, ThreadView, WindowedPage, thread_page};

/// Trending window
///
/// Matching ignores case; unrecognized input falls back to the last 24 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeframe {
    #[default]
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("week") => Timeframe::Week,
            Some("month") => Timeframe::Month,
            _ => Timeframe::Day,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Day => "24h",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        }
    }

    /// Start of the window ending at `now`
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::Day => now - Duration::days(1),
            Timeframe::Week => now - Duration::days(7),
            Timeframe::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
        }
    }
}

/// Feed and discovery service
pub struct DiscoveryService {
    db: Arc<Database>,
    hashtags: HashtagService,
}

impl DiscoveryService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            hashtags: HashtagService::new(db.clone()),
            db,
        }
    }

    async fn threads(
        &self,
        filter: ThreadFilter,
        order: ThreadOrder,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<ThreadView>, AppError> {
        let rows = self.db.list_threads(&filter, order, page).await?;
        thread_page(&self.db, rows, page, viewer.map(|p| p.user_id)).await
    }

    /// Top-level threads by users the viewer follows, newest first
    pub async fn feed(
        &self,
        viewer: &Principal,
        page: PageRequest,
    ) -> Result<Page<ThreadView>, AppError> {
        self.threads(
            ThreadFilter::Feed {
                viewer_id: viewer.user_id,
            },
            ThreadOrder::Newest,
            Some(viewer),
            page,
        )
        .await
    }

    pub async fn public_timeline(
        &self,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<ThreadView>, AppError> {
        self.threads(ThreadFilter::Public, ThreadOrder::Newest, viewer, page)
            .await
    }

    pub async fn threads_by_user(
        &self,
        username: &str,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<Page<ThreadView>, AppError> {
        let user = self
            .db
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("User not found with username: {}", username))
            })?;

        self.threads(
            ThreadFilter::ByUser { user_id: user.id },
            ThreadOrder::Newest,
            viewer,
            page,
        )
        .await
    }

    /// Live top-level threads tagged `name`; an unknown tag yields an empty page.
    pub async fn threads_by_hashtag(
        &self,
        name: &str,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<WindowedPage<ThreadView>, AppError> {
        let page = match self.hashtags.find(name).await? {
            Some(hashtag) => {
                self.threads(
                    ThreadFilter::Hashtag {
                        hashtag_id: hashtag.id,
                    },
                    ThreadOrder::Newest,
                    viewer,
                    page,
                )
                .await?
            }
            None => Page::empty(page),
        };

        Ok(WindowedPage {
            page,
            timeframe: "all".to_string(),
        })
    }

    /// Hashtags ranked by threads created in the window
    pub async fn trending_hashtags(
        &self,
        timeframe: Option<&str>,
        page: PageRequest,
    ) -> Result<WindowedPage<HashtagView>, AppError> {
        let timeframe = Timeframe::parse(timeframe);
        let since = timeframe.window_start(Utc::now());

        let (hashtags, total) = self.db.trending_hashtags(since, page).await?;

        Ok(WindowedPage {
            page: Page::new(hashtags, page, total).map(HashtagView::from),
            timeframe: timeframe.as_str().to_string(),
        })
    }

    /// Top-level threads created after the window start, most viewed first
    pub async fn trending_threads(
        &self,
        timeframe: Option<&str>,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<WindowedPage<ThreadView>, AppError> {
        let timeframe = Timeframe::parse(timeframe);
        let since = timeframe.window_start(Utc::now());

        let page = self
            .threads(
                ThreadFilter::CreatedAfter(since),
                ThreadOrder::MostViewed,
                viewer,
                page,
            )
            .await?;

        Ok(WindowedPage {
            page,
            timeframe: timeframe.as_str().to_string(),
        })
    }

    /// Threads containing `query` (case-sensitive) and hashtags whose name contains it
    ///
    /// Any query is accepted, blank ones included. `total_results` counts
    /// the items on the two returned pages only.
    pub async fn search(
        &self,
        query: &str,
        viewer: Option<&Principal>,
        page: PageRequest,
    ) -> Result<SearchResults, AppError> {
        let threads = self
            .threads(
                ThreadFilter::ContentContains(query.to_string()),
                ThreadOrder::Newest,
                viewer,
                page,
            )
            .await?;

        let fragment = normalize_name(query);
        let hashtags = if fragment.is_empty() {
            Page::empty(page)
        } else {
            let (rows, total) = self.db.search_hashtags(&fragment, page).await?;
            Page::new(rows, page, total).map(HashtagView::from)
        };

        let total_results = threads.items.len() + hashtags.items.len();
        Ok(SearchResults {
            threads,
            hashtags,
            query: query.to_string(),
            total_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NewThread;
    use crate::service::hashtag::extract;
    use crate::service::test_support::{principal, test_db};
    use chrono::TimeZone;

    async fn post(db: &Database, author: &Principal, content: &str) -> i64 {
        db.insert_thread(
            &NewThread {
                content: content.to_string(),
                user_id: author.user_id,
                parent_id: None,
            },
            &extract(content),
            &[],
        )
        .await
        .unwrap()
        .id
    }

    #[test]
    fn timeframe_falls_back_to_day() {
        assert_eq!(Timeframe::parse(Some("bogus")), Timeframe::Day);
        assert_eq!(Timeframe::parse(None), Timeframe::Day);
        assert_eq!(Timeframe::parse(Some("week")), Timeframe::Week);
        assert_eq!(Timeframe::parse(Some("month")).as_str(), "month");
        assert_eq!(Timeframe::Day.as_str(), "24h");
    }

    #[test]
    fn timeframe_ignores_case() {
        assert_eq!(Timeframe::parse(Some("WEEK")), Timeframe::Week);
        assert_eq!(Timeframe::parse(Some("Month")), Timeframe::Month);
        assert_eq!(Timeframe::parse(Some(" 24H ")), Timeframe::Day);
    }

    #[test]
    fn month_window_uses_calendar_months() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            Timeframe::Month.window_start(now),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::Week.window_start(now),
            Utc.with_ymd_and_hms(2024, 3, 24, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn feed_contains_only_followed_authors() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let ben = principal(&db, "ben").await;
        let stranger = principal(&db, "stranger").await;
        db.insert_follow(ana.user_id, ben.user_id).await.unwrap();
        let service = DiscoveryService::new(db.clone());

        let id = post(&db, &ben, "hello from ben").await;
        post(&db, &stranger, "unrelated").await;

        let feed = service.feed(&ana, PageRequest::default()).await.unwrap();
        assert_eq!(feed.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![id]);

        let empty = service.feed(&stranger, PageRequest::default()).await.unwrap();
        assert_eq!(empty.total_items, 0);

        let public = service
            .public_timeline(None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(public.total_items, 2);
    }

    #[tokio::test]
    async fn hashtag_listing_strips_hash_and_ignores_case() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = DiscoveryService::new(db.clone());
        let id = post(&db, &ana, "Loving #rust today").await;

        for name in ["rust", "#rust", "RUST"] {
            let listed = service
                .threads_by_hashtag(name, None, PageRequest::default())
                .await
                .unwrap();
            assert_eq!(listed.timeframe, "all");
            assert_eq!(listed.page.items[0].id, id);
        }

        let unknown = service
            .threads_by_hashtag("nothing", None, PageRequest::default())
            .await
            .unwrap();
        assert!(unknown.page.items.is_empty());
    }

    #[tokio::test]
    async fn threads_by_user_requires_known_username() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = DiscoveryService::new(db.clone());
        post(&db, &ana, "one").await;

        let listed = service
            .threads_by_user("ana", None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(listed.total_items, 1);

        let error = service
            .threads_by_user("ghost", None, PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn bogus_timeframe_matches_day() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = DiscoveryService::new(db.clone());
        post(&db, &ana, "#fresh").await;
        let old = post(&db, &ana, "#stale").await;
        db.set_thread_created_at_for_test(old, Utc::now() - Duration::days(3))
            .await
            .unwrap();

        let page = PageRequest::new(0, PageRequest::DEFAULT_TRENDING_HASHTAG_SIZE);
        let bogus = service.trending_hashtags(Some("bogus"), page).await.unwrap();
        let day = service.trending_hashtags(Some("24h"), page).await.unwrap();
        assert_eq!(bogus.timeframe, "24h");
        let names = |w: &WindowedPage<HashtagView>| {
            w.page.items.iter().map(|h| h.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&bogus), vec!["fresh"]);
        assert_eq!(names(&bogus), names(&day));

        let week = service.trending_hashtags(Some("week"), page).await.unwrap();
        assert_eq!(week.page.total_items, 2);
    }

    #[tokio::test]
    async fn trending_threads_rank_by_views() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = DiscoveryService::new(db.clone());
        let quiet = post(&db, &ana, "quiet").await;
        let popular = post(&db, &ana, "popular").await;
        for _ in 0..3 {
            db.increment_thread_views(popular).await.unwrap();
        }

        let trending = service
            .trending_threads(Some("week"), None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(trending.timeframe, "week");
        let ids: Vec<i64> = trending.page.items.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![popular, quiet]);
    }

    #[tokio::test]
    async fn search_covers_threads_and_hashtags() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = DiscoveryService::new(db.clone());
        let id = post(&db, &ana, "Loving #rust today").await;

        let by_text = service
            .search("Loving", None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(by_text.threads.items[0].id, id);
        assert_eq!(by_text.total_results, 1);

        let by_tag = service
            .search("#Rust", None, PageRequest::default())
            .await
            .unwrap();
        assert!(by_tag.threads.items.is_empty());
        assert_eq!(by_tag.hashtags.items[0].name, "rust");
        assert_eq!(by_tag.total_results, 1);

    }

    #[tokio::test]
    async fn search_accepts_blank_queries() {
        let (_temp_dir, db) = test_db().await;
        let ana = principal(&db, "ana").await;
        let service = DiscoveryService::new(db.clone());
        let spaced = post(&db, &ana, "a  b #x").await;
        post(&db, &ana, "single spaced").await;

        let by_spaces = service
            .search("  ", None, PageRequest::default())
            .await
            .unwrap();
        let ids: Vec<i64> = by_spaces.threads.items.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![spaced]);
        assert!(by_spaces.hashtags.items.is_empty());
        assert_eq!(by_spaces.total_results, 1);

        let everything = service
            .search("", None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(everything.threads.items.len(), 2);
        assert!(everything.hashtags.items.is_empty());
        assert_eq!(everything.query, "");
    }
}
