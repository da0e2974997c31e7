//! Hashtag extraction and usage counters

use std::collections::BTreeSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::data::{Database, Hashtag};
use crate::error::AppError;

lazy_static! {
    static ref HASHTAG_PATTERN: Regex =
        Regex::new(r"#([A-Za-z0-9_]+)").expect("hashtag pattern is valid");
}

/// Extract normalized tag names from free text.
///
/// `#` followed by word characters; lowercased and deduplicated.
pub fn extract(text: &str) -> BTreeSet<String> {
    HASHTAG_PATTERN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|tag| tag.as_str().to_ascii_lowercase())
        .collect()
}

/// Normalize a user-supplied tag reference (`#Rust` → `rust`).
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .strip_prefix('#')
        .unwrap_or(trimmed)
        .to_lowercase()
}

/// Hashtag service
pub struct HashtagService {
    db: Arc<Database>,
}

impl HashtagService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Case-insensitive lookup; a leading `#` is ignored.
    pub async fn find(&self, name: &str) -> Result<Option<Hashtag>, AppError> {
        self.db.get_hashtag_by_name(&normalize_name(name)).await
    }
}
