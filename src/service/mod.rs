//! Service layer
//!
//! Contains the content graph and discovery logic separated from HTTP handlers.
//! Every operation takes the acting principal explicitly.

pub mod hashtag;
mod comment;
mod discovery;
mod follow;
mod projection;
mod thread;

pub use comment::CommentService;
pub use discovery::{DiscoveryService, Timeframe};
pub use follow::FollowService;
pub use hashtag::HashtagService;
pub use projection::*;
pub use thread::{MediaUpload, ThreadService};

use crate::error::AppError;

/// Maximum thread length in characters
pub const MAX_THREAD_CHARS: usize = 1000;
/// Maximum comment length in characters
pub const MAX_COMMENT_CHARS: usize = 500;

/// Reject blank or oversized content.
pub fn validate_content(content: &str, max_chars: usize) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("Content is required".to_string()));
    }
    if content.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "Content cannot exceed {} characters",
            max_chars
        )));
    }
    Ok(())
}
