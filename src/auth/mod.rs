//! Identity boundary
//!
//! Resolves the acting principal from a bearer token and provides the
//! ownership check used before mutating threads and comments.
//! Credential issuance lives outside this crate; tokens are provisioned
//! with [`generate_access_token`] and `Database::insert_access_token`.

mod middleware;

use base64::Engine as _;
use rand::RngCore;

use crate::data::User;
use crate::error::AppError;

pub use middleware::{CurrentUser, MaybeUser};

/// The acting user of a request, passed explicitly into every operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub roles: Vec<String>,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            roles: user.role_set(),
        }
    }
}

/// Allow a mutation only when the principal authored the resource.
pub fn ensure_author(principal: &Principal, author_id: i64, what: &str) -> Result<(), AppError> {
    if principal.user_id == author_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "You don't have permission to modify this {}",
            what
        )))
    }
}

/// Random 256-bit bearer token, URL-safe base64.
pub fn generate_access_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
