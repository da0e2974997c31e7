//! Request extractors for the acting principal
//!
//! Reads `Authorization: Bearer <token>` and resolves it against the
//! access token table.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

use super::Principal;
use crate::AppState;
use crate::error::AppError;

fn extract_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve a token to a principal. Disabled or locked accounts are rejected.
async fn authenticate_token(token: &str, state: &AppState) -> Result<Principal, AppError> {
    let user = state
        .db
        .get_user_by_access_token(token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.enabled || user.locked {
        return Err(AppError::Unauthorized);
    }

    Ok(Principal::from(&user))
}

/// Extractor for operations that require a principal
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(principal): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", principal.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
            return Ok(CurrentUser(principal));
        }

        let state = AppState::from_ref(state);
        let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let principal = authenticate_token(token, &state).await?;
        parts.extensions.insert(principal.clone());

        Ok(CurrentUser(principal))
    }
}

/// Optional principal extractor
///
/// Anonymous when the header is missing or the token does not resolve.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
            return Ok(MaybeUser(Some(principal)));
        }

        let app_state = AppState::from_ref(state);
        let principal = match extract_token_from_headers(&parts.headers) {
            Some(token) => match authenticate_token(token, &app_state).await {
                Ok(principal) => Some(principal),
                Err(AppError::Unauthorized) => None,
                Err(error) => return Err(error),
            },
            None => None,
        };

        if let Some(principal) = &principal {
            parts.extensions.insert(principal.clone());
        }

        Ok(MaybeUser(principal))
    }
}
