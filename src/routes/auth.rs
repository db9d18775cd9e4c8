//! Caller identity from the `Authorization` header.
//!
//! The header carries the caller's Clerk ID as `Bearer <clerk_id>`; the token is
//! taken at face value and resolved against the users table. This stands in for
//! real session verification with the identity provider.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::user::User;
use crate::routes::error::ApiError;

/// Clerk ID from an `Authorization` header value: its second whitespace-separated token.
pub fn clerk_id_from_header(value: &str) -> Option<&str> {
    value.split_whitespace().nth(1)
}

fn clerk_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(clerk_id_from_header)
        .map(str::to_string)
}

async fn lookup(state: &AppState, clerk_id: &str) -> Result<Option<User>, ApiError> {
    queries::find_user_by_clerk_id(&state.db, clerk_id)
        .await
        .map_err(|e| ApiError::internal("Server error in middleware", e))
}

/// A caller that must be a known user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let clerk_id = clerk_id(parts)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized: No Clerk ID provided"))?;

        match lookup(state, &clerk_id).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(ApiError::not_found("User not found in DB")),
        }
    }
}

/// A caller that may be anonymous or not yet registered.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match clerk_id(parts) {
            Some(clerk_id) => Ok(MaybeUser(lookup(state, &clerk_id).await?)),
            None => Ok(MaybeUser(None)),
        }
    }
}
