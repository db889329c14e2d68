//! Extracts the authenticated user's identity from a request.
//!
//! Authentication itself (sessions, tokens) is handled by the gateway in
//! front of this service; requests arrive with the resolved user ID in the
//! `x-user-id` header. Requests without one are rejected.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{Error, user::UserId};

/// The header the gateway puts the resolved user ID in.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The identity of the user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
            .map(AuthenticatedUser)
            .ok_or(Error::Unauthorized)
    }
}
