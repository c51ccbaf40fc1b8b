use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{error::ApiError, routes::AppState};

/// The signed-in user, identified by email.
///
/// Sign-in happens at the OAuth proxy in front of this service; the proxy
/// forwards the user's email in the header named by `AUTH_USER_HEADER`.
/// Requests without it are rejected with 401.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionUser(pub String);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.config.auth_user_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| SessionUser(value.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
