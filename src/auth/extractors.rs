use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::cookies::ACCESS_COOKIE;
use crate::{error::ApiError, state::AppState, users::repo_types::User};

/// Authenticated caller, resolved from the `accessToken` cookie or a bearer header.
pub struct AuthUser(pub User);

fn access_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(c) = jar.get(ACCESS_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(c.value().to_string());
    }
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            access_token(parts).ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

        let claims = state.jwt.verify_access(&token).map_err(|e| {
            warn!(error = %e, "invalid access token");
            ApiError::unauthorized("Invalid access token")
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;

        Ok(AuthUser(user))
    }
}
