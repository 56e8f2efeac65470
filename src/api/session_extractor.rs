use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;

use crate::api::handlers::{error_response, internal_error, AppState, ErrorResponse, SessionSettings};
use crate::model::User;
use crate::store::traits::Store;

/// The logged-in researcher, resolved from the session cookie or an
/// `Authorization: Bearer <token>` header. Rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session_token: String,
}

#[async_trait]
impl<S> FromRequestParts<AppState<S>> for CurrentUser
where
    S: Store + 'static,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.sessions.cookie_name)
            .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Authentication required"))?;

        let session = state
            .store
            .get_session(&token)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Invalid session"))?;

        if session.is_expired_at(Utc::now()) {
            if let Err(e) = state.store.delete_session(&token).await {
                log::warn!("Failed to remove expired session: {}", e);
            }
            return Err(error_response(StatusCode::UNAUTHORIZED, "Session expired"));
        }

        let user = state
            .store
            .get_user(session.user_id)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Invalid session"))?;

        Ok(CurrentUser {
            user,
            session_token: token,
        })
    }
}

/// Session token from a bearer header, falling back to the session cookie
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_value(headers, cookie_name))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value that stores the session token in the browser
pub fn session_cookie(settings: &SessionSettings, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        settings.cookie_name,
        token,
        settings.ttl.num_seconds()
    );
    if settings.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that clears the session cookie
pub fn expired_session_cookie(settings: &SessionSettings) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        settings.cookie_name
    )
}
