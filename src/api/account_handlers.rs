use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::api::handlers::{
    error_response, internal_error, parse_json_body, ApiError, AppState, ErrorResponse,
};
use crate::api::session_extractor::{expired_session_cookie, session_cookie, session_token};
use crate::logic::{hash_password_blocking, validate_registration, verify_password_blocking};
use crate::model::{LoginRequest, NewUser, RegistrationForm, Session, User};
use crate::store::traits::{DuplicateKey, Store};

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    /// Same value as the cookie, for clients that send a bearer header
    pub token: String,
}

async fn start_session<S: Store>(
    state: &AppState<S>,
    user: User,
    status: StatusCode,
) -> Result<Response, ApiError> {
    let session = Session::new(user.id, state.sessions.ttl);
    state
        .store
        .create_session(session.clone())
        .await
        .map_err(internal_error)?;

    let cookie = session_cookie(&state.sessions, &session.token);
    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            user,
            token: session.token,
        }),
    )
        .into_response())
}

fn username_taken() -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_details(
            "Form invalid",
            serde_json::json!(["username: a user with that username already exists"]),
        )),
    )
}

/// A concurrent registration can take the username between the lookup and
/// the insert; that surfaces as a duplicate key from the store.
fn registration_store_error(e: anyhow::Error) -> ApiError {
    if DuplicateKey::is(&e) {
        log::info!("Registration lost a race: {}", e);
        username_taken()
    } else {
        internal_error(e)
    }
}

/// POST /register
/// Creates a researcher account and logs it in
pub async fn register<S: Store>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let form: RegistrationForm = parse_json_body(&body)?;

    if let Err(errors) = validate_registration(&form) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details(
                "Form invalid",
                serde_json::json!(errors),
            )),
        ));
    }

    let username = form.username.trim().to_string();
    let existing = state
        .store
        .get_user_by_username(&username)
        .await
        .map_err(internal_error)?;
    if existing.is_some() {
        return Err(username_taken());
    }

    let password_hash = hash_password_blocking(form.password1)
        .await
        .map_err(internal_error)?;
    let user = state
        .store
        .create_user(NewUser {
            username,
            email: form
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            password_hash,
        })
        .await
        .map_err(registration_store_error)?;
    log::info!("Registered user {} ({})", user.username, user.id);

    start_session(&state, user, StatusCode::CREATED).await
}

/// POST /login
pub async fn login<S: Store>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: LoginRequest = parse_json_body(&body)?;

    let user = state
        .store
        .get_user_by_username(request.username.trim())
        .await
        .map_err(internal_error)?;

    let verified = match &user {
        Some(user) => verify_password_blocking(request.password, user.password_hash.clone())
            .await
            .map_err(internal_error)?,
        None => false,
    };

    match user {
        Some(user) if verified => start_session(&state, user, StatusCode::OK).await,
        _ => {
            log::warn!("Failed login for '{}'", request.username);
            Err(error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
            ))
        }
    }
}

/// POST /logout
/// Always succeeds; an unknown or missing session is simply ignored
pub async fn logout<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers, &state.sessions.cookie_name) {
        state
            .store
            .delete_session(&token)
            .await
            .map_err(internal_error)?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, expired_session_cookie(&state.sessions))],
    )
        .into_response())
}
