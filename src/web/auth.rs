//! Password-based session authentication handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::auth;
use crate::state::AppState;

/// Authentication configuration passed as an Axum Extension.
///
/// Password-based auth needs no external client credentials; this exists so
/// the session cookie lifetime is configurable per deployment.
#[derive(Clone)]
pub struct AuthConfig {
    pub session_max_age_secs: i64,
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_max_age_secs: 7 * 24 * 3600,
            secure_cookies: false,
        }
    }
}

/// Extract the `session` cookie value from request headers.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let cookie = cookie.trim();
            cookie.strip_prefix("session=").map(|v| v.to_owned())
        })
}

/// Build a `Set-Cookie` header value for the session cookie.
pub fn session_cookie(token: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("session={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// `POST /api/auth/login` — Verify a username/password pair and start a session.
pub async fn auth_login(
    State(state): State<AppState>,
    axum::extract::Extension(auth_config): axum::extract::Extension<AuthConfig>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let user = state
        .config_store
        .authenticate(&request.username)
        .await
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid username or password" })),
            )
        })?;

    if !auth::verify_password(&request.password, &user.hash) {
        warn!(username = request.username, "login attempt with invalid password");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid username or password" })),
        ));
    }

    let token = auth::generate_session_token();
    state.session_cache.insert(token.clone(), request.username.clone(), user.clone());

    info!(username = request.username, "user authenticated");

    let cookie = session_cookie(&token, auth_config.session_max_age_secs, auth_config.secure_cookies);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "username": request.username,
            "fullName": user.full_name,
            "role": user.role,
        })),
    )
        .into_response())
}

/// `POST /api/auth/logout` — Destroy the current session.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        state.session_cache.evict(&token);
    }

    let cookie = session_cookie("", 0, false);

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true })),
    )
        .into_response()
}

/// `GET /api/auth/me` — Return the current authenticated user's info.
pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let token = extract_session_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;

    let (username, user) = state.session_cache.get(&token).ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(json!({
        "username": username,
        "fullName": user.full_name,
        "role": user.role,
    })))
}
