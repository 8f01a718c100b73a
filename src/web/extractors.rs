//! Axum extractors for authentication and authorization.

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, header};
use axum::response::Json;
use http::request::Parts;
use serde_json::json;

use crate::state::AppState;
use crate::store::User;
use crate::web::error::ApiError;

/// An authenticated user, resolved from the session cookie.
///
/// Returns 401 if no valid session cookie is present.
pub struct AuthUser {
    pub username: String,
    pub user: User,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| {
                cookies
                    .split(';')
                    .find_map(|c| c.trim().strip_prefix("session=").map(|v| v.to_owned()))
            })
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "unauthorized", "message": "No session cookie"})),
                )
            })?;

        let (username, user) = state.session_cache.get(&token).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized", "message": "Invalid or expired session"})),
            )
        })?;

        Ok(AuthUser { username, user })
    }
}

/// Check whether the authenticated user holds `permission_name`, consulting
/// the Config Store for their role's baseline permissions.
pub async fn require_permission(state: &AppState, auth_user: &AuthUser, permission_name: &str) -> Result<(), ApiError> {
    let effective = state
        .config_store
        .effective_permissions(&auth_user.username)
        .await
        .ok_or_else(|| ApiError::new(crate::web::error::ApiErrorCode::Forbidden, "No role assigned"))?;

    if crate::permissions::check(&effective, permission_name) {
        Ok(())
    } else {
        Err(ApiError::new(
            crate::web::error::ApiErrorCode::Forbidden,
            format!("Missing permission: {permission_name}"),
        ))
    }
}
