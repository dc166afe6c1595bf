use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::auth::AuthenticatedUser,
    services::{credentials, users::UserService},
    AppState,
};

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::NotAuthenticated)?;

        let claims = credentials::verify_token(token, &state.config.jwt_secret)?;
        let user_id: Uuid = claims.sub.parse().map_err(|_| AppError::InvalidToken)?;

        let user = UserService::find_active(&state.db, user_id)
            .await?
            .ok_or(AppError::UserGone)?;

        if credentials::changed_password_after(user.password_changed_at, claims.iat) {
            return Err(AppError::PasswordChanged);
        }

        Ok(AuthenticatedUser { user })
    }
}

/// The token from `Authorization: Bearer <token>`, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
