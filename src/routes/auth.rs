use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    error::AppResult,
    extract::{AppJson, AppQuery},
    models::{
        auth::AuthenticatedUser,
        user::{
            ForgotPasswordRequest, LoginRequest, ResetPasswordQuery, ResetPasswordRequest,
            SignupRequest, UpdatePasswordRequest, User,
        },
    },
    services::{auth::AuthService, credentials},
    AppState,
};

/// Seconds the logout cookie lives before the browser drops it.
const LOGGED_OUT_MAX_AGE: u64 = 10;

/// `Set-Cookie` value for the `jwt` cookie.
pub fn jwt_cookie(value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!("jwt={value}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Issues a token for `user`, mirrors it into the cookie and renders the
/// auth envelope.
fn send_token(state: &AppState, user: User, status: StatusCode) -> AppResult<Response> {
    let config = &state.config;
    let token = credentials::issue_token(user.id, &config.jwt_secret, config.jwt_expiry_seconds)?;
    let cookie = jwt_cookie(
        &token,
        config.jwt_cookie_expires_in_days * 86_400,
        config.is_production(),
    );

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "status": "success",
            "token": token,
            "data": { "user": user },
        })),
    )
        .into_response())
}

pub async fn signup(
    State(state): State<AppState>,
    AppJson(body): AppJson<SignupRequest>,
) -> AppResult<Response> {
    let user = AuthService::signup(&state.db, &body).await?;
    send_token(&state, user, StatusCode::CREATED)
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let user =
        AuthService::login(&state.db, body.email.as_deref(), body.password.as_deref()).await?;
    send_token(&state, user, StatusCode::OK)
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = jwt_cookie("loggedout", LOGGED_OUT_MAX_AGE, state.config.is_production());
    ([(header::SET_COOKIE, cookie)], Json(json!({ "status": "success" })))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(body): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    AuthService::forgot_password(
        &state.db,
        state.email.as_deref(),
        body.email.as_deref(),
        &state.config.app_base_url,
    )
    .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Token sent to email!",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ResetPasswordQuery>,
    AppJson(body): AppJson<ResetPasswordRequest>,
) -> AppResult<Response> {
    let user = AuthService::reset_password(&state.db, &query.token, &body).await?;
    send_token(&state, user, StatusCode::OK)
}

pub async fn update_password(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(body): AppJson<UpdatePasswordRequest>,
) -> AppResult<Response> {
    let user = AuthService::update_password(&state.db, &auth.user, &body).await?;
    send_token(&state, user, StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_http_only_and_secure_only_in_production() {
        let dev = jwt_cookie("abc", 90 * 86_400, false);
        assert!(dev.starts_with("jwt=abc; HttpOnly"));
        assert!(dev.contains("Max-Age=7776000"));
        assert!(!dev.contains("Secure"));

        assert!(jwt_cookie("abc", 60, true).ends_with("; Secure"));
    }

    #[test]
    fn logout_cookie_expires_quickly() {
        let cookie = jwt_cookie("loggedout", LOGGED_OUT_MAX_AGE, false);
        assert!(cookie.contains("jwt=loggedout"));
        assert!(cookie.contains("Max-Age=10"));
    }
}
