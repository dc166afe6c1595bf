use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::user::{
        check_password_confirm, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest, User,
        UserRole,
    },
    services::{
        credentials,
        email::{reset_url, EmailService},
        metrics::{LOGINS_COUNTER, PASSWORD_RESETS_COUNTER, SIGNUPS_COUNTER},
        users::UserService,
    },
};

const INCORRECT_LOGIN: &str = "Incorrect email or password";
const EMAIL_FAILED: &str = "There was an error sending the email. Try again later!";

pub struct AuthService;

impl AuthService {
    /// Creates a parent or nursery-owner account. Admins are never self-registered.
    pub async fn signup(pool: &PgPool, req: &SignupRequest) -> AppResult<User> {
        req.validate()?;
        check_password_confirm(&req.password, req.password_confirm.as_deref())
            .map_err(AppError::Validation)?;

        let role = match req.role {
            Some(UserRole::Admin) => {
                return Err(AppError::Validation(
                    "You can not sign up as an admin".to_string(),
                ))
            }
            Some(role) => role,
            None => UserRole::Parent,
        };

        let user = UserService::create(pool, req, role).await?;
        SIGNUPS_COUNTER.inc();
        tracing::info!(user_id = %user.id, role = %role, "New user signed up");
        Ok(user)
    }

    pub async fn login(
        pool: &PgPool,
        email: Option<&str>,
        password: Option<&str>,
    ) -> AppResult<User> {
        let (Some(email), Some(password)) = (
            email.filter(|e| !e.trim().is_empty()),
            password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::Validation(
                "Please provide email and password!".to_string(),
            ));
        };

        let user = UserService::find_active_by_email(pool, email).await?;

        let verified = match &user {
            Some(user) => {
                let plain = password.to_string();
                let hash = user.password_hash.clone();
                tokio::task::spawn_blocking(move || credentials::verify_password(&plain, &hash))
                    .await
                    .map_err(anyhow::Error::from)?
            }
            None => false,
        };

        match user {
            Some(user) if verified => {
                LOGINS_COUNTER.with_label_values(&["success"]).inc();
                Ok(user)
            }
            _ => {
                LOGINS_COUNTER.with_label_values(&["failure"]).inc();
                tracing::info!("Failed login attempt");
                Err(AppError::IncorrectCredentials(INCORRECT_LOGIN))
            }
        }
    }

    /// Stores a reset-token digest and mails the plaintext token. If the mail
    /// cannot go out, the stored token is cleared again.
    pub async fn forgot_password(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        email: Option<&str>,
        base_url: &str,
    ) -> AppResult<()> {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Please provide your email address!".to_string()))?;

        let user = UserService::find_active_by_email(pool, email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("There is no user with that email address.".to_string())
            })?;

        let token = credentials::issue_reset_token();
        UserService::store_reset_token(pool, user.id, Some(&token.hash), Some(token.expires_at))
            .await?;

        let url = reset_url(base_url, &token.plain);
        let name = format!("{} {}", user.first_name, user.last_name);
        let sent = match email_svc {
            Some(svc) => svc.send_password_reset(&user.email, &name, &url).await,
            None => Err(anyhow::anyhow!("SMTP is not configured")),
        };

        if let Err(e) = sent {
            tracing::error!(
                user_id = %user.id,
                "Password reset email failed, clearing token: {e:#}"
            );
            UserService::store_reset_token(pool, user.id, None, None).await?;
            return Err(AppError::UpstreamFailure(EMAIL_FAILED.to_string()));
        }

        PASSWORD_RESETS_COUNTER.with_label_values(&["requested"]).inc();
        Ok(())
    }

    pub async fn reset_password(
        pool: &PgPool,
        token: &str,
        req: &ResetPasswordRequest,
    ) -> AppResult<User> {
        let hash = credentials::hash_reset_token(token);
        let user = UserService::find_by_reset_token(pool, &hash)
            .await?
            .ok_or_else(|| AppError::Validation("Token is invalid or has expired".to_string()))?;

        req.validate()?;
        check_password_confirm(&req.password, req.password_confirm.as_deref())
            .map_err(AppError::Validation)?;

        let user = UserService::set_password(pool, user.id, &req.password).await?;
        PASSWORD_RESETS_COUNTER.with_label_values(&["completed"]).inc();
        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(user)
    }

    pub async fn update_password(
        pool: &PgPool,
        user: &User,
        req: &UpdatePasswordRequest,
    ) -> AppResult<User> {
        let plain = req.current_password.clone();
        let hash = user.password_hash.clone();
        let current_ok =
            tokio::task::spawn_blocking(move || credentials::verify_password(&plain, &hash))
                .await
                .map_err(anyhow::Error::from)?;
        if !current_ok {
            return Err(AppError::IncorrectCredentials("Your current password is wrong."));
        }

        req.validate()?;
        check_password_confirm(&req.password, req.password_confirm.as_deref())
            .map_err(AppError::Validation)?;

        let user = UserService::set_password(pool, user.id, &req.password).await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(user)
    }
}
