use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::user::{AdminUpdateUserRequest, SignupRequest, User, UserRole},
    services::{
        credentials,
        query_features::{Column, ColumnKind, QueryFeatures, Resource},
    },
};

pub static USER_RESOURCE: Resource = Resource {
    columns: &[
        Column { field: "firstName", sql: "first_name", kind: ColumnKind::Text },
        Column { field: "lastName", sql: "last_name", kind: ColumnKind::Text },
        Column { field: "email", sql: "email", kind: ColumnKind::Text },
        Column { field: "address", sql: "address", kind: ColumnKind::Text },
        Column { field: "role", sql: "role", kind: ColumnKind::Text },
        Column { field: "gender", sql: "gender", kind: ColumnKind::Text },
        Column { field: "createdAt", sql: "created_at", kind: ColumnKind::Timestamp },
    ],
    created_at: "created_at",
    id: "id",
};

pub struct UserService;

impl UserService {
    /// Inactive users are invisible to every lookup.
    pub async fn find_active(pool: &PgPool, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND active = TRUE")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn find_active_by_email(pool: &PgPool, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = $1 AND active = TRUE",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    /// Inserts a user with a freshly hashed password. The caller has already
    /// validated the request and decided the role.
    pub async fn create(pool: &PgPool, req: &SignupRequest, role: UserRole) -> AppResult<User> {
        let password = req.password.clone();
        let password_hash =
            tokio::task::spawn_blocking(move || credentials::hash_password(&password))
                .await
                .map_err(anyhow::Error::from)??;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (first_name, last_name, email, address, role, gender, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(req.email.trim().to_lowercase())
        .bind(req.address.trim())
        .bind(role.to_string())
        .bind(req.gender.to_string())
        .bind(&password_hash)
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    pub async fn list(pool: &PgPool, features: &QueryFeatures) -> AppResult<Vec<User>> {
        let mut qb = QueryBuilder::new("SELECT * FROM users WHERE active = TRUE");
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        let users = qb.build_query_as::<User>().fetch_all(pool).await?;
        Ok(users)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<User> {
        Self::find_active(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }

    pub async fn admin_update(
        pool: &PgPool,
        id: Uuid,
        req: &AdminUpdateUserRequest,
    ) -> AppResult<User> {
        req.validate()?;
        sqlx::query_as::<_, User>(
            "UPDATE users
             SET first_name = COALESCE($1, first_name),
                 last_name  = COALESCE($2, last_name),
                 email      = COALESCE($3, email),
                 address    = COALESCE($4, address),
                 role       = COALESCE($5, role),
                 gender     = COALESCE($6, gender),
                 photo      = COALESCE($7, photo),
                 version    = version + 1
             WHERE id = $8 AND active = TRUE
             RETURNING *",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.email.as_deref().map(|e| e.trim().to_lowercase()))
        .bind(&req.address)
        .bind(req.role.map(|r| r.to_string()))
        .bind(req.gender.map(|g| g.to_string()))
        .bind(&req.photo)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
    }

    /// Self-service profile edit. Only name, email and photo can change here.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
        photo: Option<&str>,
    ) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users
             SET first_name = COALESCE($1, first_name),
                 last_name  = COALESCE($2, last_name),
                 email      = COALESCE($3, email),
                 photo      = COALESCE($4, photo),
                 version    = version + 1
             WHERE id = $5 AND active = TRUE
             RETURNING *",
        )
        .bind(first_name.map(str::trim))
        .bind(last_name.map(str::trim))
        .bind(email.map(|e| e.trim().to_lowercase()))
        .bind(photo)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
    }

    /// Soft delete. The row stays but every lookup skips it.
    pub async fn deactivate(pool: &PgPool, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1 AND active = TRUE")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("user"));
        }
        Ok(())
    }

    /// Replaces the credential, stamps `password_changed_at` and burns any reset token.
    pub async fn set_password(pool: &PgPool, id: Uuid, plain: &str) -> AppResult<User> {
        let plain = plain.to_string();
        let password_hash = tokio::task::spawn_blocking(move || credentials::hash_password(&plain))
            .await
            .map_err(anyhow::Error::from)??;

        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET password_hash = $1,
                 password_changed_at = $2,
                 password_reset_token = NULL,
                 password_reset_expires = NULL
             WHERE id = $3
             RETURNING *",
        )
        .bind(&password_hash)
        .bind(credentials::password_changed_at())
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    /// Stores (or with `None`, clears) the reset-token digest and its expiry.
    pub async fn store_reset_token(
        pool: &PgPool,
        id: Uuid,
        token_hash: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token = $1, password_reset_expires = $2 WHERE id = $3",
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_reset_token(pool: &PgPool, token_hash: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE password_reset_token = $1 AND password_reset_expires > NOW() AND active = TRUE",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    /// Removes every user. Only the dev-data tool calls this.
    pub async fn delete_all(pool: &PgPool) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM users").execute(pool).await?;
        Ok(result.rows_affected())
    }
}
