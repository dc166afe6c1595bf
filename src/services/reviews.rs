use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        review::{CreateReviewRequest, ReviewRow, ReviewView, UpdateReviewRequest},
    },
    services::{
        metrics::REVIEWS_COUNTER,
        nurseries::NurseryService,
        query_features::{Column, ColumnKind, QueryFeatures, Resource},
        ratings,
    },
};

pub static REVIEW_RESOURCE: Resource = Resource {
    columns: &[
        Column { field: "rating", sql: "r.rating", kind: ColumnKind::Number },
        Column { field: "nursery", sql: "r.nursery_id", kind: ColumnKind::Uuid },
        Column { field: "user", sql: "r.user_id", kind: ColumnKind::Uuid },
        Column { field: "service", sql: "r.service_id", kind: ColumnKind::Uuid },
        Column { field: "createdAt", sql: "r.created_at", kind: ColumnKind::Timestamp },
    ],
    created_at: "r.created_at",
    id: "r.id",
};

const REVIEW_SELECT: &str = "SELECT r.id, r.review, r.rating, r.nursery_id, r.user_id, r.service_id,
        r.version, r.created_at,
        u.first_name AS author_first_name, u.last_name AS author_last_name, u.photo AS author_photo
 FROM reviews r
 JOIN users u ON u.id = r.user_id";

/// Admins edit any review; everyone else only their own.
pub fn ensure_can_edit(actor: &AuthenticatedUser, review: &ReviewRow) -> AppResult<()> {
    if actor.is_admin() || review.user_id == actor.id() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub struct ReviewService;

impl ReviewService {
    /// Lists reviews, optionally scoped to one nursery (nested route).
    pub async fn list(
        pool: &PgPool,
        features: &QueryFeatures,
        nursery_id: Option<Uuid>,
    ) -> AppResult<Vec<ReviewView>> {
        let mut qb = QueryBuilder::new(REVIEW_SELECT);
        qb.push(" WHERE TRUE");
        if let Some(nursery_id) = nursery_id {
            qb.push(" AND r.nursery_id = ");
            qb.push_bind(nursery_id);
        }
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        let rows = qb.build_query_as::<ReviewRow>().fetch_all(pool).await?;
        Ok(rows.into_iter().map(ReviewView::from).collect())
    }

    pub async fn for_nursery(pool: &PgPool, nursery_id: Uuid) -> AppResult<Vec<ReviewView>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "{REVIEW_SELECT} WHERE r.nursery_id = $1 ORDER BY r.created_at DESC, r.id"
        ))
        .bind(nursery_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(ReviewView::from).collect())
    }

    async fn find_row(pool: &PgPool, id: Uuid) -> AppResult<ReviewRow> {
        sqlx::query_as::<_, ReviewRow>(&format!("{REVIEW_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("review"))
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<ReviewView> {
        Ok(Self::find_row(pool, id).await?.into())
    }

    /// The author is always the caller. On nested routes the nursery comes from the path.
    pub async fn create(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        req: &CreateReviewRequest,
        nursery_from_path: Option<Uuid>,
    ) -> AppResult<ReviewView> {
        req.validate()?;
        let nursery_id = nursery_from_path
            .or(req.nursery)
            .ok_or_else(|| AppError::Validation("Review must belong to a Nursery.".to_string()))?;
        NurseryService::find(pool, nursery_id).await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO reviews (review, rating, nursery_id, user_id, service_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(req.review.trim())
        .bind(req.rating)
        .bind(nursery_id)
        .bind(actor.id())
        .bind(req.service)
        .fetch_one(pool)
        .await?;

        ratings::recalculate(pool, nursery_id).await?;
        REVIEWS_COUNTER.with_label_values(&["created"]).inc();
        Self::get(pool, id).await
    }

    pub async fn update(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        id: Uuid,
        req: &UpdateReviewRequest,
    ) -> AppResult<ReviewView> {
        req.validate()?;
        let before = Self::find_row(pool, id).await?;
        ensure_can_edit(actor, &before)?;

        sqlx::query(
            "UPDATE reviews
             SET review     = COALESCE($1, review),
                 rating     = COALESCE($2, rating),
                 service_id = COALESCE($3, service_id),
                 version    = version + 1
             WHERE id = $4",
        )
        .bind(req.review.as_deref().map(str::trim))
        .bind(req.rating)
        .bind(req.service)
        .bind(id)
        .execute(pool)
        .await?;

        ratings::recalculate(pool, before.nursery_id).await?;
        REVIEWS_COUNTER.with_label_values(&["updated"]).inc();
        Self::get(pool, id).await
    }

    pub async fn delete(pool: &PgPool, actor: &AuthenticatedUser, id: Uuid) -> AppResult<()> {
        let before = Self::find_row(pool, id).await?;
        ensure_can_edit(actor, &before)?;

        let nursery_id: Uuid =
            sqlx::query_scalar("DELETE FROM reviews WHERE id = $1 RETURNING nursery_id")
                .bind(id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::not_found("review"))?;

        ratings::recalculate(pool, nursery_id).await?;
        REVIEWS_COUNTER.with_label_values(&["deleted"]).inc();
        Ok(())
    }
}
