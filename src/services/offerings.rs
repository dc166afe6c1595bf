use sqlx::{types::Json, PgPool, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::offering::{CreateOfferingRequest, Offering, UpdateOfferingRequest, DEFAULT_AGE_RANGE},
    services::query_features::{Column, ColumnKind, QueryFeatures, Resource},
};

pub static OFFERING_RESOURCE: Resource = Resource {
    columns: &[
        Column { field: "serviceName", sql: "service_name", kind: ColumnKind::Text },
        Column { field: "ageRange", sql: "age_range", kind: ColumnKind::Text },
        Column { field: "createdAt", sql: "created_at", kind: ColumnKind::Timestamp },
    ],
    created_at: "created_at",
    id: "id",
};

pub struct OfferingService;

impl OfferingService {
    pub async fn list(pool: &PgPool, features: &QueryFeatures) -> AppResult<Vec<Offering>> {
        let mut qb = QueryBuilder::new("SELECT * FROM services WHERE TRUE");
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        Ok(qb.build_query_as::<Offering>().fetch_all(pool).await?)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<Offering> {
        sqlx::query_as::<_, Offering>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("service"))
    }

    pub async fn create(pool: &PgPool, req: &CreateOfferingRequest) -> AppResult<Offering> {
        req.validate()?;

        let offering = sqlx::query_as::<_, Offering>(
            "INSERT INTO services (service_name, description, age_range, additional_service)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(req.service_name.trim())
        .bind(req.description.trim())
        .bind(req.age_range.as_deref().unwrap_or(DEFAULT_AGE_RANGE))
        .bind(req.additional_service.clone().map(Json))
        .fetch_one(pool)
        .await?;

        tracing::info!(service_id = %offering.id, "Service created");
        Ok(offering)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateOfferingRequest,
    ) -> AppResult<Offering> {
        req.validate()?;

        sqlx::query_as::<_, Offering>(
            "UPDATE services
             SET service_name       = COALESCE($1, service_name),
                 description        = COALESCE($2, description),
                 age_range          = COALESCE($3, age_range),
                 additional_service = COALESCE($4, additional_service),
                 version            = version + 1
             WHERE id = $5
             RETURNING *",
        )
        .bind(req.service_name.as_deref().map(str::trim))
        .bind(req.description.as_deref().map(str::trim))
        .bind(&req.age_range)
        .bind(req.additional_service.clone().map(Json))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("service"))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("service"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_filter_on_age_range() {
        let features = QueryFeatures::parse(
            &[
                ("ageRange".to_string(), "for all ages".to_string()),
                ("sort".to_string(), "serviceName".to_string()),
            ],
            &OFFERING_RESOURCE,
        )
        .unwrap();
        let mut qb = QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM services WHERE TRUE");
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM services WHERE TRUE AND age_range = $1 ORDER BY service_name ASC, id LIMIT $2 OFFSET $3"
        );
    }

    #[test]
    fn unknown_service_fields_are_rejected() {
        let err = QueryFeatures::parse(
            &[("price[gte]".to_string(), "10".to_string())],
            &OFFERING_RESOURCE,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid filter field: price");
    }
}
