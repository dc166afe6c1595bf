use chrono::NaiveDate;
use sqlx::{types::Json, PgPool, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        nursery::{
            check_discount, check_name, check_phone_number, slugify, CreateNurseryRequest, GeoPoint,
            Location, MonthlyPlan, Nursery, NurseryDetail, NurseryStats, NurseryView,
            UpdateNurseryRequest,
        },
        user::UserRole,
    },
    services::{
        query_features::{Column, ColumnKind, QueryFeatures, Resource},
        reviews::ReviewService,
    },
};

pub static NURSERY_RESOURCE: Resource = Resource {
    columns: &[
        Column { field: "name", sql: "name", kind: ColumnKind::Text },
        Column { field: "slug", sql: "slug", kind: ColumnKind::Text },
        Column { field: "phoneNumber", sql: "phone_number", kind: ColumnKind::Text },
        Column { field: "maxGroupSize", sql: "max_group_size", kind: ColumnKind::Integer },
        Column { field: "numOfChilds", sql: "num_of_childs", kind: ColumnKind::Integer },
        Column { field: "ratingsAverage", sql: "ratings_average", kind: ColumnKind::Number },
        Column { field: "ratingsQuantity", sql: "ratings_quantity", kind: ColumnKind::Integer },
        Column { field: "price", sql: "price", kind: ColumnKind::Number },
        Column { field: "priceDiscount", sql: "price_discount", kind: ColumnKind::Number },
        Column { field: "finalPrice", sql: "(price - price_discount)", kind: ColumnKind::Number },
        Column { field: "summary", sql: "summary", kind: ColumnKind::Text },
        Column { field: "startDate", sql: "start_date", kind: ColumnKind::Date },
        Column { field: "owner", sql: "owner_id", kind: ColumnKind::Uuid },
        Column { field: "createdAt", sql: "created_at", kind: ColumnKind::Timestamp },
    ],
    created_at: "created_at",
    id: "id",
};

/// Query string behind `GET /nurseries/top-3-cheap`.
pub const TOP_CHEAP_PARAMS: [(&str, &str); 3] = [
    ("limit", "3"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,maxGroupSize,numOfChilds"),
];

/// Replaces any client-supplied limit/sort/fields with the top-3-cheap preset.
pub fn top_cheap_params(mut params: Vec<(String, String)>) -> Vec<(String, String)> {
    params.retain(|(k, _)| !TOP_CHEAP_PARAMS.iter().any(|(preset, _)| preset == k));
    params.extend(
        TOP_CHEAP_PARAMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    params
}

/// Admins manage every nursery; owners only their own.
pub fn ensure_can_manage(actor: &AuthenticatedUser, nursery: &Nursery) -> AppResult<()> {
    match actor.role() {
        UserRole::Admin => Ok(()),
        UserRole::NurseryOwner if nursery.owner_id == Some(actor.id()) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

fn check_locations(
    start_location: Option<&GeoPoint>,
    locations: Option<&[Location]>,
) -> AppResult<()> {
    if let Some(point) = start_location {
        point.check().map_err(AppError::Validation)?;
    }
    for location in locations.unwrap_or_default() {
        location.point.check().map_err(AppError::Validation)?;
    }
    Ok(())
}

pub struct NurseryService;

impl NurseryService {
    pub async fn list(pool: &PgPool, features: &QueryFeatures) -> AppResult<Vec<NurseryView>> {
        let mut qb = QueryBuilder::new("SELECT * FROM nurseries WHERE TRUE");
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        let nurseries = qb.build_query_as::<Nursery>().fetch_all(pool).await?;
        Ok(nurseries.into_iter().map(NurseryView::from).collect())
    }

    pub async fn find(pool: &PgPool, id: Uuid) -> AppResult<Nursery> {
        sqlx::query_as::<_, Nursery>("SELECT * FROM nurseries WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("nursery"))
    }

    /// The nursery with its reviews populated.
    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<NurseryDetail> {
        let nursery = Self::find(pool, id).await?;
        let reviews = ReviewService::for_nursery(pool, id).await?;
        Ok(NurseryDetail {
            nursery: nursery.into(),
            reviews,
        })
    }

    /// Loads a nursery the actor is allowed to change.
    pub async fn find_managed(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<Nursery> {
        let nursery = Self::find(pool, id).await?;
        ensure_can_manage(actor, &nursery)?;
        Ok(nursery)
    }

    pub async fn create(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        req: &CreateNurseryRequest,
    ) -> AppResult<NurseryView> {
        req.validate()?;
        let name = check_name(&req.name).map_err(AppError::Validation)?;
        check_phone_number(&req.phone_number).map_err(AppError::Validation)?;
        let discount = req.price_discount.unwrap_or(0.0);
        check_discount(req.price, discount).map_err(AppError::Validation)?;
        check_locations(req.start_location.as_ref(), req.locations.as_deref())?;

        let owner_id = (actor.role() == UserRole::NurseryOwner).then(|| actor.id());

        let nursery = sqlx::query_as::<_, Nursery>(
            "INSERT INTO nurseries
                (name, slug, phone_number, max_group_size, num_of_childs, price, price_discount,
                 summary, description, image_cover, images, start_date, start_location, locations,
                 owner_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING *",
        )
        .bind(&name)
        .bind(slugify(&name))
        .bind(&req.phone_number)
        .bind(req.max_group_size)
        .bind(req.num_of_childs.unwrap_or(0))
        .bind(req.price)
        .bind(discount)
        .bind(req.summary.trim())
        .bind(req.description.as_deref().map(str::trim))
        .bind(&req.image_cover)
        .bind(req.images.clone().unwrap_or_default())
        .bind(req.start_date)
        .bind(req.start_location.clone().map(Json))
        .bind(Json(req.locations.clone().unwrap_or_default()))
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        tracing::info!(nursery_id = %nursery.id, owner = ?owner_id, "Nursery created");
        Ok(nursery.into())
    }

    /// Applies a partial update to an already-authorized nursery.
    pub async fn update(
        pool: &PgPool,
        current: &Nursery,
        req: &UpdateNurseryRequest,
    ) -> AppResult<NurseryView> {
        req.validate()?;
        let name = req
            .name
            .as_deref()
            .map(check_name)
            .transpose()
            .map_err(AppError::Validation)?;
        if let Some(phone) = &req.phone_number {
            check_phone_number(phone).map_err(AppError::Validation)?;
        }
        if req.price.is_some() || req.price_discount.is_some() {
            check_discount(
                req.price.unwrap_or(current.price),
                req.price_discount.unwrap_or(current.price_discount),
            )
            .map_err(AppError::Validation)?;
        }
        check_locations(req.start_location.as_ref(), req.locations.as_deref())?;

        let slug = name.as_deref().map(slugify);

        let nursery = sqlx::query_as::<_, Nursery>(
            "UPDATE nurseries
             SET name           = COALESCE($1, name),
                 slug           = COALESCE($2, slug),
                 phone_number   = COALESCE($3, phone_number),
                 max_group_size = COALESCE($4, max_group_size),
                 num_of_childs  = COALESCE($5, num_of_childs),
                 price          = COALESCE($6, price),
                 price_discount = COALESCE($7, price_discount),
                 summary        = COALESCE($8, summary),
                 description    = COALESCE($9, description),
                 image_cover    = COALESCE($10, image_cover),
                 images         = COALESCE($11, images),
                 start_date     = COALESCE($12, start_date),
                 start_location = COALESCE($13, start_location),
                 locations      = COALESCE($14, locations),
                 version        = version + 1
             WHERE id = $15
             RETURNING *",
        )
        .bind(name)
        .bind(slug)
        .bind(&req.phone_number)
        .bind(req.max_group_size)
        .bind(req.num_of_childs)
        .bind(req.price)
        .bind(req.price_discount)
        .bind(req.summary.as_deref().map(str::trim))
        .bind(req.description.as_deref().map(str::trim))
        .bind(&req.image_cover)
        .bind(&req.images)
        .bind(req.start_date)
        .bind(req.start_location.clone().map(Json))
        .bind(req.locations.clone().map(Json))
        .bind(current.id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("nursery"))?;

        Ok(nursery.into())
    }

    /// Reviews and children go with it.
    pub async fn delete(pool: &PgPool, current: &Nursery) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM nurseries WHERE id = $1")
            .bind(current.id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("nursery"));
        }
        tracing::info!(nursery_id = %current.id, "Nursery deleted");
        Ok(())
    }

    /// Highly rated nurseries (average >= 4) grouped by upper-cased name.
    pub async fn stats(pool: &PgPool) -> AppResult<Vec<NurseryStats>> {
        let stats = sqlx::query_as::<_, NurseryStats>(
            "SELECT UPPER(name)                              AS name,
                    SUM(ratings_quantity)::BIGINT            AS num_ratings,
                    AVG(ratings_average)::DOUBLE PRECISION   AS avg_rating,
                    SUM(price)::DOUBLE PRECISION             AS total_price,
                    SUM(max_group_size)::BIGINT              AS max_group_size,
                    SUM(num_of_childs)::BIGINT               AS num_of_childs
             FROM nurseries
             WHERE ratings_average >= 4
             GROUP BY UPPER(name)
             ORDER BY avg_rating DESC",
        )
        .fetch_all(pool)
        .await?;
        Ok(stats)
    }

    /// Nurseries starting in `year`, grouped by month, latest month first.
    pub async fn monthly_plan(pool: &PgPool, year: i32) -> AppResult<Vec<MonthlyPlan>> {
        let (from, to) = year_bounds(year)?;
        let plan = sqlx::query_as::<_, MonthlyPlan>(
            "SELECT EXTRACT(MONTH FROM start_date)::INT    AS month,
                    COUNT(*)::BIGINT                        AS num_nurseries_started,
                    ARRAY_AGG(name ORDER BY name)           AS nurseries
             FROM nurseries
             WHERE start_date BETWEEN $1 AND $2
             GROUP BY 1
             ORDER BY month DESC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;
        Ok(plan)
    }
}

fn year_bounds(year: i32) -> AppResult<(NaiveDate, NaiveDate)> {
    let invalid = || AppError::Validation(format!("Invalid year: {year}"));
    if !(1..=9999).contains(&year) {
        return Err(invalid());
    }
    let from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
    let to = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use chrono::Utc;

    fn actor(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user: User {
                id: Uuid::new_v4(),
                first_name: "Karim".into(),
                last_name: "Mostafa".into(),
                email: "owner@nursery.io".into(),
                address: "Alexandria".into(),
                role: role.into(),
                gender: "male".into(),
                photo: "default.jpeg".into(),
                password_hash: String::new(),
                password_changed_at: None,
                password_reset_token: None,
                password_reset_expires: None,
                active: true,
                version: 0,
                created_at: Utc::now(),
            },
        }
    }

    fn nursery(owner_id: Option<Uuid>) -> Nursery {
        Nursery {
            id: Uuid::new_v4(),
            name: "Little Stars Nursery".into(),
            slug: "little-stars-nursery".into(),
            phone_number: "01012345678".into(),
            max_group_size: 12,
            num_of_childs: 0,
            ratings_average: 1.0,
            ratings_quantity: 0,
            price: 500.0,
            price_discount: 50.0,
            summary: "Play-based learning".into(),
            description: None,
            image_cover: "cover.jpeg".into(),
            images: vec![],
            start_date: None,
            start_location: None,
            locations: Json(vec![]),
            owner_id,
            version: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn owners_manage_only_their_nurseries() {
        let owner = actor("nursery-owner");
        assert!(ensure_can_manage(&owner, &nursery(Some(owner.id()))).is_ok());
        assert!(matches!(
            ensure_can_manage(&owner, &nursery(Some(Uuid::new_v4()))),
            Err(AppError::Forbidden)
        ));
        assert!(ensure_can_manage(&owner, &nursery(None)).is_err());
        assert!(ensure_can_manage(&actor("admin"), &nursery(None)).is_ok());
        assert!(ensure_can_manage(&actor("parent"), &nursery(None)).is_err());
    }

    #[test]
    fn view_adds_final_price() {
        let json = serde_json::to_value(NurseryView::from(nursery(None))).unwrap();
        assert_eq!(json["finalPrice"], 450.0);
        assert_eq!(json["ratingsAverage"], 1.0);
        assert!(json.get("owner").is_some());
    }

    #[test]
    fn top_cheap_overrides_client_paging() {
        let params = top_cheap_params(vec![
            ("limit".into(), "50".into()),
            ("price[lt]".into(), "1000".into()),
        ]);
        assert!(params.contains(&("limit".to_string(), "3".to_string())));
        assert!(!params.contains(&("limit".to_string(), "50".to_string())));
        assert!(params.contains(&("price[lt]".to_string(), "1000".to_string())));

        let features = QueryFeatures::parse(&params, &NURSERY_RESOURCE).unwrap();
        assert_eq!(features.limit, 3);
    }

    #[test]
    fn year_bounds_cover_the_calendar_year() {
        let (from, to) = year_bounds(2024).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert!(year_bounds(0).is_err());
    }
}
