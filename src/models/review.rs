use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Review joined with the author columns it is always read with.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewRow {
    pub id: Uuid,
    pub review: String,
    pub rating: f64,
    pub nursery_id: Uuid,
    pub user_id: Uuid,
    pub service_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub author_first_name: String,
    pub author_last_name: String,
    pub author_photo: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub photo: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: Uuid,
    pub review: String,
    pub rating: f64,
    pub nursery: Uuid,
    pub user: ReviewAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Uuid>,
    #[serde(rename = "__v")]
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl From<ReviewRow> for ReviewView {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            review: row.review,
            rating: row.rating,
            nursery: row.nursery_id,
            user: ReviewAuthor {
                id: row.user_id,
                first_name: row.author_first_name,
                last_name: row.author_last_name,
                photo: row.author_photo,
            },
            service: row.service_id,
            version: row.version,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: String,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: f64,
    /// Taken from the path on nested routes.
    pub nursery: Option<Uuid>,
    pub service: Option<Uuid>,
}

/// The nursery and author of a review are fixed once it exists.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: Option<f64>,
    pub service: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_out_of_range_fails_validation() {
        let req = CreateReviewRequest {
            review: "Lovely staff".into(),
            rating: 5.5,
            nursery: None,
            service: None,
        };
        assert!(req.validate().unwrap_err().field_errors().contains_key("rating"));
    }

    #[test]
    fn view_populates_author() {
        let user_id = Uuid::new_v4();
        let view = ReviewView::from(ReviewRow {
            id: Uuid::new_v4(),
            review: "Lovely staff".into(),
            rating: 4.5,
            nursery_id: Uuid::new_v4(),
            user_id,
            service_id: None,
            version: 0,
            created_at: Utc::now(),
            author_first_name: "Laila".into(),
            author_last_name: "Farouk".into(),
            author_photo: "default.jpeg".into(),
        });

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["user"]["id"], user_id.to_string());
        assert_eq!(json["user"]["firstName"], "Laila");
        assert!(json.get("service").is_none());
        assert_eq!(json["rating"], 4.5);
    }
}
