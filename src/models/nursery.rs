use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;
use validator::Validate;

use super::review::ReviewView;

pub const NAME_MIN_LEN: usize = 10;
pub const NAME_MAX_LEN: usize = 30;

fn point_kind() -> String {
    "Point".to_string()
}

/// GeoJSON point. `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    pub coordinates: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GeoPoint {
    pub fn check(&self) -> Result<(), String> {
        if self.kind != "Point" {
            return Err(format!("Unsupported location type: {}", self.kind));
        }
        match self.coordinates.as_slice() {
            [lng, lat] if (-180.0..=180.0).contains(lng) && (-90.0..=90.0).contains(lat) => Ok(()),
            _ => Err("Coordinates must be [longitude, latitude] within valid ranges".to_string()),
        }
    }
}

/// A stop the children visit on a given day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Nursery {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub phone_number: String,
    pub max_group_size: i32,
    pub num_of_childs: i32,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: f64,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub start_location: Option<Json<GeoPoint>>,
    pub locations: Json<Vec<Location>>,
    #[serde(rename = "owner")]
    pub owner_id: Option<Uuid>,
    #[serde(rename = "__v")]
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl Nursery {
    pub fn final_price(&self) -> f64 {
        self.price - self.price_discount
    }
}

/// What the API returns for a nursery: the row plus derived fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NurseryView {
    #[serde(flatten)]
    pub nursery: Nursery,
    pub final_price: f64,
}

impl From<Nursery> for NurseryView {
    fn from(nursery: Nursery) -> Self {
        let final_price = nursery.final_price();
        Self { nursery, final_price }
    }
}

#[derive(Debug, Serialize)]
pub struct NurseryDetail {
    #[serde(flatten)]
    pub nursery: NurseryView,
    pub reviews: Vec<ReviewView>,
}

// Request DTOs
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNurseryRequest {
    pub name: String,
    pub phone_number: String,
    #[validate(range(min = 1, message = "A Nursery must have a size"))]
    pub max_group_size: i32,
    #[validate(range(min = 0, message = "numOfChilds can not be negative"))]
    pub num_of_childs: Option<i32>,
    #[validate(range(min = 0.0, message = "A Nursery must have a price"))]
    pub price: f64,
    pub price_discount: Option<f64>,
    #[validate(length(min = 1, message = "A Nursery must have a summary"))]
    pub summary: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "A Nursery must have a cover image"))]
    pub image_cover: String,
    pub images: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<Location>>,
}

/// Partial update. `imageCover` and `images` may also arrive as uploaded files.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNurseryRequest {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    #[validate(range(min = 1, message = "A Nursery must have a size"))]
    pub max_group_size: Option<i32>,
    #[validate(range(min = 0, message = "numOfChilds can not be negative"))]
    pub num_of_childs: Option<i32>,
    #[validate(range(min = 0.0, message = "A Nursery must have a price"))]
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    #[validate(length(min = 1, message = "A Nursery must have a summary"))]
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<Location>>,
}

/// One row of `GET /nurseries/nursery-stats`, grouped by upper-cased name.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NurseryStats {
    pub name: String,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub total_price: f64,
    pub max_group_size: i64,
    pub num_of_childs: i64,
}

/// One month of `GET /nurseries/monthly-Plan/{year}`.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i32,
    pub num_nurseries_started: i64,
    pub nurseries: Vec<String>,
}

/// Trims and checks the name length, returning the trimmed name.
pub fn check_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len < NAME_MIN_LEN {
        return Err(format!(
            "A Nursery name must be above or equal to {NAME_MIN_LEN} characters"
        ));
    }
    if len > NAME_MAX_LEN {
        return Err(format!(
            "A Nursery name must be below or equal to {NAME_MAX_LEN} characters"
        ));
    }
    Ok(trimmed.to_string())
}

/// Egyptian mobile number: 11 digits, `01` followed by 0, 1, 2 or 5.
pub fn check_phone_number(phone: &str) -> Result<(), String> {
    let valid = phone.len() == 11
        && phone.bytes().all(|b| b.is_ascii_digit())
        && phone.starts_with("01")
        && matches!(phone.as_bytes()[2], b'0' | b'1' | b'2' | b'5');
    if valid {
        Ok(())
    } else {
        Err("Please provide a valid phone number".to_string())
    }
}

pub fn check_discount(price: f64, discount: f64) -> Result<(), String> {
    if discount < 0.0 || (discount > 0.0 && discount >= price) {
        return Err(format!(
            "Discount price ({discount}) should be below regular price"
        ));
    }
    Ok(())
}

/// Lowercased alphanumeric words joined by `-`.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_follows_name() {
        assert_eq!(slugify("Little Stars Nursery"), "little-stars-nursery");
        assert_eq!(slugify("  Happy  Kids & Co. "), "happy-kids-co");
    }

    #[test]
    fn name_is_trimmed_then_bounded() {
        assert_eq!(check_name("  Little Stars Nursery ").unwrap(), "Little Stars Nursery");
        assert!(check_name("Tiny").is_err());
        assert!(check_name("A nursery name that is far too long to accept").is_err());
    }

    #[test]
    fn phone_numbers() {
        assert!(check_phone_number("01012345678").is_ok());
        assert!(check_phone_number("01512345678").is_ok());
        assert!(check_phone_number("01312345678").is_err());
        assert!(check_phone_number("0101234567").is_err());
        assert!(check_phone_number("0101234567a").is_err());
    }

    #[test]
    fn discount_must_stay_below_price() {
        assert!(check_discount(500.0, 0.0).is_ok());
        assert!(check_discount(500.0, 100.0).is_ok());
        assert!(check_discount(500.0, 500.0).is_err());
        assert!(check_discount(500.0, -1.0).is_err());
    }

    #[test]
    fn geo_points_are_checked() {
        let point = |coordinates: Vec<f64>| GeoPoint {
            kind: "Point".into(),
            coordinates,
            address: None,
            description: None,
        };
        assert!(point(vec![31.23, 30.04]).check().is_ok());
        assert!(point(vec![31.23]).check().is_err());
        assert!(point(vec![200.0, 30.0]).check().is_err());
    }

    #[test]
    fn location_flattens_point_and_day() {
        let location: Location = serde_json::from_value(serde_json::json!({
            "coordinates": [31.2, 30.0],
            "description": "Zamalek park",
            "day": 2
        }))
        .unwrap();
        assert_eq!(location.point.kind, "Point");
        assert_eq!(location.day, Some(2));
    }
}
