//! Add-on services a nursery can offer. Named "offering" in code to keep it
//! apart from the `services` layer; the API still calls them services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_AGE_RANGE: &str = "for all ages";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdditionalServiceKind {
    Printing,
    Clothing,
    Transportation,
    #[serde(rename = "Language lessons")]
    LanguageLessons,
    #[serde(rename = "Auxiliary tools")]
    AuxiliaryTools,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdditionalService {
    #[serde(rename = "type")]
    pub kind: AdditionalServiceKind,
    #[validate(length(
        min = 1,
        message = "Please provide a description for this additional service."
    ))]
    pub description: String,
    #[validate(range(min = 0.0, message = "Please enter the price of this additional service!"))]
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Offering {
    pub id: Uuid,
    pub service_name: String,
    pub description: String,
    pub age_range: String,
    pub additional_service: Option<Json<AdditionalService>>,
    #[serde(rename = "__v")]
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferingRequest {
    #[validate(length(min = 1, message = "Service Name can not be empty!"))]
    pub service_name: String,
    #[validate(length(min = 1, message = "Please provide a description."))]
    pub description: String,
    pub age_range: Option<String>,
    #[validate(nested)]
    pub additional_service: Option<AdditionalService>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOfferingRequest {
    #[validate(length(min = 1, message = "Service Name can not be empty!"))]
    pub service_name: Option<String>,
    #[validate(length(min = 1, message = "Please provide a description."))]
    pub description: Option<String>,
    pub age_range: Option<String>,
    #[validate(nested)]
    pub additional_service: Option<AdditionalService>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additional_service_kinds_use_display_names() {
        let svc: AdditionalService = serde_json::from_value(serde_json::json!({
            "type": "Language lessons",
            "description": "Weekly English sessions",
            "price": 150.0
        }))
        .unwrap();
        assert_eq!(svc.kind, AdditionalServiceKind::LanguageLessons);

        let bad: Result<AdditionalService, _> = serde_json::from_value(serde_json::json!({
            "type": "Swimming",
            "description": "Pool time",
            "price": 10.0
        }));
        assert!(bad.is_err());
    }
}
