use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::user::Gender;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub medical_information: Vec<String>,
    #[serde(rename = "parent")]
    pub parent_id: Uuid,
    pub preferred_communication_method: String,
    #[serde(rename = "nursery")]
    pub nursery_id: Uuid,
    #[serde(rename = "__v")]
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl Child {
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        age_in_years(self.date_of_birth, today)
    }
}

/// A child with the age computed at read time.
#[derive(Debug, Serialize)]
pub struct ChildView {
    #[serde(flatten)]
    pub child: Child,
    pub age: i32,
}

impl From<Child> for ChildView {
    fn from(child: Child) -> Self {
        let age = child.age_on(Utc::now().date_naive());
        Self { child, age }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationMethod {
    Phone,
    Email,
}

impl std::fmt::Display for CommunicationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self {
            CommunicationMethod::Phone => "phone",
            CommunicationMethod::Email => "email",
        };
        f.write_str(method)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChildRequest {
    #[validate(length(
        min = 3,
        max = 128,
        message = "First name must have between 3 and 128 characters"
    ))]
    pub first_name: String,
    #[validate(length(
        min = 3,
        max = 128,
        message = "Last name must have between 3 and 128 characters"
    ))]
    pub last_name: String,
    #[serde(deserialize_with = "deserialize_birth_date")]
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub medical_information: Option<Vec<String>>,
    /// Only honoured for admins; parents always register their own children.
    pub parent: Option<Uuid>,
    pub preferred_communication_method: Option<CommunicationMethod>,
    pub nursery: Uuid,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChildRequest {
    #[validate(length(
        min = 3,
        max = 128,
        message = "First name must have between 3 and 128 characters"
    ))]
    pub first_name: Option<String>,
    #[validate(length(
        min = 3,
        max = 128,
        message = "Last name must have between 3 and 128 characters"
    ))]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_birth_date")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub medical_information: Option<Vec<String>>,
    pub preferred_communication_method: Option<CommunicationMethod>,
    pub nursery: Option<Uuid>,
}

pub const BIRTH_DATE_FORMAT_ERROR: &str =
    "Invalid date format! Please provide the date in the format DD/MM/YYYY";

/// Accepts `DD/MM/YYYY` as well as ISO `YYYY-MM-DD`.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn deserialize_birth_date<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(d)?;
    parse_birth_date(&raw).ok_or_else(|| serde::de::Error::custom(BIRTH_DATE_FORMAT_ERROR))
}

fn deserialize_optional_birth_date<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(raw) => parse_birth_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(BIRTH_DATE_FORMAT_ERROR)),
        None => Ok(None),
    }
}

pub fn check_birth_date(date: NaiveDate, today: NaiveDate) -> Result<(), String> {
    if date > today {
        return Err("Date of birth can not be in the future".to_string());
    }
    Ok(())
}

/// Whole calendar years between `dob` and `today`.
pub fn age_in_years(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn birth_date_accepts_both_formats() {
        assert_eq!(parse_birth_date("26/05/2021"), Some(date(2021, 5, 26)));
        assert_eq!(parse_birth_date("2021-05-26"), Some(date(2021, 5, 26)));
        assert_eq!(parse_birth_date("26-05-2021"), None);
        assert_eq!(parse_birth_date("31/02/2021"), None);
    }

    #[test]
    fn age_counts_whole_years() {
        let dob = date(2020, 6, 15);
        assert_eq!(age_in_years(dob, date(2024, 6, 14)), 3);
        assert_eq!(age_in_years(dob, date(2024, 6, 15)), 4);
        assert_eq!(age_in_years(dob, date(2020, 6, 15)), 0);
    }

    #[test]
    fn future_birth_dates_are_rejected() {
        let today = date(2024, 1, 1);
        assert!(check_birth_date(date(2024, 1, 2), today).is_err());
        assert!(check_birth_date(today, today).is_ok());
    }

    #[test]
    fn create_request_rejects_bad_birth_date_format() {
        let result: Result<CreateChildRequest, _> = serde_json::from_value(serde_json::json!({
            "firstName": "Yassin",
            "lastName": "Farouk",
            "dateOfBirth": "May 26th",
            "gender": "male",
            "nursery": Uuid::nil(),
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("DD/MM/YYYY"));
    }
}
