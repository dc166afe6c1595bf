use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Admin,
    Parent,
    NurseryOwner,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Admin => "admin",
            UserRole::Parent => "parent",
            UserRole::NurseryOwner => "nursery-owner",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "parent" => Ok(UserRole::Parent),
            "nursery-owner" => Ok(UserRole::NurseryOwner),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gender = match self {
            Gender::Male => "male",
            Gender::Female => "female",
        };
        f.write_str(gender)
    }
}

/// DB row struct. `role` and `gender` are TEXT columns guarded by CHECK constraints.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub role: String,
    pub gender: String,
    pub photo: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(rename = "__v")]
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::Parent)
    }
}

// Request DTOs
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
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
    #[validate(
        email(message = "Please provide a valid email!"),
        length(max = 255, message = "Email must have at most 255 characters")
    )]
    pub email: String,
    #[validate(length(min = 1, message = "Please provide your address!"))]
    pub address: String,
    pub role: Option<UserRole>,
    pub gender: Gender,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordQuery {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    pub password_confirm: Option<String>,
}

/// Body of `PATCH /users/updateMe`. Password fields are only read so the
/// request can be refused.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
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
    #[validate(
        email(message = "Please provide a valid email!"),
        length(max = 255, message = "Email must have at most 255 characters")
    )]
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

impl UpdateMeRequest {
    pub fn touches_password(&self) -> bool {
        self.password.is_some() || self.password_confirm.is_some()
    }
}

/// Admin edits never touch the credential.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
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
    #[validate(
        email(message = "Please provide a valid email!"),
        length(max = 255, message = "Email must have at most 255 characters")
    )]
    pub email: Option<String>,
    pub address: Option<String>,
    pub role: Option<UserRole>,
    pub gender: Option<Gender>,
    pub photo: Option<String>,
}

/// Password and confirmation must both be present and equal.
pub fn check_password_confirm(password: &str, confirm: Option<&str>) -> Result<(), String> {
    match confirm {
        None => Err("Please confirm your password!".to_string()),
        Some(c) if c != password => Err("Passwords are not the same!".to_string()),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [UserRole::Admin, UserRole::Parent, UserRole::NurseryOwner] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert!("nursury-owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn role_uses_kebab_case_on_the_wire() {
        let role: UserRole = serde_json::from_str("\"nursery-owner\"").unwrap();
        assert_eq!(role, UserRole::NurseryOwner);
    }

    #[test]
    fn password_confirmation_rules() {
        assert!(check_password_confirm("abcd1234", Some("abcd1234")).is_ok());
        assert_eq!(
            check_password_confirm("abcd1234", Some("abcd12345")).unwrap_err(),
            "Passwords are not the same!"
        );
        assert!(check_password_confirm("abcd1234", None).is_err());
    }

    #[test]
    fn signup_validation_flags_short_password_and_bad_email() {
        let req: SignupRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Laila",
            "lastName": "Farouk",
            "email": "not-an-email",
            "address": "Giza",
            "gender": "female",
            "password": "short",
            "passwordConfirm": "short"
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn names_longer_than_the_column_fail_validation() {
        let req: UpdateMeRequest = serde_json::from_value(serde_json::json!({
            "firstName": "L".repeat(200),
            "email": format!("{}@example.com", "a".repeat(250)),
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("email"));
    }

    #[test]
    fn user_serialization_hides_credentials() {
        let user = User {
            id: Uuid::new_v4(),
            first_name: "Laila".into(),
            last_name: "Farouk".into(),
            email: "laila@example.com".into(),
            address: "Giza".into(),
            role: "parent".into(),
            gender: "female".into(),
            photo: "default.jpeg".into(),
            password_hash: "$2b$12$hash".into(),
            password_changed_at: None,
            password_reset_token: Some("abc".into()),
            password_reset_expires: None,
            active: true,
            version: 0,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password").is_none());
        assert!(json.get("passwordResetToken").is_none());
        assert_eq!(json["firstName"], "Laila");
        assert_eq!(json["__v"], 0);
    }
}
