use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Request, State,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure a handler can produce.
///
/// All variants except `Internal` are operational: their message is safe to
/// show to the client as-is.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("You are not logged in! Please log in to get access.")]
    NotAuthenticated,

    #[error("Invalid token. Please log in again!")]
    InvalidToken,

    #[error("Your token has expired! Please log in again.")]
    TokenExpired,

    #[error("The user belonging to this token no longer exists.")]
    UserGone,

    #[error("User recently changed password! Please log in again.")]
    PasswordChanged,

    #[error("{0}")]
    IncorrectCredentials(&'static str),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    DuplicateKey(String),

    #[error("Too many requests from this IP, please try again in an hour!")]
    TooManyRequests,

    /// Extractor rejections keep the status the framework chose (400, 413, 415...).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("{0}")]
    UpstreamFailure(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("No {what} found with that ID"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotAuthenticated
            | AppError::InvalidToken
            | AppError::TokenExpired
            | AppError::UserGone
            | AppError::PasswordChanged
            | AppError::IncorrectCredentials(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DuplicateKey(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Rejected { status, .. } => *status,
            AppError::UpstreamFailure(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

/// Attached to the response of a programming error so the development-mode
/// layer can expose what went wrong.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    pub stack: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_operational() {
            let kind = if status.is_client_error() { "fail" } else { "error" };
            return (
                status,
                Json(json!({ "status": kind, "message": self.to_string() })),
            )
                .into_response();
        }

        tracing::error!(error = ?self, "unhandled error");
        let report = ErrorReport {
            message: self.to_string(),
            stack: format!("{self:?}"),
        };
        let mut response = (
            status,
            Json(json!({ "status": "error", "message": "Something went very wrong!" })),
        )
            .into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Outside production, rewrites generic 500 bodies to include the error detail.
pub async fn expose_error_details(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if state.config.is_production() {
        return response;
    }

    match response.extensions().get::<ErrorReport>().cloned() {
        Some(report) => (
            response.status(),
            Json(json!({
                "status": "error",
                "message": "Something went very wrong!",
                "error": report.message,
                "stack": report.stack,
            })),
        )
            .into_response(),
        None => response,
    }
}

/// Names the field behind a unique constraint so clients get a usable message.
fn duplicate_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("reviews_nursery_id_user_id_key") => {
            "You have already reviewed this nursery. Please update your existing review instead!"
                .to_string()
        }
        Some(name) => {
            let field = match name {
                "users_email_key" => "email",
                "nurseries_name_key" => "name",
                "nurseries_phone_number_key" => "phoneNumber",
                other => other,
            };
            format!("Duplicate field value for {field}. Please use another value!")
        }
        None => "Duplicate field value. Please use another value!".to_string(),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::DuplicateKey(duplicate_message(db_err.constraint()));
            }
            if db_err.is_foreign_key_violation() {
                return AppError::Validation(
                    "Invalid input data. A referenced record does not exist.".to_string(),
                );
            }
            if db_err.is_check_violation() {
                let detail = db_err.constraint().unwrap_or("constraint");
                return AppError::Validation(format!("Invalid input data. Violates {detail}."));
            }
            // string_data_right_truncation: a value longer than its VARCHAR column.
            if db_err.code().as_deref() == Some("22001") {
                return AppError::Validation(
                    "Invalid input data. A field is longer than allowed.".to_string(),
                );
            }
        }
        AppError::Internal(err.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter()
                    .map(|e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None => format!("{field} is invalid ({})", e.code),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        messages.sort();
        if messages.is_empty() {
            // Only nested structs failed; their Display names the path.
            messages.push(errors.to_string());
        }
        AppError::Validation(format!("Invalid input data. {}", messages.join(". ")))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(err.into())
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),* $(,)?) => {
        $(
            impl From<$rejection> for AppError {
                fn from(rejection: $rejection) -> Self {
                    AppError::Rejected {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )*
    };
}

from_rejection!(
    JsonRejection,
    PathRejection,
    QueryRejection,
    MultipartRejection,
    MultipartError,
);
