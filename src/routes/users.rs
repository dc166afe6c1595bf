use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    models::{
        auth::{AuthenticatedUser, Permission},
        user::{AdminUpdateUserRequest, UpdateMeRequest},
    },
    routes::{is_multipart, limit_json_body, success, success_list, QueryPairs},
    services::{
        images::{ImageService, MultipartForm, Upload},
        query_features::QueryFeatures,
        users::{UserService, USER_RESOURCE},
    },
    AppState,
};

pub async fn get_me(auth: AuthenticatedUser) -> Json<Value> {
    success("user", auth.user)
}

/// Accepts JSON, or multipart with an optional `photo` file next to the text fields.
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    request: Request,
) -> AppResult<Json<Value>> {
    let (body, photo): (UpdateMeRequest, Option<Upload>) = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state).await?;
        let mut form = MultipartForm::read(multipart).await?;
        let photo = form.take_file("photo");
        (form.parse_fields()?, photo)
    } else {
        let request = limit_json_body(request).await?;
        let AppJson(body) = AppJson::<UpdateMeRequest>::from_request(request, &state).await?;
        (body, None)
    };

    if body.touches_password() {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /updateMyPassword.".to_string(),
        ));
    }
    body.validate()?;

    let photo = match photo {
        Some(upload) => {
            Some(ImageService::save_user_photo(&state.uploads.image_dir, auth.id(), upload).await?)
        }
        None => None,
    };

    let user = UserService::update_profile(
        &state.db,
        auth.id(),
        body.first_name.as_deref(),
        body.last_name.as_deref(),
        body.email.as_deref(),
        photo.as_deref(),
    )
    .await?;

    Ok(success("user", user))
}

pub async fn delete_me(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<StatusCode> {
    UserService::deactivate(&state.db, auth.id()).await?;
    tracing::info!(user_id = %auth.id(), "User deactivated own account");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::ManageUsers)?;
    let features = QueryFeatures::parse(&params, &USER_RESOURCE)?;
    let users = UserService::list(&state.db, &features).await?;
    Ok(success_list("users", features.project(&users)?))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::ManageUsers)?;
    let user = UserService::get(&state.db, id).await?;
    Ok(success("user", user))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<AdminUpdateUserRequest>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::ManageUsers)?;
    let user = UserService::admin_update(&state.db, id, &body).await?;
    Ok(success("user", user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    auth.authorize(Permission::ManageUsers)?;
    UserService::deactivate(&state.db, id).await?;
    tracing::info!(user_id = %id, admin_id = %auth.id(), "User deactivated by admin");
    Ok(StatusCode::NO_CONTENT)
}
