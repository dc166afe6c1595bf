use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{
        auth::{AuthenticatedUser, Permission},
        nursery::{CreateNurseryRequest, UpdateNurseryRequest},
    },
    routes::{created, is_multipart, limit_json_body, success, success_list, QueryPairs},
    services::{
        images::{ImageService, MultipartForm, Upload},
        nurseries::{top_cheap_params, NurseryService, NURSERY_RESOURCE},
        query_features::QueryFeatures,
    },
    AppState,
};

async fn list_with(state: &AppState, params: &[(String, String)]) -> AppResult<Json<Value>> {
    let features = QueryFeatures::parse(params, &NURSERY_RESOURCE)?;
    let nurseries = NurseryService::list(&state.db, &features).await?;
    Ok(success_list("nurseries", features.project(&nurseries)?))
}

pub async fn list_nurseries(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    list_with(&state, &params).await
}

/// The three best-rated, cheapest nurseries with a short field set.
pub async fn top_cheap(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    list_with(&state, &top_cheap_params(params)).await
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let stats = NurseryService::stats(&state.db).await?;
    Ok(success("stats", stats))
}

pub async fn monthly_plan(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(year): AppPath<i32>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::ViewMonthlyPlan)?;
    let plan = NurseryService::monthly_plan(&state.db, year).await?;
    Ok(success("plan", plan))
}

pub async fn get_nursery(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let nursery = NurseryService::get(&state.db, id).await?;
    Ok(success("nursery", nursery))
}

pub async fn create_nursery(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(body): AppJson<CreateNurseryRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    auth.authorize(Permission::ManageNurseries)?;
    let nursery = NurseryService::create(&state.db, &auth, &body).await?;
    Ok(created("nursery", nursery))
}

/// Accepts JSON, or multipart with `imageCover` (one file) and `images`
/// (any number of files) next to the text fields. Uploaded files replace
/// the matching fields.
pub async fn update_nursery(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
    request: Request,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::ManageNurseries)?;
    let current = NurseryService::find_managed(&state.db, &auth, id).await?;

    let (mut body, cover, images): (UpdateNurseryRequest, Option<Upload>, Vec<Upload>) =
        if is_multipart(request.headers()) {
            let multipart = Multipart::from_request(request, &state).await?;
            let mut form = MultipartForm::read(multipart).await?;
            let cover = form.take_file("imageCover");
            let images = form.take_files("images");
            (form.parse_fields()?, cover, images)
        } else {
            let request = limit_json_body(request).await?;
            let AppJson(body) =
                AppJson::<UpdateNurseryRequest>::from_request(request, &state).await?;
            (body, None, Vec::new())
        };

    if cover.is_some() || !images.is_empty() {
        let (cover_name, image_names) =
            ImageService::save_nursery_images(&state.uploads.image_dir, current.id, cover, images)
                .await?;
        if cover_name.is_some() {
            body.image_cover = cover_name;
        }
        if !image_names.is_empty() {
            body.images = Some(image_names);
        }
    }

    let nursery = NurseryService::update(&state.db, &current, &body).await?;
    Ok(success("nursery", nursery))
}

pub async fn delete_nursery(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    auth.authorize(Permission::ManageNurseries)?;
    let current = NurseryService::find_managed(&state.db, &auth, id).await?;
    NurseryService::delete(&state.db, &current).await?;
    Ok(StatusCode::NO_CONTENT)
}
