//! `/services` endpoints: reads are public, writes are admin only.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{
        auth::{AuthenticatedUser, Permission},
        offering::{CreateOfferingRequest, UpdateOfferingRequest},
    },
    routes::{created, success, success_list, QueryPairs},
    services::{
        offerings::{OfferingService, OFFERING_RESOURCE},
        query_features::QueryFeatures,
    },
    AppState,
};

pub async fn list_services(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    let features = QueryFeatures::parse(&params, &OFFERING_RESOURCE)?;
    let services = OfferingService::list(&state.db, &features).await?;
    Ok(success_list("services", features.project(&services)?))
}

pub async fn get_service(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let service = OfferingService::get(&state.db, id).await?;
    Ok(success("service", service))
}

pub async fn create_service(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(body): AppJson<CreateOfferingRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    auth.authorize(Permission::ManageServices)?;
    let service = OfferingService::create(&state.db, &body).await?;
    Ok(created("service", service))
}

pub async fn update_service(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateOfferingRequest>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::ManageServices)?;
    let service = OfferingService::update(&state.db, id, &body).await?;
    Ok(success("service", service))
}

pub async fn delete_service(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    auth.authorize(Permission::ManageServices)?;
    OfferingService::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
