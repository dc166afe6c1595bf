use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{
        auth::{AuthenticatedUser, Permission},
        child::{CreateChildRequest, UpdateChildRequest},
    },
    routes::{created, success, success_list, QueryPairs},
    services::{
        children::{ChildService, CHILD_RESOURCE},
        query_features::QueryFeatures,
    },
    AppState,
};

pub async fn list_children(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    let features = QueryFeatures::parse(&params, &CHILD_RESOURCE)?;
    let children = ChildService::list(&state.db, &auth, &features).await?;
    Ok(success_list("children", features.project(&children)?))
}

pub async fn get_child(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let child = ChildService::get(&state.db, &auth, id).await?;
    Ok(success("child", child))
}

pub async fn create_child(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(body): AppJson<CreateChildRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    auth.authorize(Permission::RegisterChild)?;
    let child = ChildService::create(&state.db, &auth, &body).await?;
    Ok(created("child", child))
}

pub async fn update_child(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateChildRequest>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::EditChild)?;
    let child = ChildService::update(&state.db, &auth, id, &body).await?;
    Ok(success("child", child))
}

pub async fn delete_child(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    auth.authorize(Permission::EditChild)?;
    ChildService::delete(&state.db, &auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
