use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{
        auth::{AuthenticatedUser, Permission},
        review::{CreateReviewRequest, UpdateReviewRequest},
    },
    routes::{created, success, success_list, QueryPairs},
    services::{
        query_features::QueryFeatures,
        reviews::{ReviewService, REVIEW_RESOURCE},
    },
    AppState,
};

async fn list_scoped(
    state: &AppState,
    params: &[(String, String)],
    nursery_id: Option<Uuid>,
) -> AppResult<Json<Value>> {
    let features = QueryFeatures::parse(params, &REVIEW_RESOURCE)?;
    let reviews = ReviewService::list(&state.db, &features, nursery_id).await?;
    Ok(success_list("reviews", features.project(&reviews)?))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    list_scoped(&state, &params, None).await
}

pub async fn list_nursery_reviews(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
    AppPath(nursery_id): AppPath<Uuid>,
    AppQuery(params): AppQuery<QueryPairs>,
) -> AppResult<Json<Value>> {
    list_scoped(&state, &params, Some(nursery_id)).await
}

pub async fn get_review(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let review = ReviewService::get(&state.db, id).await?;
    Ok(success("review", review))
}

pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(body): AppJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    auth.authorize(Permission::WriteReview)?;
    let review = ReviewService::create(&state.db, &auth, &body, None).await?;
    Ok(created("review", review))
}

pub async fn create_nursery_review(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(nursery_id): AppPath<Uuid>,
    AppJson(body): AppJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    auth.authorize(Permission::WriteReview)?;
    let review = ReviewService::create(&state.db, &auth, &body, Some(nursery_id)).await?;
    Ok(created("review", review))
}

pub async fn update_review(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateReviewRequest>,
) -> AppResult<Json<Value>> {
    auth.authorize(Permission::EditReview)?;
    let review = ReviewService::update(&state.db, &auth, id, &body).await?;
    Ok(success("review", review))
}

pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    auth.authorize(Permission::EditReview)?;
    ReviewService::delete(&state.db, &auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
