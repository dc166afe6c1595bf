use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness plus a database round trip.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let redis = if state.redis.is_some() { "configured" } else { "disabled" };
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "database": "up", "rateLimit": redis })),
        ),
        Err(e) => {
            tracing::warn!("Health check database ping failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "database": "down", "rateLimit": redis })),
            )
        }
    }
}
