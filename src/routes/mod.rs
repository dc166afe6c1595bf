pub mod auth;
pub mod children;
pub mod health;
pub mod metrics;
pub mod nurseries;
pub mod offerings;
pub mod reviews;
pub mod users;

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    JSON_BODY_LIMIT,
};

/// `{status: "success", data: {<key>: value}}`
pub fn success<T: Serialize>(key: &str, value: T) -> Json<Value> {
    Json(json!({ "status": "success", "data": { key: value } }))
}

/// List envelope with the number of returned items.
pub fn success_list(key: &str, items: Vec<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "results": items.len(),
        "data": { key: items },
    }))
}

pub fn created<T: Serialize>(key: &str, value: T) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, success(key, value))
}

pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// Upload routes raise the body limit for multipart forms. Their JSON bodies
/// are buffered here under the same cap as every other route.
pub async fn limit_json_body(request: Request) -> AppResult<Request> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, JSON_BODY_LIMIT)
        .await
        .map_err(|_| AppError::Rejected {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "Failed to buffer the request body: length limit exceeded".to_string(),
        })?;
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Raw query pairs in request order, so repeated keys and bracketed
/// operators such as `price[gte]` survive untouched.
pub type QueryPairs = Vec<(String, String)>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn list_envelope_counts_results() {
        let Json(body) =
            success_list("nurseries", vec![json!({"name": "a"}), json!({"name": "b"})]);
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 2);
        assert_eq!(body["data"]["nurseries"][1]["name"], "b");
    }

    #[tokio::test]
    async fn json_body_over_the_cap_is_refused() {
        let request = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"description":"{}"}}"#, "x".repeat(200 * 1024))))
            .unwrap();
        let err = limit_json_body(request).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn small_json_body_passes_through() {
        let request = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"firstName":"Laila"}"#))
            .unwrap();
        let request = limit_json_body(request).await.unwrap();
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/json");

        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"firstName":"Laila"}"#);
    }

    #[test]
    fn multipart_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=X-BOUNDARY"),
        );
        assert!(is_multipart(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));
    }
}
