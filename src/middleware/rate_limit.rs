use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, AppState};

/// Per-IP request limit for everything under `/api`.
///
/// Uses the INCR + EXPIRE strategy:
/// - Increments a counter for the client IP
/// - On first increment, sets TTL to the window length
/// - Returns 429 once the counter exceeds the configured maximum
///
/// Without Redis, or when Redis errors, requests pass through.
pub async fn limit_by_ip(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(request).await;
    };

    let connect_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), connect_addr);
    let key = format!("rate:ip:{ip}");

    let mut conn = redis.clone();
    let count = match check_rate_limit(
        &mut conn,
        &key,
        state.config.rate_limit_window_secs,
    )
    .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("Rate limit check failed, letting request through: {e}");
            return next.run(request).await;
        }
    };

    if count > state.config.rate_limit_max {
        return AppError::TooManyRequests.into_response();
    }
    next.run(request).await
}

/// Increments the counter for `key` and returns the new value.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    window_secs: u64,
) -> redis::RedisResult<u64> {
    let count: u64 = redis::cmd("INCR").arg(key).query_async(redis).await?;

    if count == 1 {
        // Set TTL only on first increment to avoid resetting the window on each request
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(redis)
            .await?;
    }

    Ok(count)
}

/// Proxy headers first, then the socket peer.
pub fn client_ip(headers: &HeaderMap, connect_addr: Option<SocketAddr>) -> String {
    let from_header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    from_header("x-real-ip")
        .or_else(|| from_header("x-forwarded-for"))
        .or_else(|| connect_addr.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let peer: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.7");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.9");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.4");
    }
}
