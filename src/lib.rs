pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Uri},
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use redis::aio::MultiplexedConnection;
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use config::{Config, UploadConfig};
use error::AppError;
use services::email::EmailService;

/// JSON bodies above this size are rejected with 413.
pub const JSON_BODY_LIMIT: usize = 10 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Rate limiting is skipped when Redis is not configured.
    pub redis: Option<MultiplexedConnection>,
    pub config: Arc<Config>,
    pub email: Option<Arc<EmailService>>,
    pub uploads: Arc<UploadConfig>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        redis: Option<MultiplexedConnection>,
        config: Config,
        email: Option<EmailService>,
    ) -> Self {
        let uploads = Arc::new(config.upload_config());
        Self {
            db,
            redis,
            config: Arc::new(config),
            email: email.map(Arc::new),
            uploads,
        }
    }
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Can't find {uri} on this server!"))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origin = match HeaderValue::from_str(&config.cors_origin) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!(
                origin = %config.cors_origin,
                "Invalid CORS_ORIGIN, cross-origin requests disabled"
            );
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .allow_origin(origin)
}

pub fn build_router(state: AppState) -> Router {
    use routes::{auth, children, nurseries, offerings, reviews, users};

    let upload_limit = DefaultBodyLimit::max(state.uploads.max_upload_bytes);

    let api = Router::new()
        // Authentication
        .route("/users/signup", post(auth::signup))
        .route("/users/login", post(auth::login))
        .route("/users/logout", get(auth::logout))
        .route("/users/forgotPassword", post(auth::forgot_password))
        .route("/users/resetPassword", patch(auth::reset_password))
        .route("/users/updateMyPassword", patch(auth::update_password))
        // Current user
        .route("/users/me", get(users::get_me))
        .route("/users/updateMe", patch(users::update_me).layer(upload_limit))
        .route("/users/deleteMe", delete(users::delete_me))
        // User administration
        .route("/users", get(users::list_users))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        // Nurseries
        .route("/nurseries/top-3-cheap", get(nurseries::top_cheap))
        .route("/nurseries/nursery-stats", get(nurseries::stats))
        .route("/nurseries/monthly-Plan/{year}", get(nurseries::monthly_plan))
        .route(
            "/nurseries",
            get(nurseries::list_nurseries).post(nurseries::create_nursery),
        )
        .route(
            "/nurseries/{id}",
            get(nurseries::get_nursery)
                .delete(nurseries::delete_nursery)
                .merge(patch(nurseries::update_nursery).layer(upload_limit)),
        )
        .route(
            "/nurseries/{id}/reviews",
            get(reviews::list_nursery_reviews).post(reviews::create_nursery_review),
        )
        // Reviews
        .route("/reviews", get(reviews::list_reviews).post(reviews::create_review))
        .route(
            "/reviews/{id}",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        // Children
        .route(
            "/children",
            get(children::list_children).post(children::create_child),
        )
        .route(
            "/children/{id}",
            get(children::get_child)
                .patch(children::update_child)
                .delete(children::delete_child),
        )
        // Services
        .route(
            "/services",
            get(offerings::list_services).post(offerings::create_service),
        )
        .route(
            "/services/{id}",
            get(offerings::get_service)
                .patch(offerings::update_service)
                .delete(offerings::delete_service),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::limit_by_ip,
        ));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .nest("/api/v1", api)
        .nest_service("/img", ServeDir::new(state.uploads.image_dir.clone()))
        .fallback(route_not_found)
        .layer(from_fn_with_state(state.clone(), error::expose_error_details))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
