use std::net::SocketAddr;

use nursery_api::{build_router, config::Config, db, services::email::EmailService, AppState};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let redis = match config.redis_url.as_deref() {
        Some(url) => {
            let client = redis::Client::open(url)?;
            match client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    info!("Redis connected");
                    Some(conn)
                }
                Err(e) => {
                    warn!("Redis unreachable, rate limiting disabled: {e}");
                    None
                }
            }
        }
        None => {
            info!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    let email = EmailService::new(&config);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        info!("SMTP not configured, password reset emails disabled");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(pool, redis, config, email);
    let app = build_router(state);

    info!("Nursery API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
