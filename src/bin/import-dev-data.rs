//! Development data loader.
//!
//! Usage:
//!   DATABASE_URL=... ./import-dev-data --import data/users.json
//!   DATABASE_URL=... ./import-dev-data --delete
//!
//! `--import` reads a JSON array of users (signup fields plus `role`) and
//! creates each one with a hashed password. `--delete` removes every user.

use anyhow::{bail, Context, Result};
use clap::Parser;

use nursery_api::{
    db,
    models::user::{SignupRequest, UserRole},
    services::users::UserService,
};

#[derive(Parser)]
#[command(name = "import-dev-data", about = "Load or wipe development users")]
struct Args {
    /// JSON file with an array of users to create
    #[arg(long, value_name = "FILE", conflicts_with = "delete")]
    import: Option<std::path::PathBuf>,

    /// Delete all users
    #[arg(long)]
    delete: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL required")?;
    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await?;

    match (args.import, args.delete) {
        (Some(path), false) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let users: Vec<SignupRequest> =
                serde_json::from_str(&raw).context("Expected a JSON array of users")?;

            for user in &users {
                let role = user.role.unwrap_or(UserRole::Parent);
                UserService::create(&pool, user, role)
                    .await
                    .with_context(|| format!("Failed to import {}", user.email))?;
            }
            tracing::info!("Imported {} users", users.len());
        }
        (None, true) => {
            let deleted = UserService::delete_all(&pool).await?;
            tracing::info!("Deleted {deleted} users");
        }
        _ => bail!("Pass either --import <FILE> or --delete"),
    }

    Ok(())
}
