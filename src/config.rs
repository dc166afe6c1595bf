use std::{env, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl std::str::FromStr for AppEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            _ => Err(anyhow::anyhow!("Unknown APP_ENV: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub jwt_cookie_expires_in_days: u64,
    pub app_env: AppEnv,
    pub host: String,
    pub port: u16,
    pub rate_limit_max: u64,
    pub rate_limit_window_secs: u64,
    pub image_dir: String,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    pub app_base_url: String,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "7776000".into())
                .parse()?,
            jwt_cookie_expires_in_days: env::var("JWT_COOKIE_EXPIRES_IN")
                .unwrap_or_else(|_| "90".into())
                .parse()?,
            app_env: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".into())
                .parse()?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            rate_limit_max: env::var("RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "100".into())
                .parse()?,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "3600".into())
                .parse()?,
            image_dir: env::var("IMAGE_DIR").unwrap_or_else(|_| "data/images".into()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                .parse()?,
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            smtp_host: env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_from: env::var("SMTP_FROM").ok().filter(|s| !s.is_empty()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    /// Upload settings handed to the image pipeline.
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            image_dir: PathBuf::from(&self.image_dir),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

/// Where uploaded images land and how large a multipart body may be.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub image_dir: PathBuf,
    pub max_upload_bytes: usize,
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
