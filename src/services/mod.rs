pub mod auth;
pub mod children;
pub mod credentials;
pub mod email;
pub mod images;
pub mod metrics;
pub mod nurseries;
pub mod offerings;
pub mod query_features;
pub mod ratings;
pub mod reviews;
pub mod users;
