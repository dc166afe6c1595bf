pub mod auth;
pub mod child;
pub mod nursery;
pub mod offering;
pub mod review;
pub mod user;
