pub mod auth;
pub mod metrics;
pub mod org;
pub mod user;
