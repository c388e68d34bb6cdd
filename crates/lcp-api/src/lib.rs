//! HTTP surface of the status and issuing servers.

pub mod auth;
pub mod license;
pub mod problem;
pub mod status;

pub use auth::PasswordFile;
pub use problem::ApiError;
