//! Issuing server core: builds, stores and signs licenses, and keeps their
//! rights in step with the status server.

pub mod builder;
pub mod error;
pub mod notifier;
pub mod rpc;
pub mod service;
pub mod sync;

pub use builder::{LicenseBuilder, Profile};
pub use error::LicenseError;
pub use service::LicenseService;

pub type Result<T> = std::result::Result<T, LicenseError>;
