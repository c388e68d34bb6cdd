//! License status server core.
//!
//! [`machine`] holds the pure lifecycle rules, [`service::StatusService`]
//! sequences them against the event ledger and the issuing server, and
//! [`rpc`] exposes the service to the issuing server.

pub mod compliance;
pub mod config;
pub mod error;
pub mod links;
pub mod locks;
pub mod machine;
pub mod notifier;
pub mod rpc;
pub mod service;

pub use config::StatusConfig;
pub use error::StatusError;
pub use service::StatusService;

pub type Result<T> = std::result::Result<T, StatusError>;
