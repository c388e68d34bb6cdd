//! Shared start-up code of the `lsdserver` and `lcpserver` binaries.

pub mod config;
pub mod telemetry;
