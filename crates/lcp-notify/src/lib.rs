//! Server-to-server notification RPC.
//!
//! One command per TCP connection: the caller writes a command line and a
//! length-prefixed JSON envelope, the callee replies with one length-prefixed
//! JSON value. See [`protocol`] for the byte layout.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::NotifyClient;
pub use error::NotifyError;
pub use server::{Endpoint, Handler};
