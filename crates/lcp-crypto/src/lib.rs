//! LCP crypto primitives.
//!
//! - AES-256-CBC with a random IV prefix, for the content key, the encrypted
//!   user fields and the key check
//! - AES-256-GCM with a counter nonce, for publication resources
//! - canonical JSON and RSA / ECDSA signatures over it

pub mod aes_cbc;
pub mod canon;
pub mod error;
pub mod gcm;
pub mod keys;
pub mod sign;

pub use error::CryptoError;

pub type Result<T> = std::result::Result<T, CryptoError>;
