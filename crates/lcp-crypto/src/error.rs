use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid passphrase hash: {0}")]
    InvalidUserKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("canonicalization failed: {0}")]
    Canonical(#[from] serde_json::Error),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("unsupported or unreadable signing key: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),
}
