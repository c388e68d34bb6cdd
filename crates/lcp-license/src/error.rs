use lcp_crypto::CryptoError;
use lcp_notify::NotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("status server unreachable: {0}")]
    Upstream(#[from] NotifyError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LicenseError {
    pub fn http_status(&self) -> u16 {
        match self {
            LicenseError::Validation(_) => 400,
            LicenseError::NotFound(_) => 404,
            LicenseError::Signing(_)
            | LicenseError::Crypto(_)
            | LicenseError::Upstream(_)
            | LicenseError::Internal(_) => 500,
        }
    }
}

impl From<CryptoError> for LicenseError {
    fn from(e: CryptoError) -> Self {
        match e {
            // a bad passphrase hash is the caller's fault
            CryptoError::InvalidUserKey(_) => LicenseError::Validation(e.to_string()),
            CryptoError::Signing(_) | CryptoError::Key(_) | CryptoError::Certificate(_) => {
                LicenseError::Signing(e.to_string())
            }
            other => LicenseError::Crypto(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for LicenseError {
    fn from(e: anyhow::Error) -> Self {
        LicenseError::Internal(e.to_string())
    }
}
