use lcp_notify::NotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    /// Malformed or missing caller input.
    #[error("{0}")]
    Validation(String),

    /// Renewal end date that is not RFC 3339.
    #[error("invalid end date {0}")]
    InvalidDate(String),

    #[error("license {0} not found")]
    NotFound(String),

    /// Legal request, disallowed by the current license state.
    #[error("{0}")]
    Forbidden(String),

    /// The issuing server could not be notified.
    #[error("license server notification failed ({code}): {detail}")]
    Upstream { code: u16, detail: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Another writer changed the status row between read and commit.
    #[error("license {0} was modified concurrently, retry")]
    Conflict(String),
}

impl StatusError {
    /// HTTP status this error is reported with.
    pub fn http_status(&self) -> u16 {
        match self {
            StatusError::Validation(_) | StatusError::InvalidDate(_) => 400,
            StatusError::Unauthorized => 401,
            StatusError::Forbidden(_) => 403,
            StatusError::NotFound(_) => 404,
            StatusError::Conflict(_) => 409,
            StatusError::Upstream { .. } | StatusError::Internal(_) => 500,
        }
    }
}

impl From<anyhow::Error> for StatusError {
    fn from(e: anyhow::Error) -> Self {
        StatusError::Internal(e.to_string())
    }
}

impl From<NotifyError> for StatusError {
    fn from(e: NotifyError) -> Self {
        let code = match &e {
            NotifyError::Remote(_) => 502,
            NotifyError::Timeout => 504,
            NotifyError::Io(_) => 503,
            NotifyError::Codec(_) | NotifyError::Frame(_) => 502,
        };
        StatusError::Upstream {
            code,
            detail: e.to_string(),
        }
    }
}
