use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer did not answer in time")]
    Timeout,

    /// The peer answered with an `{"error": ..}` reply.
    #[error("peer replied with error: {0}")]
    Remote(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid frame: {0}")]
    Frame(String),
}
