use thiserror::Error;

/// Crate-wide error taxonomy. Each variant maps to one HTTP status in the
/// API layer; `LogWrite` is never propagated past the recognition flow.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("access log write failed: {0}")]
    LogWrite(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Stable machine-readable code used in the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Auth(_) => "auth_error",
            Error::NotFound(_) => "not_found",
            Error::Store(_) => "store_error",
            Error::LogWrite(_) => "log_write_error",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}
