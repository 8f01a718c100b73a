//! Crate-level error type for the scheduling core.
//!
//! HTTP-facing code maps these into [`crate::web::error::ApiError`]; internal
//! callers that only need to propagate context use `anyhow::Error` instead,
//! the same split the service layer uses for `run`/`shutdown`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("holiday data error: {0}")]
    Holiday(String),

    #[error("calendar parse error: {0}")]
    Ics(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
