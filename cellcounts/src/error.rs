//! Error types shared by the loader, the store and the analysis steps.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The SQLite store could not be opened or queried (missing file, missing
    /// relation, broken schema). Never retried.
    #[error("data source error: {0}")]
    DataSource(#[from] sqlx::Error),

    #[error("row {position} rejected at the data-access boundary: {reason}")]
    RejectedRow { position: usize, reason: String },

    /// An optional capability was compiled out of this build.
    #[error("{capability} is not available in this build")]
    MissingDependency { capability: &'static str },

    #[error("malformed input ({location}): {reason}")]
    MalformedInput { location: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("plot rendering failed: {0}")]
    Plot(String),
}

impl Error {
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, Error::MissingDependency { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
