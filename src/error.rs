use thiserror::Error;

use crate::domain::track::TrackId;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("track {0} not found")]
    NotFound(TrackId),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("file name '{0}' has no usable extension")]
    InvalidName(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
