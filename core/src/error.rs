use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ReconResult<T> = Result<T, ReconError>;
