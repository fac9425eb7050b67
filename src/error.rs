use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("history source unavailable for board {board}: {message}")]
    Source { board: String, message: String },
}

/// One board whose pipeline did not complete. Collected, never fatal to the run.
#[derive(Debug, Clone, Serialize)]
pub struct BoardFailure {
    pub board_id: Uuid,
    pub board_name: String,
    pub stage: String,
    pub error: String,
}

impl BoardFailure {
    pub fn new(board_id: Uuid, board_name: &str, stage: &str, error: impl ToString) -> Self {
        Self {
            board_id,
            board_name: board_name.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
        }
    }
}
