use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("Invalid threshold {name}: {details}")]
    InvalidThreshold { name: String, details: String },

    #[error("Invalid window {name}: {value} (must be at least 1)")]
    InvalidWindow { name: String, value: usize },

    #[error("Table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlanningError>;
