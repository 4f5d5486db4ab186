use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error in '{path}': {message}")]
    Manifest { path: String, message: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Batch aborted after table '{table}' failed: {reason}")]
    Aborted { table: String, reason: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;
