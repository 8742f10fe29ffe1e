use thiserror::Error;

use crate::db::ApiError;

#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] ApiError),

    #[error("Invalid artifact: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, PurgeError>;
