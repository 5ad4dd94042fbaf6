// error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Invalid hardware address: {0}")]
    Address(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
