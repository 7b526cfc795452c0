use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::paths::PathError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("{0}")]
    Other(String),
}
