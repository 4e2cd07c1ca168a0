use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncboxError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<anyhow::Error> for SyncboxError {
    fn from(err: anyhow::Error) -> Self {
        SyncboxError::InvalidConfig(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, SyncboxError>;
