use thiserror::Error;

#[derive(Error, Debug)]
pub enum KillwatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid killmail {kill_id}: {reason}")]
    InvalidKillmail { kill_id: i64, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for KillwatchError {
    fn from(e: serde_json::Error) -> Self {
        KillwatchError::Serialize(e.to_string())
    }
}
