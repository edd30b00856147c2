use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] killwatch_store::StoreError),

    #[error("profile error: {0}")]
    Profile(#[from] killwatch_interest::ConfigError),

    #[error("notify error: {0}")]
    Notify(#[from] killwatch_notify::NotifyError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid worker config: {0}")]
    Config(String),

    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),

    #[error("worker task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
