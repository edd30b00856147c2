//! Notification workers: poll the event store, score kills against an
//! interest profile, enrich on demand and deliver through a notifier.

pub mod config;
pub mod cooldown;
pub mod error;
pub mod fetch;
pub mod format;
pub mod rollup;
pub mod worker;

pub use config::{
    DeclaredWar, DeliveryMode, Retention, RollupConfig, WebhookConfig, WorkerConfig,
    WorkerSettings, WorkersFile,
};
pub use cooldown::Cooldown;
pub use error::{Result, WorkerError};
pub use fetch::{parse_detail, DetailFetcher, FetchError, HttpDetailFetcher};
pub use rollup::{RollupBatcher, RollupEntry};
pub use worker::{NotificationWorker, PendingNotification, PollSummary, WorkerHandle};
