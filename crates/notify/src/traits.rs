//! Delivery channel seam and its failure modes.

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("cannot render notification: {0}")]
    Template(String),

    #[error("bad notifier setup: {0}")]
    Config(String),

    /// The endpoint answered 429. The worker pauses sends for this long.
    #[error("endpoint asked us to back off for {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("endpoint refused delivery (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl NotifyError {
    pub fn retry_after(&self) -> Option<u64> {
        if let NotifyError::RateLimited { retry_after_secs } = self {
            Some(*retry_after_secs)
        } else {
            None
        }
    }
}

/// Subject, body and string metadata as posted to the webhook.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Kill id, tier, worker id and similar tags.
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Something that can carry a [`Notification`] to a user.
///
/// Workers only see this trait, so tests swap in scripted channels.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Short label used in logs.
    fn channel_name(&self) -> &str;
}
