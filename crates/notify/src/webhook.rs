//! Generic HTTP webhook notifier.
//!
//! Delivers notifications as JSON payloads (`{subject, body, metadata}`)
//! to a configured URL. A 429 response becomes
//! [`NotifyError::RateLimited`] carrying the server's requested delay.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::traits::{Notification, Notifier, NotifyError};

/// Used when a 429 carries no usable delay.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Ceiling on any requested delay; longer values are clamped to it.
pub const MAX_RETRY_AFTER_SECS: u64 = 86_400;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts notifications as JSON to one endpoint.
///
/// `${NAME}` placeholders in the URL and header values are expanded from
/// the environment once, when the notifier is built.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(
        url: String,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let url = resolve_env_vars(&url)?;
        if let Err(e) = reqwest::Url::parse(&url) {
            return Err(NotifyError::Config(format!("webhook url '{url}' does not parse: {e}")));
        }

        let headers = headers
            .into_iter()
            .map(|(name, raw)| resolve_env_vars(&raw).map(|value| (name, value)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers,
            timeout,
        })
    }

    /// Build from the string-typed values found in a workers file.
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
        timeout: Option<Duration>,
    ) -> Result<Self, NotifyError> {
        let method = method
            .map(|raw| {
                reqwest::Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
                    .map_err(|_| NotifyError::Config(format!("'{raw}' is not an HTTP method")))
            })
            .transpose()?;

        Self::new(
            url,
            method,
            headers.unwrap_or_default(),
            timeout.unwrap_or(DEFAULT_SEND_TIMEOUT),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_transport(&self, err: reqwest::Error) -> NotifyError {
        if err.is_timeout() {
            NotifyError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            NotifyError::Http(err)
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(notification)
            .map_err(|e| NotifyError::Template(format!("notification is not JSON-encodable: {e}")))?;

        let request = self.headers.iter().fold(
            self.client
                .request(self.method.clone(), &self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json"),
            |req, (name, value)| req.header(name.as_str(), value.as_str()),
        );

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(url = %self.url, %status, "webhook accepted notification");
            return Ok(());
        }

        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = retry_after_secs(&headers, &text);
            tracing::warn!(url = %self.url, retry_after_secs, "webhook is rate limiting us");
            return Err(NotifyError::RateLimited { retry_after_secs });
        }

        tracing::warn!(url = %self.url, %status, body = %text, "webhook refused notification");
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Delay requested by a 429: the `Retry-After` header (delta seconds),
/// else a `retry_after` JSON field (seconds, possibly fractional), else
/// [`DEFAULT_RETRY_AFTER_SECS`]. Clamped to `1..=MAX_RETRY_AFTER_SECS`.
pub(crate) fn retry_after_secs(headers: &HeaderMap, body: &str) -> u64 {
    let from_header = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok());
    let from_body = || {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("retry_after").and_then(serde_json::Value::as_f64))
    };

    match from_header.or_else(from_body) {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            (secs.ceil().min(MAX_RETRY_AFTER_SECS as f64) as u64).max(1)
        }
        _ => DEFAULT_RETRY_AFTER_SECS,
    }
}

/// Expand `${NAME}` placeholders from the process environment.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            return Err(NotifyError::Config(format!(
                "unclosed ${{...}} placeholder in '{input}'"
            )));
        };
        let name = &after[..close];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                return Err(NotifyError::Config(format!(
                    "placeholder ${{{name}}} refers to an unset environment variable"
                )))
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
