//! Outbound notification channels for killwatch.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - A webhook notifier with rate-limit detection
//! - Minijinja rendering of kill and rollup messages

pub mod templating;
pub mod traits;
pub mod webhook;

pub use templating::{
    InterestView, KillView, MessageTemplates, RollupView, TemplateContext, TemplateRenderer,
};
pub use traits::{Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
