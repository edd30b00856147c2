//! Minijinja template rendering for notification messages.
//!
//! Renders subject and body templates for single kills and rollup
//! summaries. Templates are arbitrary strings from worker config, so a
//! fresh [`minijinja::Environment`] is created per render call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use killwatch_core::{EntityId, KillId, Killmail, SystemId, Tier};

use crate::traits::{Notification, NotifyError};

pub const DEFAULT_KILL_SUBJECT: &str =
    "[{{ interest.tier | upper }}] {{ kill.total_value | isk }} ISK kill in {{ kill.system_name or kill.solar_system_id }}";

pub const DEFAULT_KILL_BODY: &str = "{{ kill.url }}\n\
Score {{ interest.score | round(2) }} ({{ interest.profile }})\
{% for c in interest.top_categories %}{% if loop.first %}\n{% endif %}{{ c[0] }}={{ c[1] | round(2) }}{% if not loop.last %} {% endif %}{% endfor %}\
{% if interest.matched_rules %}\nRules: {{ interest.matched_rules | join(\", \") }}{% endif %}\
{% if interest.ambush %}\nAmbush: {{ interest.ambush }}{% endif %}\
{% if interest.war %}\nWar: {{ interest.war }}{% endif %}";

pub const DEFAULT_ROLLUP_SUBJECT: &str =
    "[DIGEST] {{ rollup.count }} kills, {{ rollup.total_value | isk }} ISK";

pub const DEFAULT_ROLLUP_BODY: &str = "{% for k in rollup.kills %}\
- {{ k.total_value | isk }} ISK in {{ k.system_name or k.solar_system_id }} {{ k.url }}\n\
{% endfor %}{% if rollup.omitted %}...and {{ rollup.omitted }} more{% endif %}";

/// Kill fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct KillView {
    pub kill_id: KillId,
    pub kill_time: DateTime<Utc>,
    pub solar_system_id: SystemId,
    pub system_name: Option<String>,
    pub victim_ship_type_id: EntityId,
    pub victim_corporation_id: Option<EntityId>,
    pub victim_alliance_id: Option<EntityId>,
    pub attacker_count: u32,
    pub total_value: f64,
    pub is_pod_kill: bool,
    pub url: String,
}

impl KillView {
    pub fn new(kill: &Killmail, system_name: Option<String>) -> Self {
        Self {
            kill_id: kill.kill_id,
            kill_time: kill.kill_time,
            solar_system_id: kill.solar_system_id,
            system_name,
            victim_ship_type_id: kill.victim_ship_type_id,
            victim_corporation_id: kill.victim_corporation_id,
            victim_alliance_id: kill.victim_alliance_id,
            attacker_count: kill.attackers.count,
            total_value: kill.total_value,
            is_pod_kill: kill.is_pod_kill,
            url: format!("https://zkillboard.com/kill/{}/", kill.kill_id),
        }
    }
}

impl From<&Killmail> for KillView {
    fn from(kill: &Killmail) -> Self {
        Self::new(kill, None)
    }
}

/// Scoring outcome exposed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct InterestView {
    pub profile: String,
    pub score: f64,
    pub tier: Tier,
    pub matched_rules: Vec<String>,
    /// Matched categories, strongest first.
    pub top_categories: Vec<(String, f64)>,
    pub ambush: Option<String>,
    pub war: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollupView {
    pub count: usize,
    pub total_value: f64,
    /// Highest-value kills first.
    pub kills: Vec<KillView>,
    pub omitted: usize,
}

impl RollupView {
    /// Summarise `kills`, keeping the `top` most valuable for listing.
    pub fn new(mut kills: Vec<KillView>, top: usize) -> Self {
        let count = kills.len();
        let total_value = kills.iter().map(|k| k.total_value).sum();
        kills.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
        kills.truncate(top);
        let omitted = count - kills.len();
        Self {
            count,
            total_value,
            kills,
            omitted,
        }
    }
}

/// Context data available to notification templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub worker: String,
    pub kill: Option<KillView>,
    pub interest: Option<InterestView>,
    pub rollup: Option<RollupView>,
    /// Current timestamp in RFC 3339 format.
    pub now: String,
}

impl TemplateContext {
    pub fn for_kill(worker: impl Into<String>, kill: KillView, interest: InterestView) -> Self {
        Self {
            worker: worker.into(),
            kill: Some(kill),
            interest: Some(interest),
            rollup: None,
            now: Utc::now().to_rfc3339(),
        }
    }

    pub fn for_rollup(worker: impl Into<String>, rollup: RollupView) -> Self {
        Self {
            worker: worker.into(),
            kill: None,
            interest: None,
            rollup: Some(rollup),
            now: Utc::now().to_rfc3339(),
        }
    }
}

/// Subject/body template pairs, overridable per worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub kill_subject: String,
    pub kill_body: String,
    pub rollup_subject: String,
    pub rollup_body: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            kill_subject: DEFAULT_KILL_SUBJECT.to_string(),
            kill_body: DEFAULT_KILL_BODY.to_string(),
            rollup_subject: DEFAULT_ROLLUP_SUBJECT.to_string(),
            rollup_body: DEFAULT_ROLLUP_BODY.to_string(),
        }
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    templates: MessageTemplates,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer for `templates`, rejecting any that fail to parse.
    pub fn with_templates(templates: MessageTemplates) -> Result<Self, NotifyError> {
        let renderer = Self { templates };
        for (name, tmpl) in [
            ("kill_subject", &renderer.templates.kill_subject),
            ("kill_body", &renderer.templates.kill_body),
            ("rollup_subject", &renderer.templates.rollup_subject),
            ("rollup_body", &renderer.templates.rollup_body),
        ] {
            renderer
                .validate(tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid {name} template: {e}")))?;
        }
        Ok(renderer)
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("isk", isk_filter);
        env.add_function("env", env_function);
        env
    }

    /// Render a template string with the given context.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    /// Render the single-kill notification.
    pub fn render_kill(&self, ctx: &TemplateContext) -> Result<Notification, NotifyError> {
        let subject = self.render(&self.templates.kill_subject, ctx)?;
        let body = self.render(&self.templates.kill_body, ctx)?;
        let mut notification = Notification::new(subject, body).with_meta("worker", &ctx.worker);
        if let Some(kill) = &ctx.kill {
            notification = notification.with_meta("kill_id", kill.kill_id);
        }
        if let Some(interest) = &ctx.interest {
            notification = notification
                .with_meta("tier", interest.tier)
                .with_meta("score", format!("{:.3}", interest.score));
        }
        Ok(notification)
    }

    /// Render the rollup summary.
    pub fn render_rollup(&self, ctx: &TemplateContext) -> Result<Notification, NotifyError> {
        let subject = self.render(&self.templates.rollup_subject, ctx)?;
        let body = self.render(&self.templates.rollup_body, ctx)?;
        let mut notification = Notification::new(subject, body)
            .with_meta("worker", &ctx.worker)
            .with_meta("event", "rollup");
        if let Some(rollup) = &ctx.rollup {
            notification = notification.with_meta("count", rollup.count);
        }
        Ok(notification)
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

/// Custom filter: compact ISK amount (`2.5B`, `340.0M`).
fn isk_filter(value: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];
    for (scale, suffix) in UNITS {
        if value.abs() >= scale {
            return format!("{:.1}{suffix}", value / scale);
        }
    }
    format!("{value:.0}")
}

/// Global function: read an environment variable by name, empty when unset.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}
