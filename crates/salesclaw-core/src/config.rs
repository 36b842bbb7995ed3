//! SalesClaw configuration system.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SalesClawError};
use crate::types::{AccountDirectory, Priority, TriggerCategory, TriggerType};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesClawConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub reports: ReportConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub accounts: AccountDirectory,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl SalesClawConfig {
    /// Load config from the default path (~/.salesclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SalesClawError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SalesClawError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SalesClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the SalesClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".salesclaw")
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn resolve_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

fn bool_true() -> bool { true }

/// Trigger engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long the drainer waits for a queued event before re-checking
    /// the running flag.
    #[serde(default = "default_queue_poll_ms")]
    pub queue_poll_ms: u64,
    /// Processed-event history is trimmed once it grows past this size...
    #[serde(default = "default_history_max")]
    pub history_max: usize,
    /// ...down to this many most recent events.
    #[serde(default = "default_history_retain")]
    pub history_retain: usize,
    /// Number of events reported under `recent_triggers`.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Load the built-in rule set before `[[rules]]`.
    #[serde(default = "bool_true")]
    pub seed_rules: bool,
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default = "default_journal_path")]
    pub journal_path: String,
}

fn default_queue_poll_ms() -> u64 { 1000 }
fn default_history_max() -> usize { 10_000 }
fn default_history_retain() -> usize { 5_000 }
fn default_recent_limit() -> usize { 10 }
fn default_state_path() -> String { "~/.salesclaw/engine_state.json".into() }
fn default_journal_path() -> String { "~/.salesclaw/trigger_journal.db".into() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_poll_ms: default_queue_poll_ms(),
            history_max: default_history_max(),
            history_retain: default_history_retain(),
            recent_limit: default_recent_limit(),
            seed_rules: true,
            state_path: default_state_path(),
            journal_path: default_journal_path(),
        }
    }
}

/// Email / Slack / SMS delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default)]
    pub slack_webhook_url: String,
    #[serde(default = "default_slack_channel")]
    pub slack_default_channel: String,
    #[serde(default)]
    pub sms_api_key: String,
    /// Role or customer_id → phone number. `sales_manager` is always paged.
    #[serde(default)]
    pub phone_numbers: BTreeMap<String, String>,
}

fn default_smtp_port() -> u16 { 587 }
fn default_from_address() -> String { "alerts@company.com".into() }
fn default_slack_channel() -> String { "#sales-alerts".into() }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
            slack_webhook_url: String::new(),
            slack_default_channel: default_slack_channel(),
            sms_api_key: String::new(),
            phone_numbers: BTreeMap::new(),
        }
    }
}

/// CRM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_assignee")]
    pub default_assignee: String,
    #[serde(default = "default_activity_type")]
    pub activity_type: String,
    /// customer_id → open opportunity id, used when no CRM is connected.
    #[serde(default = "default_opportunities")]
    pub opportunities: BTreeMap<String, String>,
}

fn default_assignee() -> String { "sales-team@company.com".into() }
fn default_activity_type() -> String { "trigger_event".into() }
fn default_opportunities() -> BTreeMap<String, String> {
    [
        ("acme_inc", "opp_001"),
        ("techcorp", "opp_002"),
        ("financeapp", "opp_003"),
        ("medtech_inc", "opp_004"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_assignee: default_assignee(),
            activity_type: default_activity_type(),
            opportunities: default_opportunities(),
        }
    }
}

/// Report accumulation / generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub storage_path: String,
    #[serde(default = "default_report_types")]
    pub report_types: Vec<String>,
    /// Local hour after which the daily summary may be generated.
    #[serde(default = "default_daily_summary_hour")]
    pub daily_summary_hour: u32,
}

fn default_report_path() -> String { "~/.salesclaw/reports/trigger_events".into() }
fn default_report_types() -> Vec<String> {
    vec!["daily_summary", "customer_health", "trigger_analytics"]
        .into_iter().map(String::from).collect()
}
fn default_daily_summary_hour() -> u32 { 17 }

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            storage_path: default_report_path(),
            report_types: default_report_types(),
            daily_summary_hour: default_daily_summary_hour(),
        }
    }
}

/// Meeting / follow-up / escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub calendar_api_key: String,
    #[serde(default = "default_meeting_duration")]
    pub meeting_duration_minutes: u32,
    #[serde(default = "default_business_start")]
    pub business_day_start_hour: u32,
    #[serde(default = "default_business_end")]
    pub business_day_end_hour: u32,
}

fn default_meeting_duration() -> u32 { 30 }
fn default_business_start() -> u32 { 9 }
fn default_business_end() -> u32 { 17 }

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            calendar_api_key: String::new(),
            meeting_duration_minutes: default_meeting_duration(),
            business_day_start_hour: default_business_start(),
            business_day_end_hour: default_business_end(),
        }
    }
}

/// A polled event source (JSON-lines file written by an integration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name recorded on every event ("slack", "email", ...).
    pub name: String,
    pub path: String,
    #[serde(default = "default_source_interval")]
    pub interval_secs: u64,
}

fn default_source_interval() -> u64 { 60 }

/// A trigger rule as written in config.
///
/// `conditions` is interpreted per `type` unless it carries a `kind` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TriggerCategory>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub conditions: serde_json::Value,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cooldown_minutes: u32,
}
