//! Customer triggers: watch-lists, account health and new stakeholders.

use salesclaw_core::Priority;
use salesclaw_core::payload::{bool_field, f64_field, lower_field, str_field};
use serde_json::{Map, Value, json};

use crate::base::{Trigger, TriggerMeta, TriggerResult};

/// Accounts that always get the high-value treatment.
pub const HIGH_VALUE_ACCOUNTS: &[&str] = &["acme_inc", "techcorp", "financeapp"];

pub const DEFAULT_EVENT_TYPES: &[&str] = &["mention", "activity", "communication"];

/// Fires for watched customers, allowed event types and high-value accounts.
pub struct CustomerTrigger {
    meta: TriggerMeta,
    customer_ids: Vec<String>,
    event_types: Vec<String>,
}

impl CustomerTrigger {
    /// `event_types` defaults to mention / activity / communication.
    pub fn new(meta: TriggerMeta, customer_ids: Vec<String>, event_types: Option<Vec<String>>) -> Self {
        let event_types = event_types
            .unwrap_or_else(|| DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect());
        Self {
            meta,
            customer_ids,
            event_types,
        }
    }
}

impl Trigger for CustomerTrigger {
    fn meta(&self) -> &TriggerMeta {
        &self.meta
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let customer_id = str_field(data, "customer_id");
        let event_type = str_field(data, "event_type");

        let mut matched = Vec::new();
        let mut actions = Vec::new();
        let mut context = Map::new();

        if self.customer_ids.iter().any(|c| c == customer_id) {
            matched.push(format!("customer_match_{customer_id}"));
            context.insert("matched_customer".into(), json!(customer_id));
            actions.push("notify_account_executive".to_string());
        }

        if self.event_types.iter().any(|t| t == event_type) {
            matched.push(format!("event_type_match_{event_type}"));
            context.insert("event_type".into(), json!(event_type));
        }

        if HIGH_VALUE_ACCOUNTS.contains(&customer_id) {
            matched.push("high_value_account".to_string());
            actions.push("immediate_notification".to_string());
            actions.push("log_to_crm".to_string());
            context.insert("account_tier".into(), json!("high_value"));
        }

        TriggerResult::from_matches(matched, actions, context, 3)
    }

    fn conditions(&self) -> Value {
        json!({
            "customer_ids": self.customer_ids,
            "event_types": self.event_types,
        })
    }
}

/// Five independent account health checks; every check that holds
/// contributes its own label and actions.
pub struct AccountHealthTrigger {
    meta: TriggerMeta,
    health_threshold: f64,
    usage_drop_threshold: f64,
}

impl AccountHealthTrigger {
    pub const DEFAULT_HEALTH_THRESHOLD: f64 = 0.7;
    pub const DEFAULT_USAGE_DROP_THRESHOLD: f64 = -20.0;

    pub fn new(meta: TriggerMeta) -> Self {
        Self::with_thresholds(
            meta,
            Self::DEFAULT_HEALTH_THRESHOLD,
            Self::DEFAULT_USAGE_DROP_THRESHOLD,
        )
    }

    pub fn with_thresholds(meta: TriggerMeta, health_threshold: f64, usage_drop_threshold: f64) -> Self {
        Self {
            meta,
            health_threshold,
            usage_drop_threshold,
        }
    }
}

impl Trigger for AccountHealthTrigger {
    fn meta(&self) -> &TriggerMeta {
        &self.meta
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut matched = Vec::new();
        let mut actions: Vec<String> = Vec::new();
        let mut context = Map::new();

        let health_score = f64_field(data, "health_score").unwrap_or(1.0);
        if health_score < self.health_threshold {
            matched.push("low_health_score".to_string());
            context.insert("health_score".into(), json!(health_score));
            actions.push("schedule_health_check".into());
        }

        let usage_change = f64_field(data, "usage_change_percent").unwrap_or(0.0);
        if usage_change < self.usage_drop_threshold {
            matched.push("significant_usage_drop".to_string());
            context.insert("usage_change".into(), json!(usage_change));
            actions.push("notify_csm".into());
            actions.push("investigate_usage_drop".into());
        }

        let tickets = f64_field(data, "support_tickets_30d").unwrap_or(0.0);
        if tickets > 5.0 {
            matched.push("high_support_volume".to_string());
            context.insert("ticket_count".into(), json!(tickets));
            actions.push("escalate_to_support_manager".into());
        }

        let payment_failed = bool_field(data, "payment_failed");
        if payment_failed {
            matched.push("payment_failure".to_string());
            context.insert("payment_status".into(), json!("failed"));
            actions.push("notify_billing".into());
            actions.push("urgent_followup".into());
        }

        let days_to_renewal = f64_field(data, "days_to_renewal").unwrap_or(999.0);
        if days_to_renewal <= 90.0 {
            matched.push("renewal_approaching".to_string());
            context.insert("days_to_renewal".into(), json!(days_to_renewal));
            actions.push("initiate_renewal_process".into());
        }

        let mut result = TriggerResult::from_matches(matched, actions, context, 5);
        if health_score < 0.5 || payment_failed {
            result.boost(0.2);
        }
        result
    }

    fn conditions(&self) -> Value {
        json!({
            "health_threshold": self.health_threshold,
            "usage_drop_threshold": self.usage_drop_threshold,
            "checks": [
                "health_score",
                "usage_change_percent",
                "support_tickets_30d",
                "payment_failed",
                "days_to_renewal",
            ],
        })
    }
}

const EXECUTIVE_LEVELS: &[&str] = &["ceo", "cto", "cio", "cfo", "vp"];

/// New contacts, executive-level contacts and decision-maker signals.
pub struct NewStakeholderTrigger {
    meta: TriggerMeta,
}

impl NewStakeholderTrigger {
    pub fn new(meta: TriggerMeta) -> Self {
        Self { meta }
    }
}

impl Default for NewStakeholderTrigger {
    fn default() -> Self {
        Self::new(TriggerMeta::new(
            "new_stakeholder",
            "New Stakeholder",
            "Detects new contacts and executive involvement",
            Priority::Medium,
        ))
    }
}

impl Trigger for NewStakeholderTrigger {
    fn meta(&self) -> &TriggerMeta {
        &self.meta
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut matched = Vec::new();
        let mut actions: Vec<String> = Vec::new();
        let mut context = Map::new();

        if bool_field(data, "new_contact_detected") {
            matched.push("new_contact_identified".to_string());
            let info = data.get("contact_info").cloned().unwrap_or_else(|| json!({}));
            context.insert("contact_info".into(), info);
            actions.push("research_new_contact".into());
        }

        let level = lower_field(data, "contact_level");
        if EXECUTIVE_LEVELS.contains(&level.as_str()) {
            matched.push("executive_level_contact".to_string());
            context.insert("executive_level".into(), json!(level));
            actions.push("notify_ae_manager".into());
            actions.push("prepare_executive_materials".into());
        }

        let signals = data.get("decision_maker_signals").filter(|v| match v {
            Value::Array(items) => !items.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => false,
        });
        if let Some(signals) = signals {
            matched.push("decision_maker_identified".to_string());
            context.insert("decision_signals".into(), signals.clone());
            actions.push("update_buying_committee".into());
        }

        TriggerResult::from_matches(matched, actions, context, 3)
    }

    fn conditions(&self) -> Value {
        json!({
            "monitors": ["new_contact_detected", "contact_level", "decision_maker_signals"],
        })
    }
}
