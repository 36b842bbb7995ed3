//! Trigger rules: a compiled evaluator plus priority, cooldown and actions.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use salesclaw_core::config::RuleConfig;
use salesclaw_core::{Priority, Result, SalesClawConfig, TriggerCategory, TriggerType};
use salesclaw_triggers::{Conditions, Trigger, TriggerMeta, TriggerResult};
use serde_json::{Value, json};

/// A configured rule. Rules own their cooldown state; the evaluator is
/// shared and stateless.
#[derive(Clone)]
pub struct TriggerRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trigger_type: TriggerType,
    pub priority: Priority,
    pub category: TriggerCategory,
    pub conditions: Conditions,
    pub actions: Vec<String>,
    pub enabled: bool,
    pub cooldown_minutes: u32,
    pub last_triggered: Option<DateTime<Utc>>,
    evaluator: Arc<dyn Trigger>,
}

impl fmt::Debug for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRule")
            .field("id", &self.id)
            .field("trigger_type", &self.trigger_type)
            .field("priority", &self.priority)
            .field("category", &self.category)
            .field("enabled", &self.enabled)
            .field("cooldown_minutes", &self.cooldown_minutes)
            .field("last_triggered", &self.last_triggered)
            .finish_non_exhaustive()
    }
}

impl TriggerRule {
    /// Build a rule. `category` is inferred from the id when not given.
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        trigger_type: TriggerType,
        priority: Priority,
        category: Option<TriggerCategory>,
        conditions: Conditions,
        actions: &[&str],
    ) -> Self {
        let category = category.unwrap_or_else(|| TriggerCategory::infer(id));
        let meta = TriggerMeta::new(id, name, description, priority);
        let evaluator = conditions.build(meta, category);
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            trigger_type,
            priority,
            category,
            conditions,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            enabled: true,
            cooldown_minutes: 0,
            last_triggered: None,
            evaluator,
        }
    }

    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        let conditions = Conditions::from_rule_value(&config.id, config.trigger_type, &config.conditions)?;
        let actions: Vec<&str> = config.actions.iter().map(String::as_str).collect();
        let mut rule = Self::new(
            &config.id,
            &config.name,
            &config.description,
            config.trigger_type,
            config.priority,
            config.category,
            conditions,
            &actions,
        );
        rule.enabled = config.enabled;
        rule.cooldown_minutes = config.cooldown_minutes;
        Ok(rule)
    }

    pub fn with_cooldown(mut self, minutes: u32) -> Self {
        self.cooldown_minutes = minutes;
        self
    }

    pub fn meta(&self) -> TriggerMeta {
        TriggerMeta::new(&self.id, &self.name, &self.description, self.priority)
    }

    /// Whether `now` falls inside the cooldown window after the last firing.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered {
            Some(last) if self.cooldown_minutes > 0 => {
                now < last + Duration::minutes(i64::from(self.cooldown_minutes))
            }
            _ => false,
        }
    }

    /// Evaluate at `now`. `None` when the rule is disabled or cooling down;
    /// otherwise the evaluator's result, triggered or not.
    pub fn evaluate_at(&self, data: &Value, now: DateTime<Utc>) -> Option<TriggerResult> {
        if !self.enabled || self.in_cooldown(now) {
            return None;
        }
        Some(self.evaluator.evaluate(data))
    }

    pub fn should_trigger(&self, data: &Value) -> bool {
        self.evaluate_at(data, Utc::now())
            .is_some_and(|result| result.triggered)
    }

    /// Listing form for the CLI and state dumps.
    pub fn describe(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "type": self.trigger_type,
            "priority": self.priority,
            "category": self.category,
            "enabled": self.enabled,
            "cooldown_minutes": self.cooldown_minutes,
            "last_triggered": self.last_triggered,
            "actions": self.actions,
            "conditions": self.evaluator.conditions(),
        })
    }
}

fn seed(id: &str, trigger_type: TriggerType, conditions: Value) -> Option<Conditions> {
    match Conditions::from_rule_value(id, trigger_type, &conditions) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::error!("Built-in rule {id} rejected: {e}");
            None
        }
    }
}

/// The built-in rule set.
pub fn default_rules() -> Vec<TriggerRule> {
    let mut rules = Vec::new();

    if let Some(c) = seed(
        "high_value_account_mention",
        TriggerType::CustomerSpecific,
        json!({"customer_ids": ["acme_inc", "techcorp", "financeapp"]}),
    ) {
        rules.push(TriggerRule::new(
            "high_value_account_mention",
            "High Value Account Mention",
            "Trigger when high-value accounts are mentioned",
            TriggerType::CustomerSpecific,
            Priority::High,
            None,
            c,
            &["notify_ae", "log_to_crm", "add_to_report"],
        ));
    }

    if let Some(c) = seed(
        "churn_risk_keywords",
        TriggerType::Keyword,
        json!({
            "keywords": ["cancel", "terminate", "disappointed", "frustrated", "switching"],
            "patterns": [r"considering\s+alternatives", r"not\s+meeting\s+.*\s+needs"],
        }),
    ) {
        rules.push(TriggerRule::new(
            "churn_risk_keywords",
            "Churn Risk Keywords",
            "Detect potential churn risk from keywords",
            TriggerType::Keyword,
            Priority::Critical,
            None,
            c,
            &["immediate_alert", "notify_manager", "create_save_task"],
        ));
    }

    if let Some(c) = seed(
        "buying_signals",
        TriggerType::Keyword,
        json!({
            "keywords": ["budget approved", "looking for a solution", "need something by"],
            "patterns": [r"what\s+would\s+it\s+take", r"can\s+acme\s+handle"],
        }),
    ) {
        rules.push(TriggerRule::new(
            "buying_signals",
            "Buying Signals",
            "Detect buying intent signals",
            TriggerType::Keyword,
            Priority::High,
            Some(TriggerCategory::BuyingSignal),
            c,
            &["notify_ae", "schedule_demo", "update_opportunity"],
        ));
    }

    if let Some(c) = seed(
        "usage_drop",
        TriggerType::Metric,
        json!({"metric": "usage_change_percent", "threshold": -20, "operator": "lt"}),
    ) {
        rules.push(
            TriggerRule::new(
                "usage_drop",
                "Usage Drop Alert",
                "Alert when customer usage drops significantly",
                TriggerType::Metric,
                Priority::High,
                None,
                c,
                &["notify_csm", "health_score_update", "schedule_checkin"],
            )
            .with_cooldown(1440),
        );
    }

    rules
}

/// Built-in rules (when enabled) followed by `[[rules]]` from config.
/// A rule that fails to compile is logged and skipped; a config rule with
/// the id of a built-in one replaces it.
pub fn load_rules(config: &SalesClawConfig) -> Vec<TriggerRule> {
    let mut rules = if config.engine.seed_rules {
        default_rules()
    } else {
        Vec::new()
    };

    for rule_config in &config.rules {
        match TriggerRule::from_config(rule_config) {
            Ok(rule) => {
                if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
                    *existing = rule;
                } else {
                    rules.push(rule);
                }
            }
            Err(e) => tracing::error!("⚠️ Skipping rule {}: {e}", rule_config.id),
        }
    }

    tracing::debug!("Loaded {} trigger rules", rules.len());
    rules
}
