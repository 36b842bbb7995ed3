//! Trigger contract, evaluation result and condition operators.

use regex::RegexBuilder;
use salesclaw_core::Priority;
use salesclaw_core::payload::{as_number, display_value};
use salesclaw_core::types::push_unique;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of evaluating one trigger against one payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub triggered: bool,
    /// In `[0.0, 1.0]`; exactly 0.0 when nothing matched.
    pub confidence: f64,
    pub matched_conditions: Vec<String>,
    pub suggested_actions: Vec<String>,
    /// Extracted evidence (matched keywords, metric values, trend, ...).
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Set when the evaluator raised the priority above the trigger's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_priority: Option<Priority>,
}

impl TriggerResult {
    /// Build a result from matched labels, scoring confidence over `total`.
    pub fn from_matches(
        matched_conditions: Vec<String>,
        suggested_actions: Vec<String>,
        context: Map<String, Value>,
        total: usize,
    ) -> Self {
        let confidence = calculate_confidence(&matched_conditions, total);
        Self {
            triggered: !matched_conditions.is_empty(),
            confidence,
            matched_conditions,
            suggested_actions,
            context,
            escalated_priority: None,
        }
    }

    /// A non-triggering result that explains why evaluation could not run.
    pub fn error(message: impl Into<String>) -> Self {
        let mut context = Map::new();
        context.insert("error".into(), Value::String(message.into()));
        Self {
            context,
            ..Self::default()
        }
    }

    /// Add to the confidence, clamped to 1.0. No effect on a result that
    /// did not trigger.
    pub fn boost(&mut self, amount: f64) {
        if self.triggered {
            self.confidence = (self.confidence + amount).clamp(0.0, 1.0);
        }
    }

    /// Append suggested actions, skipping ones already present.
    pub fn suggest(&mut self, actions: &[&str]) {
        for action in actions {
            push_unique(&mut self.suggested_actions, *action);
        }
    }

    pub fn escalate(&mut self, priority: Priority) {
        self.escalated_priority = Some(priority);
    }

    /// Effective priority given the trigger's configured one. Escalation
    /// only ever raises urgency.
    pub fn priority_or(&self, configured: Priority) -> Priority {
        match self.escalated_priority {
            Some(p) if p.rank() < configured.rank() => p,
            _ => configured,
        }
    }

    /// Context value as a number.
    pub fn context_number(&self, key: &str) -> Option<f64> {
        self.context.get(key).and_then(as_number)
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    /// Context value as a list of strings (e.g. `matched_keywords`).
    pub fn context_strings(&self, key: &str) -> Vec<String> {
        self.context
            .get(key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Static identity of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TriggerMeta {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            priority,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A stateless evaluator over event payloads.
///
/// `evaluate` must be pure: no I/O and no shared mutable state.
pub trait Trigger: Send + Sync {
    fn meta(&self) -> &TriggerMeta;

    fn evaluate(&self, data: &Value) -> TriggerResult;

    /// Static configuration as JSON (keywords, thresholds, ...).
    fn conditions(&self) -> Value;
}

/// Provided behaviour shared by every trigger. Implemented for all
/// [`Trigger`]s and not overridable.
pub trait TriggerExt {
    /// `false` for disabled triggers without evaluating, otherwise
    /// whether evaluation triggered.
    fn should_fire(&self, data: &Value) -> bool;
}

impl<T: Trigger + ?Sized> TriggerExt for T {
    fn should_fire(&self, data: &Value) -> bool {
        if !self.meta().enabled {
            return false;
        }
        self.evaluate(data).triggered
    }
}

/// Comparison operators for metric thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[serde(alias = "eq")]
    Equals,
    #[serde(alias = "ne")]
    NotEquals,
    Contains,
    NotContains,
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "lt")]
    LessThan,
    #[serde(alias = "gte")]
    GreaterThanOrEqual,
    #[serde(alias = "lte")]
    LessThanOrEqual,
    InList,
    NotInList,
    #[serde(alias = "regex_match")]
    MatchesRegex,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Equals => "equals",
            Condition::NotEquals => "not_equals",
            Condition::Contains => "contains",
            Condition::NotContains => "not_contains",
            Condition::GreaterThan => "greater_than",
            Condition::LessThan => "less_than",
            Condition::GreaterThanOrEqual => "greater_than_or_equal",
            Condition::LessThanOrEqual => "less_than_or_equal",
            Condition::InList => "in_list",
            Condition::NotInList => "not_in_list",
            Condition::MatchesRegex => "matches_regex",
        }
    }

    /// Check `value <op> target`. Numeric operators on non-numeric values
    /// are false, never an error.
    pub fn check(&self, value: &Value, target: &Value) -> bool {
        match self {
            Condition::Equals => values_equal(value, target),
            Condition::NotEquals => !values_equal(value, target),
            Condition::Contains => lower(value).contains(&lower(target)),
            Condition::NotContains => !lower(value).contains(&lower(target)),
            Condition::GreaterThan => compare(value, target, |a, b| a > b),
            Condition::LessThan => compare(value, target, |a, b| a < b),
            Condition::GreaterThanOrEqual => compare(value, target, |a, b| a >= b),
            Condition::LessThanOrEqual => compare(value, target, |a, b| a <= b),
            Condition::InList => in_list(value, target).unwrap_or(false),
            Condition::NotInList => in_list(value, target).map(|found| !found).unwrap_or(false),
            Condition::MatchesRegex => {
                let pattern = display_value(target);
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(re) => re.is_match(&display_value(value)),
                    Err(e) => {
                        tracing::warn!("Invalid regex '{}': {}", pattern, e);
                        false
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lower(value: &Value) -> String {
    display_value(value).to_lowercase()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(value: &Value, target: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(value), as_number(target)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// `None` when the target is not a container.
fn in_list(value: &Value, target: &Value) -> Option<bool> {
    match target {
        Value::Array(items) => Some(items.iter().any(|item| values_equal(value, item))),
        Value::String(s) => Some(s.contains(&display_value(value))),
        _ => None,
    }
}

/// `matched / total`, +0.1 per label mentioning "critical" (else +0.05 per
/// label mentioning "high_priority"), clamped to 1.0.
pub fn calculate_confidence(matched_conditions: &[String], total_conditions: usize) -> f64 {
    if total_conditions == 0 || matched_conditions.is_empty() {
        return 0.0;
    }

    let base = matched_conditions.len() as f64 / total_conditions as f64;
    let boost: f64 = matched_conditions
        .iter()
        .map(|label| {
            let label = label.to_lowercase();
            if label.contains("critical") {
                0.1
            } else if label.contains("high_priority") {
                0.05
            } else {
                0.0
            }
        })
        .sum();

    (base + boost).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AlwaysTrigger {
        meta: TriggerMeta,
    }

    impl Trigger for AlwaysTrigger {
        fn meta(&self) -> &TriggerMeta {
            &self.meta
        }

        fn evaluate(&self, _data: &Value) -> TriggerResult {
            TriggerResult::from_matches(vec!["always".into()], vec![], Map::new(), 1)
        }

        fn conditions(&self) -> Value {
            json!({})
        }
    }

    #[test]
    fn test_disabled_trigger_never_fires() {
        let on = AlwaysTrigger {
            meta: TriggerMeta::new("t", "T", "", Priority::Low),
        };
        let off = AlwaysTrigger {
            meta: TriggerMeta::new("t", "T", "", Priority::Low).disabled(),
        };
        assert!(on.should_fire(&json!({})));
        assert!(!off.should_fire(&json!({})));
    }

    #[test]
    fn test_confidence_boost_and_clamp() {
        let labels = vec!["critical_a".to_string(), "critical_b".to_string()];
        assert_eq!(calculate_confidence(&labels, 2), 1.0);

        let labels = vec!["x_high_priority".to_string()];
        let c = calculate_confidence(&labels, 4);
        assert!((c - 0.30).abs() < 1e-9);

        assert_eq!(calculate_confidence(&[], 5), 0.0);
        assert_eq!(calculate_confidence(&["a".to_string()], 0), 0.0);
    }

    #[test]
    fn test_condition_operators() {
        assert!(Condition::LessThan.check(&json!(-25), &json!(-20)));
        assert!(!Condition::GreaterThan.check(&json!("n/a"), &json!(5)));
        assert!(Condition::Equals.check(&json!(5), &json!(5.0)));
        assert!(Condition::Contains.check(&json!("Hello World"), &json!("world")));
        assert!(Condition::InList.check(&json!("a"), &json!(["a", "b"])));
        assert!(Condition::NotInList.check(&json!("c"), &json!(["a", "b"])));
        assert!(!Condition::NotInList.check(&json!("c"), &json!(3)));
        assert!(Condition::MatchesRegex.check(&json!("Ticket ABC-12"), &json!(r"abc-\d+")));
        assert!(!Condition::MatchesRegex.check(&json!("x"), &json!("(")));
    }

    #[test]
    fn test_condition_aliases() {
        let c: Condition = serde_json::from_value(json!("lt")).unwrap();
        assert_eq!(c, Condition::LessThan);
        let c: Condition = serde_json::from_value(json!("greater_than_or_equal")).unwrap();
        assert_eq!(c, Condition::GreaterThanOrEqual);
    }

    #[test]
    fn test_boost_only_applies_when_triggered() {
        let mut idle = TriggerResult::default();
        idle.boost(0.5);
        assert_eq!(idle.confidence, 0.0);

        let mut hit = TriggerResult::from_matches(vec!["a".into()], vec![], Map::new(), 2);
        hit.boost(0.9);
        assert_eq!(hit.confidence, 1.0);
    }

    #[test]
    fn test_escalation_never_lowers_priority() {
        let mut result = TriggerResult::default();
        result.escalate(Priority::High);
        assert_eq!(result.priority_or(Priority::Critical), Priority::Critical);
        assert_eq!(result.priority_or(Priority::Medium), Priority::High);
    }
}
