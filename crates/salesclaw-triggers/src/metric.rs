//! Metric triggers: threshold checks on `metrics.<name>` with trend analysis
//! over `metrics.<name>_history`.

use salesclaw_core::Priority;
use salesclaw_core::payload::as_number;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::base::{Condition, Trigger, TriggerMeta, TriggerResult};

/// Direction of a metric's recent movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    Unknown,
}

/// Recent window (last 3 values) against the average of the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// `min(|change_percent| / 50, 1.0)`.
    pub severity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_average: Option<f64>,
}

const TREND_WINDOW: usize = 3;

/// Classify a series: ±10% change decides improving / declining.
pub fn analyze_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend {
            direction: TrendDirection::Unknown,
            severity: 0.0,
            change_percent: None,
            recent_average: None,
            older_average: None,
        };
    }

    let split = values.len().saturating_sub(TREND_WINDOW);
    let recent = &values[split..];
    let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
    let older_avg = if values.len() > TREND_WINDOW {
        let older = &values[..split];
        older.iter().sum::<f64>() / older.len() as f64
    } else {
        values[0]
    };

    let change_percent = if older_avg != 0.0 {
        (recent_avg - older_avg) / older_avg * 100.0
    } else {
        0.0
    };

    let direction = if change_percent > 10.0 {
        TrendDirection::Improving
    } else if change_percent < -10.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    Trend {
        direction,
        severity: (change_percent.abs() / 50.0).min(1.0),
        change_percent: Some(change_percent),
        recent_average: Some(recent_avg),
        older_average: Some(older_avg),
    }
}

/// Compares one named metric against a threshold.
pub struct MetricTrigger {
    meta: TriggerMeta,
    metric_name: String,
    threshold: Value,
    condition: Condition,
    time_window_hours: u32,
}

impl MetricTrigger {
    pub fn new(
        meta: TriggerMeta,
        metric_name: impl Into<String>,
        threshold: Value,
        condition: Condition,
    ) -> Self {
        Self {
            meta,
            metric_name: metric_name.into(),
            threshold,
            condition,
            time_window_hours: 24,
        }
    }

    pub fn with_time_window(mut self, hours: u32) -> Self {
        self.time_window_hours = hours;
        self
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    fn history(&self, metrics: &Value) -> Vec<f64> {
        metrics
            .get(format!("{}_history", self.metric_name))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(as_number).collect())
            .unwrap_or_default()
    }
}

impl Trigger for MetricTrigger {
    fn meta(&self) -> &TriggerMeta {
        &self.meta
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let metrics = data.get("metrics").cloned().unwrap_or(Value::Null);
        let current = match metrics.get(&self.metric_name) {
            Some(v) if !v.is_null() => v,
            _ => return TriggerResult::error(format!("Metric {} not found", self.metric_name)),
        };

        let mut matched = Vec::new();
        let mut actions = Vec::new();
        let mut context = Map::new();

        if self.condition.check(current, &self.threshold) {
            matched.push(format!("threshold_{}", self.condition));
            context.insert(self.metric_name.clone(), current.clone());
            context.insert("threshold".into(), self.threshold.clone());
            context.insert("condition".into(), json!(self.condition.as_str()));
        }

        let history = self.history(&metrics);
        if !history.is_empty() {
            let trend = analyze_trend(&history);
            if trend.direction == TrendDirection::Declining && trend.severity > 0.5 {
                matched.push("declining_trend".to_string());
                actions.push("investigate_decline".to_string());
            }
            context.insert("trend".into(), json!(trend));
        }

        TriggerResult::from_matches(matched, actions, context, 2)
    }

    fn conditions(&self) -> Value {
        json!({
            "metric_name": self.metric_name,
            "threshold": self.threshold,
            "condition": self.condition.as_str(),
            "time_window_hours": self.time_window_hours,
        })
    }
}

/// Usage drop below a threshold (default -20%). Drops past -50% escalate to
/// critical with +0.3 confidence.
pub struct UsageDropTrigger {
    base: MetricTrigger,
}

impl UsageDropTrigger {
    pub const DEFAULT_THRESHOLD: f64 = -20.0;

    pub fn new() -> Self {
        Self::with_threshold(
            TriggerMeta::new(
                "usage_drop",
                "Usage Drop Alert",
                "Alerts when customer usage drops significantly",
                Priority::High,
            ),
            Self::DEFAULT_THRESHOLD,
        )
    }

    pub fn with_threshold(meta: TriggerMeta, drop_threshold: f64) -> Self {
        Self {
            base: MetricTrigger::new(meta, "usage_change_percent", json!(drop_threshold), Condition::LessThan),
        }
    }
}

impl Default for UsageDropTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for UsageDropTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "notify_csm",
            "schedule_health_check",
            "investigate_usage_pattern",
            "check_technical_issues",
        ]);

        let change = result.context_number("usage_change_percent").unwrap_or(0.0);
        if change < -50.0 {
            result.suggest(&["escalate_to_manager"]);
            result.escalate(Priority::Critical);
            result.boost(0.3);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

/// Engagement score below a threshold (default 0.3); under 0.2 needs
/// immediate outreach.
pub struct EngagementScoreTrigger {
    base: MetricTrigger,
}

impl EngagementScoreTrigger {
    pub const DEFAULT_THRESHOLD: f64 = 0.3;

    pub fn new() -> Self {
        Self::with_threshold(
            TriggerMeta::new(
                "low_engagement",
                "Low Engagement Score",
                "Alerts when customer engagement score drops",
                Priority::Medium,
            ),
            Self::DEFAULT_THRESHOLD,
        )
    }

    pub fn with_threshold(meta: TriggerMeta, score_threshold: f64) -> Self {
        Self {
            base: MetricTrigger::new(meta, "engagement_score", json!(score_threshold), Condition::LessThan)
                .with_time_window(72),
        }
    }
}

impl Default for EngagementScoreTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for EngagementScoreTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "plan_engagement_campaign",
            "send_check_in_email",
            "offer_training_session",
            "review_onboarding_progress",
        ]);

        let score = result.context_number("engagement_score").unwrap_or(1.0);
        if score < 0.2 {
            result.suggest(&["immediate_outreach"]);
            result.escalate(Priority::High);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

/// More than N support tickets in 30 days (default 5); over 10 pulls in
/// the product team.
pub struct SupportTicketVolumeTrigger {
    base: MetricTrigger,
}

impl SupportTicketVolumeTrigger {
    pub const DEFAULT_THRESHOLD: f64 = 5.0;

    pub fn new() -> Self {
        Self::with_threshold(
            TriggerMeta::new(
                "high_support_volume",
                "High Support Ticket Volume",
                "Alerts when support ticket volume is unusually high",
                Priority::Medium,
            ),
            Self::DEFAULT_THRESHOLD,
        )
    }

    pub fn with_threshold(meta: TriggerMeta, ticket_threshold: f64) -> Self {
        Self {
            base: MetricTrigger::new(meta, "support_tickets_30d", json!(ticket_threshold), Condition::GreaterThan),
        }
    }
}

impl Default for SupportTicketVolumeTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for SupportTicketVolumeTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "notify_support_manager",
            "analyze_ticket_patterns",
            "schedule_customer_call",
            "review_product_issues",
        ]);

        let tickets = result.context_number("support_tickets_30d").unwrap_or(0.0);
        if tickets > 10.0 {
            result.suggest(&["escalate_to_product_team", "emergency_customer_review"]);
            result.escalate(Priority::High);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

/// Churn risk score above a threshold (default 0.7). ARR over 100,000
/// makes it certain and pulls in the C-level.
pub struct RevenueAtRiskTrigger {
    base: MetricTrigger,
}

impl RevenueAtRiskTrigger {
    pub const DEFAULT_THRESHOLD: f64 = 0.7;
    pub const HIGH_VALUE_ARR: f64 = 100_000.0;

    pub fn new() -> Self {
        Self::with_threshold(
            TriggerMeta::new(
                "revenue_at_risk",
                "Revenue at Risk",
                "Alerts when revenue is at risk",
                Priority::Critical,
            ),
            Self::DEFAULT_THRESHOLD,
        )
    }

    pub fn with_threshold(meta: TriggerMeta, risk_threshold: f64) -> Self {
        Self {
            base: MetricTrigger::new(meta, "churn_risk_score", json!(risk_threshold), Condition::GreaterThan),
        }
    }
}

impl Default for RevenueAtRiskTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for RevenueAtRiskTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "alert_revenue_team",
            "prepare_retention_plan",
            "schedule_executive_call",
            "review_contract_terms",
        ]);

        let arr = data
            .pointer("/customer_value/annual_recurring_revenue")
            .and_then(as_number)
            .unwrap_or(0.0);
        if arr > Self::HIGH_VALUE_ARR {
            result.suggest(&["escalate_to_c_level", "prepare_executive_briefing"]);
            result.context.insert("revenue_impact".into(), json!("high"));
            result.confidence = 1.0;
        }
        result.context.insert("arr_at_risk".into(), json!(arr));
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

/// Average response time above a threshold (default 2000ms); over 5s is an
/// incident.
pub struct PerformanceIssueTrigger {
    base: MetricTrigger,
}

impl PerformanceIssueTrigger {
    pub const DEFAULT_THRESHOLD_MS: f64 = 2000.0;

    pub fn new() -> Self {
        Self::with_threshold(
            TriggerMeta::new(
                "performance_issue",
                "Performance Issue Detection",
                "Alerts when performance metrics indicate issues",
                Priority::High,
            ),
            Self::DEFAULT_THRESHOLD_MS,
        )
    }

    pub fn with_threshold(meta: TriggerMeta, response_time_threshold_ms: f64) -> Self {
        Self {
            base: MetricTrigger::new(
                meta,
                "avg_response_time_ms",
                json!(response_time_threshold_ms),
                Condition::GreaterThan,
            )
            .with_time_window(1),
        }
    }
}

impl Default for PerformanceIssueTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for PerformanceIssueTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "notify_engineering",
            "check_infrastructure",
            "proactive_customer_communication",
            "monitor_customer_impact",
        ]);

        let response_ms = result.context_number("avg_response_time_ms").unwrap_or(0.0);
        if response_ms > 5000.0 {
            result.suggest(&["escalate_to_sre", "prepare_incident_response"]);
            result.escalate(Priority::Critical);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_metric_reports_error() {
        let trigger = MetricTrigger::new(
            TriggerMeta::new("m", "M", "", Priority::Low),
            "nps",
            json!(30),
            Condition::LessThan,
        );
        let result = trigger.evaluate(&json!({"metrics": {"other": 1}}));
        assert!(!result.triggered);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.context_str("error"), Some("Metric nps not found"));

        let no_metrics = trigger.evaluate(&json!({}));
        assert!(no_metrics.context.contains_key("error"));
    }

    #[test]
    fn test_threshold_match_records_context() {
        let trigger = MetricTrigger::new(
            TriggerMeta::new("m", "M", "", Priority::Low),
            "nps",
            json!(30),
            Condition::LessThan,
        );
        let result = trigger.evaluate(&json!({"metrics": {"nps": 12}}));
        assert_eq!(result.matched_conditions, vec!["threshold_less_than"]);
        assert_eq!(result.context["nps"], json!(12));
        assert_eq!(result.context_str("condition"), Some("less_than"));
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_declining_trend_matches_independently() {
        let trigger = MetricTrigger::new(
            TriggerMeta::new("m", "M", "", Priority::Low),
            "active_users",
            json!(10),
            Condition::LessThan,
        );
        let result = trigger.evaluate(&json!({
            "metrics": {
                "active_users": 40,
                "active_users_history": [100, 100, 100, 40, 40, 40],
            }
        }));

        assert_eq!(result.matched_conditions, vec!["declining_trend"]);
        assert_eq!(result.suggested_actions, vec!["investigate_decline"]);
        assert_eq!(result.context["trend"]["direction"], json!("declining"));
        assert_eq!(result.context["trend"]["severity"], json!(1.0));
    }

    #[test]
    fn test_trend_analysis() {
        assert_eq!(analyze_trend(&[5.0]).direction, TrendDirection::Unknown);

        let short = analyze_trend(&[10.0, 12.0, 14.0]);
        assert_eq!(short.older_average, Some(10.0));
        assert_eq!(short.recent_average, Some(12.0));
        assert_eq!(short.direction, TrendDirection::Improving);

        let flat = analyze_trend(&[10.0, 10.0, 10.0, 10.5]);
        assert_eq!(flat.direction, TrendDirection::Stable);

        let zero = analyze_trend(&[0.0, 5.0]);
        assert_eq!(zero.change_percent, Some(0.0));
    }

    #[test]
    fn test_usage_drop_escalation() {
        let trigger = UsageDropTrigger::new();
        let severe = trigger.evaluate(&json!({"metrics": {"usage_change_percent": -55}}));

        assert!(severe.triggered);
        assert_eq!(severe.escalated_priority, Some(Priority::Critical));
        assert!(severe.suggested_actions.contains(&"escalate_to_manager".to_string()));
        let base = 0.5;
        assert!(severe.confidence >= (base + 0.3_f64).min(1.0) - 1e-9);

        let mild = trigger.evaluate(&json!({"metrics": {"usage_change_percent": -25}}));
        let deep = trigger.evaluate(&json!({"metrics": {"usage_change_percent": -60}}));
        assert_eq!(mild.escalated_priority, None);
        assert_eq!(deep.priority_or(Priority::High), Priority::Critical);
        assert!(deep.confidence > mild.confidence);
    }

    #[test]
    fn test_engagement_and_ticket_escalation() {
        let low = EngagementScoreTrigger::new().evaluate(&json!({"metrics": {"engagement_score": 0.1}}));
        assert_eq!(low.escalated_priority, Some(Priority::High));
        assert!(low.suggested_actions.contains(&"immediate_outreach".to_string()));

        let tickets = SupportTicketVolumeTrigger::new()
            .evaluate(&json!({"metrics": {"support_tickets_30d": 12}}));
        assert!(tickets.suggested_actions.contains(&"escalate_to_product_team".to_string()));

        let ok = SupportTicketVolumeTrigger::new().evaluate(&json!({"metrics": {"support_tickets_30d": 3}}));
        assert!(!ok.triggered);
    }

    #[test]
    fn test_revenue_at_risk_high_value() {
        let result = RevenueAtRiskTrigger::new().evaluate(&json!({
            "metrics": {"churn_risk_score": 0.8},
            "customer_value": {"annual_recurring_revenue": 250000},
        }));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.context_str("revenue_impact"), Some("high"));
        assert_eq!(result.context_number("arr_at_risk"), Some(250000.0));

        let small = RevenueAtRiskTrigger::new().evaluate(&json!({"metrics": {"churn_risk_score": 0.9}}));
        assert_eq!(small.context_number("arr_at_risk"), Some(0.0));
        assert!(small.confidence < 1.0);
    }

    #[test]
    fn test_performance_incident() {
        let result = PerformanceIssueTrigger::new()
            .evaluate(&json!({"metrics": {"avg_response_time_ms": 6500}}));
        assert_eq!(result.escalated_priority, Some(Priority::Critical));
        assert!(result.suggested_actions.contains(&"escalate_to_sre".to_string()));
    }
}
