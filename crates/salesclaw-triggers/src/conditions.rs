//! Rule condition sets and their compilation into trigger evaluators.
//!
//! A rule's `conditions` map either names a trigger family explicitly with
//! a `kind` tag, or is read according to the rule's type:
//!
//! | type                                | keys                                   |
//! |-------------------------------------|----------------------------------------|
//! | `keyword`, `pattern`                | `keywords`, `patterns`                 |
//! | `customer_specific`, `person_specific` | `customer_ids`, `event_types`       |
//! | `metric`, `threshold`               | `metric`, `threshold`, `operator`      |

use std::sync::Arc;

use salesclaw_core::{Result, SalesClawError, TriggerCategory, TriggerType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::base::{Condition, Trigger, TriggerMeta};
use crate::customer::{AccountHealthTrigger, CustomerTrigger, NewStakeholderTrigger};
use crate::keyword::{
    BuyingSignalTrigger, ChurnRiskTrigger, CompetitiveTrigger, KeywordTrigger,
    SecurityComplianceTrigger,
};
use crate::metric::{
    EngagementScoreTrigger, MetricTrigger, PerformanceIssueTrigger, RevenueAtRiskTrigger,
    SupportTicketVolumeTrigger, UsageDropTrigger,
};

/// The condition set of a rule, one variant per trigger family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conditions {
    Keyword {
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        patterns: Vec<String>,
        #[serde(default = "default_context_window")]
        context_window: usize,
    },
    /// Stock keyword lists.
    BuyingSignal,
    ChurnRisk,
    Competitive,
    SecurityCompliance,
    Customer {
        #[serde(default)]
        customer_ids: Vec<String>,
        /// `None` uses mention / activity / communication.
        #[serde(default)]
        event_types: Option<Vec<String>>,
    },
    AccountHealth {
        #[serde(default = "default_health_threshold")]
        health_threshold: f64,
        #[serde(default = "default_usage_drop")]
        usage_drop_threshold: f64,
    },
    NewStakeholder,
    Metric {
        metric: String,
        threshold: Value,
        #[serde(default = "default_operator")]
        operator: Condition,
        #[serde(default = "default_time_window")]
        time_window_hours: u32,
    },
    UsageDrop {
        #[serde(default = "default_usage_drop")]
        threshold: f64,
    },
    EngagementScore {
        #[serde(default = "default_engagement")]
        threshold: f64,
    },
    SupportTicketVolume {
        #[serde(default = "default_ticket_volume")]
        threshold: f64,
    },
    RevenueAtRisk {
        #[serde(default = "default_revenue_risk")]
        threshold: f64,
    },
    PerformanceIssue {
        #[serde(default = "default_response_time")]
        threshold: f64,
    },
}

fn default_context_window() -> usize { KeywordTrigger::DEFAULT_CONTEXT_WINDOW }
fn default_health_threshold() -> f64 { AccountHealthTrigger::DEFAULT_HEALTH_THRESHOLD }
fn default_usage_drop() -> f64 { UsageDropTrigger::DEFAULT_THRESHOLD }
fn default_engagement() -> f64 { EngagementScoreTrigger::DEFAULT_THRESHOLD }
fn default_ticket_volume() -> f64 { SupportTicketVolumeTrigger::DEFAULT_THRESHOLD }
fn default_revenue_risk() -> f64 { RevenueAtRiskTrigger::DEFAULT_THRESHOLD }
fn default_response_time() -> f64 { PerformanceIssueTrigger::DEFAULT_THRESHOLD_MS }
fn default_operator() -> Condition { Condition::GreaterThan }
fn default_time_window() -> u32 { 24 }

#[derive(Deserialize)]
struct KeywordFields {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default = "default_context_window")]
    context_window: usize,
}

#[derive(Deserialize)]
struct CustomerFields {
    #[serde(default)]
    customer_ids: Vec<String>,
    #[serde(default)]
    event_types: Vec<String>,
}

#[derive(Deserialize)]
struct MetricFields {
    metric: String,
    threshold: Value,
    #[serde(default = "default_operator")]
    operator: Condition,
    #[serde(default = "default_time_window")]
    time_window_hours: u32,
}

impl Conditions {
    /// Interpret a rule's `conditions` map.
    ///
    /// Untagged customer conditions without `event_types` match on the
    /// customer list alone. Untagged metric conditions on a well-known
    /// metric compile to the dedicated trigger for it (e.g.
    /// `usage_change_percent` below a threshold becomes a usage-drop
    /// trigger with its escalation rules).
    pub fn from_rule_value(rule_id: &str, trigger_type: TriggerType, value: &Value) -> Result<Self> {
        let value = if value.is_null() {
            Value::Object(Default::default())
        } else {
            value.clone()
        };
        let invalid = |e: serde_json::Error| SalesClawError::invalid_rule(rule_id, e.to_string());

        if value.get("kind").is_some() {
            return serde_json::from_value(value).map_err(invalid);
        }

        let conditions = match trigger_type {
            TriggerType::Keyword | TriggerType::Pattern => {
                let f: KeywordFields = serde_json::from_value(value).map_err(invalid)?;
                if f.keywords.is_empty() && f.patterns.is_empty() {
                    return Err(SalesClawError::invalid_rule(rule_id, "no keywords or patterns"));
                }
                Conditions::Keyword {
                    keywords: f.keywords,
                    patterns: f.patterns,
                    context_window: f.context_window,
                }
            }
            TriggerType::CustomerSpecific | TriggerType::PersonSpecific => {
                let f: CustomerFields = serde_json::from_value(value).map_err(invalid)?;
                Conditions::Customer {
                    customer_ids: f.customer_ids,
                    event_types: Some(f.event_types),
                }
            }
            TriggerType::Metric | TriggerType::Threshold => {
                let f: MetricFields = serde_json::from_value(value).map_err(invalid)?;
                Self::specialize_metric(f)
            }
        };
        Ok(conditions)
    }

    fn specialize_metric(f: MetricFields) -> Self {
        let threshold = f.threshold.as_f64();
        match (f.metric.as_str(), f.operator, threshold) {
            ("usage_change_percent", Condition::LessThan, Some(threshold)) => {
                Conditions::UsageDrop { threshold }
            }
            ("engagement_score", Condition::LessThan, Some(threshold)) => {
                Conditions::EngagementScore { threshold }
            }
            ("support_tickets_30d", Condition::GreaterThan, Some(threshold)) => {
                Conditions::SupportTicketVolume { threshold }
            }
            ("churn_risk_score", Condition::GreaterThan, Some(threshold)) => {
                Conditions::RevenueAtRisk { threshold }
            }
            ("avg_response_time_ms", Condition::GreaterThan, Some(threshold)) => {
                Conditions::PerformanceIssue { threshold }
            }
            _ => Conditions::Metric {
                metric: f.metric,
                threshold: f.threshold,
                operator: f.operator,
                time_window_hours: f.time_window_hours,
            },
        }
    }

    /// Compile into an evaluator. Custom keyword lists pick up the intent
    /// handling of the rule's category (churn escalation, competitor
    /// tracking, ...).
    pub fn build(&self, meta: TriggerMeta, category: TriggerCategory) -> Arc<dyn Trigger> {
        match self {
            Conditions::Keyword {
                keywords,
                patterns,
                context_window,
            } => {
                let base = KeywordTrigger::new(meta, keywords, patterns)
                    .with_context_window(*context_window);
                match category {
                    TriggerCategory::BuyingSignal => Arc::new(BuyingSignalTrigger::from_keyword(base)),
                    TriggerCategory::ChurnRisk => Arc::new(ChurnRiskTrigger::from_keyword(base)),
                    TriggerCategory::Competitive => Arc::new(CompetitiveTrigger::from_keyword(base)),
                    TriggerCategory::Security => Arc::new(SecurityComplianceTrigger::from_keyword(base)),
                    _ => Arc::new(base),
                }
            }
            Conditions::BuyingSignal => Arc::new(BuyingSignalTrigger::with_meta(meta)),
            Conditions::ChurnRisk => Arc::new(ChurnRiskTrigger::with_meta(meta)),
            Conditions::Competitive => Arc::new(CompetitiveTrigger::with_meta(meta)),
            Conditions::SecurityCompliance => Arc::new(SecurityComplianceTrigger::with_meta(meta)),
            Conditions::Customer {
                customer_ids,
                event_types,
            } => Arc::new(CustomerTrigger::new(meta, customer_ids.clone(), event_types.clone())),
            Conditions::AccountHealth {
                health_threshold,
                usage_drop_threshold,
            } => Arc::new(AccountHealthTrigger::with_thresholds(
                meta,
                *health_threshold,
                *usage_drop_threshold,
            )),
            Conditions::NewStakeholder => Arc::new(NewStakeholderTrigger::new(meta)),
            Conditions::Metric {
                metric,
                threshold,
                operator,
                time_window_hours,
            } => Arc::new(
                MetricTrigger::new(meta, metric.clone(), threshold.clone(), *operator)
                    .with_time_window(*time_window_hours),
            ),
            Conditions::UsageDrop { threshold } => Arc::new(UsageDropTrigger::with_threshold(meta, *threshold)),
            Conditions::EngagementScore { threshold } => {
                Arc::new(EngagementScoreTrigger::with_threshold(meta, *threshold))
            }
            Conditions::SupportTicketVolume { threshold } => {
                Arc::new(SupportTicketVolumeTrigger::with_threshold(meta, *threshold))
            }
            Conditions::RevenueAtRisk { threshold } => {
                Arc::new(RevenueAtRiskTrigger::with_threshold(meta, *threshold))
            }
            Conditions::PerformanceIssue { threshold } => {
                Arc::new(PerformanceIssueTrigger::with_threshold(meta, *threshold))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesclaw_core::Priority;
    use serde_json::json;

    fn meta() -> TriggerMeta {
        TriggerMeta::new("rule", "Rule", "", Priority::High)
    }

    #[test]
    fn test_keyword_conditions_by_type() {
        let c = Conditions::from_rule_value(
            "churn_risk_keywords",
            TriggerType::Keyword,
            &json!({"keywords": ["cancel", "switching"], "patterns": [r"considering\s+alternatives"]}),
        )
        .unwrap();
        assert!(matches!(c, Conditions::Keyword { ref keywords, .. } if keywords.len() == 2));

        let trigger = c.build(meta(), TriggerCategory::ChurnRisk);
        let result = trigger.evaluate(&json!({"text": "We plan to cancel"}));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.escalated_priority, Some(Priority::Critical));
    }

    #[test]
    fn test_empty_keyword_rule_is_invalid() {
        let err = Conditions::from_rule_value("empty", TriggerType::Keyword, &Value::Null).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_customer_rule_matches_listed_customers_only() {
        let c = Conditions::from_rule_value(
            "watch",
            TriggerType::CustomerSpecific,
            &json!({"customer_ids": ["zeta_co"]}),
        )
        .unwrap();
        let trigger = c.build(meta(), TriggerCategory::General);

        assert!(trigger.evaluate(&json!({"customer_id": "zeta_co"})).triggered);
        assert!(!trigger.evaluate(&json!({"customer_id": "other", "event_type": "mention"})).triggered);
    }

    #[test]
    fn test_metric_specialization() {
        let c = Conditions::from_rule_value(
            "usage_drop",
            TriggerType::Metric,
            &json!({"metric": "usage_change_percent", "threshold": -20, "operator": "lt"}),
        )
        .unwrap();
        assert_eq!(c, Conditions::UsageDrop { threshold: -20.0 });

        let generic = Conditions::from_rule_value(
            "nps",
            TriggerType::Threshold,
            &json!({"metric": "nps", "threshold": 30, "operator": "lte"}),
        )
        .unwrap();
        assert!(matches!(generic, Conditions::Metric { operator: Condition::LessThanOrEqual, .. }));
    }

    #[test]
    fn test_metric_without_name_is_invalid() {
        let err = Conditions::from_rule_value("m", TriggerType::Metric, &json!({"threshold": 5}));
        assert!(err.is_err());
    }

    #[test]
    fn test_kind_tag_selects_family() {
        let c = Conditions::from_rule_value(
            "health",
            TriggerType::CustomerSpecific,
            &json!({"kind": "account_health", "health_threshold": 0.5}),
        )
        .unwrap();
        assert_eq!(
            c,
            Conditions::AccountHealth {
                health_threshold: 0.5,
                usage_drop_threshold: -20.0
            }
        );

        let stock = Conditions::from_rule_value("b", TriggerType::Keyword, &json!({"kind": "buying_signal"}))
            .unwrap();
        assert_eq!(stock, Conditions::BuyingSignal);

        assert!(Conditions::from_rule_value("x", TriggerType::Keyword, &json!({"kind": "telepathy"})).is_err());
    }
}
