//! Report actions: accumulate trigger entries and generate HTML reports.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Timelike, Utc};
use salesclaw_core::payload::display_value;
use salesclaw_core::{Priority, Result, TriggerCategory};
use salesclaw_triggers::{TriggerEvent, TriggerResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::base::{Action, ActionInfo, ActionResult};
use crate::delivery::ReportStore;

/// Normalized trigger record stored in report buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub timestamp: DateTime<Utc>,
    pub trigger_id: String,
    pub trigger_name: String,
    pub customer_id: Option<String>,
    pub priority: Priority,
    pub category: TriggerCategory,
    pub source: String,
    pub conditions_met: Vec<String>,
    pub actions_taken: Vec<String>,
    pub confidence: f64,
    pub context_summary: String,
}

impl ReportEntry {
    pub fn from_event(event: &TriggerEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            trigger_id: event.trigger_id.clone(),
            trigger_name: event.display_name().to_string(),
            customer_id: event.customer_id.clone(),
            priority: event.priority,
            category: event.category,
            source: event.source.clone(),
            conditions_met: event.result.matched_conditions.clone(),
            actions_taken: event.result.suggested_actions.clone(),
            confidence: event.result.confidence,
            context_summary: summarize_context(&event.result),
        }
    }
}

/// One-line digest of the interesting context keys, joined with ` | `.
pub fn summarize_context(result: &TriggerResult) -> String {
    let mut parts = Vec::new();

    let keywords = result.context_strings("matched_keywords");
    if !keywords.is_empty() {
        let shown: Vec<&str> = keywords.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Keywords: {}", shown.join(", ")));
    }
    if let Some(competitor) = result.context_str("competitor") {
        parts.push(format!("Competitor: {competitor}"));
    }
    if let Some(score) = result.context.get("health_score") {
        parts.push(format!("Health Score: {}", display_value(score)));
    }
    if let Some(change) = result.context_number("usage_change") {
        parts.push(format!("Usage Change: {change}%"));
    }
    parts.join(" | ")
}

/// Buckets an entry dated `date` lands in: the day, the week (keyed by its
/// Monday) and the customer when there is one.
pub fn report_buckets(date: NaiveDate, customer_id: Option<&str>) -> Vec<String> {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    let mut buckets = vec![
        format!("daily_{}", date.format("%Y-%m-%d")),
        format!("weekly_{}", monday.format("%Y-%m-%d")),
    ];
    if let Some(customer) = customer_id {
        buckets.push(format!("customer_{customer}"));
    }
    buckets
}

pub struct AddToReportAction {
    info: ActionInfo,
    store: Arc<dyn ReportStore>,
}

impl AddToReportAction {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self {
            info: ActionInfo::new(
                "add_to_report",
                "Add to Report",
                "Add trigger events to daily, weekly and customer reports",
            ),
            store,
        }
    }
}

#[async_trait]
impl Action for AddToReportAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let entry = ReportEntry::from_event(event);
        let date = event.timestamp.with_timezone(&Local).date_naive();
        let buckets = report_buckets(date, event.customer_id.as_deref());

        for bucket in &buckets {
            self.store.append(bucket, &entry).await?;
        }

        Ok(ActionResult::success(
            format!("Added to {} reports", buckets.len()),
            json!({"buckets": buckets, "entry": entry}),
        ))
    }
}

/// Whether a report of `kind` is due for this event at local `hour`.
pub fn should_generate(kind: &str, event: &TriggerEvent, hour: u32, daily_summary_hour: u32) -> bool {
    match kind {
        "daily_summary" => hour >= daily_summary_hour,
        "customer_health" => event.category.is_health_related(),
        "trigger_analytics" => event.priority.is_urgent(),
        _ => false,
    }
}

/// HIGH / MEDIUM / LOW risk label for the health report.
pub fn risk_level(event: &TriggerEvent) -> &'static str {
    if event.category == TriggerCategory::ChurnRisk || event.priority == Priority::Critical {
        "HIGH"
    } else if event.category == TriggerCategory::UsageDrop || event.priority == Priority::High {
        "MEDIUM"
    } else {
        "LOW"
    }
}

fn html_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("<li>{item}</li>"))
        .collect::<Vec<_>>()
        .join("")
}

fn render_report(kind: &str, event: &TriggerEvent, generated_at: DateTime<Local>) -> String {
    let result = &event.result;
    let (title, body) = match kind {
        "daily_summary" => (
            "Daily Trigger Summary".to_string(),
            format!(
                "<p>Latest trigger: <b>{}</b> ({}) from {}</p><p>Customer: {}</p><ul>{}</ul>",
                event.display_name(),
                event.priority.as_str().to_uppercase(),
                event.source,
                event.customer_or_unknown(),
                html_list(&result.matched_conditions),
            ),
        ),
        "customer_health" => (
            format!("Customer Health Alert - {}", event.customer_or_unknown()),
            format!(
                "<p>Risk level: <b>{}</b></p><p>Trigger: {}</p><h3>Indicators</h3><ul>{}</ul><h3>Recommended Actions</h3><ul>{}</ul>",
                risk_level(event),
                event.display_name(),
                html_list(&result.matched_conditions),
                html_list(&result.suggested_actions),
            ),
        ),
        _ => (
            "Trigger Analytics".to_string(),
            format!(
                "<table><tr><td>Trigger</td><td>{}</td></tr><tr><td>Category</td><td>{}</td></tr>\
                 <tr><td>Priority</td><td>{}</td></tr><tr><td>Confidence</td><td>{:.2}</td></tr>\
                 <tr><td>Source</td><td>{}</td></tr></table><ul>{}</ul>",
                event.trigger_id,
                event.category,
                event.priority,
                result.confidence,
                event.source,
                html_list(&result.matched_conditions),
            ),
        ),
    };
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>{body}\
         <footer>Generated {}</footer></body></html>",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

pub struct GenerateReportAction {
    info: ActionInfo,
    store: Arc<dyn ReportStore>,
    report_types: Vec<String>,
    daily_summary_hour: u32,
}

impl GenerateReportAction {
    pub fn new(store: Arc<dyn ReportStore>, report_types: Vec<String>, daily_summary_hour: u32) -> Self {
        Self {
            info: ActionInfo::new(
                "generate_report",
                "Generate Report",
                "Generate summary, health and analytics reports",
            ),
            store,
            report_types,
            daily_summary_hour,
        }
    }
}

#[async_trait]
impl Action for GenerateReportAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let now = Local::now();
        let mut generated = Vec::new();

        for kind in &self.report_types {
            if !should_generate(kind, event, now.hour(), self.daily_summary_hour) {
                continue;
            }
            let file_name = format!("{kind}_{}.html", now.format("%Y%m%d_%H%M%S"));
            let location = self
                .store
                .publish(&file_name, &render_report(kind, event, now))
                .await?;
            generated.push(json!({"type": kind, "file": file_name, "location": location}));
        }

        if generated.is_empty() {
            return Ok(ActionResult::skipped("No reports needed at this time"));
        }
        Ok(ActionResult::success(
            format!("Generated {} reports", generated.len()),
            json!({"reports": generated}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{ActionRunner, ActionStatus};
    use crate::delivery::MemoryReportStore;
    use crate::testing::event;

    #[test]
    fn test_buckets_key_week_by_monday() {
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(
            report_buckets(thursday, Some("acme_inc")),
            vec!["daily_2024-03-14", "weekly_2024-03-11", "customer_acme_inc"]
        );
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(report_buckets(monday, None), vec!["daily_2024-03-11", "weekly_2024-03-11"]);
    }

    #[test]
    fn test_context_summary() {
        let mut ev = event("competitive_mentions", TriggerCategory::Competitive, Priority::Medium, None);
        ev.result.context.insert("matched_keywords".into(), json!(["gong", "chorus", "outreach", "salesloft"]));
        ev.result.context.insert("competitor".into(), json!("gong"));
        ev.result.context.insert("usage_change".into(), json!(-30.0));
        assert_eq!(
            summarize_context(&ev.result),
            "Keywords: gong, chorus, outreach | Competitor: gong | Usage Change: -30%"
        );
    }

    #[tokio::test]
    async fn test_add_to_report_fills_buckets() {
        let store = Arc::new(MemoryReportStore::new());
        let runner = ActionRunner::new(AddToReportAction::new(store.clone()));
        let ev = event("buying_signals", TriggerCategory::BuyingSignal, Priority::High, Some("acme_inc"));

        let result = runner.execute(&ev).await;
        assert_eq!(result.status, ActionStatus::Success);

        let names = store.bucket_names();
        assert_eq!(names.len(), 3);
        let customer = store.bucket("customer_acme_inc");
        assert_eq!(customer.len(), 1);
        assert_eq!(customer[0].trigger_id, "buying_signals");
        assert_eq!(customer[0].actions_taken, vec!["follow_up"]);
    }

    #[test]
    fn test_generation_gates() {
        let churn = event("churn_risk_keywords", TriggerCategory::ChurnRisk, Priority::Critical, Some("acme_inc"));
        let buying = event("buying_signals", TriggerCategory::BuyingSignal, Priority::Medium, None);

        assert!(should_generate("daily_summary", &buying, 17, 17));
        assert!(!should_generate("daily_summary", &buying, 16, 17));
        assert!(should_generate("customer_health", &churn, 9, 17));
        assert!(!should_generate("customer_health", &buying, 9, 17));
        assert!(should_generate("trigger_analytics", &churn, 9, 17));
        assert!(!should_generate("trigger_analytics", &buying, 9, 17));
        assert!(!should_generate("quarterly_review", &churn, 23, 17));
    }

    #[test]
    fn test_risk_levels() {
        let high = event("t", TriggerCategory::ChurnRisk, Priority::Low, None);
        let medium = event("t", TriggerCategory::UsageDrop, Priority::Low, None);
        let low = event("t", TriggerCategory::General, Priority::Medium, None);
        assert_eq!(risk_level(&high), "HIGH");
        assert_eq!(risk_level(&medium), "MEDIUM");
        assert_eq!(risk_level(&low), "LOW");
    }

    #[tokio::test]
    async fn test_generate_report_for_urgent_health_event() {
        let store = Arc::new(MemoryReportStore::new());
        let types = vec!["customer_health".to_string(), "trigger_analytics".to_string()];
        let runner = ActionRunner::new(GenerateReportAction::new(store.clone(), types, 17));
        let ev = event("account_health", TriggerCategory::AccountHealth, Priority::High, Some("techcorp"));

        let result = runner.execute(&ev).await;
        assert_eq!(result.status, ActionStatus::Success);
        let published = store.published();
        assert_eq!(published.len(), 2);
        assert!(published[0].0.starts_with("customer_health_"));
        assert!(published[0].1.contains("Risk level: <b>MEDIUM</b>"));
    }

    #[tokio::test]
    async fn test_generate_report_skips_when_nothing_due() {
        let store = Arc::new(MemoryReportStore::new());
        let types = vec!["customer_health".to_string(), "trigger_analytics".to_string()];
        let runner = ActionRunner::new(GenerateReportAction::new(store, types, 17));
        let ev = event("buying_signals", TriggerCategory::BuyingSignal, Priority::Low, None);
        assert_eq!(runner.execute(&ev).await.status, ActionStatus::Skipped);
    }
}
