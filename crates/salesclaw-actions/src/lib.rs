//! # SalesClaw Actions
//!
//! Units of external-effecting work run when a rule fires. Every action
//! implements [`Action`]; callers always go through [`ActionRunner`], which
//! owns the enabled flag, timing, failure containment and statistics.
//!
//! Delivery (SMTP, Slack, CRM, calendar, report storage) is injected
//! through the traits in [`delivery`], so the decision logic in each family
//! is independent of transport.

pub mod base;
pub mod crm;
pub mod delivery;
pub mod notification;
pub mod report;
pub mod workflow;

pub use base::{Action, ActionInfo, ActionResult, ActionRunner, ActionStats, ActionStatus};
pub use crm::{CreateTaskAction, LogActivityAction, UpdateOpportunityAction};
pub use delivery::Deliveries;
pub use notification::{EmailNotificationAction, SlackNotificationAction, SmsNotificationAction};
pub use report::{AddToReportAction, GenerateReportAction};
pub use workflow::{CreateFollowupAction, EscalationAction, ScheduleMeetingAction};

/// Bullet list used in message bodies.
pub(crate) fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;
    use salesclaw_core::{Priority, TriggerCategory, TriggerType};
    use salesclaw_triggers::{TriggerEvent, TriggerMeta, TriggerResult};
    use serde_json::json;

    /// A fired event with the given shape.
    pub fn event(
        trigger_id: &str,
        category: TriggerCategory,
        priority: Priority,
        customer_id: Option<&str>,
    ) -> TriggerEvent {
        let meta = TriggerMeta::new(trigger_id, "Test Trigger", "", priority);
        let mut result = TriggerResult::default();
        result.triggered = true;
        result.confidence = 0.5;
        result.matched_conditions = vec!["keyword_match_test".into()];
        result.suggested_actions = vec!["follow_up".into()];
        let data = match customer_id {
            Some(id) => json!({"customer_id": id, "text": "test"}),
            None => json!({"text": "test"}),
        };
        TriggerEvent::new(&meta, TriggerType::Keyword, category, "slack", data, result, Utc::now())
    }
}
