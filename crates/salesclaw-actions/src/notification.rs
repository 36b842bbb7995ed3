//! Email, Slack and SMS alerts.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use salesclaw_core::payload::display_value;
use salesclaw_core::types::push_unique;
use salesclaw_core::{AccountDirectory, Priority, Result, TriggerCategory};
use salesclaw_triggers::TriggerEvent;
use serde_json::json;

use crate::base::{Action, ActionInfo, ActionResult};
use crate::bullets;
use crate::delivery::{ChatSender, Mailer, SmsSender};

/// Alert email to the account owner and whoever the priority and category call for.
pub struct EmailNotificationAction {
    info: ActionInfo,
    mailer: Arc<dyn Mailer>,
    directory: AccountDirectory,
}

impl EmailNotificationAction {
    pub fn new(mailer: Arc<dyn Mailer>, directory: AccountDirectory) -> Self {
        Self {
            info: ActionInfo::new(
                "email_notification",
                "Email Notification",
                "Send email alerts for trigger events",
            ),
            mailer,
            directory,
        }
    }

    /// Recipients in first-seen order.
    pub fn recipients(&self, event: &TriggerEvent) -> Vec<String> {
        let dir = &self.directory;
        let mut recipients = Vec::new();

        if let Some(customer) = &event.customer_id {
            push_unique(&mut recipients, dir.account_executive_or_team(customer));
        }
        match event.priority {
            Priority::Critical => {
                push_unique(&mut recipients, &dir.sales_manager);
                push_unique(&mut recipients, &dir.cro);
            }
            Priority::High => push_unique(&mut recipients, &dir.sales_team),
            _ => {}
        }
        match event.category {
            TriggerCategory::ChurnRisk => push_unique(&mut recipients, &dir.customer_success),
            TriggerCategory::BuyingSignal => push_unique(&mut recipients, &dir.sales_team),
            TriggerCategory::Security => push_unique(&mut recipients, &dir.security_team),
            _ => {}
        }
        recipients
    }

    pub fn subject(event: &TriggerEvent) -> String {
        format!(
            "[{}] Sales Alert: {} - {}",
            event.priority.as_str().to_uppercase(),
            event.display_name(),
            event.customer_or_unknown()
        )
    }

    pub fn body(event: &TriggerEvent) -> String {
        let result = &event.result;
        let context: Vec<String> = result
            .context
            .iter()
            .map(|(key, value)| format!("{key}: {}", display_value(value)))
            .collect();

        format!(
            "Sales Trigger Alert\n\n\
             Trigger: {}\n\
             Customer: {}\n\
             Source: {}\n\
             Time: {}\n\
             Priority: {}\n\n\
             Conditions Met:\n{}\n\n\
             Context:\n{}\n\n\
             Suggested Actions:\n{}\n",
            event.display_name(),
            event.customer_or_unknown(),
            event.source,
            event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            event.priority.as_str().to_uppercase(),
            bullets(&result.matched_conditions),
            bullets(&context),
            bullets(&result.suggested_actions),
        )
    }
}

#[async_trait]
impl Action for EmailNotificationAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let recipients = self.recipients(event);
        if recipients.is_empty() {
            return Ok(ActionResult::skipped("No recipients found for notification"));
        }

        let subject = Self::subject(event);
        self.mailer
            .send_email(&recipients, &subject, &Self::body(event))
            .await?;

        Ok(ActionResult::success(
            format!("Email sent to {} recipients", recipients.len()),
            json!({"recipients": recipients, "subject": subject}),
        ))
    }
}

/// Slack message routed to a channel by priority and category.
pub struct SlackNotificationAction {
    info: ActionInfo,
    chat: Arc<dyn ChatSender>,
    default_channel: String,
}

impl SlackNotificationAction {
    pub fn new(chat: Arc<dyn ChatSender>, default_channel: &str) -> Self {
        Self {
            info: ActionInfo::new(
                "slack_notification",
                "Slack Notification",
                "Send Slack alerts for trigger events",
            ),
            chat,
            default_channel: default_channel.into(),
        }
    }

    pub fn channel(&self, event: &TriggerEvent) -> String {
        if event.priority == Priority::Critical {
            return "#sales-critical".into();
        }
        match event.category {
            TriggerCategory::ChurnRisk => "#customer-success".into(),
            TriggerCategory::BuyingSignal => "#sales-hot-leads".into(),
            TriggerCategory::Competitive => "#competitive-intel".into(),
            TriggerCategory::Security => "#security-team".into(),
            _ => self.default_channel.clone(),
        }
    }

    pub fn message(event: &TriggerEvent) -> String {
        let emoji = match event.priority {
            Priority::Critical => "🚨",
            Priority::High => "⚠️",
            Priority::Medium => "ℹ️",
            Priority::Low => "📝",
        };
        let result = &event.result;
        let mut text = format!(
            "{emoji} *Sales Alert: {}*\n\
             *Customer:* {}\n\
             *Priority:* {}\n\
             *Source:* {}\n",
            event.display_name(),
            event.customer_or_unknown(),
            event.priority.as_str().to_uppercase(),
            event.source,
        );
        if !result.matched_conditions.is_empty() {
            text.push_str(&format!("\n*Conditions:*\n{}\n", bullets(&result.matched_conditions)));
        }
        if !result.suggested_actions.is_empty() {
            text.push_str(&format!("\n*Suggested Actions:*\n{}\n", bullets(&result.suggested_actions)));
        }
        text
    }
}

#[async_trait]
impl Action for SlackNotificationAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let channel = self.channel(event);
        let message = Self::message(event);
        self.chat.send_chat(&channel, &message).await?;

        let preview: String = message.chars().take(100).collect();
        Ok(ActionResult::success(
            format!("Slack message sent to {channel}"),
            json!({"channel": channel, "message_preview": preview}),
        ))
    }
}

/// Text message, reserved for critical triggers.
pub struct SmsNotificationAction {
    info: ActionInfo,
    sms: Arc<dyn SmsSender>,
    phone_numbers: BTreeMap<String, String>,
}

impl SmsNotificationAction {
    pub fn new(sms: Arc<dyn SmsSender>, phone_numbers: BTreeMap<String, String>) -> Self {
        Self {
            info: ActionInfo::new(
                "sms_notification",
                "SMS Notification",
                "Send SMS alerts for critical triggers",
            ),
            sms,
            phone_numbers,
        }
    }

    pub fn recipients(&self, event: &TriggerEvent) -> Vec<String> {
        let mut numbers = Vec::new();
        if let Some(number) = self.phone_numbers.get("sales_manager") {
            push_unique(&mut numbers, number);
        }
        if let Some(number) = event.customer_id.as_ref().and_then(|c| self.phone_numbers.get(c)) {
            push_unique(&mut numbers, number);
        }
        numbers
    }
}

#[async_trait]
impl Action for SmsNotificationAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        if event.priority != Priority::Critical {
            return Ok(ActionResult::skipped("SMS only sent for critical priority triggers"));
        }
        let recipients = self.recipients(event);
        if recipients.is_empty() {
            return Ok(ActionResult::skipped("No phone numbers configured for SMS"));
        }

        let message = format!(
            "CRITICAL: {} - {}. Check sales dashboard immediately.",
            event.display_name(),
            event.customer_or_unknown()
        );
        self.sms.send_sms(&recipients, &message).await?;

        Ok(ActionResult::success(
            format!("SMS sent to {} recipients", recipients.len()),
            json!({"recipients": recipients}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{ActionRunner, ActionStatus};
    use crate::delivery::LogDelivery;
    use crate::testing::event;

    fn email() -> EmailNotificationAction {
        EmailNotificationAction::new(Arc::new(LogDelivery), AccountDirectory::default())
    }

    #[test]
    fn test_email_recipients_for_critical_churn() {
        let ev = event("churn_risk_keywords", TriggerCategory::ChurnRisk, Priority::Critical, Some("acme_inc"));
        assert_eq!(
            email().recipients(&ev),
            vec![
                "john.doe@company.com",
                "sales-manager@company.com",
                "cro@company.com",
                "customer-success@company.com",
            ]
        );
    }

    #[test]
    fn test_email_recipients_deduplicate_sales_team() {
        let ev = event("buying_signals", TriggerCategory::BuyingSignal, Priority::High, Some("unknown_co"));
        assert_eq!(email().recipients(&ev), vec!["sales-team@company.com"]);
    }

    #[tokio::test]
    async fn test_email_skipped_without_recipients() {
        let runner = ActionRunner::new(email());
        let ev = event("misc", TriggerCategory::General, Priority::Low, None);
        let result = runner.execute(&ev).await;
        assert_eq!(result.status, ActionStatus::Skipped);
        assert_eq!(runner.stats().execution_count, 0);
    }

    #[test]
    fn test_email_subject_and_body() {
        let ev = event("security_check", TriggerCategory::Security, Priority::Medium, Some("techcorp"));
        assert_eq!(
            EmailNotificationAction::subject(&ev),
            "[MEDIUM] Sales Alert: Test Trigger - techcorp"
        );
        let body = EmailNotificationAction::body(&ev);
        assert!(body.contains("Source: slack"));
        assert!(body.contains("• keyword_match_test"));
        assert!(body.contains("• follow_up"));
    }

    #[test]
    fn test_slack_channel_routing() {
        let slack = SlackNotificationAction::new(Arc::new(LogDelivery), "#sales-alerts");
        let cases = [
            (TriggerCategory::ChurnRisk, Priority::Critical, "#sales-critical"),
            (TriggerCategory::ChurnRisk, Priority::High, "#customer-success"),
            (TriggerCategory::BuyingSignal, Priority::High, "#sales-hot-leads"),
            (TriggerCategory::Competitive, Priority::Medium, "#competitive-intel"),
            (TriggerCategory::Security, Priority::Low, "#security-team"),
            (TriggerCategory::UsageDrop, Priority::High, "#sales-alerts"),
        ];
        for (category, priority, channel) in cases {
            assert_eq!(slack.channel(&event("t", category, priority, None)), channel);
        }
    }

    #[tokio::test]
    async fn test_slack_result_preview() {
        let runner = ActionRunner::new(SlackNotificationAction::new(Arc::new(LogDelivery), "#sales-alerts"));
        let ev = event("t", TriggerCategory::General, Priority::Critical, Some("acme_inc"));
        let result = runner.execute(&ev).await;
        assert_eq!(result.status, ActionStatus::Success);
        assert_eq!(result.data["channel"], "#sales-critical");
        let preview = result.data["message_preview"].as_str().unwrap();
        assert!(preview.starts_with("🚨 *Sales Alert: Test Trigger*"));
        assert!(preview.chars().count() <= 100);
    }

    #[tokio::test]
    async fn test_sms_only_for_critical() {
        let mut phones = BTreeMap::new();
        phones.insert("sales_manager".to_string(), "+15550100".to_string());
        phones.insert("acme_inc".to_string(), "+15550199".to_string());
        let runner = ActionRunner::new(SmsNotificationAction::new(Arc::new(LogDelivery), phones));

        let high = event("t", TriggerCategory::ChurnRisk, Priority::High, Some("acme_inc"));
        assert_eq!(runner.execute(&high).await.status, ActionStatus::Skipped);

        let critical = event("t", TriggerCategory::ChurnRisk, Priority::Critical, Some("acme_inc"));
        let result = runner.execute(&critical).await;
        assert_eq!(result.status, ActionStatus::Success);
        assert_eq!(result.data["recipients"], json!(["+15550100", "+15550199"]));
    }

    #[tokio::test]
    async fn test_sms_skipped_without_numbers() {
        let runner = ActionRunner::new(SmsNotificationAction::new(Arc::new(LogDelivery), BTreeMap::new()));
        let critical = event("t", TriggerCategory::General, Priority::Critical, None);
        let result = runner.execute(&critical).await;
        assert_eq!(result.status, ActionStatus::Skipped);
        assert_eq!(result.message, "No phone numbers configured for SMS");
    }
}
