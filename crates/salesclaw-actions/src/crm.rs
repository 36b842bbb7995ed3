//! CRM actions: opportunity updates, tasks and activity log entries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use salesclaw_core::{AccountDirectory, Priority, Result, TriggerCategory};
use salesclaw_triggers::TriggerEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::base::{Action, ActionInfo, ActionResult};
use crate::delivery::CrmClient;

/// Field changes written to an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub trigger_alert: String,
}

impl OpportunityUpdate {
    pub fn for_event(event: &TriggerEvent, now: DateTime<Utc>) -> Self {
        let mut update = Self {
            stage: None,
            probability: None,
            health_score: None,
            competitor: None,
            next_step: None,
            notes: None,
            last_activity: now,
            trigger_alert: format!("{} fired at {}", event.trigger_id, event.timestamp.to_rfc3339()),
        };

        match event.category {
            TriggerCategory::BuyingSignal => {
                update.stage = Some("Proposal".into());
                update.probability = Some(75);
                update.next_step = Some("Prepare and send proposal".into());
                update.notes = Some(format!(
                    "Buying signal detected: {}",
                    event.result.matched_conditions.join(", ")
                ));
            }
            TriggerCategory::ChurnRisk => {
                update.health_score = Some("At Risk".into());
                update.next_step = Some("Emergency retention call".into());
                update.notes = Some(format!(
                    "Churn risk detected: {}",
                    event.result.matched_conditions.join(", ")
                ));
            }
            TriggerCategory::Competitive => {
                let competitor = event.result.context_str("competitor").unwrap_or("Unknown");
                update.next_step = Some(format!("Prepare {competitor} competitive materials"));
                update.competitor = Some(competitor.to_string());
            }
            TriggerCategory::Security => {
                update.next_step = Some("Schedule security/compliance review".into());
            }
            _ => {}
        }
        update
    }
}

/// Updates the customer's open opportunity to reflect the trigger.
pub struct UpdateOpportunityAction {
    info: ActionInfo,
    crm: Arc<dyn CrmClient>,
}

impl UpdateOpportunityAction {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self {
            info: ActionInfo::new(
                "update_opportunity",
                "Update Opportunity",
                "Update CRM opportunity based on trigger events",
            ),
            crm,
        }
    }
}

#[async_trait]
impl Action for UpdateOpportunityAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let Some(customer_id) = event.customer_id.as_deref() else {
            return Ok(ActionResult::skipped("No customer ID in trigger event"));
        };
        let Some(opportunity_id) = self.crm.find_opportunity(customer_id).await? else {
            return Ok(ActionResult::skipped(format!(
                "No active opportunity found for {customer_id}"
            )));
        };

        let update = OpportunityUpdate::for_event(event, Utc::now());
        self.crm.update_opportunity(&opportunity_id, &update).await?;

        Ok(ActionResult::success(
            format!("Updated opportunity {opportunity_id}"),
            json!({"opportunity_id": opportunity_id, "updates": update}),
        ))
    }
}

/// A follow-up task in the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub customer_id: Option<String>,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub assignee: String,
    pub created_by: String,
}

/// Due date offset by priority: critical 2h, high 24h, medium 2 days, low 7 days.
pub fn task_due_date(priority: Priority, now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = match priority {
        Priority::Critical => Duration::hours(2),
        Priority::High => Duration::hours(24),
        Priority::Medium => Duration::days(2),
        Priority::Low => Duration::days(7),
    };
    now + offset
}

pub struct CreateTaskAction {
    info: ActionInfo,
    crm: Arc<dyn CrmClient>,
    directory: AccountDirectory,
    default_assignee: String,
}

impl CreateTaskAction {
    pub fn new(crm: Arc<dyn CrmClient>, directory: AccountDirectory, default_assignee: &str) -> Self {
        Self {
            info: ActionInfo::new(
                "create_task",
                "Create Task",
                "Create follow-up tasks in CRM",
            ),
            crm,
            directory,
            default_assignee: default_assignee.into(),
        }
    }

    fn assignee(&self, event: &TriggerEvent) -> String {
        if let Some(customer) = &event.customer_id {
            return self
                .directory
                .account_executive(customer)
                .unwrap_or(self.default_assignee.as_str())
                .to_string();
        }
        match event.category {
            TriggerCategory::ChurnRisk => self.directory.customer_success.clone(),
            TriggerCategory::Security => self.directory.solutions_engineer.clone(),
            _ => self.default_assignee.clone(),
        }
    }

    pub fn task_for(&self, event: &TriggerEvent, now: DateTime<Utc>) -> TaskDetails {
        let customer = event.customer_or_unknown();
        let matched = event.result.matched_conditions.join(", ");
        let mut priority = event.priority;

        let (title, description, task_type) = match event.category {
            TriggerCategory::BuyingSignal => (
                format!("Follow up on buying signal - {customer}"),
                format!("Customer showed buying intent: {matched}. Reach out to qualify and advance the deal."),
                "sales_followup",
            ),
            TriggerCategory::ChurnRisk => {
                priority = Priority::Critical;
                (
                    format!("URGENT: Address churn risk - {customer}"),
                    format!("Churn risk indicators: {matched}. Schedule a retention call immediately."),
                    "retention_call",
                )
            }
            TriggerCategory::Competitive => (
                format!("Competitive response needed - {customer}"),
                format!(
                    "Competitor mentioned: {}. Prepare competitive positioning.",
                    event.result.context_str("competitor").unwrap_or("Unknown")
                ),
                "competitive_response",
            ),
            TriggerCategory::Security => (
                format!("Security inquiry response - {customer}"),
                format!("Security or compliance questions raised: {matched}. Engage a solutions engineer."),
                "technical_response",
            ),
            _ => (
                format!("Follow up on trigger - {customer}"),
                format!("Trigger {} fired: {matched}", event.display_name()),
                "general_followup",
            ),
        };

        TaskDetails {
            title,
            description,
            task_type: task_type.to_string(),
            customer_id: event.customer_id.clone(),
            priority,
            due_date: task_due_date(priority, now),
            assignee: self.assignee(event),
            created_by: "trigger_system".into(),
        }
    }
}

#[async_trait]
impl Action for CreateTaskAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let task = self.task_for(event, Utc::now());
        let task_id = self.crm.create_task(&task).await?;

        Ok(ActionResult::success(
            format!("Created task: {}", task.title),
            json!({"task_id": task_id, "task": task}),
        ))
    }
}

/// An activity entry on the customer timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub customer_id: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub subject: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub priority: Priority,
}

pub struct LogActivityAction {
    info: ActionInfo,
    crm: Arc<dyn CrmClient>,
    activity_type: String,
}

impl LogActivityAction {
    pub fn new(crm: Arc<dyn CrmClient>, activity_type: &str) -> Self {
        Self {
            info: ActionInfo::new(
                "log_activity",
                "Log Activity",
                "Log trigger events as CRM activities",
            ),
            crm,
            activity_type: activity_type.into(),
        }
    }

    pub fn activity_for(&self, event: &TriggerEvent) -> ActivityRecord {
        let result = &event.result;
        let description = format!(
            "Trigger: {}\nSource: {}\nConfidence: {:.2}\nConditions: {}\nSuggested actions: {}",
            event.display_name(),
            event.source,
            result.confidence,
            result.matched_conditions.join(", "),
            result.suggested_actions.join(", "),
        );
        ActivityRecord {
            customer_id: event.customer_id.clone(),
            activity_type: self.activity_type.clone(),
            subject: format!("Trigger Alert: {}", event.display_name()),
            description,
            timestamp: event.timestamp,
            source: "automation_trigger".into(),
            priority: event.priority,
        }
    }
}

#[async_trait]
impl Action for LogActivityAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let activity = self.activity_for(event);
        let activity_id = self.crm.log_activity(&activity).await?;
        Ok(ActionResult::success(
            "Activity logged in CRM",
            json!({"activity_id": activity_id, "activity": activity}),
        ))
    }
}
