//! Workflow actions: meetings, follow-up sequences and escalations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime, Timelike};
use salesclaw_core::config::WorkflowConfig;
use salesclaw_core::types::push_unique;
use salesclaw_core::{AccountDirectory, Priority, Result, TriggerCategory};
use salesclaw_triggers::TriggerEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::base::{Action, ActionInfo, ActionResult};
use crate::delivery::{Calendar, SequenceSink};

// ── Meetings ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub customer_id: Option<String>,
    pub title: String,
    pub description: String,
    pub meeting_type: String,
    pub duration_minutes: u32,
    /// Local wall-clock start.
    pub start_time: NaiveDateTime,
    pub attendees: Vec<String>,
    pub scheduled_by: String,
}

/// Hours from now before a meeting: critical 2, high 24, otherwise 48.
pub fn meeting_lead_hours(priority: Priority) -> i64 {
    match priority {
        Priority::Critical => 2,
        Priority::High => 24,
        _ => 48,
    }
}

/// `now + lead_hours`, moved into business hours: before `start_hour`
/// snaps to `start_hour` the same day, at or after `end_hour` to
/// `start_hour` the next day.
pub fn next_business_slot(now: NaiveDateTime, lead_hours: i64, start_hour: u32, end_hour: u32) -> NaiveDateTime {
    let slot = now + Duration::hours(lead_hours);
    let day = if slot.hour() < start_hour {
        slot.date()
    } else if slot.hour() >= end_hour {
        slot.date() + Duration::days(1)
    } else {
        return slot;
    };
    day.and_hms_opt(start_hour, 0, 0).unwrap_or(slot)
}

pub struct ScheduleMeetingAction {
    info: ActionInfo,
    calendar: Arc<dyn Calendar>,
    directory: AccountDirectory,
    settings: WorkflowConfig,
}

impl ScheduleMeetingAction {
    pub fn new(calendar: Arc<dyn Calendar>, directory: AccountDirectory, settings: WorkflowConfig) -> Self {
        Self {
            info: ActionInfo::new(
                "schedule_meeting",
                "Schedule Meeting",
                "Schedule meetings with customers or internal teams",
            ),
            calendar,
            directory,
            settings,
        }
    }

    fn warrants_meeting(event: &TriggerEvent) -> bool {
        event.priority == Priority::Critical
            || matches!(
                event.category,
                TriggerCategory::ChurnRisk
                    | TriggerCategory::BuyingSignal
                    | TriggerCategory::Competitive
                    | TriggerCategory::Security
                    | TriggerCategory::ExecutiveEngagement
            )
    }

    fn attendees(&self, event: &TriggerEvent) -> Vec<String> {
        let dir = &self.directory;
        let mut attendees = Vec::new();
        if let Some(ae) = event.customer_id.as_deref().and_then(|c| dir.account_executive(c)) {
            push_unique(&mut attendees, ae);
        }
        match event.category {
            TriggerCategory::ChurnRisk => {
                push_unique(&mut attendees, &dir.customer_success);
                push_unique(&mut attendees, &dir.sales_manager);
            }
            TriggerCategory::Security => push_unique(&mut attendees, &dir.solutions_engineer),
            TriggerCategory::Competitive => push_unique(&mut attendees, &dir.competitive_intel),
            _ => {}
        }
        if event.priority == Priority::Critical {
            push_unique(&mut attendees, &dir.sales_manager);
        }
        attendees
    }

    /// The meeting this event calls for, if any, relative to local `now`.
    pub fn meeting_for(&self, event: &TriggerEvent, now: NaiveDateTime) -> Option<MeetingRequest> {
        if !Self::warrants_meeting(event) {
            return None;
        }
        let customer = event.customer_or_unknown();
        let (title, meeting_type, duration) = match event.category {
            TriggerCategory::ChurnRisk => (
                format!("URGENT: Customer Retention Call - {customer}"),
                "retention_call",
                60,
            ),
            TriggerCategory::BuyingSignal => (format!("Sales Opportunity Call - {customer}"), "sales_call", 45),
            TriggerCategory::Competitive => (
                format!("Competitive Strategy Call - {customer}"),
                "competitive_review",
                30,
            ),
            TriggerCategory::Security => (
                format!("Security/Compliance Review - {customer}"),
                "technical_review",
                45,
            ),
            _ => (
                format!("Customer Check-in - {customer}"),
                "general_checkin",
                self.settings.meeting_duration_minutes,
            ),
        };

        let start_time = next_business_slot(
            now,
            meeting_lead_hours(event.priority),
            self.settings.business_day_start_hour,
            self.settings.business_day_end_hour,
        );

        Some(MeetingRequest {
            customer_id: event.customer_id.clone(),
            title,
            description: format!(
                "Scheduled after trigger {}: {}",
                event.display_name(),
                event.result.matched_conditions.join(", ")
            ),
            meeting_type: meeting_type.to_string(),
            duration_minutes: duration,
            start_time,
            attendees: self.attendees(event),
            scheduled_by: "trigger_system".into(),
        })
    }
}

#[async_trait]
impl Action for ScheduleMeetingAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let Some(meeting) = self.meeting_for(event, Local::now().naive_local()) else {
            return Ok(ActionResult::skipped("Meeting not appropriate for this trigger type"));
        };
        let meeting_id = self.calendar.book_meeting(&meeting).await?;

        Ok(ActionResult::success(
            format!("Meeting scheduled: {}", meeting.title),
            json!({"meeting_id": meeting_id, "meeting": meeting}),
        ))
    }
}

// ── Follow-up sequences ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupStep {
    pub step: u32,
    pub delay_hours: u32,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl FollowupStep {
    fn email(step: u32, delay_hours: u32, template: &str, subject: &str) -> Self {
        Self {
            step,
            delay_hours,
            action: "send_email".into(),
            template: Some(template.into()),
            subject: Some(subject.into()),
            description: None,
            document: None,
        }
    }

    fn described(step: u32, delay_hours: u32, action: &str, description: &str) -> Self {
        Self {
            step,
            delay_hours,
            action: action.into(),
            template: None,
            subject: None,
            description: Some(description.into()),
            document: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupSequence {
    pub customer_id: Option<String>,
    pub trigger_id: String,
    pub priority: Priority,
    pub steps: Vec<FollowupStep>,
}

/// Category-specific follow-up steps.
pub fn followup_steps(event: &TriggerEvent) -> Vec<FollowupStep> {
    match event.category {
        TriggerCategory::BuyingSignal => vec![
            FollowupStep::email(1, 2, "buying_signal_immediate_followup", "Great to hear about your interest!"),
            FollowupStep::email(2, 24, "proposal_offer", "Proposal for your consideration"),
            FollowupStep::described(3, 72, "create_task", "Follow up on proposal response"),
        ],
        TriggerCategory::ChurnRisk => vec![
            FollowupStep::email(1, 1, "churn_risk_immediate", "Let's address your concerns"),
            FollowupStep::described(2, 24, "schedule_call", "Retention call with customer success"),
            FollowupStep::email(3, 48, "retention_offer", "Special offer to continue our partnership"),
        ],
        TriggerCategory::Competitive => {
            let competitor = event.result.context_str("competitor").unwrap_or("competitor");
            vec![
                FollowupStep::email(
                    1,
                    4,
                    "competitive_response",
                    &format!("How we compare to {competitor}"),
                ),
                FollowupStep {
                    document: Some(format!("{competitor}_battlecard.pdf")),
                    ..FollowupStep::described(2, 24, "send_document", "Share competitive battlecard")
                },
            ]
        }
        _ => vec![FollowupStep::email(1, 24, "general_checkin", "Checking in on your experience")],
    }
}

pub struct CreateFollowupAction {
    info: ActionInfo,
    sequences: Arc<dyn SequenceSink>,
}

impl CreateFollowupAction {
    pub fn new(sequences: Arc<dyn SequenceSink>) -> Self {
        Self {
            info: ActionInfo::new(
                "create_followup",
                "Create Follow-up",
                "Create automated follow-up sequences",
            ),
            sequences,
        }
    }
}

#[async_trait]
impl Action for CreateFollowupAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let sequence = FollowupSequence {
            customer_id: event.customer_id.clone(),
            trigger_id: event.trigger_id.clone(),
            priority: event.priority,
            steps: followup_steps(event),
        };
        let sequence_id = self.sequences.create_sequence(&sequence).await?;

        Ok(ActionResult::success(
            format!("Created {}-step follow-up sequence", sequence.steps.len()),
            json!({"sequence_id": sequence_id, "sequence": sequence}),
        ))
    }
}

// ── Escalation ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevel {
    /// `immediate`, `manager` or `director`.
    pub level: String,
    pub delay_minutes: u32,
    pub recipients: Vec<String>,
    pub message_type: String,
    /// Only escalate to this level when the condition holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPlan {
    pub trigger_id: String,
    pub customer_id: Option<String>,
    pub priority: Priority,
    pub levels: Vec<EscalationLevel>,
}

pub struct EscalationAction {
    info: ActionInfo,
    sequences: Arc<dyn SequenceSink>,
    directory: AccountDirectory,
}

impl EscalationAction {
    pub fn new(sequences: Arc<dyn SequenceSink>, directory: AccountDirectory) -> Self {
        Self {
            info: ActionInfo::new(
                "escalation",
                "Escalation",
                "Escalate critical triggers through management levels",
            ),
            sequences,
            directory,
        }
    }

    fn immediate_contacts(&self, event: &TriggerEvent) -> Vec<String> {
        let dir = &self.directory;
        let customer = event.customer_id.as_deref().unwrap_or_default();
        let mut contacts = vec![dir.account_executive_or_team(customer).to_string()];
        if dir.is_managed(customer) {
            push_unique(&mut contacts, &dir.customer_success);
        }
        contacts
    }

    /// Escalation ladder for critical and high events; `None` otherwise.
    pub fn plan_for(&self, event: &TriggerEvent) -> Option<EscalationPlan> {
        let level = |name: &str, delay: u32, recipients: Vec<String>, message_type: &str, condition: Option<&str>| {
            EscalationLevel {
                level: name.into(),
                delay_minutes: delay,
                recipients,
                message_type: message_type.into(),
                condition: condition.map(String::from),
            }
        };
        let manager = vec![self.directory.sales_manager.clone()];

        let levels = match event.priority {
            Priority::Critical => vec![
                level("immediate", 0, self.immediate_contacts(event), "sms_and_email", None),
                level("manager", 15, manager, "email_and_slack", None),
                level(
                    "director",
                    60,
                    vec![self.directory.sales_director.clone()],
                    "email",
                    Some("no_response_from_previous_level"),
                ),
            ],
            Priority::High => vec![
                level("immediate", 0, self.immediate_contacts(event), "email", None),
                level("manager", 60, manager, "email", Some("no_acknowledgment")),
            ],
            _ => return None,
        };

        Some(EscalationPlan {
            trigger_id: event.trigger_id.clone(),
            customer_id: event.customer_id.clone(),
            priority: event.priority,
            levels,
        })
    }
}

#[async_trait]
impl Action for EscalationAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult> {
        let Some(plan) = self.plan_for(event) else {
            return Ok(ActionResult::skipped("Escalation only for critical/high priority triggers"));
        };
        let escalation_id = self.sequences.start_escalation(&plan).await?;

        Ok(ActionResult::success(
            format!("Escalation started with {} levels", plan.levels.len()),
            json!({"escalation_id": escalation_id, "levels": plan.levels.len(), "plan": plan}),
        ))
    }
}
