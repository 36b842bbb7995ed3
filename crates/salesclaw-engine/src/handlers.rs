//! Action handlers bound to the engine by action id.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use salesclaw_actions::{
    ActionResult, ActionRunner, ActionStats, ActionStatus, AddToReportAction, CreateFollowupAction,
    CreateTaskAction, Deliveries, EmailNotificationAction, EscalationAction, GenerateReportAction,
    LogActivityAction, ScheduleMeetingAction, SlackNotificationAction, SmsNotificationAction,
    UpdateOpportunityAction,
};
use salesclaw_core::{Result, SalesClawConfig};
use salesclaw_triggers::TriggerEvent;
use serde_json::json;

use crate::engine::TriggerEngine;

/// What the engine calls for each action id listed on a fired rule.
pub type ActionHandler = Arc<dyn Fn(TriggerEvent) -> BoxFuture<'static, Result<ActionResult>> + Send + Sync>;

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(TriggerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResult>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Handler running a single action through its runner.
pub fn action_handler(runner: Arc<ActionRunner>) -> ActionHandler {
    handler_fn(move |event| {
        let runner = runner.clone();
        async move { Ok(runner.execute(&event).await) }
    })
}

/// Handler running several actions in order. The combined status is
/// failed if any part failed, success if any part succeeded or is pending,
/// skipped otherwise.
pub fn composite_handler(name: &str, runners: Vec<Arc<ActionRunner>>) -> ActionHandler {
    let name = name.to_string();
    let runners = Arc::new(runners);
    handler_fn(move |event| {
        let name = name.clone();
        let runners = runners.clone();
        async move {
            let mut results = Vec::with_capacity(runners.len());
            for runner in runners.iter() {
                results.push((runner.id().to_string(), runner.execute(&event).await));
            }

            let any = |status: ActionStatus| results.iter().any(|(_, r)| r.status == status);
            let data = json!({
                "results": results
                    .iter()
                    .map(|(id, r)| json!({"action_id": id, "result": r.to_dict()}))
                    .collect::<Vec<_>>(),
            });

            let combined = if any(ActionStatus::Failed) {
                ActionResult {
                    data,
                    ..ActionResult::failed(format!("{name}: some actions failed"), "one or more actions failed")
                }
            } else if any(ActionStatus::Success) || any(ActionStatus::Pending) {
                ActionResult::success(format!("{name}: {} actions executed", results.len()), data)
            } else {
                ActionResult {
                    data,
                    ..ActionResult::skipped(format!("{name}: nothing to do"))
                }
            };
            Ok(combined)
        }
    })
}

/// Rule action ids that map onto stock actions.
const ALIASES: &[(&str, &[&str])] = &[
    ("notify_ae", &["email_notification"]),
    ("log_to_crm", &["log_activity"]),
    ("immediate_alert", &["email_notification", "slack_notification", "sms_notification"]),
    ("notify_manager", &["escalation"]),
    ("create_save_task", &["create_task"]),
    ("schedule_demo", &["schedule_meeting"]),
    ("notify_csm", &["email_notification", "slack_notification"]),
    ("health_score_update", &["generate_report"]),
    ("schedule_checkin", &["schedule_meeting"]),
];

/// The stock action set, one runner per action id.
pub struct ActionSuite {
    runners: BTreeMap<String, Arc<ActionRunner>>,
}

impl ActionSuite {
    pub fn from_config(config: &SalesClawConfig, deliveries: Deliveries) -> Self {
        let directory = config.accounts.clone();
        let notify = &config.notifications;

        let runners = vec![
            ActionRunner::new(EmailNotificationAction::new(deliveries.mailer.clone(), directory.clone())),
            ActionRunner::new(SlackNotificationAction::new(
                deliveries.chat.clone(),
                &notify.slack_default_channel,
            )),
            ActionRunner::new(SmsNotificationAction::new(
                deliveries.sms.clone(),
                notify.phone_numbers.clone(),
            )),
            ActionRunner::new(UpdateOpportunityAction::new(deliveries.crm.clone())),
            ActionRunner::new(CreateTaskAction::new(
                deliveries.crm.clone(),
                directory.clone(),
                &config.crm.default_assignee,
            )),
            ActionRunner::new(LogActivityAction::new(deliveries.crm.clone(), &config.crm.activity_type)),
            ActionRunner::new(AddToReportAction::new(deliveries.reports.clone())),
            ActionRunner::new(GenerateReportAction::new(
                deliveries.reports.clone(),
                config.reports.report_types.clone(),
                config.reports.daily_summary_hour,
            )),
            ActionRunner::new(ScheduleMeetingAction::new(
                deliveries.calendar.clone(),
                directory.clone(),
                config.workflow.clone(),
            )),
            ActionRunner::new(CreateFollowupAction::new(deliveries.sequences.clone())),
            ActionRunner::new(EscalationAction::new(deliveries.sequences.clone(), directory)),
        ];

        Self {
            runners: runners
                .into_iter()
                .map(|r| (r.id().to_string(), Arc::new(r)))
                .collect(),
        }
    }

    pub fn runner(&self, action_id: &str) -> Option<Arc<ActionRunner>> {
        self.runners.get(action_id).cloned()
    }

    pub fn stats(&self) -> Vec<ActionStats> {
        self.runners.values().map(|r| r.stats()).collect()
    }

    /// Handlers for every stock id and every alias.
    pub fn handlers(&self) -> Vec<(String, ActionHandler)> {
        let mut handlers: Vec<(String, ActionHandler)> = self
            .runners
            .iter()
            .map(|(id, runner)| (id.clone(), action_handler(runner.clone())))
            .collect();

        for (alias, targets) in ALIASES {
            let runners: Vec<Arc<ActionRunner>> = targets.iter().filter_map(|t| self.runner(t)).collect();
            let handler = match runners.as_slice() {
                [single] => action_handler(single.clone()),
                _ => composite_handler(alias, runners),
            };
            handlers.push((alias.to_string(), handler));
        }
        handlers
    }

    pub fn register(&self, engine: &TriggerEngine) {
        let handlers = self.handlers();
        let count = handlers.len();
        for (id, handler) in handlers {
            engine.register_action_handler(&id, handler);
        }
        tracing::info!("🔌 Registered {count} action handlers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::default_rules;
    use async_trait::async_trait;
    use chrono::Utc;
    use salesclaw_actions::{Action, ActionInfo};
    use salesclaw_core::config::EngineConfig;
    use salesclaw_core::{Priority, TriggerCategory, TriggerType};
    use salesclaw_triggers::{TriggerMeta, TriggerResult};

    struct Fixed {
        info: ActionInfo,
        status: ActionStatus,
    }

    #[async_trait]
    impl Action for Fixed {
        fn info(&self) -> &ActionInfo {
            &self.info
        }

        async fn execute_impl(&self, _event: &TriggerEvent) -> Result<ActionResult> {
            Ok(match self.status {
                ActionStatus::Failed => ActionResult::failed("broke", "boom"),
                ActionStatus::Skipped => ActionResult::skipped("not needed"),
                _ => ActionResult::success("done", json!({})),
            })
        }
    }

    fn fixed(id: &str, status: ActionStatus) -> Arc<ActionRunner> {
        Arc::new(ActionRunner::new(Fixed {
            info: ActionInfo::new(id, id, ""),
            status,
        }))
    }

    fn event() -> TriggerEvent {
        let meta = TriggerMeta::new("buying_signals", "Buying Signals", "", Priority::High);
        TriggerEvent::new(
            &meta,
            TriggerType::Keyword,
            TriggerCategory::BuyingSignal,
            "slack",
            json!({"customer_id": "acme_inc", "text": "budget approved"}),
            TriggerResult::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_composite_status() {
        let failing = composite_handler(
            "mixed",
            vec![fixed("a", ActionStatus::Success), fixed("b", ActionStatus::Failed)],
        );
        let result = failing(event()).await.unwrap();
        assert_eq!(result.status, ActionStatus::Failed);
        assert_eq!(result.data["results"].as_array().unwrap().len(), 2);

        let ok = composite_handler(
            "partly",
            vec![fixed("a", ActionStatus::Skipped), fixed("b", ActionStatus::Success)],
        );
        assert_eq!(ok(event()).await.unwrap().status, ActionStatus::Success);

        let idle = composite_handler("idle", vec![fixed("a", ActionStatus::Skipped)]);
        assert_eq!(idle(event()).await.unwrap().status, ActionStatus::Skipped);
    }

    #[test]
    fn test_suite_covers_seed_rule_actions() {
        let config = SalesClawConfig::default();
        let suite = ActionSuite::from_config(&config, Deliveries::logging(&config));
        assert_eq!(suite.stats().len(), 11);

        let ids: Vec<String> = suite.handlers().into_iter().map(|(id, _)| id).collect();
        for rule in default_rules() {
            for action in &rule.actions {
                assert!(ids.contains(action), "no handler for {action}");
            }
        }
    }

    #[tokio::test]
    async fn test_churn_event_runs_stock_actions() {
        let config = SalesClawConfig::default();
        let suite = ActionSuite::from_config(&config, Deliveries::logging(&config));
        let engine = TriggerEngine::new(&EngineConfig::default(), default_rules());
        suite.register(&engine);

        let fired = engine
            .process_event("email", &json!({"customer_id": "acme_inc", "text": "We plan to cancel"}))
            .await;
        assert_eq!(fired.len(), 2);
        assert_eq!(engine.drain_pending().await, 2);

        let stats = |id: &str| suite.runner(id).unwrap().stats();
        assert_eq!(stats("email_notification").success_count, 2);
        assert_eq!(stats("log_activity").success_count, 1);
        assert_eq!(stats("add_to_report").success_count, 1);
        assert_eq!(stats("create_task").success_count, 1);
        assert_eq!(stats("escalation").success_count, 1);
        assert_eq!(stats("slack_notification").success_count, 1);
    }
}
