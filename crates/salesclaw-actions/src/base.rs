//! Action contract and the execution wrapper shared by every action.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use salesclaw_core::Result;
use salesclaw_triggers::TriggerEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
    Pending,
    Skipped,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of one action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    /// Wall-clock time stamped by [`ActionRunner`].
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionResult {
    fn with_status(status: ActionStatus, message: impl Into<String>, data: Value) -> Self {
        Self {
            status,
            message: message.into(),
            data,
            execution_time_ms: 0.0,
            error: None,
        }
    }

    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self::with_status(ActionStatus::Success, message, data)
    }

    pub fn pending(message: impl Into<String>, data: Value) -> Self {
        Self::with_status(ActionStatus::Pending, message, data)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Skipped, message, json!({}))
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(ActionStatus::Failed, message, json!({}))
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    /// `{status, message, data, execution_time_ms, error}`.
    pub fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Identity of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub action_id: String,
    pub name: String,
    pub description: String,
}

impl ActionInfo {
    pub fn new(action_id: &str, name: &str, description: &str) -> Self {
        Self {
            action_id: action_id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Snapshot of an action's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub action_id: String,
    pub name: String,
    pub enabled: bool,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub last_executed: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    execution_count: u64,
    success_count: u64,
    failure_count: u64,
    last_executed: Option<DateTime<Utc>>,
}

/// An external-effecting unit of work run when a rule fires.
///
/// Implementations only decide and deliver. Callers never invoke
/// `execute_impl` directly; they go through [`ActionRunner::execute`].
#[async_trait]
pub trait Action: Send + Sync {
    fn info(&self) -> &ActionInfo;

    async fn execute_impl(&self, event: &TriggerEvent) -> Result<ActionResult>;
}

/// Wraps an [`Action`] with the enabled flag, timing, failure containment
/// and counters. The wrapper cannot be overridden by implementations.
pub struct ActionRunner {
    action: Box<dyn Action>,
    enabled: AtomicBool,
    counters: Mutex<Counters>,
}

impl ActionRunner {
    pub fn new(action: impl Action + 'static) -> Self {
        Self {
            action: Box::new(action),
            enabled: AtomicBool::new(true),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.action.info().action_id
    }

    pub fn name(&self) -> &str {
        &self.action.info().name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Run the action for one event. Never returns an error and never
    /// propagates a panic from the implementation.
    pub async fn execute(&self, event: &TriggerEvent) -> ActionResult {
        let name = self.name().to_string();
        if !self.is_enabled() {
            return ActionResult::skipped(format!("Action {name} is disabled"));
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = AssertUnwindSafe(self.action.execute_impl(event))
            .catch_unwind()
            .await;

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ActionResult::failed(format!("Action {name} failed with error"), e.to_string()),
            Err(panic) => ActionResult::failed(
                format!("Action {name} failed with error"),
                panic_message(panic.as_ref()),
            ),
        };
        result.execution_time_ms = clock.elapsed().as_secs_f64() * 1000.0;

        if result.status == ActionStatus::Failed {
            tracing::warn!(
                "❌ Action {} failed for {}: {}",
                self.id(),
                event.trigger_id,
                result.error.as_deref().unwrap_or("unknown")
            );
        } else {
            tracing::debug!(
                "Action {} -> {} ({:.1}ms)",
                self.id(),
                result.status.as_str(),
                result.execution_time_ms
            );
        }

        self.record(result.status, started_at);
        result
    }

    fn record(&self, status: ActionStatus, at: DateTime<Utc>) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        match status {
            ActionStatus::Skipped => return,
            ActionStatus::Success | ActionStatus::Pending => counters.success_count += 1,
            ActionStatus::Failed => counters.failure_count += 1,
        }
        counters.execution_count += 1;
        counters.last_executed = Some(at);
    }

    pub fn stats(&self) -> ActionStats {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let info = self.action.info();
        ActionStats {
            action_id: info.action_id.clone(),
            name: info.name.clone(),
            enabled: self.is_enabled(),
            execution_count: counters.execution_count,
            success_count: counters.success_count,
            failure_count: counters.failure_count,
            success_rate: counters.success_count as f64 / counters.execution_count.max(1) as f64,
            last_executed: counters.last_executed,
        }
    }

    pub fn reset_stats(&self) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters = Counters::default();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use salesclaw_core::{Priority, SalesClawError, TriggerCategory};

    enum Behaviour {
        Succeed,
        SelfTimed,
        Skip,
        Fail,
        Panic,
    }

    struct Scripted {
        info: ActionInfo,
        behaviour: Behaviour,
    }

    impl Scripted {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                info: ActionInfo::new("scripted", "Scripted", "test action"),
                behaviour,
            }
        }
    }

    #[async_trait]
    impl Action for Scripted {
        fn info(&self) -> &ActionInfo {
            &self.info
        }

        async fn execute_impl(&self, _event: &TriggerEvent) -> Result<ActionResult> {
            match self.behaviour {
                Behaviour::Succeed => Ok(ActionResult::success("done", json!({"ok": true}))),
                Behaviour::SelfTimed => Ok(ActionResult {
                    execution_time_ms: 9_999.0,
                    ..ActionResult::success("done", json!({}))
                }),
                Behaviour::Skip => Ok(ActionResult::skipped("not applicable")),
                Behaviour::Fail => Err(SalesClawError::Delivery("smtp unreachable".into())),
                Behaviour::Panic => panic!("boom"),
            }
        }
    }

    fn event() -> TriggerEvent {
        testing::event("buying_signals", TriggerCategory::BuyingSignal, Priority::High, Some("acme_inc"))
    }

    #[tokio::test]
    async fn test_disabled_action_is_skipped_without_counting() {
        let runner = ActionRunner::new(Scripted::new(Behaviour::Panic));
        runner.set_enabled(false);

        let result = runner.execute(&event()).await;
        assert_eq!(result.status, ActionStatus::Skipped);
        assert_eq!(result.message, "Action Scripted is disabled");

        let stats = runner.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.execution_count, 0);
        assert_eq!(stats.last_executed, None);
    }

    #[tokio::test]
    async fn test_error_becomes_failed_result() {
        let runner = ActionRunner::new(Scripted::new(Behaviour::Fail));
        let result = runner.execute(&event()).await;

        assert_eq!(result.status, ActionStatus::Failed);
        assert_eq!(result.message, "Action Scripted failed with error");
        assert_eq!(result.error.as_deref(), Some("Delivery error: smtp unreachable"));
        assert!(result.execution_time_ms >= 0.0);

        let stats = runner.stats();
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_wrapper_owns_execution_time() {
        let runner = ActionRunner::new(Scripted::new(Behaviour::SelfTimed));
        let result = runner.execute(&event()).await;

        assert_eq!(result.status, ActionStatus::Success);
        assert!(result.execution_time_ms >= 0.0);
        assert!(result.execution_time_ms < 9_999.0);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let runner = ActionRunner::new(Scripted::new(Behaviour::Panic));
        let result = runner.execute(&event()).await;
        assert_eq!(result.status, ActionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(runner.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn test_counters_stay_consistent() {
        let ok = ActionRunner::new(Scripted::new(Behaviour::Succeed));
        let skip = ActionRunner::new(Scripted::new(Behaviour::Skip));
        for _ in 0..3 {
            ok.execute(&event()).await;
            skip.execute(&event()).await;
        }

        let stats = ok.stats();
        assert_eq!(stats.execution_count, 3);
        assert_eq!(stats.execution_count, stats.success_count + stats.failure_count);
        assert_eq!(stats.success_rate, 1.0);
        assert!(stats.last_executed.is_some());

        assert_eq!(skip.stats().execution_count, 0);

        ok.reset_stats();
        assert_eq!(ok.stats().execution_count, 0);
    }

    #[test]
    fn test_result_dict_shape() {
        let dict = ActionResult::failed("nope", "bad").to_dict();
        assert_eq!(dict["status"], "failed");
        assert_eq!(dict["error"], "bad");
        assert_eq!(dict["data"], json!({}));
        assert_eq!(dict["execution_time_ms"], 0.0);
    }
}
