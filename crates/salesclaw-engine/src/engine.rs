//! Trigger engine: evaluates rules against inbound payloads, queues fired
//! events and dispatches their actions.
//!
//! Concurrency: one tokio task per monitored source plus a single drainer.
//! The rule lock covers evaluation, enqueue and the `last_triggered`
//! update, so a rule cannot fire twice inside its cooldown. The history
//! lock and the queue receiver lock are never held across an await.
//!
//! Every `start()` hands its loops a fresh shutdown channel, so loops from
//! an earlier run exit even when the engine is restarted before they were
//! joined.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use salesclaw_core::config::EngineConfig;
use salesclaw_core::{Result, SalesClawError};
use salesclaw_triggers::TriggerEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::handlers::ActionHandler;
use crate::history::EventHistory;
use crate::rule::TriggerRule;
use crate::source::EventSource;
use crate::store::{EngineState, RuleState, STATE_EVENT_LIMIT, StateStore};

/// Aggregate view of processed events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerStats {
    pub total_triggers: usize,
    pub triggers_by_priority: BTreeMap<String, usize>,
    pub triggers_by_type: BTreeMap<String, usize>,
    pub triggers_by_source: BTreeMap<String, usize>,
    pub recent_triggers: Vec<Value>,
}

struct Monitor {
    source: Arc<dyn EventSource>,
    interval: Duration,
}

pub struct TriggerEngine {
    rules: Mutex<Vec<TriggerRule>>,
    handlers: RwLock<HashMap<String, ActionHandler>>,
    monitors: std::sync::Mutex<Vec<Monitor>>,
    queue_tx: mpsc::UnboundedSender<TriggerEvent>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<TriggerEvent>>,
    queued: Notify,
    history: std::sync::Mutex<EventHistory>,
    /// `None` once [`close_events`](TriggerEngine::close_events) ran.
    processed_tx: std::sync::Mutex<Option<broadcast::Sender<TriggerEvent>>>,
    running: AtomicBool,
    /// Shutdown sender of the current run.
    shutdown: std::sync::Mutex<Option<watch::Sender<bool>>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    poll_interval: Duration,
    recent_limit: usize,
}

impl TriggerEngine {
    pub fn new(config: &EngineConfig, rules: Vec<TriggerRule>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (processed_tx, _) = broadcast::channel(256);
        Self {
            rules: Mutex::new(rules),
            handlers: RwLock::new(HashMap::new()),
            monitors: std::sync::Mutex::new(Vec::new()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            queued: Notify::new(),
            history: std::sync::Mutex::new(EventHistory::new(config.history_max, config.history_retain)),
            processed_tx: std::sync::Mutex::new(Some(processed_tx)),
            running: AtomicBool::new(false),
            shutdown: std::sync::Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
            poll_interval: Duration::from_millis(config.queue_poll_ms.max(1)),
            recent_limit: config.recent_limit,
        }
    }

    // ─── Setup ────────────────────────────────────────────────

    pub async fn add_rule(&self, rule: TriggerRule) {
        tracing::info!("📋 Rule added: '{}' ({})", rule.name, rule.id);
        self.rules.lock().await.push(rule);
    }

    /// Snapshot of the current rules.
    pub async fn rules(&self) -> Vec<TriggerRule> {
        self.rules.lock().await.clone()
    }

    pub async fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut rules = self.rules.lock().await;
        match rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Bind an action id to a handler. Several rules may share one id.
    pub fn register_action_handler(&self, action_id: &str, handler: ActionHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(action_id.to_string(), handler);
    }

    pub fn handler_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Poll `source` every `interval` once the engine starts.
    pub fn add_source(&self, source: Arc<dyn EventSource>, interval: Duration) {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Monitor { source, interval });
    }

    /// Receive every event after its actions ran. After
    /// [`close_events`](Self::close_events) the receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        match self.processed_tx.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Close the processed-event stream. Subscribers receive everything sent
    /// so far, then `Closed`.
    pub fn close_events(&self) {
        self.processed_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    // ─── Evaluation ───────────────────────────────────────────

    pub async fn process_event(&self, source: &str, payload: &Value) -> Vec<TriggerEvent> {
        self.process_event_at(source, payload, Utc::now()).await
    }

    /// Evaluate every rule at `now` and queue an event for each one that fires.
    pub async fn process_event_at(&self, source: &str, payload: &Value, now: DateTime<Utc>) -> Vec<TriggerEvent> {
        let mut fired = Vec::new();
        let mut rules = self.rules.lock().await;

        for rule in rules.iter_mut() {
            let Some(result) = rule.evaluate_at(payload, now) else {
                continue;
            };
            if !result.triggered {
                continue;
            }

            let event = TriggerEvent::new(
                &rule.meta(),
                rule.trigger_type,
                rule.category,
                source,
                payload.clone(),
                result,
                now,
            );
            if self.queue_tx.send(event.clone()).is_err() {
                tracing::error!("Trigger queue closed, dropping event for {}", rule.id);
                continue;
            }
            rule.last_triggered = Some(now);
            self.queued.notify_one();
            tracing::info!("⚡ Trigger fired: {} from {source} ({})", rule.name, event.priority);
            fired.push(event);
        }

        fired
    }

    // ─── Draining ─────────────────────────────────────────────

    /// Run the actions of every queued event now. Returns how many events
    /// were processed.
    pub async fn drain_pending(&self) -> usize {
        let pending: Vec<TriggerEvent> = {
            let mut rx = self.queue_rx.lock().await;
            let mut pending = Vec::new();
            while let Ok(event) = rx.try_recv() {
                pending.push(event);
            }
            pending
        };

        let count = pending.len();
        for event in pending {
            self.dispatch(event).await;
        }
        count
    }

    async fn dispatch(&self, event: TriggerEvent) {
        let actions = {
            let rules = self.rules.lock().await;
            rules
                .iter()
                .find(|r| r.id == event.trigger_id)
                .map(|r| r.actions.clone())
        };
        let actions = actions.unwrap_or_else(|| {
            tracing::warn!("No rule {} for queued event, running no actions", event.trigger_id);
            Vec::new()
        });

        for action_id in &actions {
            let handler = self
                .handlers
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(action_id)
                .cloned();
            let Some(handler) = handler else {
                tracing::debug!("No handler registered for action {action_id}");
                continue;
            };

            let call = AssertUnwindSafe(async { handler(event.clone()).await });
            match call.catch_unwind().await {
                Ok(Ok(result)) => tracing::debug!(
                    "Action {action_id} for {}: {} ({})",
                    event.trigger_id,
                    result.status.as_str(),
                    result.message
                ),
                Ok(Err(e)) => tracing::error!("Error executing action {action_id}: {e}"),
                Err(_) => tracing::error!("Action handler {action_id} panicked"),
            }
        }

        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        if let Some(tx) = self.processed_tx.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }

    async fn next_queued(&self) -> Option<TriggerEvent> {
        self.queue_rx.lock().await.try_recv().ok()
    }

    async fn drain_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Queue drainer started");
        while !*shutdown.borrow() {
            if let Some(event) = self.next_queued().await {
                self.dispatch(event).await;
                continue;
            }
            tokio::select! {
                _ = self.queued.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        tracing::debug!("Queue drainer stopped");
    }

    async fn monitor_loop(
        self: Arc<Self>,
        source: Arc<dyn EventSource>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("👀 Monitoring {} (every {}s)", source.name(), interval.as_secs());

        while !*shutdown.borrow() {
            match source.fetch().await {
                Ok(payloads) => {
                    for payload in &payloads {
                        self.process_event(source.name(), payload).await;
                    }
                }
                Err(e) => tracing::error!("Error monitoring {}: {e}", source.name()),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        tracing::debug!("Monitor {} stopped", source.name());
    }

    // ─── Lifecycle ────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the drainer and one monitor per source. Fails when already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SalesClawError::Engine("trigger engine already running".into()));
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(tokio::spawn(Arc::clone(self).drain_loop(shutdown_rx.clone())));

        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        for monitor in monitors.iter() {
            let engine = Arc::clone(self);
            tasks.push(tokio::spawn(engine.monitor_loop(
                Arc::clone(&monitor.source),
                monitor.interval,
                shutdown_rx.clone(),
            )));
        }

        tracing::info!("🚀 Trigger engine started ({} sources)", monitors.len());
        Ok(())
    }

    /// Ask every loop to exit at its next boundary. Queued events stay queued.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(shutdown) = self.shutdown.lock().unwrap_or_else(|e| e.into_inner()).take() {
                shutdown.send_replace(true);
            }
            tracing::info!("🛑 Trigger engine stopped");
        }
    }

    /// Wait for the spawned loops to finish.
    pub async fn wait(&self) {
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Engine task ended abnormally: {e}");
            }
        }
    }

    // ─── Stats & state ────────────────────────────────────────

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn get_trigger_stats(&self) -> TriggerStats {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = TriggerStats {
            total_triggers: history.len(),
            ..Default::default()
        };

        for event in history.iter() {
            *stats
                .triggers_by_priority
                .entry(event.priority.as_str().to_string())
                .or_default() += 1;
            *stats
                .triggers_by_type
                .entry(event.trigger_type.as_str().to_string())
                .or_default() += 1;
            *stats.triggers_by_source.entry(event.source.clone()).or_default() += 1;
        }

        stats.recent_triggers = history
            .recent(self.recent_limit)
            .iter()
            .map(TriggerEvent::to_dict)
            .collect();
        stats
    }

    /// Persist the most recent processed events and every rule's cooldown
    /// and enabled flag.
    pub async fn save_state(&self, path: &Path) -> Result<()> {
        let rule_states = self
            .rules
            .lock()
            .await
            .iter()
            .map(|r| RuleState {
                id: r.id.clone(),
                last_triggered: r.last_triggered,
                enabled: r.enabled,
            })
            .collect();
        let processed_events = self
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recent(STATE_EVENT_LIMIT);

        let state = EngineState {
            saved_at: Utc::now(),
            processed_events,
            rule_states,
        };
        StateStore::new(path).save(&state)
    }

    /// Restore a snapshot written by [`save_state`](Self::save_state).
    /// Rules missing from the engine are ignored. Returns whether a
    /// snapshot existed.
    pub async fn load_state(&self, path: &Path) -> Result<bool> {
        let Some(state) = StateStore::new(path).load()? else {
            return Ok(false);
        };

        {
            let mut rules = self.rules.lock().await;
            for saved in &state.rule_states {
                if let Some(rule) = rules.iter_mut().find(|r| r.id == saved.id) {
                    rule.last_triggered = saved.last_triggered;
                    rule.enabled = saved.enabled;
                }
            }
        }

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        for event in state.processed_events {
            history.push(event);
        }
        tracing::info!(
            "♻️ Restored {} events and {} rule states from {}",
            history.len(),
            state.rule_states.len(),
            path.display()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{action_handler, handler_fn};
    use futures::future::BoxFuture;
    use crate::rule::default_rules;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use salesclaw_actions::{Action, ActionInfo, ActionResult, ActionRunner};
    use salesclaw_core::{Priority, TriggerCategory, TriggerType};
    use salesclaw_triggers::Conditions;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn engine_with(rules: Vec<TriggerRule>) -> Arc<TriggerEngine> {
        let config = EngineConfig {
            queue_poll_ms: 20,
            ..Default::default()
        };
        Arc::new(TriggerEngine::new(&config, rules))
    }

    fn buying_rule(actions: &[&str]) -> TriggerRule {
        let conditions = Conditions::Keyword {
            keywords: vec!["budget approved".into()],
            patterns: vec![],
            context_window: 50,
        };
        TriggerRule::new(
            "buying_signals",
            "Buying Signals",
            "",
            TriggerType::Keyword,
            Priority::High,
            None,
            conditions,
            actions,
        )
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> ActionHandler {
        handler_fn(move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ActionResult::success("counted", json!({})))
            }
        })
    }

    #[tokio::test]
    async fn test_cooldown_blocks_refire() {
        let engine = engine_with(vec![buying_rule(&[]).with_cooldown(60)]);
        let payload = json!({"text": "budget approved"});
        let ten = Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap();

        assert_eq!(engine.process_event_at("slack", &payload, ten).await.len(), 1);
        let half_past = ten + chrono::Duration::minutes(30);
        assert!(engine.process_event_at("slack", &payload, half_past).await.is_empty());
        let five_past_eleven = ten + chrono::Duration::minutes(65);
        assert_eq!(engine.process_event_at("slack", &payload, five_past_eleven).await.len(), 1);

        assert_eq!(engine.drain_pending().await, 2);
    }

    #[tokio::test]
    async fn test_events_carry_escalated_priority() {
        let engine = engine_with(default_rules());
        let fired = engine
            .process_event("email", &json!({"customer_id": "acme_inc", "text": "We will cancel the contract"}))
            .await;

        let ids: Vec<&str> = fired.iter().map(|e| e.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["high_value_account_mention", "churn_risk_keywords"]);
        assert_eq!(fired[1].priority, Priority::Critical);
        assert_eq!(fired[1].category, TriggerCategory::ChurnRisk);
        assert_eq!(fired[1].customer_id.as_deref(), Some("acme_inc"));
    }

    #[tokio::test]
    async fn test_stats_sum_to_total() {
        let engine = engine_with(default_rules());
        engine
            .process_event("slack", &json!({"customer_id": "techcorp", "text": "budget approved"}))
            .await;
        engine
            .process_event("metrics", &json!({"metrics": {"usage_change_percent": -60}}))
            .await;
        engine.drain_pending().await;

        let stats = engine.get_trigger_stats();
        assert_eq!(stats.total_triggers, 3);
        assert_eq!(stats.triggers_by_priority.values().sum::<usize>(), 3);
        assert_eq!(stats.triggers_by_type.values().sum::<usize>(), 3);
        assert_eq!(stats.triggers_by_source.get("slack"), Some(&2));
        assert_eq!(stats.triggers_by_priority.get("critical"), Some(&1));
        assert_eq!(stats.recent_triggers.len(), 3);
        assert_eq!(stats.recent_triggers[2]["trigger_id"], "usage_drop");
    }

    struct Exploding {
        info: ActionInfo,
    }

    #[async_trait]
    impl Action for Exploding {
        fn info(&self) -> &ActionInfo {
            &self.info
        }

        async fn execute_impl(&self, _event: &TriggerEvent) -> salesclaw_core::Result<ActionResult> {
            Err(SalesClawError::Action("crm down".into()))
        }
    }

    #[tokio::test]
    async fn test_drainer_survives_failing_handlers() {
        let engine = engine_with(vec![buying_rule(&["fails", "panics", "failing_action", "missing", "counts"])]);
        let counter = Arc::new(AtomicUsize::new(0));

        engine.register_action_handler(
            "fails",
            handler_fn(|_event| async { Err(SalesClawError::Action("nope".into())) }),
        );
        engine.register_action_handler(
            "panics",
            Arc::new(|_event: TriggerEvent| -> BoxFuture<'static, salesclaw_core::Result<ActionResult>> {
                panic!("handler bug")
            }),
        );
        let runner = Arc::new(ActionRunner::new(Exploding {
            info: ActionInfo::new("failing_action", "Failing", ""),
        }));
        engine.register_action_handler("failing_action", action_handler(runner.clone()));
        engine.register_action_handler("counts", counting_handler(counter.clone()));

        engine.process_event("slack", &json!({"text": "budget approved"})).await;
        engine.process_event("slack", &json!({"text": "budget approved again"})).await;
        assert_eq!(engine.drain_pending().await, 2);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(runner.stats().failure_count, 2);
        assert_eq!(engine.history_len(), 2);
    }

    #[tokio::test]
    async fn test_running_engine_drains_monitored_source() {
        let engine = engine_with(vec![buying_rule(&["counts"])]);
        let counter = Arc::new(AtomicUsize::new(0));
        engine.register_action_handler("counts", counting_handler(counter.clone()));

        let source = Arc::new(MemorySource::new("slack"));
        source.push(json!({"text": "budget approved"}));
        engine.add_source(source.clone(), Duration::from_millis(10));
        let mut processed = engine.subscribe();

        engine.start().unwrap();
        assert!(engine.start().is_err());

        let event = tokio::time::timeout(Duration::from_secs(5), processed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.trigger_id, "buying_signals");
        assert_eq!(event.source, "slack");

        engine.stop();
        engine.wait().await;
        assert!(!engine.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Counts fetches. The first fetch fails, the second yields one
    /// buying-signal payload, later ones are empty.
    struct FlakySource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl EventSource for FlakySource {
        fn name(&self) -> &str {
            "crm"
        }

        async fn fetch(&self) -> salesclaw_core::Result<Vec<Value>> {
            match self.fetches.fetch_add(1, Ordering::SeqCst) {
                0 => Err(SalesClawError::Source("feed unavailable".into())),
                1 => Ok(vec![json!({"text": "budget approved"})]),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn test_monitor_survives_fetch_error() {
        let engine = engine_with(vec![buying_rule(&[])]);
        let source = Arc::new(FlakySource {
            fetches: AtomicUsize::new(0),
        });
        engine.add_source(source.clone(), Duration::from_millis(10));
        let mut processed = engine.subscribe();

        engine.start().unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), processed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.source, "crm");
        assert!(source.fetches.load(Ordering::SeqCst) >= 2);

        engine.stop();
        engine.wait().await;
    }

    #[tokio::test]
    async fn test_restart_before_wait_runs_one_set_of_loops() {
        let engine = engine_with(vec![]);
        let source = Arc::new(FlakySource {
            fetches: AtomicUsize::new(2),
        });
        engine.add_source(source.clone(), Duration::from_millis(100));

        engine.start().unwrap();
        engine.stop();
        engine.start().unwrap();
        assert!(engine.is_running());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let fetches = source.fetches.load(Ordering::SeqCst) - 2;
        assert!(fetches >= 1);
        assert!(fetches <= 13, "{fetches} fetches in 1s at a 100ms interval");

        engine.stop();
        tokio::time::timeout(Duration::from_secs(5), engine.wait()).await.unwrap();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_drainer_wakes_on_enqueue_and_shares_the_queue() {
        let config = EngineConfig {
            queue_poll_ms: 60_000,
            ..Default::default()
        };
        let engine = Arc::new(TriggerEngine::new(&config, vec![buying_rule(&[])]));
        let mut processed = engine.subscribe();
        engine.start().unwrap();
        tokio::task::yield_now().await;

        engine.process_event("slack", &json!({"text": "budget approved"})).await;
        let event = tokio::time::timeout(Duration::from_secs(5), processed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.trigger_id, "buying_signals");

        let drained = tokio::time::timeout(Duration::from_millis(500), engine.drain_pending()).await;
        assert_eq!(drained.unwrap(), 0);

        engine.stop();
        tokio::time::timeout(Duration::from_secs(5), engine.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_events_ends_subscriptions() {
        let engine = engine_with(vec![buying_rule(&[])]);
        let mut processed = engine.subscribe();

        engine.process_event("slack", &json!({"text": "budget approved"})).await;
        engine.drain_pending().await;
        engine.close_events();

        assert_eq!(processed.recv().await.unwrap().trigger_id, "buying_signals");
        assert!(matches!(
            processed.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(matches!(
            engine.subscribe().recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = EngineConfig {
            history_max: 4,
            history_retain: 2,
            ..Default::default()
        };
        let engine = Arc::new(TriggerEngine::new(&config, vec![buying_rule(&[])]));
        for _ in 0..5 {
            engine.process_event("slack", &json!({"text": "budget approved"})).await;
        }
        engine.drain_pending().await;
        assert_eq!(engine.history_len(), 2);
    }

    #[tokio::test]
    async fn test_state_round_trip_keeps_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_state.json");
        let payload = json!({"metrics": {"usage_change_percent": -30}});

        let first = engine_with(default_rules());
        assert_eq!(first.process_event("metrics", &payload).await.len(), 1);
        first.drain_pending().await;
        assert!(first.set_rule_enabled("buying_signals", false).await);
        first.save_state(&path).await.unwrap();

        let restarted = engine_with(default_rules());
        assert!(restarted.load_state(&path).await.unwrap());
        assert_eq!(restarted.history_len(), 1);
        assert!(restarted.process_event("metrics", &payload).await.is_empty());

        let rules = restarted.rules().await;
        let buying = rules.iter().find(|r| r.id == "buying_signals").unwrap();
        assert!(!buying.enabled);

        let fresh = engine_with(default_rules());
        assert!(!fresh.load_state(&dir.path().join("absent.json")).await.unwrap());
    }
}
