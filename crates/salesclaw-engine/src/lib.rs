//! # SalesClaw Engine
//!
//! Runs trigger rules against inbound payloads and dispatches their actions.
//!
//! ## Architecture
//! ```text
//! EventSource (memory, JSON-lines file)
//!   └── monitor task (one per source, own interval)
//!         → TriggerEngine::process_event(source, payload)
//!             → for each TriggerRule: enabled? cooldown? evaluator fires?
//!             → TriggerEvent → queue, last_triggered = now
//! drainer task
//!   → pop TriggerEvent → handlers for each rule action id
//!   → bounded history → get_trigger_stats()
//!   → broadcast → TriggerJournal (per-customer reporting summary)
//! ```

pub mod engine;
pub mod handlers;
pub mod history;
pub mod journal;
pub mod rule;
pub mod source;
pub mod store;

pub use engine::{TriggerEngine, TriggerStats};
pub use handlers::{ActionHandler, ActionSuite, action_handler, composite_handler, handler_fn};
pub use history::EventHistory;
pub use journal::{RiskLevel, TriggerJournal, TriggerSummary};
pub use rule::{TriggerRule, default_rules, load_rules};
pub use source::{EventSource, JsonlFileSource, MemorySource};
pub use store::{EngineState, RuleState, StateStore};
