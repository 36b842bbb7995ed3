//! # SalesClaw Triggers
//!
//! Stateless evaluators that decide whether an inbound event payload
//! satisfies a named condition.
//!
//! ```text
//! payload (JSON map)
//!   → Trigger::evaluate(&payload) → TriggerResult
//!       keyword   : substring + regex over `text` / `subject`
//!       customer  : watch-lists, account health, stakeholders
//!       metric    : threshold on `metrics.<name>` + trend over `<name>_history`
//! ```
//!
//! Rules describe their condition set with [`Conditions`], which compiles
//! into one of the evaluators here, so rule matching and trigger matching
//! share a single implementation.

pub mod base;
pub mod conditions;
pub mod customer;
pub mod event;
pub mod keyword;
pub mod metric;

pub use base::{Condition, Trigger, TriggerExt, TriggerMeta, TriggerResult, calculate_confidence};
pub use conditions::Conditions;
pub use customer::{AccountHealthTrigger, CustomerTrigger, NewStakeholderTrigger};
pub use event::TriggerEvent;
pub use keyword::{
    BuyingSignalTrigger, ChurnRiskTrigger, CompetitiveTrigger, KeywordTrigger,
    SecurityComplianceTrigger,
};
pub use metric::{
    EngagementScoreTrigger, MetricTrigger, PerformanceIssueTrigger, RevenueAtRiskTrigger,
    SupportTicketVolumeTrigger, UsageDropTrigger,
};
