//! The record created when a rule fires.

use chrono::{DateTime, Utc};
use salesclaw_core::payload::{opt_string, str_field};
use salesclaw_core::{Priority, TriggerCategory, TriggerType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::base::{TriggerMeta, TriggerResult};

/// One firing of one rule against one payload. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_id: String,
    pub trigger_type: TriggerType,
    pub category: TriggerCategory,
    /// The rule's priority, or the evaluator's escalation of it.
    pub priority: Priority,
    /// Integration that produced the payload ("slack", "email", "metrics", ...).
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub customer_id: Option<String>,
    pub person_id: Option<String>,
    /// Human-readable rule name.
    pub matched_pattern: Option<String>,
    #[serde(default)]
    pub result: TriggerResult,
}

impl TriggerEvent {
    pub fn new(
        meta: &TriggerMeta,
        trigger_type: TriggerType,
        category: TriggerCategory,
        source: impl Into<String>,
        data: Value,
        result: TriggerResult,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_id: meta.id.clone(),
            trigger_type,
            category,
            priority: result.priority_or(meta.priority),
            source: source.into(),
            timestamp,
            customer_id: opt_string(&data, "customer_id"),
            person_id: opt_string(&data, "person_id"),
            matched_pattern: Some(meta.name.clone()),
            data,
            result,
        }
    }

    /// Plain-data form for storage and stats.
    pub fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rule name, falling back to the trigger id.
    pub fn display_name(&self) -> &str {
        self.matched_pattern.as_deref().unwrap_or(&self.trigger_id)
    }

    pub fn customer_or_unknown(&self) -> &str {
        self.customer_id.as_deref().unwrap_or("Unknown")
    }

    /// Payload `text`, or `""`.
    pub fn text(&self) -> &str {
        str_field(&self.data, "text")
    }
}
