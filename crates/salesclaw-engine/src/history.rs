//! Bounded history of processed trigger events.

use std::collections::VecDeque;

use salesclaw_triggers::TriggerEvent;

/// Ring of processed events. Once it grows past `max` entries the oldest
/// are dropped so only the `retain` most recent remain.
#[derive(Debug)]
pub struct EventHistory {
    events: VecDeque<TriggerEvent>,
    max: usize,
    retain: usize,
}

impl EventHistory {
    pub fn new(max: usize, retain: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max: max.max(1),
            retain: retain.min(max).max(1),
        }
    }

    pub fn push(&mut self, event: TriggerEvent) {
        self.events.push_back(event);
        if self.events.len() > self.max {
            let excess = self.events.len() - self.retain;
            self.events.drain(..excess);
            tracing::debug!("History trimmed to {} events", self.events.len());
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TriggerEvent> {
        self.events.iter()
    }

    /// The `n` most recent events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TriggerEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(10_000, 5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use salesclaw_core::{Priority, TriggerCategory, TriggerType};
    use salesclaw_triggers::{TriggerMeta, TriggerResult};
    use serde_json::json;

    fn event(n: usize) -> TriggerEvent {
        let meta = TriggerMeta::new(&format!("rule_{n}"), "Rule", "", Priority::Low);
        TriggerEvent::new(
            &meta,
            TriggerType::Keyword,
            TriggerCategory::General,
            "test",
            json!({}),
            TriggerResult::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let mut history = EventHistory::new(10, 5);
        for n in 0..10 {
            history.push(event(n));
        }
        assert_eq!(history.len(), 10);

        history.push(event(10));
        assert_eq!(history.len(), 5);
        let ids: Vec<&str> = history.iter().map(|e| e.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["rule_6", "rule_7", "rule_8", "rule_9", "rule_10"]);
    }

    #[test]
    fn test_recent() {
        let mut history = EventHistory::default();
        for n in 0..3 {
            history.push(event(n));
        }
        let recent = history.recent(2);
        assert_eq!(recent[0].trigger_id, "rule_1");
        assert_eq!(recent[1].trigger_id, "rule_2");
        assert_eq!(history.recent(10).len(), 3);
    }
}
