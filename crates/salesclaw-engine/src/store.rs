//! File-based engine state: recent processed events and per-rule
//! cooldown / enabled flags, so a restart does not re-fire cooled-down rules.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use salesclaw_core::Result;
use salesclaw_triggers::TriggerEvent;
use serde::{Deserialize, Serialize};

/// Events kept in a state snapshot.
pub const STATE_EVENT_LIMIT: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleState {
    pub id: String,
    pub last_triggered: Option<DateTime<Utc>>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_events: Vec<TriggerEvent>,
    #[serde(default)]
    pub rule_states: Vec<RuleState>,
}

/// JSON snapshot on disk.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &EngineState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(
            "💾 Saved {} events and {} rule states to {}",
            state.processed_events.len(),
            state.rule_states.len(),
            self.path.display()
        );
        Ok(())
    }

    /// `None` when no snapshot has been written yet.
    pub fn load(&self) -> Result<Option<EngineState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));
        let state = EngineState {
            saved_at: Utc::now(),
            processed_events: Vec::new(),
            rule_states: vec![RuleState {
                id: "usage_drop".into(),
                last_triggered: Some(Utc::now()),
                enabled: false,
            }],
        };

        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }
}
