//! Per-customer trigger journal feeding account reports.
//!
//! Processed events that name a customer are kept in SQLite and folded into
//! a [`TriggerSummary`] on demand: counts, recent activity, trend and risk.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use salesclaw_core::{Priority, Result, SalesClawError, TriggerCategory};
use salesclaw_triggers::TriggerEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        }
    }
}

/// One journaled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub event_id: String,
    pub trigger_id: String,
    pub trigger_name: String,
    pub category: TriggerCategory,
    pub priority: Priority,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub matched_conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTrigger {
    pub trigger_name: String,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    /// First two matched conditions.
    pub summary: String,
}

/// Trigger activity of one customer over a timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSummary {
    pub total_triggers: usize,
    pub critical_alerts: usize,
    pub buying_signals: usize,
    pub churn_risks: usize,
    pub competitive_mentions: usize,
    pub security_inquiries: usize,
    pub recent_triggers: Vec<RecentTrigger>,
    pub trigger_trends: String,
    pub risk_assessment: RiskLevel,
    pub opportunity_signals: Vec<JournalEntry>,
    pub risk_indicators: Vec<JournalEntry>,
    pub engagement_score: u32,
}

impl TriggerSummary {
    fn empty() -> Self {
        Self {
            total_triggers: 0,
            critical_alerts: 0,
            buying_signals: 0,
            churn_risks: 0,
            competitive_mentions: 0,
            security_inquiries: 0,
            recent_triggers: Vec::new(),
            trigger_trends: "No trigger activity".into(),
            risk_assessment: RiskLevel::Low,
            opportunity_signals: Vec::new(),
            risk_indicators: Vec::new(),
            engagement_score: ENGAGEMENT_BASELINE,
        }
    }

    /// Fold chronologically ordered entries.
    fn from_entries(entries: &[JournalEntry]) -> Self {
        if entries.is_empty() {
            return Self::empty();
        }

        let mut summary = Self::empty();
        summary.total_triggers = entries.len();

        for entry in entries {
            if entry.priority == Priority::Critical {
                summary.critical_alerts += 1;
            }
            match entry.category {
                TriggerCategory::BuyingSignal => {
                    summary.buying_signals += 1;
                    summary.engagement_score = (summary.engagement_score + 10).min(100);
                    if summary.opportunity_signals.len() < SIGNAL_LIMIT {
                        summary.opportunity_signals.push(entry.clone());
                    }
                }
                TriggerCategory::ChurnRisk => {
                    summary.churn_risks += 1;
                    summary.engagement_score = summary.engagement_score.saturating_sub(20);
                    if summary.risk_indicators.len() < SIGNAL_LIMIT {
                        summary.risk_indicators.push(entry.clone());
                    }
                }
                TriggerCategory::Competitive => summary.competitive_mentions += 1,
                TriggerCategory::Security => summary.security_inquiries += 1,
                _ => {}
            }
        }

        summary.recent_triggers = entries
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .map(|e| RecentTrigger {
                trigger_name: e.trigger_name.clone(),
                timestamp: e.timestamp,
                priority: e.priority,
                summary: e
                    .matched_conditions
                    .iter()
                    .take(2)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        summary.risk_assessment = assess_risk(&summary);
        summary.trigger_trends = describe_trend(entries).into();
        summary
    }
}

const ENGAGEMENT_BASELINE: u32 = 50;
const SIGNAL_LIMIT: usize = 3;
const RECENT_LIMIT: usize = 5;

fn assess_risk(summary: &TriggerSummary) -> RiskLevel {
    if summary.churn_risks > 2 || summary.critical_alerts > 3 {
        RiskLevel::High
    } else if summary.churn_risks > 0 || summary.critical_alerts > 1 {
        RiskLevel::Medium
    } else if summary.buying_signals > summary.churn_risks {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

/// Compare the older half of the entries with the newer half.
fn describe_trend(entries: &[JournalEntry]) -> &'static str {
    if entries.len() < 2 {
        return "Insufficient data for trend analysis";
    }
    let (early, recent) = entries.split_at(entries.len() / 2);
    let count = |half: &[JournalEntry], category| half.iter().filter(|e| e.category == category).count();

    if count(recent, TriggerCategory::ChurnRisk) > count(early, TriggerCategory::ChurnRisk) {
        "Increasing risk signals - requires attention"
    } else if count(recent, TriggerCategory::BuyingSignal) > count(early, TriggerCategory::BuyingSignal) {
        "Positive momentum - growing buying interest"
    } else if recent.len() < early.len() {
        "Decreasing activity - may need engagement"
    } else {
        "Stable activity levels"
    }
}

fn store_err(e: rusqlite::Error) -> SalesClawError {
    SalesClawError::Store(e.to_string())
}

fn timestamp_key(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed journal of processed trigger events.
pub struct TriggerJournal {
    conn: Mutex<Connection>,
}

impl TriggerJournal {
    /// Open or create the journal database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path).map_err(store_err)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(store_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS trigger_events (
                event_id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                trigger_id TEXT NOT NULL,
                trigger_name TEXT NOT NULL,
                category TEXT NOT NULL,
                priority TEXT NOT NULL,
                source TEXT NOT NULL,
                timestamp TEXT NOT NULL,           -- RFC 3339, UTC, microseconds
                matched_conditions TEXT NOT NULL   -- JSON array
            );

            CREATE INDEX IF NOT EXISTS idx_trigger_events_customer
                ON trigger_events (customer_id, timestamp);
            ",
        )
        .map_err(store_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Store an event. Events without a customer are not journaled and
    /// return `false`.
    pub fn record(&self, event: &TriggerEvent) -> Result<bool> {
        let Some(customer_id) = event.customer_id.as_deref() else {
            return Ok(false);
        };
        let matched = serde_json::to_string(&event.result.matched_conditions)?;

        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR IGNORE INTO trigger_events
                (event_id, customer_id, trigger_id, trigger_name, category, priority, source, timestamp, matched_conditions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.event_id.to_string(),
                customer_id,
                event.trigger_id,
                event.display_name(),
                event.category.as_str(),
                event.priority.as_str(),
                event.source,
                timestamp_key(&event.timestamp),
                matched,
            ],
        )
        .map_err(store_err)?;
        Ok(true)
    }

    /// Entries for a customer newer than `since`, oldest first.
    pub fn entries_since(&self, customer_id: &str, since: DateTime<Utc>) -> Result<Vec<JournalEntry>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT event_id, trigger_id, trigger_name, category, priority, source, timestamp, matched_conditions
                 FROM trigger_events
                 WHERE customer_id = ?1 AND timestamp > ?2
                 ORDER BY timestamp ASC",
            )
            .map_err(store_err)?;

        let rows = stmt
            .query_map(params![customer_id, timestamp_key(&since)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(store_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let (event_id, trigger_id, trigger_name, category, priority, source, timestamp, matched) =
                row.map_err(store_err)?;
            let timestamp = match DateTime::parse_from_rfc3339(&timestamp) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!("Skipping journal row {event_id}: bad timestamp ({e})");
                    continue;
                }
            };
            entries.push(JournalEntry {
                event_id,
                trigger_id,
                trigger_name,
                category: serde_json::from_value(Value::String(category)).unwrap_or(TriggerCategory::General),
                priority: priority.parse().unwrap_or(Priority::Medium),
                source,
                timestamp,
                matched_conditions: serde_json::from_str(&matched).unwrap_or_default(),
            });
        }
        Ok(entries)
    }

    /// Summary of a customer's triggers in the `timeframe_days` before `now`.
    pub fn customer_summary(&self, customer_id: &str, timeframe_days: i64, now: DateTime<Utc>) -> Result<TriggerSummary> {
        let entries = self.entries_since(customer_id, now - Duration::days(timeframe_days))?;
        Ok(TriggerSummary::from_entries(&entries))
    }

    /// Journal every event the receiver yields until its sender is gone.
    /// SQLite writes run on the blocking pool.
    pub fn spawn_recorder(self: Arc<Self>, mut events: broadcast::Receiver<TriggerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let journal = Arc::clone(&self);
                        let event_id = event.event_id;
                        match tokio::task::spawn_blocking(move || journal.record(&event)).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::error!("Failed to journal {event_id}: {e}"),
                            Err(e) => tracing::error!("Journal write for {event_id} aborted: {e}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("⚠️ Journal fell behind, {missed} events not recorded");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
