//! Event sources polled by the engine's monitors.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use salesclaw_core::{Result, SalesClawError};
use serde_json::Value;

/// A named producer of JSON payloads ("slack", "email", "metrics", ...).
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Items that arrived since the previous fetch.
    async fn fetch(&self) -> Result<Vec<Value>>;
}

/// Queue fed in-process, drained on every fetch.
pub struct MemorySource {
    name: String,
    queue: Mutex<VecDeque<Value>>,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, payload: Value) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(payload);
    }
}

#[async_trait]
impl EventSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Value>> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queue.drain(..).collect())
    }
}

/// Tails a JSON-lines file written by an integration, one payload per line.
/// Only complete lines are consumed; a partially written last line is read
/// on the next fetch.
pub struct JsonlFileSource {
    name: String,
    path: PathBuf,
    offset: tokio::sync::Mutex<usize>,
}

impl JsonlFileSource {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            offset: tokio::sync::Mutex::new(0),
        }
    }
}

#[async_trait]
impl EventSource for JsonlFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SalesClawError::Source(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };

        let mut offset = self.offset.lock().await;
        if bytes.len() < *offset {
            tracing::warn!("{} was truncated, reading from the start", self.path.display());
            *offset = 0;
        }

        let unread = &bytes[*offset..];
        let Some(last_newline) = unread.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &unread[..=last_newline];
        *offset += complete.len();

        let mut payloads = Vec::new();
        for line in String::from_utf8_lossy(complete).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(payload) => payloads.push(payload),
                Err(e) => tracing::warn!("⚠️ Skipping malformed line in {}: {e}", self.name),
            }
        }
        Ok(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_source_drains() {
        let source = MemorySource::new("slack");
        source.push(json!({"text": "hello"}));
        source.push(json!({"text": "world"}));

        assert_eq!(source.fetch().await.unwrap().len(), 2);
        assert!(source.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_source_tails_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email.jsonl");
        let source = JsonlFileSource::new("email", &path);

        assert!(source.fetch().await.unwrap().is_empty());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"text": "first"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        write!(file, r#"{{"text": "partial"#).unwrap();
        file.flush().unwrap();

        let first = source.fetch().await.unwrap();
        assert_eq!(first, vec![json!({"text": "first"})]);

        writeln!(file, r#"", "customer_id": "acme_inc"}}"#).unwrap();
        file.flush().unwrap();

        let second = source.fetch().await.unwrap();
        assert_eq!(second, vec![json!({"text": "partial", "customer_id": "acme_inc"})]);
        assert!(source.fetch().await.unwrap().is_empty());
    }
}
