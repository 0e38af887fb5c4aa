//! Usage-record sinks.
//!
//! Every terminal request outcome produces one [`UsageRecord`], handed to a
//! [`UsageSink`] fire-and-forget: `emit` never blocks the request path and
//! never fails it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use tg_domain::usage::{Outcome, UsageRecord};

pub trait UsageSink: Send + Sync {
    fn emit(&self, record: &UsageRecord);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TracingSink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Emits each record as a structured `tracing` event on target
/// `tollgate::usage`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl UsageSink for TracingSink {
    fn emit(&self, r: &UsageRecord) {
        tracing::info!(
            target: "tollgate::usage",
            request_id = %r.request_id,
            service = %r.service,
            agent_id = %r.agent_id,
            model = r.model.as_deref().unwrap_or(""),
            tokens = r.tokens,
            input_tokens = r.input_tokens,
            output_tokens = r.output_tokens,
            cost = r.cost,
            duration_ms = r.duration_ms,
            queue_time_ms = r.queue_time_ms,
            outcome = %r.outcome,
            timestamp = %r.timestamp.to_rfc3339(),
            "usage"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JsonlSink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Appends one JSON line per record to a file from a background task.
pub struct JsonlSink {
    tx: mpsc::UnboundedSender<String>,
    path: PathBuf,
}

impl JsonlSink {
    /// Open (or create) `path` for appending and start the writer task.
    ///
    /// The task exits once every clone of the sink has been dropped.
    pub async fn spawn(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let task_path = path.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let write = async {
                    file.write_all(line.as_bytes()).await?;
                    file.write_all(b"\n").await?;
                    file.flush().await
                };
                if let Err(e) = write.await {
                    tracing::warn!(path = %task_path.display(), error = %e, "usage log write failed");
                }
            }
        });

        tracing::info!(path = %path.display(), "usage log opened");
        Ok(Self { tx, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageSink for JsonlSink {
    fn emit(&self, record: &UsageRecord) {
        match serde_json::to_string(record) {
            Ok(line) => {
                if self.tx.send(line).is_err() {
                    tracing::warn!("usage log writer has stopped; record dropped");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize usage record"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemorySink / FanoutSink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keeps records in memory. Used by tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.records.lock().iter().map(|r| r.outcome).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl UsageSink for MemorySink {
    fn emit(&self, record: &UsageRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Sends every record to each inner sink in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn UsageSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn UsageSink>>) -> Self {
        Self { sinks }
    }
}

impl UsageSink for FanoutSink {
    fn emit(&self, record: &UsageRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn record(outcome: Outcome) -> UsageRecord {
        UsageRecord {
            request_id: Uuid::new_v4(),
            service: "openai".into(),
            agent_id: "alpha".into(),
            model: Some("gpt-4o-mini".into()),
            tokens: 120,
            input_tokens: 100,
            output_tokens: 20,
            cost: 0.0012,
            duration_ms: 450,
            queue_time_ms: 0,
            outcome,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone(), Arc::new(TracingSink)]);
        fanout.emit(&record(Outcome::Success));
        fanout.emit(&record(Outcome::TimedOut));
        assert_eq!(a.outcomes(), vec![Outcome::Success, Outcome::TimedOut]);
        assert_eq!(b.len(), 2);
    }

    #[tokio::test]
    async fn jsonl_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("usage.jsonl");
        let sink = JsonlSink::spawn(&path).await.unwrap();

        let first = record(Outcome::Success);
        sink.emit(&first);
        sink.emit(&record(Outcome::QuotaExceeded));

        // The writer is asynchronous; poll until both lines land.
        let mut contents = String::new();
        for _ in 0..100 {
            contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if contents.lines().count() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: UsageRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.request_id, first.request_id);
        assert!(lines[1].contains("\"outcome\":\"quota_exceeded\""));
    }
}
