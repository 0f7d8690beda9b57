use crate::error::{AppError, AppResult};
use crate::models::ActivityEntry;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Consumer of committed activity entries
#[async_trait]
pub trait ActivitySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, entry: &ActivityEntry) -> AppResult<()>;
}

/// Append-only JSON-lines audit log, one file per day
pub struct AuditTrailService {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    /// Create a new audit trail service
    pub fn new(log_directory: impl AsRef<Path>) -> AppResult<Self> {
        let log_directory = log_directory.as_ref();
        std::fs::create_dir_all(log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("activity_{}.jsonl", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Append one entry
    pub async fn log(&self, entry: &ActivityEntry) -> AppResult<()> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl ActivitySink for AuditTrailService {
    fn name(&self) -> &'static str {
        "audit_trail"
    }

    async fn publish(&self, entry: &ActivityEntry) -> AppResult<()> {
        self.log(entry).await
    }
}

/// Fan-out of committed activity to every registered sink.
///
/// Entries are already durable in the store when published here, so a
/// failing sink is logged and skipped.
#[derive(Clone, Default)]
pub struct ActivityFeed {
    sinks: Vec<Arc<dyn ActivitySink>>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub async fn publish_all(&self, entries: &[ActivityEntry]) {
        for entry in entries {
            for sink in &self.sinks {
                if let Err(e) = sink.publish(entry).await {
                    warn!(
                        "Activity sink {} failed for {} on bet {}: {}",
                        sink.name(),
                        entry.kind.as_str(),
                        entry.bet_id,
                        e
                    );
                }
            }
        }
    }
}
