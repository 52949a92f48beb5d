//! Per-document processing timeline and workflow status.
//!
//! Handlers append a start entry and then exactly one success or failure entry for every
//! pipeline run that carries a document id. Entries are never edited. Each document keeps
//! at most [`MAX_ENTRIES_PER_EDITAL`] entries; older ones are dropped first. The number of
//! documents is not capped and lives as long as the process.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    AiProcessing,
    ProductMatching,
    FullPipeline,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::AiProcessing => "AI_PROCESSING",
            Stage::ProductMatching => "PRODUCT_MATCHING",
            Stage::FullPipeline => "FULL_PIPELINE",
        }
    }

    /// Wording used in log messages.
    pub fn describe(self) -> &'static str {
        match self {
            Stage::AiProcessing => "AI processing",
            Stage::ProductMatching => "product matching",
            Stage::FullPipeline => "full pipeline (extraction + matching)",
        }
    }
}

/// Workflow position of a document, advanced by successful pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditalStatus {
    Processing,
    RequirementsExtracted,
    ProductSelected,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditalRecord {
    pub id: String,
    pub status: EditalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_product_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub const MAX_ENTRIES_PER_EDITAL: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingLogEntry {
    pub id: Uuid,
    pub edital_id: String,
    pub stage: Stage,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Sink for processing log entries, keyed by document id.
pub trait LogWriter: Send + Sync {
    fn record(&self, edital_id: &str, stage: Stage, message: String);

    /// Entries for one document, oldest first.
    fn timeline(&self, edital_id: &str) -> Vec<ProcessingLogEntry>;

    /// Move the document to `status`. A `None` product keeps the one already selected.
    fn set_status(&self, edital_id: &str, status: EditalStatus, best_product_id: Option<String>);

    fn status(&self, edital_id: &str) -> Option<EditalRecord>;
}

pub struct ProcessingLog {
    entries: DashMap<String, Vec<ProcessingLogEntry>>,
    records: DashMap<String, EditalRecord>,
    max_entries: usize,
}

impl Default for ProcessingLog {
    fn default() -> Self {
        Self::with_limit(MAX_ENTRIES_PER_EDITAL)
    }
}

impl ProcessingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            records: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }
}

impl LogWriter for ProcessingLog {
    fn record(&self, edital_id: &str, stage: Stage, message: String) {
        tracing::debug!(edital_id, stage = stage.as_str(), %message, "Processing log entry");
        let entry = ProcessingLogEntry {
            id: Uuid::new_v4(),
            edital_id: edital_id.to_string(),
            stage,
            message,
            timestamp: Utc::now(),
        };
        let mut entries = self.entries.entry(edital_id.to_string()).or_default();
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }
    }

    fn timeline(&self, edital_id: &str) -> Vec<ProcessingLogEntry> {
        self.entries
            .get(edital_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn set_status(&self, edital_id: &str, status: EditalStatus, best_product_id: Option<String>) {
        tracing::info!(edital_id, ?status, best_product = ?best_product_id, "Edital status updated");
        let now = Utc::now();
        self.records
            .entry(edital_id.to_string())
            .and_modify(|record| {
                record.status = status;
                if best_product_id.is_some() {
                    record.best_product_id = best_product_id.clone();
                }
                record.updated_at = now;
            })
            .or_insert_with(|| EditalRecord {
                id: edital_id.to_string(),
                status,
                best_product_id: best_product_id.clone(),
                updated_at: now,
            });
    }

    fn status(&self, edital_id: &str) -> Option<EditalRecord> {
        self.records.get(edital_id).map(|record| record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_kept_per_document_in_order() {
        let log = ProcessingLog::new();
        log.record("ed-1", Stage::FullPipeline, "start".into());
        log.record("ed-2", Stage::AiProcessing, "other".into());
        log.record("ed-1", Stage::FullPipeline, "done".into());

        let timeline = log.timeline("ed-1");
        let messages: Vec<&str> = timeline.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["start", "done"]);
        assert!(timeline[0].timestamp <= timeline[1].timestamp);
        assert_ne!(timeline[0].id, timeline[1].id);
        assert!(log.timeline("unknown").is_empty());
    }

    #[test]
    fn oldest_entries_are_dropped_past_the_limit() {
        let log = ProcessingLog::with_limit(3);
        for i in 0..5 {
            log.record("ed-1", Stage::AiProcessing, format!("run {i}"));
        }
        let messages: Vec<String> = log.timeline("ed-1").into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["run 2", "run 3", "run 4"]);
    }

    #[test]
    fn status_keeps_the_selected_product_until_replaced() {
        let log = ProcessingLog::new();
        assert!(log.status("ed-1").is_none());

        log.set_status("ed-1", EditalStatus::ProductSelected, Some("p1".into()));
        log.set_status("ed-1", EditalStatus::RequirementsExtracted, None);
        let record = log.status("ed-1").unwrap();
        assert_eq!(record.status, EditalStatus::RequirementsExtracted);
        assert_eq!(record.best_product_id.as_deref(), Some("p1"));

        log.set_status("ed-1", EditalStatus::ProductSelected, Some("p2".into()));
        assert_eq!(log.status("ed-1").unwrap().best_product_id.as_deref(), Some("p2"));
        assert_eq!(
            serde_json::to_value(EditalStatus::RequirementsExtracted).unwrap(),
            "REQUIREMENTS_EXTRACTED"
        );
    }

    #[test]
    fn stage_serializes_as_constant_name() {
        let json = serde_json::to_value(Stage::ProductMatching).unwrap();
        assert_eq!(json, "PRODUCT_MATCHING");
        assert_eq!(Stage::ProductMatching.as_str(), "PRODUCT_MATCHING");
    }
}
