//! Record of what has already been pushed to the retrieval store.
//!
//! Re-ingesting the same tab or file within a short window is wasted work,
//! so each ingestion is logged under a stable id. An entry only counts as
//! fresh when the recorded name still matches: a tab whose page changed gets
//! ingested again even inside the window.

use crate::store::KvStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Tabs,
    Files,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Tabs => write!(f, "tabs"),
            SourceKind::Files => write!(f, "files"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IngestionRecord {
    name: String,
    timestamp_ms: i64,
}

pub struct IngestionLog {
    store: Arc<dyn KvStore>,
    window_ms: i64,
}

impl IngestionLog {
    pub fn new(store: Arc<dyn KvStore>, window_ms: i64) -> Self {
        Self { store, window_ms }
    }

    fn key(kind: SourceKind, id: &str) -> String {
        format!("ingest-{kind}-{id}")
    }

    /// Was `id` ingested under the same `name` within the freshness window?
    pub fn is_fresh(&self, kind: SourceKind, id: &str, name: &str) -> bool {
        let Some(raw) = self.store.get(&Self::key(kind, id)) else {
            return false;
        };
        let Ok(record) = serde_json::from_str::<IngestionRecord>(&raw) else {
            return false;
        };
        record.name == name && now_ms() - record.timestamp_ms < self.window_ms
    }

    pub fn mark(&self, kind: SourceKind, id: &str, name: &str) -> Result<()> {
        let record = IngestionRecord {
            name: name.to_string(),
            timestamp_ms: now_ms(),
        };
        let raw = serde_json::to_string(&record).context("failed to serialize ingestion record")?;
        self.store.set(&Self::key(kind, id), &raw)?;
        debug!(%kind, id, name, "ingestion recorded");
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn log() -> (IngestionLog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (IngestionLog::new(store.clone(), DAY_MS), store)
    }

    #[test]
    fn unmarked_entries_are_not_fresh() {
        let (log, _) = log();
        assert!(!log.is_fresh(SourceKind::Tabs, "42", "Docs - Home"));
    }

    #[test]
    fn marked_entries_are_fresh_within_the_window() {
        let (log, _) = log();
        log.mark(SourceKind::Tabs, "42", "Docs - Home").unwrap();
        assert!(log.is_fresh(SourceKind::Tabs, "42", "Docs - Home"));
        // Same id, different kind: independent record.
        assert!(!log.is_fresh(SourceKind::Files, "42", "Docs - Home"));
    }

    #[test]
    fn name_change_invalidates_freshness() {
        let (log, _) = log();
        log.mark(SourceKind::Tabs, "42", "Docs - Home").unwrap();
        assert!(!log.is_fresh(SourceKind::Tabs, "42", "Docs - Pricing"));
    }

    #[test]
    fn entries_expire_after_the_window() {
        let (log, store) = log();
        let stale = IngestionRecord {
            name: "report.pdf".into(),
            timestamp_ms: now_ms() - DAY_MS - 1000,
        };
        store
            .set(
                "ingest-files-report.pdf",
                &serde_json::to_string(&stale).unwrap(),
            )
            .unwrap();
        assert!(!log.is_fresh(SourceKind::Files, "report.pdf", "report.pdf"));
    }
}
