//! Process-wide pipeline status shared by every backend in the process.
//!
//! Ingestion tracks per-document processing state here, so the status must be
//! initialized once before the first ingestion call is issued.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

static PIPELINE_STATUS: OnceCell<Arc<PipelineStatus>> = OnceCell::const_new();

/// Processing state of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl DocStatus {
    /// True once the document will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocStatus::Processed | DocStatus::Failed)
    }
}

/// Tracked document entry.
#[derive(Debug, Clone)]
pub struct DocRecord {
    pub status: DocStatus,
    pub updated_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Shared per-document processing state.
#[derive(Debug, Default)]
pub struct PipelineStatus {
    docs: RwLock<HashMap<String, DocRecord>>,
}

impl PipelineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or insert) the state of a document.
    pub async fn mark(&self, doc_id: &str, status: DocStatus, message: Option<String>) {
        debug!(doc_id, ?status, "pipeline status update");
        self.docs.write().await.insert(
            doc_id.to_string(),
            DocRecord {
                status,
                updated_at: Utc::now(),
                message,
            },
        );
    }

    pub async fn status(&self, doc_id: &str) -> Option<DocStatus> {
        self.docs.read().await.get(doc_id).map(|r| r.status)
    }

    /// Full entry for a document, including when it last changed.
    pub async fn record(&self, doc_id: &str) -> Option<DocRecord> {
        self.docs.read().await.get(doc_id).cloned()
    }

    /// True while any document is still pending or processing.
    pub async fn is_busy(&self) -> bool {
        self.docs
            .read()
            .await
            .values()
            .any(|r| !r.status.is_terminal())
    }

    /// Number of documents per state.
    pub async fn counts(&self) -> HashMap<DocStatus, usize> {
        let mut counts = HashMap::new();
        for record in self.docs.read().await.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Initialize the process-wide pipeline status.
///
/// The first caller creates it; every later call returns the same instance.
pub async fn initialize_pipeline_status() -> Arc<PipelineStatus> {
    PIPELINE_STATUS
        .get_or_init(|| async {
            info!("Pipeline status initialized");
            Arc::new(PipelineStatus::new())
        })
        .await
        .clone()
}
