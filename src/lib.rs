//! LightRAG on Neo4j
//!
//! This library drives a LightRAG engine through its lifecycle:
//! - Resolve and validate configuration before anything touches the network
//! - Initialize storages (Neo4j graph, model bindings), then pipeline status
//! - Fetch the sample text once and ingest it
//! - Query it in several retrieval modes, one after another
//! - Finalize storages on every exit path

pub mod config;
pub mod error;
pub mod integrations;
pub mod lightrag;
pub mod metrics;
pub mod session;
pub mod storage;

// Re-export common types
pub use config::{RagConfig, RagSettings, StorageKind};
pub use error::{Error, Result};
pub use lightrag::{BackendHandle, LightRagServer, QueryParam, RagBackend, RetrievalMode};
pub use session::WorkingDirLock;

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
