//! LightRAG integration: the backend contract, retrieval modes, the shared
//! pipeline status and the HTTP client for a running LightRAG server.
//!
//! The engine itself (chunking, embeddings, graph extraction, query planning)
//! lives in [LightRAG](https://github.com/HKUDS/LightRAG); this module only
//! drives it through a fixed lifecycle.

pub mod backend;
pub mod mode;
pub mod pipeline;
pub mod server;

pub use backend::{BackendHandle, LifecycleState, RagBackend};
pub use mode::{QueryParam, RetrievalMode};
pub use pipeline::{initialize_pipeline_status, DocStatus, PipelineStatus};
pub use server::LightRagServer;
