//! Backend contract and the lifecycle-tracking handle around it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::mode::QueryParam;
use super::pipeline::{initialize_pipeline_status, PipelineStatus};
use crate::error::{Error, Result};

/// Capabilities a retrieval engine must expose to be driven by this crate.
///
/// Implementations are constructed by a factory taking the resolved
/// [`RagConfig`](crate::config::RagConfig); every other step goes through
/// [`BackendHandle`], which enforces the call order.
#[allow(async_fn_in_trait)]
pub trait RagBackend {
    /// Storage-layer setup (connections, schema/index checks).
    async fn initialize_storages(&mut self) -> Result<()>;

    /// Bind the process-wide pipeline status. Ingestion is only valid afterwards.
    async fn initialize_pipeline_status(&mut self, status: Arc<PipelineStatus>) -> Result<()>;

    /// Ingest a text payload and wait until processing completes.
    async fn ingest(&mut self, text: &str, source: &str) -> Result<()>;

    /// Answer a question with the given retrieval parameters.
    async fn query(&self, question: &str, param: &QueryParam) -> Result<String>;

    /// Release connections and file handles.
    async fn finalize_storages(&mut self) -> Result<()>;
}

/// Lifecycle of a backend handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not yet initialized
    Open,
    /// Storages and pipeline status initialized
    Active,
    /// Resources released
    Finalized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Open => "open",
            LifecycleState::Active => "active",
            LifecycleState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Exclusive owner of a constructed backend.
pub struct BackendHandle<B> {
    backend: B,
    state: LifecycleState,
}

impl<B: RagBackend> BackendHandle<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: LifecycleState::Open,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume the handle, returning the backend regardless of state.
    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Initialize storages, then the pipeline status. Only then is the handle active.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state != LifecycleState::Open {
            return Err(Error::LifecycleError(format!(
                "cannot initialize a {} backend",
                self.state
            )));
        }

        self.backend.initialize_storages().await?;
        debug!("Storages initialized");

        let status = initialize_pipeline_status().await;
        self.backend
            .initialize_pipeline_status(status)
            .await
            .map_err(|err| match err {
                Error::InitializationError(_) | Error::ConnectionError(_) => err,
                other => Error::InitializationError(other.to_string()),
            })?;

        self.state = LifecycleState::Active;
        info!("Backend active");
        Ok(())
    }

    pub async fn ingest(&mut self, text: &str, source: &str) -> Result<()> {
        self.ensure_active("ingest")?;
        self.backend.ingest(text, source).await
    }

    pub async fn query(&self, question: &str, param: &QueryParam) -> Result<String> {
        self.ensure_active("query")?;
        self.backend.query(question, param).await
    }

    /// Release backend resources. Runs the backend's finalizer at most once;
    /// later calls are no-ops.
    pub async fn finalize(&mut self) -> Result<()> {
        if self.state == LifecycleState::Finalized {
            return Ok(());
        }
        self.state = LifecycleState::Finalized;

        match self.backend.finalize_storages().await {
            Ok(()) => {
                info!("Backend finalized");
                Ok(())
            }
            Err(err @ Error::FinalizationError(_)) => Err(err),
            Err(other) => Err(Error::FinalizationError(other.to_string())),
        }
    }

    fn ensure_active(&self, operation: &str) -> Result<()> {
        if self.state == LifecycleState::Active {
            Ok(())
        } else {
            Err(Error::LifecycleError(format!(
                "{operation} requires an active backend, handle is {}",
                self.state
            )))
        }
    }
}
