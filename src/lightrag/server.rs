//! HTTP backend for a running LightRAG API server.
//!
//! Storage initialization checks the server's health and storage binding,
//! the Neo4j endpoint (when the graph lives there) and the model bindings.
//! Ingestion posts the text and polls its track id until every document
//! reaches a terminal state.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::backend::RagBackend;
use super::mode::QueryParam;
use super::pipeline::{DocStatus, PipelineStatus};
use crate::config::{ModelBindings, RagConfig, ServerParams, StorageKind};
use crate::error::{Error, Result};
use crate::integrations::ModelCatalog;
use crate::storage::GraphStore;

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    configuration: ServerConfiguration,
    #[serde(default)]
    core_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerConfiguration {
    #[serde(default)]
    graph_storage: Option<String>,
    #[serde(default)]
    llm_model: Option<String>,
    #[serde(default)]
    embedding_model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PipelineStatusResponse {
    #[serde(default)]
    busy: bool,
    #[serde(default)]
    job_name: String,
    #[serde(default)]
    latest_message: String,
}

#[derive(Debug, Serialize)]
struct InsertTextRequest<'a> {
    text: &'a str,
    file_source: &'a str,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackStatusResponse {
    #[serde(default)]
    documents: Vec<TrackedDocument>,
}

#[derive(Debug, Deserialize)]
struct TrackedDocument {
    id: String,
    status: String,
    #[serde(default)]
    error_msg: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(flatten)]
    param: &'a QueryParam,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    response: String,
}

/// LightRAG server client bound to one storage kind and one set of models.
pub struct LightRagServer {
    http: Client,
    server: ServerParams,
    storage: StorageKind,
    models: ModelBindings,
    graph: Option<GraphStore>,
    pipeline: Option<Arc<PipelineStatus>>,
}

impl LightRagServer {
    /// Construct the backend. Performs no I/O.
    pub fn new(config: &RagConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("lightrag_neo4j/", env!("CARGO_PKG_VERSION")))
            .timeout(config.server.request_timeout)
            .build()
            .map_err(|e| Error::ConfigurationError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            server: config.server.clone(),
            storage: config.storage.clone(),
            models: config.models.clone(),
            graph: None,
            pipeline: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.server.url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.server.url, path));
        match self.server.api_key.as_deref() {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, String> {
        let response = request
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("failed to read response: {}", e))?;

        if !status.is_success() {
            return Err(format!("server returned {}: {}", status, truncate(&text, 300)));
        }

        serde_json::from_str(&text).map_err(|e| format!("invalid response: {}", e))
    }

    async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .request(Method::GET, "/health")
            .send()
            .await
            .map_err(|e| {
                Error::ConnectionError(format!(
                    "LightRAG server at {} is unreachable: {}",
                    self.server.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::InitializationError(format!(
                "health check returned {}",
                status
            )));
        }

        response
            .json::<HealthResponse>()
            .await
            .map_err(|e| Error::InitializationError(format!("invalid health response: {}", e)))
    }

    fn check_bindings(&self, health: &HealthResponse) -> Result<()> {
        if health.status != "healthy" {
            return Err(Error::InitializationError(format!(
                "server reports status '{}'",
                health.status
            )));
        }

        let expected = self.storage.class_name();
        match health.configuration.graph_storage.as_deref() {
            Some(reported) if reported == expected => {}
            Some(reported) => {
                return Err(Error::InitializationError(format!(
                    "server graph storage is {reported}, but {expected} was requested"
                )));
            }
            None => warn!("Server did not report its graph storage; assuming {expected}"),
        }

        let configured = &health.configuration;
        if let Some(llm) = configured.llm_model.as_deref() {
            if llm != self.models.completion_model {
                warn!(
                    server = llm,
                    requested = %self.models.completion_model,
                    "Completion model differs from the server's"
                );
            }
        }
        if let Some(embedding) = configured.embedding_model.as_deref() {
            if embedding != self.models.embedding_model {
                warn!(
                    server = embedding,
                    requested = %self.models.embedding_model,
                    "Embedding model differs from the server's"
                );
            }
        }

        Ok(())
    }

    async fn wait_for_track(&self, track_id: &str, pipeline: &PipelineStatus) -> Result<()> {
        let deadline = Instant::now() + self.server.ingest_timeout;
        let path = format!("/documents/track_status/{}", track_id);

        loop {
            let status: TrackStatusResponse = self
                .send_json(self.request(Method::GET, &path))
                .await
                .map_err(|msg| Error::IngestionError(format!("track {track_id}: {msg}")))?;

            // An empty list means the server has not registered the documents yet.
            let mut pending = status.documents.is_empty();
            let mut failures = Vec::new();

            for doc in &status.documents {
                let state = parse_doc_status(&doc.status);
                pipeline.mark(&doc.id, state, doc.error_msg.clone()).await;
                match state {
                    DocStatus::Failed => failures.push(format!(
                        "{}: {}",
                        doc.id,
                        doc.error_msg.as_deref().unwrap_or("unknown error")
                    )),
                    DocStatus::Processed => {}
                    DocStatus::Pending | DocStatus::Processing => pending = true,
                }
            }

            if !pending {
                if failures.is_empty() {
                    pipeline.mark(track_id, DocStatus::Processed, None).await;
                    let counts = pipeline.counts().await;
                    info!(
                        track_id,
                        documents = status.documents.len(),
                        processed_total = counts.get(&DocStatus::Processed).copied().unwrap_or(0),
                        failed_total = counts.get(&DocStatus::Failed).copied().unwrap_or(0),
                        "Ingestion complete"
                    );
                    return Ok(());
                }

                let message = failures.join("; ");
                pipeline
                    .mark(track_id, DocStatus::Failed, Some(message.clone()))
                    .await;
                return Err(Error::IngestionError(format!(
                    "processing failed for {message}"
                )));
            }

            if Instant::now() >= deadline {
                let accepted = pipeline.record(track_id).await.map(|r| r.updated_at);
                pipeline
                    .mark(track_id, DocStatus::Failed, Some("timed out".to_string()))
                    .await;
                let accepted = accepted
                    .map(|at| format!(", accepted at {}", at.to_rfc3339()))
                    .unwrap_or_default();
                return Err(Error::IngestionError(format!(
                    "track {} did not finish within {:?}{}",
                    track_id, self.server.ingest_timeout, accepted
                )));
            }

            debug!(track_id, "Documents still processing");
            sleep(self.server.poll_interval).await;
        }
    }
}

impl RagBackend for LightRagServer {
    async fn initialize_storages(&mut self) -> Result<()> {
        let health = self.health().await?;
        self.check_bindings(&health)?;
        info!(
            url = %self.server.url,
            storage = self.storage.class_name(),
            version = health.core_version.as_deref().unwrap_or("unknown"),
            "LightRAG server healthy"
        );

        if let StorageKind::Neo4j(params) = &self.storage {
            let store = GraphStore::connect(params).await?;
            store.ensure_schema().await?;
            match store.entity_count().await {
                Ok(count) => info!(
                    entities = count,
                    database = store.database(),
                    "Graph storage ready"
                ),
                Err(err) => warn!("Could not count stored entities: {}", err),
            }
            self.graph = Some(store);
        }

        if self.models.verify {
            ModelCatalog::new(&self.models).verify(&self.models).await?;
        }

        Ok(())
    }

    async fn initialize_pipeline_status(&mut self, status: Arc<PipelineStatus>) -> Result<()> {
        let snapshot: PipelineStatusResponse = self
            .send_json(self.request(Method::GET, "/documents/pipeline_status"))
            .await
            .map_err(|msg| {
                Error::InitializationError(format!("pipeline status unavailable: {msg}"))
            })?;

        if snapshot.busy {
            warn!(
                job = %snapshot.job_name,
                latest = %snapshot.latest_message,
                "Server pipeline is busy; new documents will queue behind the current job"
            );
        }

        self.pipeline = Some(status);
        Ok(())
    }

    async fn ingest(&mut self, text: &str, source: &str) -> Result<()> {
        let pipeline = self.pipeline.clone().ok_or_else(|| {
            Error::LifecycleError("ingest issued before pipeline status initialization".to_string())
        })?;

        if pipeline.is_busy().await {
            warn!(source, "Earlier documents are still processing");
        }

        let body = InsertTextRequest {
            text,
            file_source: source,
        };
        let response: InsertResponse = self
            .send_json(self.request(Method::POST, "/documents/text").json(&body))
            .await
            .map_err(Error::IngestionError)?;

        match response.status.as_str() {
            "success" | "partial_success" => {}
            "duplicated" => {
                info!(source, "Document already ingested, skipping");
                return Ok(());
            }
            other => {
                return Err(Error::IngestionError(format!(
                    "server refused document ({}): {}",
                    other, response.message
                )));
            }
        }

        let track_id = response
            .track_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::IngestionError("server did not return a track id".to_string()))?;

        pipeline.mark(&track_id, DocStatus::Pending, None).await;
        info!(track_id = %track_id, source, "Document accepted, waiting for processing");
        self.wait_for_track(&track_id, &pipeline).await
    }

    async fn query(&self, question: &str, param: &QueryParam) -> Result<String> {
        let body = QueryRequest {
            query: question,
            param,
        };
        let response: QueryResponse = self
            .send_json(self.request(Method::POST, "/query").json(&body))
            .await
            .map_err(|msg| Error::query(param.mode, msg))?;

        Ok(response.response)
    }

    async fn finalize_storages(&mut self) -> Result<()> {
        if let Some(store) = self.graph.take() {
            debug!(database = store.database(), "Closing Neo4j connection pool");
        }
        self.pipeline = None;
        Ok(())
    }
}

fn parse_doc_status(value: &str) -> DocStatus {
    match value.to_lowercase().as_str() {
        "processed" => DocStatus::Processed,
        "failed" => DocStatus::Failed,
        "processing" | "preprocessed" => DocStatus::Processing,
        _ => DocStatus::Pending,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
