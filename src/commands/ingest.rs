//! Content ingestion: fetch (or reuse) the payload and hand it to the engine.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lightrag::{BackendHandle, RagBackend};

/// Public-domain sample text ingested when no input file is given.
pub const DEFAULT_SAMPLE_URL: &str =
    "https://raw.githubusercontent.com/gusye1234/nano-graphrag/main/tests/mock_data.txt";
/// Local cache for the downloaded sample.
pub const DEFAULT_SAMPLE_PATH: &str = "./book.txt";

/// Remote sample plus the file it is cached in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSource {
    pub url: String,
    pub path: PathBuf,
}

impl Default for SampleSource {
    fn default() -> Self {
        Self {
            url: DEFAULT_SAMPLE_URL.to_string(),
            path: PathBuf::from(DEFAULT_SAMPLE_PATH),
        }
    }
}

/// Where the ingested text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Cached download of a remote sample
    Sample(SampleSource),
    /// Local file supplied by the user
    File(PathBuf),
}

impl ContentSource {
    /// File name reported to the engine as the document's source.
    pub fn label(&self) -> String {
        let path = match self {
            ContentSource::Sample(sample) => &sample.path,
            ContentSource::File(path) => path,
        };
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

/// Downloads the sample once and serves it from disk afterwards.
pub struct SampleFetcher {
    http: Client,
}

impl SampleFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("lightrag_neo4j/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigurationError(format!("HTTP client error: {}", e)))?;
        Ok(Self { http })
    }

    /// Return the cache path, downloading the sample only if it is absent.
    pub async fn fetch(&self, source: &SampleSource) -> Result<PathBuf> {
        if tokio::fs::try_exists(&source.path).await? {
            debug!(path = %source.path.display(), "Using cached sample");
            return Ok(source.path.clone());
        }

        info!(url = %source.url, path = %source.path.display(), "Downloading sample text");
        let response = self
            .http
            .get(&source.url)
            .send()
            .await
            .map_err(|e| Error::FetchError(format!("{}: {}", source.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchError(format!(
                "{} returned {}",
                source.url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::FetchError(format!("{}: {}", source.url, e)))?;

        write_atomically(&source.path, &body).await?;
        info!(bytes = body.len(), path = %source.path.display(), "Sample cached");
        Ok(source.path.clone())
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string());
    let partial = path.with_file_name(format!(".{}.part", name));

    if let Err(err) = tokio::fs::write(&partial, contents).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err.into());
    }
    tokio::fs::rename(&partial, path).await?;
    Ok(())
}

/// Read the whole payload into memory.
pub async fn load_payload(fetcher: &SampleFetcher, source: &ContentSource) -> Result<String> {
    let path = match source {
        ContentSource::Sample(sample) => fetcher.fetch(sample).await?,
        ContentSource::File(path) => path.clone(),
    };

    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        Error::IngestionError(format!("cannot read {}: {}", path.display(), e))
    })?;

    if text.trim().is_empty() {
        return Err(Error::IngestionError(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(text)
}

/// Ingest the payload and wait until the engine has processed it.
pub async fn ingest_payload<B: RagBackend>(
    handle: &mut BackendHandle<B>,
    payload: &str,
    source: &str,
) -> Result<()> {
    info!(source, chars = payload.chars().count(), "Ingesting document");
    handle.ingest(payload, source).await
}
