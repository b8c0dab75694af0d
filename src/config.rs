//! Configuration for the LightRAG server, the Neo4j graph storage and the
//! OpenAI model bindings.
//!
//! Raw values arrive as [`RagSettings`] (CLI flags with env fallback, plus an
//! optional YAML file) and are resolved exactly once into an immutable
//! [`RagConfig`]. Nothing downstream reads the environment again.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default constants
pub const DEFAULT_WORKING_DIR: &str = "./rag_storage";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:9621";
pub const DEFAULT_NEO4J_DATABASE: &str = "neo4j";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_INGEST_TIMEOUT_SECS: u64 = 1800;

const NEO4J_SCHEMES: [&str; 6] = ["neo4j", "neo4j+s", "neo4j+ssc", "bolt", "bolt+s", "bolt+ssc"];

/// Graph storage implementations the engine can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStorage {
    Neo4j,
    NetworkX,
}

impl FromStr for GraphStorage {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "neo4j" | "neo4jstorage" => Ok(GraphStorage::Neo4j),
            "networkx" | "networkxstorage" => Ok(GraphStorage::NetworkX),
            other => Err(Error::ConfigurationError(format!(
                "unsupported graph storage '{other}' (expected neo4j or networkx)"
            ))),
        }
    }
}

/// Connection parameters for a Neo4j graph storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Neo4jParams {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for Neo4jParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jParams")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Storage backend selected for the engine, with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Neo4j(Neo4jParams),
    /// File-backed graph kept in the working directory
    NetworkX,
}

impl StorageKind {
    /// Storage class name as reported by the engine.
    pub fn class_name(&self) -> &'static str {
        match self {
            StorageKind::Neo4j(_) => "Neo4JStorage",
            StorageKind::NetworkX => "NetworkXStorage",
        }
    }
}

/// Completion and embedding functions the engine is bound to.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelBindings {
    pub completion_model: String,
    pub embedding_model: String,
    pub api_key: String,
    pub api_base: Option<String>,
    /// Check both models against the provider's catalogue during initialization
    pub verify: bool,
}

impl fmt::Debug for ModelBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBindings")
            .field("completion_model", &self.completion_model)
            .field("embedding_model", &self.embedding_model)
            .field("api_key", &"***")
            .field("api_base", &self.api_base)
            .field("verify", &self.verify)
            .finish()
    }
}

/// LightRAG API server endpoint and timing.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerParams {
    pub url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub ingest_timeout: Duration,
}

impl fmt::Debug for ServerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerParams")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("ingest_timeout", &self.ingest_timeout)
            .finish()
    }
}

/// Fully resolved configuration. Immutable once the backend is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagConfig {
    pub working_dir: PathBuf,
    pub storage: StorageKind,
    pub models: ModelBindings,
    pub server: ServerParams,
}

impl RagConfig {
    /// Create the working directory if it is absent. Safe to call repeatedly.
    pub fn prepare_working_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.working_dir)?;
        Ok(())
    }
}

/// Raw, possibly incomplete settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RagSettings {
    pub working_dir: Option<String>,
    pub storage: Option<String>,
    pub neo4j_uri: Option<String>,
    pub neo4j_user: Option<String>,
    pub neo4j_password: Option<String>,
    pub neo4j_database: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub embedding_model: Option<String>,
    pub verify_models: Option<bool>,
    pub server_url: Option<String>,
    pub server_api_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub ingest_timeout_secs: Option<u64>,
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "***")
}

impl fmt::Debug for RagSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagSettings")
            .field("working_dir", &self.working_dir)
            .field("storage", &self.storage)
            .field("neo4j_uri", &self.neo4j_uri)
            .field("neo4j_user", &self.neo4j_user)
            .field("neo4j_password", &redact(&self.neo4j_password))
            .field("neo4j_database", &self.neo4j_database)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("llm_model", &self.llm_model)
            .field("embedding_model", &self.embedding_model)
            .field("verify_models", &self.verify_models)
            .field("server_url", &self.server_url)
            .field("server_api_key", &redact(&self.server_api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("ingest_timeout_secs", &self.ingest_timeout_secs)
            .finish()
    }
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlConfig {
    working_dir: Option<String>,
    graph_storage: Option<String>,
    neo4j: Option<YamlNeo4j>,
    openai: Option<YamlOpenAI>,
    server: Option<YamlServer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlNeo4j {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlOpenAI {
    api_key: Option<String>,
    base_url: Option<String>,
    llm_model: Option<String>,
    embedding_model: Option<String>,
    verify_models: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlServer {
    url: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    ingest_timeout_secs: Option<u64>,
}

impl RagSettings {
    /// Load settings from a YAML file. `${VAR}` values are taken from the
    /// environment at load time.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationError(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse settings from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = serde_yaml::from_str(content)?;
        let neo4j = yaml.neo4j.unwrap_or_default();
        let openai = yaml.openai.unwrap_or_default();
        let server = yaml.server.unwrap_or_default();

        Ok(Self {
            working_dir: substitute(yaml.working_dir),
            storage: substitute(yaml.graph_storage),
            neo4j_uri: substitute(neo4j.uri),
            neo4j_user: substitute(neo4j.user),
            neo4j_password: substitute(neo4j.password),
            neo4j_database: substitute(neo4j.database),
            openai_api_key: substitute(openai.api_key),
            openai_base_url: substitute(openai.base_url),
            llm_model: substitute(openai.llm_model),
            embedding_model: substitute(openai.embedding_model),
            verify_models: openai.verify_models,
            server_url: substitute(server.url),
            server_api_key: substitute(server.api_key),
            request_timeout_secs: server.request_timeout_secs,
            poll_interval_ms: server.poll_interval_ms,
            ingest_timeout_secs: server.ingest_timeout_secs,
        })
    }

    /// Fill every unset field from `fallback`. Values already set win.
    pub fn merge(self, fallback: RagSettings) -> RagSettings {
        RagSettings {
            working_dir: self.working_dir.or(fallback.working_dir),
            storage: self.storage.or(fallback.storage),
            neo4j_uri: self.neo4j_uri.or(fallback.neo4j_uri),
            neo4j_user: self.neo4j_user.or(fallback.neo4j_user),
            neo4j_password: self.neo4j_password.or(fallback.neo4j_password),
            neo4j_database: self.neo4j_database.or(fallback.neo4j_database),
            openai_api_key: self.openai_api_key.or(fallback.openai_api_key),
            openai_base_url: self.openai_base_url.or(fallback.openai_base_url),
            llm_model: self.llm_model.or(fallback.llm_model),
            embedding_model: self.embedding_model.or(fallback.embedding_model),
            verify_models: self.verify_models.or(fallback.verify_models),
            server_url: self.server_url.or(fallback.server_url),
            server_api_key: self.server_api_key.or(fallback.server_api_key),
            request_timeout_secs: self.request_timeout_secs.or(fallback.request_timeout_secs),
            poll_interval_ms: self.poll_interval_ms.or(fallback.poll_interval_ms),
            ingest_timeout_secs: self.ingest_timeout_secs.or(fallback.ingest_timeout_secs),
        }
    }

    /// Validate and resolve into a [`RagConfig`].
    ///
    /// Performs no I/O. Every missing required setting is reported in a
    /// single [`Error::ConfigurationError`].
    pub fn resolve(self) -> Result<RagConfig> {
        let mut missing: Vec<&'static str> = Vec::new();
        let mut invalid: Vec<String> = Vec::new();

        let storage = match non_empty(self.storage) {
            Some(name) => match name.parse::<GraphStorage>() {
                Ok(kind) => kind,
                Err(Error::ConfigurationError(reason)) => {
                    invalid.push(reason);
                    GraphStorage::Neo4j
                }
                Err(other) => {
                    invalid.push(other.to_string());
                    GraphStorage::Neo4j
                }
            },
            None => GraphStorage::Neo4j,
        };

        let api_key = non_empty(self.openai_api_key);
        if api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }

        let storage = match storage {
            GraphStorage::NetworkX => Some(StorageKind::NetworkX),
            GraphStorage::Neo4j => {
                let uri = non_empty(self.neo4j_uri);
                let user = non_empty(self.neo4j_user);
                let password = non_empty(self.neo4j_password);
                if uri.is_none() {
                    missing.push("NEO4J_URI");
                }
                if user.is_none() {
                    missing.push("NEO4J_USERNAME");
                }
                if password.is_none() {
                    missing.push("NEO4J_PASSWORD");
                }
                if let Some(uri) = uri.as_deref() {
                    if let Err(reason) = validate_neo4j_uri(uri) {
                        invalid.push(reason);
                    }
                }

                match (uri, user, password) {
                    (Some(uri), Some(user), Some(password)) => {
                        Some(StorageKind::Neo4j(Neo4jParams {
                            uri,
                            user,
                            password,
                            database: non_empty(self.neo4j_database)
                                .unwrap_or_else(|| DEFAULT_NEO4J_DATABASE.to_string()),
                        }))
                    }
                    _ => None,
                }
            }
        };

        let server_url = non_empty(self.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if let Err(reason) = validate_http_url("LIGHTRAG_SERVER_URL", &server_url) {
            invalid.push(reason);
        }

        let api_base = non_empty(self.openai_base_url);
        if let Some(base) = api_base.as_deref() {
            if let Err(reason) = validate_http_url("OPENAI_API_BASE", base) {
                invalid.push(reason);
            }
        }

        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms == 0 {
            invalid.push("poll interval must be greater than zero".to_string());
        }

        if !missing.is_empty() {
            return Err(Error::ConfigurationError(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if !invalid.is_empty() {
            return Err(Error::ConfigurationError(invalid.join("; ")));
        }

        let (Some(storage), Some(api_key)) = (storage, api_key) else {
            return Err(Error::ConfigurationError(
                "incomplete storage or model settings".to_string(),
            ));
        };

        Ok(RagConfig {
            working_dir: PathBuf::from(
                non_empty(self.working_dir).unwrap_or_else(|| DEFAULT_WORKING_DIR.to_string()),
            ),
            storage,
            models: ModelBindings {
                completion_model: non_empty(self.llm_model)
                    .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
                embedding_model: non_empty(self.embedding_model)
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                api_key,
                api_base,
                verify: self.verify_models.unwrap_or(true),
            },
            server: ServerParams {
                url: server_url,
                api_key: non_empty(self.server_api_key),
                request_timeout: Duration::from_secs(
                    self.request_timeout_secs
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
                ),
                poll_interval: Duration::from_millis(poll_interval_ms),
                ingest_timeout: Duration::from_secs(
                    self.ingest_timeout_secs
                        .unwrap_or(DEFAULT_INGEST_TIMEOUT_SECS),
                ),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve a value: if it looks like ${VAR}, take the env var instead
fn substitute(value: Option<String>) -> Option<String> {
    match value {
        Some(v) if v.starts_with("${") && v.ends_with('}') => {
            let var_name = &v[2..v.len() - 1];
            std::env::var(var_name).ok()
        }
        other => other,
    }
}

fn validate_neo4j_uri(uri: &str) -> std::result::Result<(), String> {
    match uri.split_once("://") {
        Some((scheme, rest)) if NEO4J_SCHEMES.contains(&scheme) && !rest.is_empty() => Ok(()),
        Some((scheme, _)) if !NEO4J_SCHEMES.contains(&scheme) => Err(format!(
            "NEO4J_URI has unsupported scheme '{scheme}' (expected one of {})",
            NEO4J_SCHEMES.join(", ")
        )),
        _ => Err(format!("NEO4J_URI '{uri}' is not a valid URI")),
    }
}

fn validate_http_url(name: &str, value: &str) -> std::result::Result<(), String> {
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(format!(
            "{name} must use http or https, got '{}'",
            url.scheme()
        )),
        Err(e) => Err(format!("{name} '{value}' is not a valid URL: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neo4j_settings() -> RagSettings {
        RagSettings {
            neo4j_uri: Some("neo4j://localhost:7687".into()),
            neo4j_user: Some("neo4j".into()),
            neo4j_password: Some("password".into()),
            openai_api_key: Some("sk-test".into()),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_with_defaults() {
        let config = neo4j_settings().resolve().unwrap();

        assert_eq!(config.working_dir, PathBuf::from(DEFAULT_WORKING_DIR));
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.models.completion_model, DEFAULT_COMPLETION_MODEL);
        assert_eq!(config.models.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert!(config.models.verify);
        match config.storage {
            StorageKind::Neo4j(ref params) => {
                assert_eq!(params.database, DEFAULT_NEO4J_DATABASE);
                assert_eq!(params.user, "neo4j");
            }
            other => panic!("unexpected storage {other:?}"),
        }
        assert_eq!(config.storage.class_name(), "Neo4JStorage");
    }

    #[test]
    fn reports_every_missing_field_at_once() {
        let err = RagSettings::default().resolve().unwrap_err();
        let msg = err.to_string();

        assert!(matches!(err, Error::ConfigurationError(_)));
        for name in ["OPENAI_API_KEY", "NEO4J_URI", "NEO4J_USERNAME", "NEO4J_PASSWORD"] {
            assert!(msg.contains(name), "{name} missing from '{msg}'");
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let settings = RagSettings {
            neo4j_password: Some("   ".into()),
            ..neo4j_settings()
        };
        let err = settings.resolve().unwrap_err();
        assert!(err.to_string().contains("NEO4J_PASSWORD"));
        assert!(!err.to_string().contains("NEO4J_URI"));
    }

    #[test]
    fn networkx_needs_no_neo4j_credentials() {
        let settings = RagSettings {
            storage: Some("NetworkXStorage".into()),
            openai_api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let config = settings.resolve().unwrap();
        assert_eq!(config.storage, StorageKind::NetworkX);
    }

    #[test]
    fn rejects_unknown_storage_and_bad_uris() {
        let settings = RagSettings {
            storage: Some("redis".into()),
            ..neo4j_settings()
        };
        assert!(settings.resolve().unwrap_err().to_string().contains("redis"));

        let settings = RagSettings {
            neo4j_uri: Some("http://localhost:7474".into()),
            ..neo4j_settings()
        };
        assert!(settings
            .resolve()
            .unwrap_err()
            .to_string()
            .contains("unsupported scheme"));

        let settings = RagSettings {
            server_url: Some("not a url".into()),
            ..neo4j_settings()
        };
        assert!(settings
            .resolve()
            .unwrap_err()
            .to_string()
            .contains("LIGHTRAG_SERVER_URL"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let settings = RagSettings {
            poll_interval_ms: Some(0),
            ..neo4j_settings()
        };
        assert!(settings.resolve().unwrap_err().to_string().contains("poll"));
    }

    #[test]
    fn resolve_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let working_dir = dir.path().join("rag_storage");

        let settings = RagSettings {
            working_dir: Some(working_dir.display().to_string()),
            ..neo4j_settings()
        };
        let config = settings.clone().resolve().unwrap();
        assert!(!working_dir.exists());

        let failing = RagSettings {
            openai_api_key: None,
            ..settings
        };
        assert!(failing.resolve().is_err());
        assert!(!working_dir.exists());

        config.prepare_working_dir().unwrap();
        config.prepare_working_dir().unwrap();
        assert!(working_dir.is_dir());
    }

    #[test]
    fn merge_prefers_explicit_values() {
        let explicit = RagSettings {
            neo4j_uri: Some("bolt://db:7687".into()),
            ..Default::default()
        };
        let merged = explicit.merge(neo4j_settings());

        assert_eq!(merged.neo4j_uri.as_deref(), Some("bolt://db:7687"));
        assert_eq!(merged.neo4j_user.as_deref(), Some("neo4j"));
    }

    #[test]
    fn trims_trailing_slash_from_server_url() {
        let settings = RagSettings {
            server_url: Some("http://rag.internal:9621/".into()),
            ..neo4j_settings()
        };
        assert_eq!(
            settings.resolve().unwrap().server.url,
            "http://rag.internal:9621"
        );
    }

    #[test]
    fn parses_yaml_sections() {
        let yaml = r#"
working_dir: /tmp/rag
graph_storage: neo4j
neo4j:
  uri: bolt://localhost:7687
  user: neo4j
  password: secret
openai:
  api_key: sk-yaml
  llm_model: gpt-4o
  verify_models: false
server:
  url: http://localhost:9621
  poll_interval_ms: 250
"#;
        let settings = RagSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.neo4j_password.as_deref(), Some("secret"));
        assert_eq!(settings.verify_models, Some(false));

        let config = settings.resolve().unwrap();
        assert_eq!(config.models.completion_model, "gpt-4o");
        assert_eq!(config.server.poll_interval, Duration::from_millis(250));
        assert!(!config.models.verify);
    }

    #[test]
    fn yaml_placeholder_reads_environment() {
        std::env::set_var("LIGHTRAG_NEO4J_TEST_PASSWORD", "from-env");
        let yaml = "neo4j:\n  password: ${LIGHTRAG_NEO4J_TEST_PASSWORD}\n";
        let settings = RagSettings::from_yaml_str(yaml).unwrap();
        std::env::remove_var("LIGHTRAG_NEO4J_TEST_PASSWORD");

        assert_eq!(settings.neo4j_password.as_deref(), Some("from-env"));
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let err = RagSettings::from_yaml_str("neo4j:\n  passwrd: x\n").unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = RagSettings {
            neo4j_password: Some("hunter2".into()),
            server_api_key: Some("server-secret".into()),
            ..neo4j_settings()
        }
        .resolve()
        .unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("server-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn unresolved_settings_debug_hides_secrets() {
        let settings = RagSettings {
            neo4j_password: Some("hunter2".into()),
            server_api_key: Some("server-secret".into()),
            ..neo4j_settings()
        };
        let debug = format!("{:?}", settings);

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("server-secret"));
        assert!(debug.contains("neo4j://localhost:7687"));
        assert!(debug.contains("neo4j_password: Some(\"***\")"));
    }
}
