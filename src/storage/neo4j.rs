//! Neo4j pre-flight for the engine's graph storage.
//!
//! The engine owns the graph; this side only verifies the endpoint is
//! reachable with the configured credentials and that the lookup index the
//! engine relies on exists.

use neo4rs::{query, ConfigBuilder, Graph};
use tracing::{debug, info};

use crate::config::Neo4jParams;
use crate::error::{Error, Result};

/// Label the engine attaches to every entity node in the default workspace.
pub const WORKSPACE_LABEL: &str = "base";

/// Connection to the Neo4j database backing the engine's graph storage.
pub struct GraphStore {
    graph: Graph,
    database: String,
}

impl GraphStore {
    /// Connect to Neo4j server
    pub async fn connect(params: &Neo4jParams) -> Result<Self> {
        let config = ConfigBuilder::default()
            .uri(params.uri.as_str())
            .user(params.user.as_str())
            .password(params.password.as_str())
            .db(params.database.as_str())
            .build()
            .map_err(|e| Error::ConfigurationError(format!("invalid Neo4j settings: {e}")))?;

        let graph = Graph::connect(config).await.map_err(|e| {
            Error::ConnectionError(format!("cannot connect to Neo4j at {}: {e}", params.uri))
        })?;

        let store = Self {
            graph,
            database: params.database.clone(),
        };
        store.ping().await?;
        info!(uri = %params.uri, database = %store.database, "Connected to Neo4j");
        Ok(store)
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        let mut result = self
            .graph
            .execute(query("RETURN 1 AS ok"))
            .await
            .map_err(|e| Error::ConnectionError(format!("Neo4j did not answer: {e}")))?;

        match result.next().await? {
            Some(row) if row.get::<i64>("ok").unwrap_or(0) == 1 => Ok(()),
            _ => Err(Error::ConnectionError(
                "Neo4j returned an unexpected ping result".to_string(),
            )),
        }
    }

    /// Ensure the entity lookup index exists.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statement = format!(
            "CREATE INDEX entity_id_{label} IF NOT EXISTS FOR (n:`{label}`) ON (n.entity_id)",
            label = WORKSPACE_LABEL
        );
        self.graph
            .run(query(&statement))
            .await
            .map_err(|e| Error::InitializationError(format!("failed to ensure index: {e}")))?;

        debug!(label = WORKSPACE_LABEL, "Entity index present");
        Ok(())
    }

    /// Number of entity nodes currently stored.
    pub async fn entity_count(&self) -> Result<u64> {
        let statement = format!("MATCH (n:`{}`) RETURN count(n) AS nodes", WORKSPACE_LABEL);
        let mut result = self.graph.execute(query(&statement)).await?;

        let count = match result.next().await? {
            Some(row) => row.get::<i64>("nodes").unwrap_or(0),
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}
