//! OpenAI model catalogue checks for the engine's completion and embedding
//! bindings.

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use tracing::{debug, info};

use crate::config::ModelBindings;
use crate::error::{Error, Result};

/// Verifies that the bound models are reachable with the configured key.
pub struct ModelCatalog {
    client: OpenAIClient<OpenAIConfig>,
}

impl ModelCatalog {
    pub fn new(bindings: &ModelBindings) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(bindings.api_key.clone());
        if let Some(base) = bindings.api_base.as_deref() {
            config = config.with_api_base(base.trim_end_matches('/'));
        }

        Self {
            client: OpenAIClient::with_config(config),
        }
    }

    /// Look up both the completion and the embedding model.
    pub async fn verify(&self, bindings: &ModelBindings) -> Result<()> {
        for model in [&bindings.completion_model, &bindings.embedding_model] {
            let found = self.client.models().retrieve(model).await.map_err(|e| {
                Error::InitializationError(format!("model '{model}' is not available: {e}"))
            })?;
            debug!(model = %found.id, owner = %found.owned_by, "Model available");
        }

        info!(
            completion = %bindings.completion_model,
            embedding = %bindings.embedding_model,
            "Model bindings verified"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn bindings(server: &MockServer) -> ModelBindings {
        ModelBindings {
            completion_model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
            api_key: "sk-test".into(),
            api_base: Some(server.url("/v1")),
            verify: true,
        }
    }

    fn model_body(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "object": "model",
            "created": 1_700_000_000,
            "owned_by": "openai"
        })
    }

    #[tokio::test]
    async fn verifies_both_models() {
        let server = MockServer::start_async().await;
        let completion = server.mock(|when, then| {
            when.method(GET).path("/v1/models/gpt-4o-mini");
            then.status(200).json_body(model_body("gpt-4o-mini"));
        });
        let embedding = server.mock(|when, then| {
            when.method(GET).path("/v1/models/text-embedding-3-small");
            then.status(200).json_body(model_body("text-embedding-3-small"));
        });

        let bindings = bindings(&server);
        ModelCatalog::new(&bindings).verify(&bindings).await.unwrap();

        completion.assert_calls(1);
        embedding.assert_calls(1);
    }

    #[tokio::test]
    async fn unknown_model_is_initialization_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v1/models/gpt-4o-mini");
            then.status(404).json_body(serde_json::json!({
                "error": {
                    "message": "The model `gpt-4o-mini` does not exist",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": "model_not_found"
                }
            }));
        });

        let bindings = bindings(&server);
        let err = ModelCatalog::new(&bindings)
            .verify(&bindings)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InitializationError(_)));
        assert!(err.to_string().contains("gpt-4o-mini"));
    }
}
