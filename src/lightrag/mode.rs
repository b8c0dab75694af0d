//! Retrieval modes and the per-query parameters sent with each question.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Retrieval strategy understood by the LightRAG engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Plain vector search over text chunks
    Naive,
    /// Entity-centric graph neighbourhood
    Local,
    /// Relationship-centric graph summary
    Global,
    /// Local + global
    Hybrid,
    /// Graph retrieval mixed with vector search
    Mix,
    /// Skip retrieval and ask the model directly
    Bypass,
}

impl RetrievalMode {
    /// Modes exercised by a default run, in dispatch order.
    pub const DEFAULT_SEQUENCE: [RetrievalMode; 4] = [
        RetrievalMode::Naive,
        RetrievalMode::Local,
        RetrievalMode::Global,
        RetrievalMode::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Naive => "naive",
            RetrievalMode::Local => "local",
            RetrievalMode::Global => "global",
            RetrievalMode::Hybrid => "hybrid",
            RetrievalMode::Mix => "mix",
            RetrievalMode::Bypass => "bypass",
        }
    }

    /// Capitalized label for result headings ("Hybrid", "Naive", ...).
    pub fn title(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "naive" => Ok(RetrievalMode::Naive),
            "local" => Ok(RetrievalMode::Local),
            "global" => Ok(RetrievalMode::Global),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            "mix" => Ok(RetrievalMode::Mix),
            "bypass" => Ok(RetrievalMode::Bypass),
            other => Err(Error::ConfigurationError(format!(
                "unknown retrieval mode '{other}' \
                 (expected naive, local, global, hybrid, mix or bypass)"
            ))),
        }
    }
}

/// Per-query parameters sent alongside the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParam {
    pub mode: RetrievalMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
}

impl QueryParam {
    pub fn new(mode: RetrievalMode) -> Self {
        Self {
            mode,
            top_k: None,
            response_type: None,
        }
    }

    /// Same options, different mode.
    pub fn with_mode(&self, mode: RetrievalMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

impl Default for QueryParam {
    fn default() -> Self {
        Self::new(RetrievalMode::Hybrid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("NAIVE".parse::<RetrievalMode>().unwrap(), RetrievalMode::Naive);
        assert_eq!(" local ".parse::<RetrievalMode>().unwrap(), RetrievalMode::Local);
        assert_eq!("hybrid".parse::<RetrievalMode>().unwrap(), RetrievalMode::Hybrid);
        assert_eq!("mix".parse::<RetrievalMode>().unwrap(), RetrievalMode::Mix);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "vector".parse::<RetrievalMode>().unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
        assert!(err.to_string().contains("vector"));
    }

    #[test]
    fn display_matches_wire_name() {
        for mode in RetrievalMode::DEFAULT_SEQUENCE {
            let wire = serde_json::to_value(mode).unwrap();
            assert_eq!(wire, serde_json::Value::String(mode.to_string()));
        }
    }

    #[test]
    fn title_capitalizes_first_letter() {
        assert_eq!(RetrievalMode::Hybrid.title(), "Hybrid");
        assert_eq!(RetrievalMode::Naive.title(), "Naive");
    }

    #[test]
    fn query_param_serializes_only_set_fields() {
        let param = QueryParam::new(RetrievalMode::Global);
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json, serde_json::json!({ "mode": "global" }));

        let tuned = QueryParam {
            top_k: Some(20),
            ..param.with_mode(RetrievalMode::Local)
        };
        let json = serde_json::to_value(&tuned).unwrap();
        assert_eq!(json["mode"], "local");
        assert_eq!(json["top_k"], 20);
        assert!(json.get("response_type").is_none());
    }
}
