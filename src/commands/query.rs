//! Sequential query dispatch across retrieval modes.

use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::lightrag::{BackendHandle, QueryParam, RagBackend, RetrievalMode};
use crate::metrics;

/// Default question asked of the sample text.
pub const DEFAULT_QUESTION: &str = "What are the main themes in this story?";

/// Answer produced by one retrieval mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub mode: RetrievalMode,
    pub response: String,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// Ask `question` once per mode, in the given order.
///
/// Each query is awaited before the next is issued. The first failure
/// stops the dispatch and comes back as a `QueryError` for its mode;
/// handle misuse stays a `LifecycleError`.
pub async fn dispatch_queries<B: RagBackend>(
    handle: &BackendHandle<B>,
    question: &str,
    modes: &[RetrievalMode],
    template: &QueryParam,
) -> Result<Vec<QueryOutcome>> {
    let mut outcomes = Vec::with_capacity(modes.len());

    for &mode in modes {
        let param = template.with_mode(mode);
        let start = Instant::now();

        match handle.query(question, &param).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                metrics::record_query(mode.as_str(), true);
                info!(%mode, elapsed_ms = elapsed.as_millis() as u64, "Query answered");
                outcomes.push(QueryOutcome {
                    mode,
                    response,
                    elapsed,
                });
            }
            Err(err) => {
                metrics::record_query(mode.as_str(), false);
                error!(%mode, "Query failed: {}", err);
                return Err(match err {
                    Error::QueryError { .. } | Error::LifecycleError(_) => err,
                    other => Error::query(mode, other.to_string()),
                });
            }
        }
    }

    Ok(outcomes)
}

/// Print each outcome under a `{Mode} Search Result:` heading.
pub fn render_text<W: Write>(out: &mut W, outcomes: &[QueryOutcome]) -> std::io::Result<()> {
    for outcome in outcomes {
        writeln!(out, "\n{} Search Result:", outcome.mode.title())?;
        writeln!(out, "{}", outcome.response)?;
    }
    Ok(())
}

pub fn render_json<W: Write>(out: &mut W, outcomes: &[QueryOutcome]) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, outcomes)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(mode: RetrievalMode, response: &str) -> QueryOutcome {
        QueryOutcome {
            mode,
            response: response.to_string(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn text_output_has_mode_headings_in_order() {
        let outcomes = vec![
            outcome(RetrievalMode::Naive, "first"),
            outcome(RetrievalMode::Hybrid, "second"),
        ];
        let mut buf = Vec::new();
        render_text(&mut buf, &outcomes).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "\nNaive Search Result:\nfirst\n\nHybrid Search Result:\nsecond\n"
        );
    }

    #[test]
    fn json_output_lists_outcomes() {
        let mut buf = Vec::new();
        render_json(&mut buf, &[outcome(RetrievalMode::Global, "answer")]).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["mode"], "global");
        assert_eq!(value[0]["response"], "answer");
        assert_eq!(value[0]["elapsed_ms"], 1500);
    }

    #[test]
    fn empty_outcomes_render_nothing() {
        let mut buf = Vec::new();
        render_text(&mut buf, &[]).unwrap();
        assert!(buf.is_empty());
    }
}
