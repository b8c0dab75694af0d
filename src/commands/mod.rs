//! Command implementations
//!
//! Each module corresponds to one lifecycle step driven by the CLI.

pub mod ingest;
pub mod query;
pub mod run;

// Re-export commonly used types
pub use ingest::{
    ingest_payload, load_payload, ContentSource, SampleFetcher, SampleSource, DEFAULT_SAMPLE_PATH,
    DEFAULT_SAMPLE_URL,
};
pub use query::{dispatch_queries, render_json, render_text, QueryOutcome, DEFAULT_QUESTION};
pub use run::{run, run_with_shutdown, RunPlan, RunReport, INGEST_NOTICE};
