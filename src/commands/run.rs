//! Full lifecycle: construct, initialize, ingest, query, finalize.
//!
//! Finalization runs on every exit path once a backend exists, including
//! failures in any phase and a shutdown signal arriving mid-phase.

use std::future::Future;
use std::io::Write;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::ingest::{ingest_payload, load_payload, ContentSource, SampleFetcher};
use super::query::{dispatch_queries, QueryOutcome, DEFAULT_QUESTION};
use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::lightrag::{BackendHandle, QueryParam, RagBackend, RetrievalMode};
use crate::metrics::{Phase, PhaseTimer};
use crate::session::WorkingDirLock;

/// What a run should do once the backend is active.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Payload to ingest; `None` skips ingestion
    pub source: Option<ContentSource>,
    pub question: String,
    /// Modes to query, in order; empty skips querying
    pub modes: Vec<RetrievalMode>,
    /// Options shared by every query
    pub template: QueryParam,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            source: Some(ContentSource::Sample(Default::default())),
            question: DEFAULT_QUESTION.to_string(),
            modes: RetrievalMode::DEFAULT_SEQUENCE.to_vec(),
            template: QueryParam::default(),
        }
    }
}

/// Line written to the progress output once the document is ingested.
pub const INGEST_NOTICE: &str = "Content inserted successfully!";

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Source label of the ingested document
    pub ingested: Option<String>,
    pub outcomes: Vec<QueryOutcome>,
}

/// Execute the plan, finalizing on Ctrl-C as well.
///
/// Progress lines go to `out` as phases complete.
pub async fn run<B, F, W>(
    config: &RagConfig,
    plan: &RunPlan,
    construct: F,
    fetcher: &SampleFetcher,
    out: &mut W,
) -> Result<RunReport>
where
    B: RagBackend,
    F: FnOnce(&RagConfig) -> Result<B>,
    W: Write,
{
    run_with_shutdown(config, plan, construct, fetcher, ctrl_c(), out).await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Interrupt received"),
        Err(err) => {
            error!("Cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await
        }
    }
}

/// Execute the plan until it completes or `shutdown` resolves.
///
/// A construction failure is returned as is, since there is nothing to
/// finalize. Otherwise the backend is finalized exactly once. A
/// finalization error is only returned when the run itself succeeded.
pub async fn run_with_shutdown<B, F, S, W>(
    config: &RagConfig,
    plan: &RunPlan,
    construct: F,
    fetcher: &SampleFetcher,
    shutdown: S,
    out: &mut W,
) -> Result<RunReport>
where
    B: RagBackend,
    F: FnOnce(&RagConfig) -> Result<B>,
    S: Future<Output = ()>,
    W: Write,
{
    let span = info_span!("run", run_id = %Uuid::new_v4());

    async move {
        config.prepare_working_dir()?;
        let _lock = WorkingDirLock::acquire(&config.working_dir)?;

        let mut handle = BackendHandle::new(construct(config)?);
        info!(
            working_dir = %config.working_dir.display(),
            storage = config.storage.class_name(),
            "Backend constructed"
        );

        let outcome = tokio::select! {
            result = drive(&mut handle, plan, fetcher, out) => result,
            _ = shutdown => {
                warn!("Shutdown requested, abandoning the current phase");
                Err(Error::Interrupted)
            }
        };

        let finalized = timed(Phase::Finalize, handle.finalize()).await;
        match (outcome, finalized) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(fin)) => {
                error!("{}", fin);
                Err(fin)
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(fin)) => {
                error!("{} (after: {})", fin, err);
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

async fn drive<B: RagBackend, W: Write>(
    handle: &mut BackendHandle<B>,
    plan: &RunPlan,
    fetcher: &SampleFetcher,
    out: &mut W,
) -> Result<RunReport> {
    timed(Phase::Initialize, handle.initialize()).await?;

    let mut report = RunReport::default();

    if let Some(source) = &plan.source {
        let payload = timed(Phase::Fetch, load_payload(fetcher, source)).await?;
        let label = source.label();
        timed(Phase::Ingest, ingest_payload(handle, &payload, &label)).await?;
        writeln!(out, "{}", INGEST_NOTICE)?;
        out.flush()?;
        report.ingested = Some(label);
    }

    if !plan.modes.is_empty() {
        report.outcomes = timed(
            Phase::Query,
            dispatch_queries(handle, &plan.question, &plan.modes, &plan.template),
        )
        .await?;
    }

    Ok(report)
}

async fn timed<T>(phase: Phase, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let timer = PhaseTimer::start(phase);
    let result = fut.await;
    timer.finish(result.is_ok());
    result
}
