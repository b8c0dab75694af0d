//! Prometheus metrics for a run.
//!
//! Exposes:
//! - `lightrag_neo4j_phase_duration_seconds` (histogram)
//! - `lightrag_neo4j_phase_total` (counter with status: ok, error, cancelled)
//! - `lightrag_neo4j_phase_inflight` (gauge)
//! - `lightrag_neo4j_query_total` (counter per retrieval mode and status)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Lifecycle phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Fetch,
    Ingest,
    Query,
    Finalize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialize => "initialize",
            Phase::Fetch => "fetch",
            Phase::Ingest => "ingest",
            Phase::Query => "query",
            Phase::Finalize => "finalize",
        }
    }
}

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static PHASE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~27 minutes; ingestion is slow.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 16).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "lightrag_neo4j_phase_duration_seconds",
        "Run phase duration in seconds",
        &["phase"],
        buckets
    )
    .expect("failed to register phase duration histogram")
});

static PHASE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lightrag_neo4j_phase_total",
        "Total phase executions by status",
        &["phase", "status"]
    )
    .expect("failed to register phase counter")
});

static PHASE_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "lightrag_neo4j_phase_inflight",
        "Number of in-flight phases",
        &["phase"]
    )
    .expect("failed to register inflight gauge")
});

static QUERY_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lightrag_neo4j_query_total",
        "Queries by retrieval mode and status",
        &["mode", "status"]
    )
    .expect("failed to register query counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&PHASE_DURATION);
    Lazy::force(&PHASE_TOTAL);
    Lazy::force(&PHASE_INFLIGHT);
    Lazy::force(&QUERY_TOTAL);
}

fn status_label(success: bool) -> &'static str {
    if success {
        "ok"
    } else {
        "error"
    }
}

fn phase_started(label: &str) {
    init_collectors();
    PHASE_INFLIGHT.with_label_values(&[label]).inc();
}

fn phase_finished(label: &str, start: Instant, status: &str) {
    PHASE_INFLIGHT.with_label_values(&[label]).dec();
    PHASE_DURATION
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    PHASE_TOTAL.with_label_values(&[label, status]).inc();
}

/// One in-flight phase execution.
///
/// Counts toward the inflight gauge until finished. Dropping it unfinished,
/// as happens when a shutdown cancels the phase future, records the phase
/// as `cancelled`.
pub struct PhaseTimer {
    label: &'static str,
    start: Instant,
    finished: bool,
}

impl PhaseTimer {
    pub fn start(phase: Phase) -> Self {
        Self::labelled(phase.as_str())
    }

    fn labelled(label: &'static str) -> Self {
        phase_started(label);
        Self {
            label,
            start: Instant::now(),
            finished: false,
        }
    }

    /// Record completion with duration and status.
    pub fn finish(mut self, success: bool) {
        self.finished = true;
        phase_finished(self.label, self.start, status_label(success));
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        if !self.finished {
            phase_finished(self.label, self.start, "cancelled");
        }
    }
}

pub fn record_query(mode: &str, success: bool) {
    init_collectors();
    QUERY_TOTAL
        .with_label_values(&[mode, status_label(success)])
        .inc();
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "encode error",
        ));
    }

    let mut response = text_response(StatusCode::OK, buffer);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(text_response(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Bind and spawn the metrics HTTP endpoint. Returns the bound address.
pub async fn spawn_metrics_server(addr: SocketAddr) -> anyhow::Result<SocketAddr> {
    init_collectors();
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "Prometheus metrics endpoint started");

    tokio::spawn(async move {
        if let Err(err) = serve(listener).await {
            error!(addr = %local, "Metrics server failed: {}", err);
        }
    });
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    // Counters are process-wide, so each test works on its own label values
    // or asserts lower bounds.

    #[test]
    fn records_phase_metrics() {
        let timer = PhaseTimer::start(Phase::Fetch);
        assert!(PHASE_INFLIGHT.with_label_values(&["fetch"]).get() >= 1);

        timer.finish(true);

        assert!(PHASE_TOTAL.with_label_values(&["fetch", "ok"]).get() >= 1);
        assert!(
            PHASE_DURATION
                .with_label_values(&["fetch"])
                .get_sample_count()
                >= 1
        );
    }

    #[test]
    fn records_failed_phase() {
        PhaseTimer::labelled("test_failed_phase").finish(false);

        assert_eq!(PHASE_TOTAL.with_label_values(&["test_failed_phase", "error"]).get(), 1);
        assert_eq!(PHASE_INFLIGHT.with_label_values(&["test_failed_phase"]).get(), 0);
    }

    #[test]
    fn dropped_timer_releases_inflight() {
        let timer = PhaseTimer::labelled("test_dropped_phase");
        assert_eq!(PHASE_INFLIGHT.with_label_values(&["test_dropped_phase"]).get(), 1);

        drop(timer);

        assert_eq!(PHASE_INFLIGHT.with_label_values(&["test_dropped_phase"]).get(), 0);
        let total = |status: &str| {
            PHASE_TOTAL
                .with_label_values(&["test_dropped_phase", status])
                .get()
        };
        assert_eq!(total("cancelled"), 1);
        assert_eq!(total("error"), 0);
    }

    #[tokio::test]
    async fn cancelled_phase_future_releases_inflight() {
        let phase = async {
            let _timer = PhaseTimer::labelled("test_cancelled_phase");
            std::future::pending::<()>().await
        };

        tokio::select! {
            biased;
            _ = phase => unreachable!("pending never completes"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
        }

        assert_eq!(PHASE_INFLIGHT.with_label_values(&["test_cancelled_phase"]).get(), 0);
        assert_eq!(
            PHASE_TOTAL
                .with_label_values(&["test_cancelled_phase", "cancelled"])
                .get(),
            1
        );
    }

    #[test]
    fn records_query_per_mode() {
        record_query("test_mode_label", true);
        record_query("test_mode_label", true);
        record_query("test_mode_label", false);

        assert_eq!(QUERY_TOTAL.with_label_values(&["test_mode_label", "ok"]).get(), 2);
        assert_eq!(QUERY_TOTAL.with_label_values(&["test_mode_label", "error"]).get(), 1);
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        PhaseTimer::start(Phase::Ingest).finish(true);

        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(CONTENT_TYPE).expect("content type");
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body");
        assert!(text.contains("lightrag_neo4j_phase_total"));
        assert!(text.contains("lightrag_neo4j_phase_duration_seconds"));
        assert!(text.contains("phase=\"ingest\""));
    }

    #[tokio::test]
    async fn server_answers_on_metrics_path() {
        PhaseTimer::start(Phase::Query).finish(true);
        let addr = spawn_metrics_server("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind");

        let body = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert!(body.contains("lightrag_neo4j_phase_inflight"));

        let missing = reqwest::get(format!("http://{addr}/other")).await.expect("request");
        assert_eq!(missing.status().as_u16(), 404);
    }
}
