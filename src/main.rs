//! LightRAG + Neo4j CLI - main entry point
//!
//! Resolves configuration, then drives the engine through its lifecycle.

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lightrag_neo4j::commands::{
    self, render_json, render_text, ContentSource, RunPlan, RunReport, SampleFetcher,
    SampleSource, DEFAULT_QUESTION, DEFAULT_SAMPLE_PATH, DEFAULT_SAMPLE_URL,
};
use lightrag_neo4j::error::EXIT_CONFIG_ERROR;
use lightrag_neo4j::{metrics, LightRagServer, QueryParam, RagSettings, Result, RetrievalMode};

#[derive(Parser)]
#[command(name = "lightrag_neo4j")]
#[command(about = "Ingest a document into LightRAG on Neo4j and query it", long_about = None)]
#[command(version)]
struct Cli {
    /// Extra .env file to load before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// YAML config file; flags and environment take precedence
    #[arg(long, global = true, env = "LIGHTRAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, global = true, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// Engine working directory
    #[arg(long, global = true, env = "WORKING_DIR")]
    working_dir: Option<String>,

    /// Graph storage: neo4j | networkx
    #[arg(long, global = true, env = "LIGHTRAG_GRAPH_STORAGE")]
    storage: Option<String>,

    #[arg(long, global = true, env = "NEO4J_URI")]
    neo4j_uri: Option<String>,

    #[arg(long, global = true, env = "NEO4J_USERNAME")]
    neo4j_user: Option<String>,

    #[arg(long, global = true, env = "NEO4J_PASSWORD", hide_env_values = true)]
    neo4j_password: Option<String>,

    #[arg(long, global = true, env = "NEO4J_DATABASE")]
    neo4j_database: Option<String>,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true, env = "OPENAI_API_BASE")]
    openai_base_url: Option<String>,

    #[arg(long, global = true, env = "LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, global = true, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Skip the model catalogue lookup during initialization
    #[arg(long, global = true, default_value_t = false)]
    skip_model_check: bool,

    /// LightRAG server base URL
    #[arg(long, global = true, env = "LIGHTRAG_SERVER_URL")]
    server_url: Option<String>,

    #[arg(long, global = true, env = "LIGHTRAG_API_KEY", hide_env_values = true)]
    server_api_key: Option<String>,
}

impl SettingsArgs {
    fn into_settings(self) -> RagSettings {
        RagSettings {
            working_dir: self.working_dir,
            storage: self.storage,
            neo4j_uri: self.neo4j_uri,
            neo4j_user: self.neo4j_user,
            neo4j_password: self.neo4j_password,
            neo4j_database: self.neo4j_database,
            openai_api_key: self.openai_api_key,
            openai_base_url: self.openai_base_url,
            llm_model: self.llm_model,
            embedding_model: self.embedding_model,
            verify_models: self.skip_model_check.then_some(false),
            server_url: self.server_url,
            server_api_key: self.server_api_key,
            ..RagSettings::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Ingest this file instead of the sample text
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Sample text to download when no input is given
    #[arg(long, default_value = DEFAULT_SAMPLE_URL)]
    sample_url: String,

    /// Where the downloaded sample is cached
    #[arg(long, default_value = DEFAULT_SAMPLE_PATH)]
    sample_path: PathBuf,
}

impl Default for SourceArgs {
    fn default() -> Self {
        Self {
            input: None,
            sample_url: DEFAULT_SAMPLE_URL.to_string(),
            sample_path: PathBuf::from(DEFAULT_SAMPLE_PATH),
        }
    }
}

impl SourceArgs {
    fn into_source(self) -> ContentSource {
        match self.input {
            Some(path) => ContentSource::File(path),
            None => ContentSource::Sample(SampleSource {
                url: self.sample_url,
                path: self.sample_path,
            }),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Question asked in every mode
    #[arg(short, long, default_value = DEFAULT_QUESTION)]
    question: String,

    /// Retrieval modes, in order (comma-separated or repeated)
    #[arg(
        short,
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = RetrievalMode::DEFAULT_SEQUENCE.to_vec()
    )]
    mode: Vec<RetrievalMode>,

    /// Number of entities/relations to retrieve
    #[arg(long)]
    top_k: Option<usize>,

    /// Answer format hint (e.g. "Multiple Paragraphs", "Bullet Points")
    #[arg(long)]
    response_type: Option<String>,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Default for QueryArgs {
    fn default() -> Self {
        Self {
            question: DEFAULT_QUESTION.to_string(),
            mode: RetrievalMode::DEFAULT_SEQUENCE.to_vec(),
            top_k: None,
            response_type: None,
            json: false,
        }
    }
}

impl QueryArgs {
    fn template(&self) -> QueryParam {
        QueryParam {
            top_k: self.top_k,
            response_type: self.response_type.clone(),
            ..QueryParam::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize, ingest, query every mode, finalize (default)
    Run {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Initialize, ingest, finalize
    Ingest {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Initialize, query, finalize
    Query {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Initialize and finalize only
    Check,
}

impl Commands {
    /// Lifecycle plan plus whether results go out as JSON.
    fn into_plan(self) -> (RunPlan, bool) {
        match self {
            Commands::Run { source, query } => build_plan(Some(source), Some(query)),
            Commands::Ingest { source } => build_plan(Some(source), None),
            Commands::Query { query } => build_plan(None, Some(query)),
            Commands::Check => build_plan(None, None),
        }
    }
}

fn build_plan(source: Option<SourceArgs>, query: Option<QueryArgs>) -> (RunPlan, bool) {
    let source = source.map(SourceArgs::into_source);
    match query {
        Some(query) => {
            let template = query.template();
            let plan = RunPlan {
                source,
                question: query.question,
                modes: query.mode,
                template,
            };
            (plan, query.json)
        }
        None => {
            let plan = RunPlan {
                source,
                question: DEFAULT_QUESTION.to_string(),
                modes: Vec::new(),
                template: QueryParam::default(),
            };
            (plan, false)
        }
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "lightrag_neo4j=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    let mut cli = Cli::parse();
    if let Some(path) = cli.env_file.clone() {
        if let Err(err) = dotenvy::from_path(&path) {
            eprintln!("Error: cannot load {}: {}", path.display(), err);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
        // Re-read so env-backed flags see the file's values.
        cli = Cli::parse();
    }

    init_tracing();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let file_settings = match cli.config.as_deref() {
        Some(path) => RagSettings::load_from_file(path)?,
        None => RagSettings::default(),
    };
    let config = cli.settings.into_settings().merge(file_settings).resolve()?;

    if let Some(addr) = cli.metrics_addr.as_deref() {
        start_metrics(addr).await;
    }

    let command = cli.command.unwrap_or(Commands::Run {
        source: SourceArgs::default(),
        query: QueryArgs::default(),
    });
    let (plan, json) = command.into_plan();

    let fetcher = SampleFetcher::new()?;
    // No progress lines in JSON output.
    let mut progress: Box<dyn Write> = if json {
        Box::new(std::io::sink())
    } else {
        Box::new(std::io::stdout())
    };
    let report =
        commands::run(&config, &plan, LightRagServer::new, &fetcher, &mut progress).await?;

    print_report(&report, json)?;
    Ok(())
}

async fn start_metrics(addr: &str) {
    match addr.parse::<SocketAddr>() {
        Ok(socket) => {
            if let Err(err) = metrics::spawn_metrics_server(socket).await {
                warn!(%addr, "Metrics endpoint unavailable: {}", err);
            }
        }
        Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if let Some(source) = report.ingested.as_deref() {
        info!(source, "Document ingested");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        render_json(&mut out, &report.outcomes)?;
    } else {
        render_text(&mut out, &report.outcomes)?;
    }
    out.flush()?;
    Ok(())
}
