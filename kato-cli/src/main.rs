//! `kato` - a local smoke-test harness over the KATO `Processor`.
//!
//! ```bash
//! # Run a canned observe/learn/recall sequence, no setup required
//! kato demo
//!
//! # Drive one session interactively
//! kato repl
//!
//! # Drive a durable deployment across separate invocations
//! kato --surreal-endpoint ws://127.0.0.1:8000 --qdrant-url http://127.0.0.1:6334 \
//!     create-session
//! kato --surreal-endpoint ws://127.0.0.1:8000 --qdrant-url http://127.0.0.1:6334 \
//!     observe <session-id> a b c
//! ```
//!
//! This is not a network service - there is no HTTP/WebSocket surface here,
//! only a CLI that calls straight into `kato-engine`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kato_cli::commands::{self, DurableOpts};
use kato_cli::output::{self, OutputFormat};
use kato_cli::repl;
use kato_core::SessionConfigOverrides;

#[derive(Parser)]
#[command(name = "kato")]
#[command(about = "Local smoke-test harness for the KATO episodic pattern-matching engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Partition namespace for every session this invocation touches.
    #[arg(long, global = true, default_value = "default")]
    kb_id: String,

    /// SurrealDB endpoint; omit to use the in-process pattern/metadata/session
    /// stores (state does not survive past this invocation).
    #[arg(long, global = true)]
    surreal_endpoint: Option<String>,

    #[arg(long, global = true, default_value = "kato")]
    surreal_namespace: String,

    #[arg(long, global = true, default_value = "kato")]
    surreal_database: String,

    /// Qdrant URL; omit to use the in-process vector index.
    #[arg(long, global = true)]
    qdrant_url: Option<String>,

    #[arg(long, global = true, default_value = "kato_vectors")]
    qdrant_collection: String,

    #[arg(long, global = true, default_value_t = 128)]
    vector_size: u64,

    /// Pretty-print JSON output instead of the compact form.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a canned observe/learn/recall sequence in one process.
    Demo,

    /// Interactive REPL against a single session.
    Repl,

    /// Create a new session and print its id.
    CreateSession {
        #[arg(long)]
        max_pattern_length: Option<usize>,
        #[arg(long)]
        recall_threshold: Option<f64>,
        #[arg(long)]
        stm_capacity: Option<usize>,
    },

    /// Observe one event (a set of symbols) into an existing session.
    Observe {
        session_id: String,
        symbols: Vec<String>,
        #[arg(long = "emotive", value_name = "KEY=VALUE")]
        emotives: Vec<String>,
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Learn the session's current STM as a pattern.
    Learn { session_id: String },

    /// Predict against the session's current STM.
    Predict { session_id: String },

    /// Clear a session's STM without learning it.
    Clear { session_id: String },

    /// Fetch a learned pattern by name.
    GetPattern { name: String },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Plain };

    let durable = DurableOpts {
        surreal_endpoint: cli.surreal_endpoint.clone(),
        surreal_namespace: cli.surreal_namespace.clone(),
        surreal_database: cli.surreal_database.clone(),
        qdrant_url: cli.qdrant_url.clone(),
        qdrant_collection: cli.qdrant_collection.clone(),
        vector_size: cli.vector_size,
    };
    let processor = commands::build_processor(&cli.kb_id, &durable).await?;

    match cli.command {
        Commands::Demo => {
            let steps = commands::run_demo(&processor).await?;
            output::print(&steps, format)?;
        }
        Commands::Repl => {
            repl::run(&processor, format).await?;
        }
        Commands::CreateSession { max_pattern_length, recall_threshold, stm_capacity } => {
            let overrides = SessionConfigOverrides {
                max_pattern_length,
                recall_threshold,
                stm_capacity,
                ..Default::default()
            };
            let session_id = commands::create_session(&processor, overrides).await?;
            output::print(&serde_json::json!({"session_id": session_id}), format)?;
        }
        Commands::Observe { session_id, symbols, emotives, metadata } => {
            let obs = commands::build_observation(&symbols, &emotives, metadata.as_deref())?;
            let (stm_len, learned) = processor.observe(&session_id, obs).await?;
            output::print(&serde_json::json!({"stm_len": stm_len, "auto_learned": learned}), format)?;
        }
        Commands::Learn { session_id } => {
            let name = processor.learn(&session_id).await?;
            output::print(&serde_json::json!({"learned": name}), format)?;
        }
        Commands::Predict { session_id } => {
            let predictions = processor.predict(&session_id).await?;
            output::print(&predictions, format)?;
        }
        Commands::Clear { session_id } => {
            processor.clear_stm(&session_id).await?;
            output::info("STM cleared");
        }
        Commands::GetPattern { name } => {
            let pattern = processor.get_pattern(&name).await?;
            output::print(&pattern, format)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kato=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
