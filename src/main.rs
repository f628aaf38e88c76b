//! svckit: admission-controlled service toolkit.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request       ┌──────────────────────────────────────────────┐
//!     ─────────────────────┼─▶ http::HttpService                          │
//!                          │     TraceLayer → TimeoutLayer → admission    │
//!                          │                                  │           │
//!                          │                                  ▼           │
//!                          │   admission: Gate + DoneSignal + Drain       │
//!                          │      ▲            ▲             ▲           │
//!                          │      │            │             │           │
//!                          │  http::HttpClient db::SqlDb  db::CachePool   │
//!                          │                                              │
//!                          │  Cross-cutting: config, observability,       │
//!                          │  lifecycle (signals, shutdown, pid file)     │
//!                          └──────────────────────────────────────────────┘
//! ```

use axum::{extract::State, routing::get, Json, Router};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use svckit::admission::{AdmissionControl, Notifier};
use svckit::config::{load_config, ToolkitConfig};
use svckit::db::SqlDb;
use svckit::http::HttpService;
use svckit::idgen::{IdGenerator, MemoryIdGen, SqlIdGen};
use svckit::lifecycle::{shutdown_signal, PidFile, Shutdown};
use svckit::observability::{init_logging, metrics, spawn_reopen_task};
use svckit::util::token;

#[derive(Parser)]
#[command(name = "svckit")]
#[command(about = "Admission-controlled service toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo HTTP service
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print generated ids
    GenId {
        #[arg(short, long, value_enum, default_value_t = Backend::Memory)]
        backend: Backend,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// TOML configuration file (sqlite backend reads the [sql] section)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Table backing the sqlite generator
        #[arg(long, default_value = "ids")]
        table: String,
    },
    /// Print a random token
    Token,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Memory,
    Sqlite,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(read_config(config.as_deref())?).await,
        Commands::GenId {
            backend,
            count,
            config,
            table,
        } => gen_id(read_config(config.as_deref())?, backend, count, &table).await,
        Commands::Token => {
            println!("{}", token::generate());
            Ok(())
        }
    }
}

fn read_config(path: Option<&std::path::Path>) -> Result<ToolkitConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => load_config(path)?,
        None => ToolkitConfig::default(),
    })
}

async fn serve(config: ToolkitConfig) -> Result<(), Box<dyn std::error::Error>> {
    let logging = init_logging(&config.observability)?;

    tracing::info!("svckit v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.service.bind_address,
        capacity = config.service.admission.capacity,
        hesitation_ms = config.service.admission.hesitation_ms,
        busy_status = config.service.busy_status,
        "Configuration loaded"
    );

    // Initialize metrics server
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let _pid_file = config.pid_file.as_deref().map(PidFile::create).transpose()?;

    if let Some(file) = logging.log_file() {
        let notifier = Notifier::new();
        spawn_reopen_task(file.clone(), notifier.clone());
        #[cfg(unix)]
        svckit::lifecycle::spawn_reopen_on_sigusr1(notifier)?;
    }

    let admission = Arc::new(OnceLock::new());
    let service = HttpService::bind(demo_router(Arc::clone(&admission)), &config.service).await?;
    if admission.set(service.admission().clone()).is_err() {
        tracing::warn!("Admission snapshot source already set");
    }
    let shutdown = Shutdown::new();
    shutdown.register(service.admission());
    service.start();
    tracing::info!(address = %service.local_addr(), "Listening for connections");

    let stopped = service.stopped();
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = stopped.wait() => tracing::warn!("Serve loop ended before shutdown was requested"),
    }

    let grace = config.shutdown.grace_period();
    shutdown.trigger();
    if let Err(e) = shutdown.drain(grace).await {
        tracing::warn!(error = %e, "Exiting with requests still in flight");
    }
    if tokio::time::timeout(grace, stopped.wait()).await.is_err() {
        tracing::warn!("Serve loop did not finish within the grace period");
    }

    if let Some(err) = service.error() {
        return Err(err.to_string().into());
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn gen_id(
    config: ToolkitConfig,
    backend: Backend,
    count: usize,
    table: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let _logging = init_logging(&config.observability)?;

    let gen: Box<dyn IdGenerator> = match backend {
        Backend::Memory => Box::new(MemoryIdGen::new()),
        Backend::Sqlite => Box::new(SqlIdGen::open(SqlDb::new(&config.sql), table).await?),
    };
    for _ in 0..count {
        println!("{}", gen.next_id(None).await?);
    }
    gen.close().await;
    Ok(())
}

#[derive(Clone)]
struct DemoState {
    ids: Arc<MemoryIdGen>,
    /// Filled in once the service is bound.
    admission: Arc<OnceLock<AdmissionControl>>,
}

/// Demo routes served by `svckit serve`.
fn demo_router(admission: Arc<OnceLock<AdmissionControl>>) -> Router {
    let state = DemoState {
        ids: Arc::new(MemoryIdGen::new()),
        admission,
    };
    Router::new()
        .route("/", get(|| async { "svckit\n" }))
        .route("/token", get(|| async { token::generate() }))
        .route("/id", get(next_id))
        .route("/stats", get(stats))
        .route("/slow", get(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "done\n"
        }))
        .with_state(state)
}

async fn next_id(State(state): State<DemoState>) -> String {
    match state.ids.next_id(None).await {
        Ok(id) => id.to_string(),
        Err(e) => e.to_string(),
    }
}

async fn stats(State(state): State<DemoState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "admission": state.admission.get().map(AdmissionControl::snapshot),
    }))
}
