//! SQL Exporter Binary Entry Point
//!
//! Runs configured SQL queries on a schedule and serves the results on
//! `/metrics`. Core functionality is provided by the `sql_exporter` library crate.

use clap::{Parser, Subcommand};
use sql_exporter::{
    config::{AppConfig, load_env_file},
    database::QueryExecutor,
    engine::CollectionEngine,
    server::{AppState, create_router},
};
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// SQL Exporter - SQL query results as Prometheus metrics
#[derive(Parser, Debug)]
#[command(name = "sql-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "config/config.yaml",
        env = "SQL_EXPORTER_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, global = true, env = "EXPORTER_HOST")]
    host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, global = true, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start collecting and serve metrics over HTTP (default)
    Run,
    /// Run one collection cycle and print the resulting metrics
    Collect {
        /// Only run this query
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Test every database connection
    Test,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Values from a `.env` file become visible to clap and to `${VAR}` expansion.
    let env_file = load_env_file(Path::new(".env"));
    let cli = Cli::parse();

    // Load configuration first; the log level comes from it.
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(host) = cli.host {
        config.exporter.host = host;
    }
    if let Some(port) = cli.port {
        config.exporter.port = port;
    }
    if let Some(level) = cli.log_level {
        config.exporter.log_level = level;
    }
    config.validate()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.exporter.log_directive())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match env_file {
        Ok(true) => tracing::debug!("Loaded environment from .env"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env"),
    }
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    tracing::info!(
        config = %cli.config,
        databases = config.databases.len(),
        queries = config.queries.len(),
        "Configuration loaded"
    );

    let executor = Arc::new(QueryExecutor::from_config(&config.databases)?);

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, Arc::clone(&executor)).await,
        Command::Collect { query } => collect(config, Arc::clone(&executor), query).await,
        Command::Test => Ok(test_connections(&executor).await),
    };

    executor.close().await;
    result
}

/// Collect continuously and serve metrics until a shutdown signal arrives.
async fn run(
    config: AppConfig,
    executor: Arc<QueryExecutor>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing::info!("SQL Exporter starting");

    // Unreachable databases are logged but do not block startup.
    executor.test_all_connections().await;

    let mut engine = CollectionEngine::new(config.queries, executor)?;

    let addr: SocketAddr = format!("{}:{}", config.exporter.host, config.exporter.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let app_state = AppState {
        registry: Arc::clone(engine.registry()),
        jobs: engine.jobs().clone(),
    };
    let app = create_router(app_state);
    engine.start()?;

    tracing::info!("Metrics available at: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down collection jobs...");
    let report = engine.stop(config.exporter.shutdown_timeout).await;
    if !report.is_clean() {
        tracing::warn!(abandoned = ?report.abandoned, "Some jobs did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

/// Run a single collection and print outcomes and metrics.
async fn collect(
    config: AppConfig,
    executor: Arc<QueryExecutor>,
    query: Option<String>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let failed: Vec<String> = executor
        .test_all_connections()
        .await
        .into_iter()
        .filter_map(|(name, result)| result.err().map(|e| format!("{name}: {e}")))
        .collect();
    if !failed.is_empty() {
        for line in &failed {
            eprintln!("connection failed: {line}");
        }
        return Ok(ExitCode::FAILURE);
    }

    let engine = CollectionEngine::new(config.queries, executor)?;
    for (name, outcome) in engine.collect_once(query.as_deref()).await? {
        println!("# {name}: {outcome}");
    }
    print!("{}", engine.registry().render()?);

    Ok(ExitCode::SUCCESS)
}

/// Print PASS/FAIL per database.
async fn test_connections(executor: &QueryExecutor) -> ExitCode {
    let results = executor.test_all_connections().await;
    let mut all_passed = true;

    for (name, result) in &results {
        match result {
            Ok(()) => println!("PASS  {name}"),
            Err(e) => {
                all_passed = false;
                println!("FAIL  {name}: {e}");
            }
        }
    }

    if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
