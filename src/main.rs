//! trending-ingest binary entrypoint.
//! One-shot runs for an external scheduler, or a long-running `serve` mode with
//! its own schedule and a small status/metrics HTTP surface.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trending_ingest::history::RunHistory;
use trending_ingest::supply::{export, files::FileSupplier, RawSupplier};
use trending_ingest::telemetry::Metrics;
use trending_ingest::{api, scheduler, IngestConfig, Pipeline, Store};

#[derive(Parser, Debug)]
#[command(name = "trending-ingest", version, about = "Incremental upsert ingestion of trending-video snapshots")]
struct Cli {
    /// Config file (TOML or JSON); defaults to $INGEST_CONFIG_PATH or config/ingest.{toml,json}
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once and print the run report as JSON
    Run,
    /// Run on a schedule and serve /health, /metrics, /status, /runs, POST /run
    Serve,
    /// Write the cleaned CSV (facts joined with category titles)
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the latest committed trending day
    Watermark,
}

/// Compact logs by default; `INGEST_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("INGEST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<IngestConfig, trending_ingest::IngestError> {
    match path {
        Some(p) => IngestConfig::load_from(p)?.with_env_overrides(),
        None => IngestConfig::load_default(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = match load_config(cli.config.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(target: "ingest", error = %e, "cannot load configuration");
            return ExitCode::from(e.kind().exit_code());
        }
    };

    match cli.command {
        Command::Run => run_once(&cfg).await,
        Command::Serve => match serve(cfg).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(target: "ingest", error = ?e, "serve failed");
                ExitCode::FAILURE
            }
        },
        Command::Export { out } => match export_cleaned(&cfg, out).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(target: "ingest", error = ?e, "export failed");
                ExitCode::FAILURE
            }
        },
        Command::Watermark => print_watermark(&cfg),
    }
}

async fn run_once(cfg: &IngestConfig) -> ExitCode {
    let pipeline = match Pipeline::from_config(cfg) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(target: "ingest", error = %e, "could not open the store");
            return ExitCode::from(e.kind().exit_code());
        }
    };
    let report = pipeline.run_once().await;
    match serde_json::to_string_pretty(&report) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::warn!(target: "ingest", error = %e, "report not printable"),
    }
    match report.error_kind() {
        None => ExitCode::SUCCESS,
        Some(kind) => ExitCode::from(kind.exit_code()),
    }
}

async fn serve(cfg: IngestConfig) -> anyhow::Result<()> {
    let metrics = Metrics::install().context("installing prometheus recorder")?;
    let pipeline = Arc::new(Pipeline::from_config(&cfg).context("opening store")?);
    let history = Arc::new(RunHistory::with_capacity(cfg.history_cap));

    let _ticker = scheduler::spawn_scheduler(
        pipeline.clone(),
        history.clone(),
        Duration::from_secs(cfg.schedule_interval_secs),
    );

    let app = api::router(api::AppState {
        pipeline,
        history,
        metrics: metrics.handle.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;
    tracing::info!(target: "ingest", addr = %cfg.listen_addr, every_secs = cfg.schedule_interval_secs, "serving");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}

async fn export_cleaned(cfg: &IngestConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let supplier = FileSupplier::from_config(cfg);
    let batch = supplier.fetch().await?;
    let path = out.unwrap_or_else(|| cfg.processed_path.clone());
    let summary = export::write_cleaned(&batch.categories, &batch.observations, &path)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn print_watermark(cfg: &IngestConfig) -> ExitCode {
    let opts = trending_ingest::store::StoreOptions {
        busy_timeout: Duration::from_millis(cfg.busy_timeout_ms),
    };
    match Store::open(&cfg.database_path, opts).and_then(|s| s.watermark()) {
        Ok(Some(d)) => {
            println!("{d}");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("none");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(target: "ingest", error = %e, "cannot read watermark");
            ExitCode::from(e.kind().exit_code())
        }
    }
}
