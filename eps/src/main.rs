//! Endpoint Probe Sweeper - CLI entrypoint.
//!
//! Loads the run configuration and endpoint manifest, starts the memory
//! governor, runs the sweep, and writes the remediation report to disk.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use eps::orchestrator::{Orchestrator, RateLimitTarget};
use eps::transport::HttpTransport;
use eps_common::{Catalog, RunConfig};
use eps_telemetry::{GovernorConfig, MemoryGovernor, ProcSampler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "eps")]
#[command(author, version, about = "Endpoint probe sweeper - phased API probing with failure attribution")]
struct Cli {
    /// Path to run configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the target service; overrides the config file.
    #[arg(short, long)]
    base_url: Option<String>,

    /// Path to the endpoint manifest (TOML).
    #[arg(short, long)]
    manifest: PathBuf,

    /// Where to write the JSON report.
    #[arg(short, long, default_value = "eps-report.json")]
    output: PathBuf,

    /// Bearer token attached to every probe.
    #[arg(long, env = "EPS_AUTH_TOKEN")]
    token: Option<String>,

    /// Run the sequential rate-limit probe against this path after the sweep.
    #[arg(long)]
    rate_limit_path: Option<String>,

    /// Iteration cap for the rate-limit probe; overrides the config file.
    #[arg(long)]
    rate_limit_iterations: Option<u32>,

    /// Interval between memory governor samples, e.g. "500ms" or "2s".
    #[arg(long, default_value = "1s")]
    sample_interval: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Configuration: file (or defaults), then CLI overrides.
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(token) = cli.token {
        config.auth_token = Some(token);
    }
    if let Some(iterations) = cli.rate_limit_iterations {
        config.rate_limit_iterations = iterations;
    }
    config.validate_hard()?;
    for warning in config.validate() {
        warn!(field = warning.field, "{}", warning.message);
    }

    let catalog = Catalog::from_manifest_path(&cli.manifest)
        .with_context(|| format!("loading manifest from {}", cli.manifest.display()))?;
    info!(
        phases = catalog.phases().len(),
        endpoints = catalog.endpoint_count(),
        "Manifest loaded"
    );

    let sample_interval: Duration = cli
        .sample_interval
        .parse::<humantime::Duration>()
        .context("parsing --sample-interval")?
        .into();

    let governor = MemoryGovernor::spawn(
        Arc::new(ProcSampler::default()),
        GovernorConfig {
            threshold_percent: config.memory_threshold_percent,
            sample_interval,
            reclaim_hook: None,
        },
    );

    let transport = Arc::new(HttpTransport::new(config.per_request_timeout())?);

    // Ctrl-C requests a graceful stop: in-flight batches drain and the
    // report covers everything completed so far.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; draining in-flight probes");
            let _ = cancel_tx.send(true);
        }
    });

    let rate_limit = cli.rate_limit_path.map(|path| RateLimitTarget {
        path,
        iterations: config.rate_limit_iterations,
    });

    let orchestrator = Orchestrator::new(config, transport);
    let report = orchestrator
        .run(&catalog, Some(governor), cancel_rx, rate_limit)
        .await;

    eps::sink::write_report(&report, &cli.output)
        .with_context(|| format!("writing report to {}", cli.output.display()))?;

    for recommendation in &report.recommendations {
        info!(
            priority = %recommendation.priority,
            routes = %recommendation.routes.join(", "),
            outcome = %recommendation.outcome,
            count = recommendation.count,
            "{}",
            recommendation.guidance
        );
    }

    if report.run_aborted || report.has_critical() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
