//! Tailwatch - real-time log file monitoring with sliding-window alerts.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tailwatch::cli::{Cli, LogFormat};
use tailwatch::config::{Config, RuntimeConfig};
use tailwatch::metrics::initialize_metrics;
use tailwatch::{LogAnalyzer, MetricsServer, MonitorEngine};

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    if let Some(path) = &cli.analyze {
        return run_analysis(&cli, path);
    }

    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    info!("Validating configuration");
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(error_count = errors.len(), "Configuration validation failed");
        std::process::exit(1);
    }

    if cli.validate {
        println!("Configuration is valid: {}", cli.config.display());
        println!("  Source: {}", config.source.path.display());
        println!(
            "  Patterns: {} custom ({} enabled), defaults {}",
            config.patterns.custom.len(),
            config.patterns.custom.iter().filter(|p| p.enabled).count(),
            if config.patterns.include_defaults {
                "included"
            } else {
                "excluded"
            }
        );
        println!(
            "  Handlers: log {}, {} webhook(s)",
            if config.handlers.log { "on" } else { "off" },
            config.handlers.webhooks.len()
        );
        println!(
            "  Metrics: {} (port {})",
            if config.metrics.enabled {
                "enabled"
            } else {
                "disabled"
            },
            config.metrics.port
        );
        return Ok(());
    }

    let runtime_config = config.compile()?;

    info!(
        path = %runtime_config.path.display(),
        pattern_count = runtime_config.patterns.len(),
        "tailwatch starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(runtime_config))
}

/// Batch mode: analyze the file with the configured patterns when a config
/// file is present, otherwise with the default catalogue. A config file that
/// exists but cannot be loaded is fatal.
fn run_analysis(cli: &Cli, path: &std::path::Path) -> Result<()> {
    let analyzer = if cli.config.exists() {
        let config = match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
                std::process::exit(1);
            }
        };
        if let Err(errors) = config.validate() {
            for e in &errors {
                error!(error = %e, "Configuration validation error");
            }
            std::process::exit(1);
        }
        LogAnalyzer::new(config.compile()?.patterns)
    } else {
        info!(
            path = %cli.config.display(),
            "No configuration file, analyzing with default patterns"
        );
        LogAnalyzer::default()
    };

    let report = analyzer.analyze(path, cli.time_range())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(runtime_config: RuntimeConfig) -> Result<()> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let handlers = match runtime_config.build_handlers(http_client) {
        Ok(handlers) => handlers,
        Err(errors) => {
            for e in &errors {
                error!(error = %e, "Failed to build alert handler");
            }
            anyhow::bail!("{} alert handler(s) could not be built", errors.len());
        }
    };

    let cancel = CancellationToken::new();

    let metrics_handle = if runtime_config.metrics.enabled {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let server = MetricsServer::with_ready_signal(runtime_config.metrics.port, ready_tx);
        let cancel_metrics = cancel.clone();
        info!(port = runtime_config.metrics.port, "Starting metrics server");
        let handle = tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
        if ready_rx.await.is_ok() {
            let pattern_names: Vec<&str> =
                runtime_config.patterns.iter().map(|p| p.name()).collect();
            let handler_names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
            initialize_metrics(&pattern_names, &handler_names);
        }
        Some(handle)
    } else {
        info!("Metrics server disabled");
        None
    };

    let engine = MonitorEngine::from_config(&runtime_config, handlers)?;

    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown");
        cancel_signal.cancel();
    });

    let result = engine.run(cancel.clone()).await;
    cancel.cancel();

    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    let summary = engine.metrics_summary();
    info!(
        lines_processed = summary.lines_processed,
        active_alerts = summary.active_alerts.len(),
        "tailwatch shutdown complete"
    );

    result.map_err(|e| anyhow::anyhow!("Engine error: {}", e))
}
