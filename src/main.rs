// Main entrypoint for the listlru stress driver.

use anyhow::{Context, Result};
use clap::Parser;
use listlru::config::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CONFIG_PATH: &str = "cfg/listlru.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/listlru.cfg.local.yaml";

/// listlru - stress driver for per-node, per-cgroup shrinkable lists
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Skip printing the Prometheus scrape at exit
    #[arg(long)]
    no_metrics: bool,
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        info!(
            component = "config",
            event = "load_success",
            path = ?custom_path,
            "config loaded"
        );
        return Ok(cfg);
    }

    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => {
            info!(
                component = "config",
                event = "load_success",
                path = CONFIG_PATH_LOCAL,
                "config loaded"
            );
            Ok(cfg)
        }
        Err(_) => {
            let cfg = Config::load(PathBuf::from(CONFIG_PATH))
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            info!(
                component = "config",
                event = "load_success",
                path = CONFIG_PATH,
                "config loaded"
            );
            Ok(cfg)
        }
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        // Production: JSON format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        // Development: Pretty console format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Install the recorder before any list exists so no sample is lost.
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            listlru::metrics::describe();
            Some(handle)
        }
        Err(e) => {
            eprintln!("Warning: Failed to install Prometheus recorder: {}", e);
            None
        }
    };

    let cfg = load_cfg(args.cfg)?;
    configure_logger(&cfg);

    if cfg.stress().threads == 0 {
        info!(
            component = "main",
            event = "num_cpus_configured",
            num_cpus = num_cpus::get(),
            "Worker threads configured (one per available core)"
        );
    } else {
        warn!(
            component = "main",
            event = "num_cpus_configured",
            num_cpus = cfg.stress().threads,
            "Worker threads configured"
        );
    }

    let shutdown_token = CancellationToken::new();
    let report = listlru::stress::run(cfg.lru(), cfg.stress(), &shutdown_token)
        .context("stress run failed")?;

    info!(
        component = "main",
        event = "stress_done",
        threads = report.threads,
        added = report.added,
        deleted = report.deleted,
        isolated = report.isolated,
        walks = report.walks,
        reparented_memcgs = report.reparented_memcgs,
        reparented_items = report.reparented_items,
        final_count = report.final_count,
        "stress run completed"
    );

    if let (Some(handle), false) = (prometheus, args.no_metrics) {
        println!("{}", handle.render());
    }

    Ok(())
}
