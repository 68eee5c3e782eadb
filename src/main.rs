//! # Secret Sync Controller
//!
//! Keeps sync objects reconciled against external secret managers.
//!
//! ## Overview
//!
//! The controller:
//!
//! 1. **Loads stores and sync objects** from a YAML manifest
//! 2. **Validates every store** periodically and caches its health
//! 3. **Reconciles every object**: pulls requested secrets, pushes cluster
//!    values and deletes keys that are no longer pushed
//! 4. **Holds back passes** against stores not known to be healthy
//!
//! Controller settings come from environment variables (see
//! [`ControllerConfig`](secret_sync_controller::config::ControllerConfig)).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use secret_sync_controller::config::{load_resources, ControllerConfig};
use secret_sync_controller::runtime::{self, InitOptions};

/// Secret Sync Controller
#[derive(Parser)]
#[command(name = "secret-sync-controller")]
#[command(
    about = "Sync secrets between external secret managers and the cluster",
    long_about = None,
    after_help = "\
Examples:
  secret-sync-controller run --resources resources.yaml
  secret-sync-controller check --resources resources.yaml
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Port of the metrics and probe server (overrides METRICS_PORT)
    #[arg(long, global = true)]
    metrics_port: Option<u16>,

    /// Passes allowed to run at once (overrides MAX_CONCURRENT_RECONCILIATIONS)
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Reconcile even when a store is not known healthy
    #[arg(long, global = true)]
    disable_flood_gate: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the environment
    fn apply(&self, config: &mut ControllerConfig) {
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(max) = self.max_concurrent {
            config.max_concurrent_reconciliations = max;
        }
        if self.disable_flood_gate {
            config.enable_flood_gate = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller until SIGINT/SIGTERM
    Run {
        /// Manifest of stores and sync objects
        #[arg(short, long, env = "RESOURCES_FILE", value_name = "PATH")]
        resources: PathBuf,

        /// Do not connect to a cluster; credential references will not resolve
        #[arg(long)]
        without_cluster: bool,
    },
    /// Check a manifest without contacting any backend
    Check {
        /// Manifest of stores and sync objects
        #[arg(short, long, env = "RESOURCES_FILE", value_name = "PATH")]
        resources: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ControllerConfig::from_env();
    cli.apply(&mut config);
    runtime::init_process(&config);

    match cli.command {
        Commands::Run {
            resources,
            without_cluster,
        } => {
            let options = InitOptions {
                resources,
                without_cluster,
            };
            let init = runtime::initialize(config, &options).await?;
            runtime::run(init).await
        }
        Commands::Check { resources } => {
            let manifest = load_resources(&resources)?;
            let registry = runtime::build_registry(&config)?;
            let problems = manifest.problems(&registry);
            if problems.is_empty() {
                println!(
                    "✅ {} stores and {} objects OK",
                    manifest.stores.len(),
                    manifest.objects.len()
                );
                return Ok(());
            }
            for problem in &problems {
                println!("❌ {problem}");
            }
            bail!("{} problems found", problems.len())
        }
    }
}
