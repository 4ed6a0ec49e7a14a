//! # Slonictl Binary
//!
//! Command-line entrypoint: converge a Slony-I replication cluster to the
//! state declared in a manifest.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slonictl_bin::apply;
use slonictl_config::manifest::Manifest;
use slonictl_config::secrets;
use slonictl_core::Reconciler;
use slonictl_script::{RecordingRunner, ScriptRunner, SlonikRunner};
use slonictl_store::StoreFactory;
use slonictl_types::SetId;
use tracing::Instrument;

#[derive(Parser, Debug)]
#[command(name = "slonictl")]
#[command(about = "Converge a Slony-I replication cluster to its declared state", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "slonictl.yaml")]
    config: String,

    /// Control-store backend (overrides config)
    #[arg(long)]
    store: Option<String>,

    /// Path to the slonik binary (overrides config)
    #[arg(long)]
    slonik: Option<String>,

    /// Log format: pretty, compact, or json (overrides config)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read live state and print every script apply would run, without
    /// executing anything
    Plan {
        /// Desired-state manifest
        #[arg(short = 'f', long)]
        manifest: String,
    },
    /// Reconcile the cluster to the manifest
    Apply {
        /// Desired-state manifest
        #[arg(short = 'f', long)]
        manifest: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration and apply CLI overrides.
    let mut config = slonictl_config::load_or_default(&args.config);
    if let Some(store) = &args.store {
        config.store.backend = store.clone();
    }
    if let Some(slonik) = &args.slonik {
        config.slonik.binary = slonik.clone();
    }
    if let Some(format) = &args.log_format {
        config.observability.log_format = format.clone();
    }
    config.validate().context("configuration validation failed")?;

    // Initialize logging.
    let format = slonictl_observe::LogFormat::from_str(&config.observability.log_format)
        .map_err(anyhow::Error::msg)?;
    slonictl_observe::init_logging(slonictl_observe::LogConfig {
        format,
        include_target: false,
        filter: Some(config.observability.log_level.clone()),
    })?;

    let (manifest_path, dry_run) = match &args.command {
        Command::Plan { manifest } => (manifest, true),
        Command::Apply { manifest } => (manifest, false),
    };

    // Resolve the desired state.
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path))?;
    let provider = secrets::default_provider();
    let state = manifest
        .resolve(&config, &provider)
        .context("resolving manifest")?;

    let store = StoreFactory::from_name(&config.store.backend)?;
    let recorder = Arc::new(RecordingRunner::new());
    let runner: Arc<dyn ScriptRunner> = if dry_run {
        recorder.clone()
    } else {
        Arc::new(SlonikRunner::new(&config.slonik.binary))
    };

    let reconciler = Reconciler::new(state.cluster_name.clone(), store, runner)
        .with_temp_set(SetId(config.temp_set_id));

    let span = slonictl_observe::reconcile_span(
        if dry_run { "plan" } else { "apply" },
        state.cluster_name.as_str(),
    );
    let summary = apply::run(&reconciler, &state).instrument(span).await?;

    if dry_run {
        let scripts = recorder.recorded();
        if scripts.is_empty() {
            println!("Nothing to do; cluster already converged.");
        } else {
            for (i, script) in scripts.iter().enumerate() {
                println!("--- script {} ---", i + 1);
                print!("{}", script);
            }
        }
    }

    for result in &summary.results {
        println!(
            "{:<40} {}",
            result.entity,
            if result.changed { "changed" } else { "ok" }
        );
    }
    println!(
        "{} entities, {} changed",
        summary.results.len(),
        summary.changed_count()
    );

    Ok(())
}
