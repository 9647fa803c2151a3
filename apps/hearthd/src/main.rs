//! hearthd - package lifecycle orchestrator
//!
//! Wires configuration, the docker driver, the content gateway and the state
//! store into the install pipeline, then runs one command while logging the
//! pipeline's events.

mod cli;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use clap::Parser;
use hearth_config::Config;
use hearth_install::{InstallContext, InstallFlagTracker, InstallSettings, Installer};
use hearth_net::{GatewayFetcher, NetClient, NetConfig};
use hearth_platform::DockerCli;
use hearth_state::StateStore;
use hearth_types::PackageInstallState;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting hearthd v{}", env!("CARGO_PKG_VERSION"));

    // File (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    if let Some(data_dir) = &cli.global.data_dir {
        config.paths.data_dir = Some(data_dir.clone());
    }
    if let Some(gateway) = &cli.global.gateway_url {
        config.network.gateway_url.clone_from(gateway);
    }
    config.validate()?;

    let (event_sender, mut event_receiver) = hearth_events::channel();
    let installer = build_installer(&config, event_sender).await?;
    let json = cli.global.json;

    events::run_with_events(execute_command(cli.command, &installer, json), &mut event_receiver)
        .await
}

async fn build_installer(
    config: &Config,
    event_sender: hearth_events::EventSender,
) -> Result<Installer, CliError> {
    let runtime = DockerCli::new(
        config.runtime.docker_binary.clone(),
        config.compose_command(),
        Some(event_sender.clone()),
    );
    let client = NetClient::new(NetConfig {
        timeout: Duration::from_secs(config.network.timeout),
        retry_count: config.network.retries,
        retry_delay: Duration::from_secs(config.network.retry_delay),
        ..NetConfig::default()
    })?;
    let fetcher = GatewayFetcher::new(
        client,
        &config.network.gateway_url,
        Some(event_sender.clone()),
    )?;
    let store = StateStore::open(&config.db_path()).await?;

    Ok(Installer::new(InstallContext {
        runtime: Arc::new(runtime),
        fetcher: Arc::new(fetcher),
        store,
        flags: Arc::new(InstallFlagTracker::new(config.flag_timeout())),
        settings: InstallSettings::from_config(config),
        event_sender: Some(event_sender),
    }))
}

async fn execute_command(
    command: Commands,
    installer: &Installer,
    json: bool,
) -> Result<(), CliError> {
    match command {
        Commands::Recover => {
            installer.post_restart_patch().await;
            Ok(())
        }
        Commands::Install { batch } => {
            let contents = tokio::fs::read_to_string(&batch).await?;
            let batch: Vec<PackageInstallState> = serde_json::from_str(&contents)
                .map_err(|e| CliError::InvalidArguments(format!("{}: {e}", batch.display())))?;
            // A restart left by a previous run is settled before new work starts
            installer.post_restart_patch().await;
            installer.install(&batch).await?;
            Ok(())
        }
        Commands::Status { package } => show_status(installer, package.as_deref(), json).await,
    }
}

async fn show_status(
    installer: &Installer,
    package: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    let store = &installer.context().store;
    let names = match package {
        Some(name) => vec![name.to_string()],
        None => store.installed_packages().await?,
    };

    let mut records = serde_json::Map::new();
    for name in names {
        let metadata = store.installed_metadata(&name).await?;
        let in_progress = installer.package_is_installing(&name);
        if json {
            records.insert(
                name,
                serde_json::json!({ "metadata": metadata, "installing": in_progress }),
            );
        } else {
            match metadata {
                Some(meta) => println!(
                    "{name} {} (installed {}, updated {}){}",
                    meta.version,
                    meta.installed_at.to_rfc3339(),
                    meta.updated_at.to_rfc3339(),
                    if in_progress { " [installing]" } else { "" }
                ),
                None => println!("{name} not installed"),
            }
        }
    }
    if json {
        println!("{}", serde_json::Value::Object(records));
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "info,hearth=debug,hearthd=debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // Logs go to stderr so JSON results on stdout stay parseable
    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}
