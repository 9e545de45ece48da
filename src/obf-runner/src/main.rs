// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod build_task;
mod config;
mod listener;
mod package;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use obf_app::{init_logging, normalize_name, ConfigError, ConfigFile};
use obf_backend::{register_builtin_backends_on, BackendOptions, RegistrationContext};
use obf_core::{BroadcastTelemetry, DynResult, ParameterChannel};

use build_task::BuildTaskConfig;
use config::RunnerConfig;
use package::BuildPackage;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - EBM build execution daemon");

/// How long a cancelled build gets to clear the queue and turn the beam off.
const CANCEL_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Build package directory or buildInfo.json file
    #[arg(value_name = "PACKAGE", required_unless_present = "print_config")]
    package: Option<PathBuf>,
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Machine backend to use (e.g. simulated)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// IP address for the operator TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the operator TCP listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

/// Pick the backend from CLI, then config, and check that it exists.
fn resolve_backend(
    cli: &Cli,
    cfg: &RunnerConfig,
    registry: &RegistrationContext,
) -> DynResult<String> {
    let backend = cli
        .backend
        .clone()
        .or_else(|| cfg.machine.backend.clone())
        .unwrap_or_else(|| "simulated".to_string());
    let backend = normalize_name(&backend);
    if !registry.is_backend_registered(&backend) {
        return Err(format!(
            "Unknown machine backend: {} (available: {})",
            backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }
    Ok(backend)
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);

    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", RunnerConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = RunnerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        RunnerConfig::load_from_default_paths()?
    };
    cfg.validate().map_err(ConfigError::Invalid)?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let backend = resolve_backend(&cli, &cfg, &registry)?;

    let Some(ref package_path) = cli.package else {
        return Err("No build package given".into());
    };
    let package = BuildPackage::load(package_path)?;
    let run_id = Uuid::new_v4();
    info!(
        "Starting build {} of {} ({} layers, backend: {})",
        run_id,
        package.display_name(),
        package.plan.total_layers(),
        backend
    );
    if let Some(manifest) = package.manifest.as_ref() {
        if !manifest.author.is_empty() {
            info!("Author: {}", manifest.author);
        }
    }
    let plan = Arc::new(package.plan);

    let params = Arc::new(ParameterChannel::new());
    let telemetry = Arc::new(BroadcastTelemetry::new(Some(run_id)));
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if cfg.listen.enabled {
        let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
        let listen_port = cli.port.unwrap_or(cfg.listen.port);
        let listen_addr = SocketAddr::from((listen_ip, listen_port));
        let tcp = TcpListener::bind(listen_addr).await?;
        let auth_tokens = cfg.listen.auth.tokens.clone();
        let listener_params = Arc::clone(&params);
        let status_rx = telemetry.status_receiver();
        let listener_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = listener::run_listener(
                tcp,
                listener_params,
                status_rx,
                auth_tokens,
                listener_shutdown_rx,
            )
            .await
            {
                error!("Listener error: {:?}", e);
            }
        }));
    }

    let task_config = BuildTaskConfig {
        registry: Arc::new(registry),
        backend,
        options: BackendOptions {
            simulation: cfg.simulation.clone(),
        },
        controller: cfg.controller.to_controller_config(),
        run_id,
    };
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut build_handle = tokio::spawn(build_task::run_build_task(
        task_config,
        plan,
        params,
        Arc::clone(&telemetry),
        cancel_rx,
    ));

    let mut build_error = None;
    tokio::select! {
        joined = &mut build_handle => {
            match joined {
                Ok(Ok(_report)) => {
                    if cfg.listen.enabled {
                        info!("Build finished, serving status until Ctrl+C");
                        signal::ctrl_c().await?;
                    }
                }
                Ok(Err(e)) => build_error = Some(e),
                Err(e) => build_error = Some(format!("Build task failed: {}", e).into()),
            }
        }
        res = signal::ctrl_c() => {
            res?;
            info!("Ctrl+C received, cancelling build");
            let _ = cancel_tx.send(true);
            match tokio::time::timeout(CANCEL_GRACE, &mut build_handle).await {
                Ok(Ok(Ok(_report))) => {}
                Ok(Ok(Err(e))) => build_error = Some(e),
                Ok(Err(e)) => build_error = Some(format!("Build task failed: {}", e).into()),
                Err(_) => {
                    warn!(
                        "Build did not stop within {}s, dropping it without machine teardown",
                        CANCEL_GRACE.as_secs()
                    );
                    build_handle.abort();
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }

    match build_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
