// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build task: instantiates the machine backend and drives one build.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use obf_backend::{register_builtin_backends_on, BackendOptions, RegistrationContext};
use obf_core::machine::Machine;
use obf_core::{
    BroadcastTelemetry, BuildController, BuildPlan, BuildReport, ControllerConfig, DynResult,
    ParameterChannel, TelemetryPublisher,
};

/// Configuration for the build task.
pub struct BuildTaskConfig {
    pub registry: Arc<RegistrationContext>,
    pub backend: String,
    pub options: BackendOptions,
    pub controller: ControllerConfig,
    pub run_id: Uuid,
}

impl Default for BuildTaskConfig {
    fn default() -> Self {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        Self {
            registry: Arc::new(registry),
            backend: "simulated".to_string(),
            options: BackendOptions::default(),
            controller: ControllerConfig::default(),
            run_id: Uuid::new_v4(),
        }
    }
}

/// Run `plan` to completion or abort.
///
/// Progress is published through `telemetry`; operator overrides are read
/// from `params` at the start of every exposure attempt. Setting `cancel`
/// to `true` aborts the build through the controller.
pub async fn run_build_task(
    config: BuildTaskConfig,
    plan: Arc<BuildPlan>,
    params: Arc<ParameterChannel>,
    telemetry: Arc<BroadcastTelemetry>,
    cancel: watch::Receiver<bool>,
) -> DynResult<BuildReport> {
    info!("[{}] Opening machine backend {}", config.run_id, config.backend);
    let machine = config
        .registry
        .build_machine(&config.backend, &config.options)?;
    let info = machine.info();
    info!(
        "[{}] Machine ready: {} {} {}",
        config.run_id, info.manufacturer, info.model, info.revision
    );

    let mut publisher = TelemetryPublisher::new();
    publisher.register(telemetry);

    let mut controller = BuildController::new(machine, plan, params, publisher, config.controller);
    match controller.run_until_cancelled(cancel).await {
        Ok(report) => {
            info!(
                "[{}] Build completed: {} layers, {} attempts, {} retries",
                config.run_id, report.layers_completed, report.attempts, report.total_retries
            );
            Ok(report)
        }
        Err(abort) => {
            error!("[{}] Build aborted: {}", config.run_id, abort);
            Err(abort.into())
        }
    }
}
