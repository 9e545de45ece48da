// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build execution.
//!
//! [`BuildController`] drives one build plan against a [`BuildMachine`]:
//! beam ignition, preheat, the per-layer recoat/expose/recover loop and
//! teardown. Every fatal condition publishes a `Build Error:` activity,
//! makes a best-effort exposure queue clear and ends the run with a
//! [`BuildAbort`]. The per-layer exposure retry is the only retry.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::machine::{BuildMachine, MachineError, MachineResult, UNBOUNDED_REPETITIONS};
use crate::params::ParameterChannel;
use crate::plan::{BuildPlan, Layer};
use crate::telemetry::TelemetryPublisher;
use crate::wait;

use super::exposure;
use super::fault::FaultKind;
use super::policies::{BoundedRetry, RetryPolicy};
use super::state::{BuildEvent, ControllerSnapshot, ControllerState};

/// Timing constants and thresholds used by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub beam_restart_timeout: Duration,
    pub arc_trip_recovery_timeout: Duration,
    /// HV current (mA) at or below which the beam counts as low.
    pub beam_current_low_threshold: f64,
    pub beam_current_low_timeout: Duration,
    pub beam_current_poll_interval: Duration,
    pub preheat_poll_interval: Duration,
    pub max_layer_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            beam_restart_timeout: Duration::from_secs(60),
            arc_trip_recovery_timeout: Duration::from_secs(60),
            beam_current_low_threshold: 1.0,
            beam_current_low_timeout: Duration::from_secs(30),
            beam_current_poll_interval: wait::DEFAULT_INTERVAL,
            preheat_poll_interval: Duration::from_millis(500),
            max_layer_retries: BoundedRetry::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Unrecoverable build failure. Displays as the operator-facing message.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildAbort {
    #[error("Failed to start beam")]
    BeamStartFailed,

    #[error("Failed to reach target temperature")]
    PreheatTimeout,

    #[error("Failed to clear exposure queue")]
    QueueClearFailed,

    #[error("BeamPowerLow condition timed out")]
    BeamCurrentTimeout,

    #[error("Unable to complete Layerfeed.")]
    RecoatFailed { layer: usize },

    #[error("Timeout waiting for beam on")]
    BeamRestartFailed { layer: usize },

    #[error("Failed to submit exposures for layer {layer}: {source}")]
    ExposureFailed { layer: usize, source: MachineError },

    #[error("Unable to recover from arc trip")]
    RecoveryFailed { layer: usize, fault: FaultKind },

    #[error("Maximum retry count exceeded!")]
    RetryLimitExceeded { layer: usize, retries: u32 },

    #[error("Build cancelled by operator")]
    Cancelled,
}

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub layers_completed: usize,
    pub attempts: u32,
    pub total_retries: u32,
    pub final_state: ControllerSnapshot,
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|c| *c).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Collapse a machine error into the negative answer for that query.
fn or_negative<T: Default>(result: MachineResult<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("{} failed: {}", what, e);
        T::default()
    })
}

pub struct BuildController {
    machine: Box<dyn BuildMachine>,
    plan: Arc<BuildPlan>,
    params: Arc<ParameterChannel>,
    telemetry: TelemetryPublisher,
    config: ControllerConfig,
    retry: Box<dyn RetryPolicy>,
    state: ControllerState,
    attempts: u32,
    total_retries: u32,
}

impl BuildController {
    pub fn new(
        machine: Box<dyn BuildMachine>,
        plan: Arc<BuildPlan>,
        params: Arc<ParameterChannel>,
        telemetry: TelemetryPublisher,
        config: ControllerConfig,
    ) -> Self {
        let retry = Box::new(BoundedRetry::new(config.max_layer_retries));
        let state = ControllerState::new(plan.total_layers());
        Self {
            machine,
            plan,
            params,
            telemetry,
            config,
            retry,
            state,
            attempts: 0,
            total_retries: 0,
        }
    }

    pub fn with_retry_policy(mut self, retry: Box<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Execute the whole plan. Must be called once per controller.
    pub async fn run(&mut self) -> Result<BuildReport, BuildAbort> {
        let outcome = self.execute().await;
        self.finish(outcome).await
    }

    /// Like `run`, but stops at the next await point once `cancel` reads
    /// `true`. A cancelled build is aborted and the beam switched off.
    /// A dropped sender never cancels.
    pub async fn run_until_cancelled(
        &mut self,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<BuildReport, BuildAbort> {
        let outcome = tokio::select! {
            outcome = self.execute() => outcome,
            _ = cancelled(&mut cancel) => Err(BuildAbort::Cancelled),
        };
        if matches!(outcome, Err(BuildAbort::Cancelled)) {
            self.abort(&BuildAbort::Cancelled).await;
            self.telemetry.publish_activity("Turning off the beam");
            or_negative(self.machine.beam_off().await, "Beam off");
            return Err(BuildAbort::Cancelled);
        }
        self.finish(outcome).await
    }

    async fn finish(&mut self, outcome: Result<(), BuildAbort>) -> Result<BuildReport, BuildAbort> {
        match outcome {
            Ok(()) => Ok(BuildReport {
                layers_completed: self.state.current_layer(),
                attempts: self.attempts,
                total_retries: self.total_retries,
                final_state: self.state.snapshot(),
            }),
            Err(abort) => {
                self.abort(&abort).await;
                Err(abort)
            }
        }
    }

    async fn abort(&mut self, abort: &BuildAbort) {
        let message = format!("Build Error: {}", abort);
        error!("{}", message);
        self.telemetry.publish_activity(&message);
        if !self.clear_queue().await {
            warn!("Exposure queue not cleared while aborting");
        }
        self.transition(BuildEvent::Abort);
    }

    async fn execute(&mut self) -> Result<(), BuildAbort> {
        let total = self.plan.total_layers();
        self.telemetry.publish_progress(total, 0);
        self.telemetry.publish_activity("Init");

        self.ignite().await?;
        self.preheat().await?;

        debug!("Plan has {} layers", total);
        let plan = Arc::clone(&self.plan);
        for layer in &plan.layers {
            self.transition(BuildEvent::LayerStarted);
            let index = self.state.current_layer();
            self.telemetry.publish_progress(total, index);
            self.prepare_layer(index).await?;
            self.expose_layer(layer, index).await?;
        }
        self.transition(BuildEvent::LayersExhausted);

        self.teardown().await
    }

    fn transition(&mut self, event: BuildEvent) {
        if self.state.process_event(event) {
            self.telemetry.publish_status(&self.state.snapshot());
        }
    }

    async fn beam_is_on(&mut self) -> bool {
        or_negative(self.machine.beam_is_on().await, "Beam state query")
    }

    async fn restart_hv(&mut self) -> bool {
        let timeout = self.config.beam_restart_timeout;
        or_negative(self.machine.restart_hv(timeout).await, "HV restart")
    }

    async fn clear_queue(&mut self) -> bool {
        or_negative(
            self.machine.clear_exposure_queue().await,
            "Exposure queue clear",
        )
    }

    async fn ignite(&mut self) -> Result<(), BuildAbort> {
        self.telemetry.publish_activity("Turning on the beam");
        if !self.beam_is_on().await {
            self.transition(BuildEvent::IgnitionRequested);
            if !self.restart_hv().await {
                return Err(BuildAbort::BeamStartFailed);
            }
        }
        self.telemetry.publish_activity("The beam is active");
        self.transition(BuildEvent::BeamReady);
        Ok(())
    }

    async fn preheat(&mut self) -> Result<(), BuildAbort> {
        let heat = self.plan.start_heat.clone();
        self.telemetry.publish_activity(&format!(
            "Start heating to target temperature: {}",
            heat.target_temperature
        ));
        or_negative(
            self.machine
                .start_exposure(&heat.preheat_pattern, UNBOUNDED_REPETITIONS)
                .await,
            "Preheat exposure",
        );
        debug!(
            "Waiting for {} seconds or until target temperature is reached",
            heat.timeout_secs
        );

        let timeout = heat.timeout();
        let interval = self.config.preheat_poll_interval;
        let sensor = heat.temperature_sensor;
        let target = heat.target_temperature;
        let reached = wait::try_wait::<_, BuildAbort, _>(self, timeout, interval, |ctl| {
            let sensor = sensor.clone();
            Box::pin(async move { ctl.preheat_reached(&sensor, target).await })
        })
        .await?;
        if !reached {
            return Err(BuildAbort::PreheatTimeout);
        }
        if !self.clear_queue().await {
            return Err(BuildAbort::QueueClearFailed);
        }
        Ok(())
    }

    /// Preheat predicate. Restarts a dropped beam before reading the sensor.
    async fn preheat_reached(&mut self, sensor: &str, target: f64) -> Result<bool, BuildAbort> {
        if !self.beam_is_on().await && !self.restart_hv().await {
            return Err(BuildAbort::BeamStartFailed);
        }
        let reading = or_negative(self.machine.temperature(sensor).await, "Temperature read");
        Ok(reading.is_some_and(|t| t >= target))
    }

    async fn wait_for_beam_current_low(&mut self) -> Result<(), BuildAbort> {
        self.telemetry.publish_activity("Waiting for beam power low");
        let threshold = self.config.beam_current_low_threshold;
        let timeout = self.config.beam_current_low_timeout;
        let interval = self.config.beam_current_poll_interval;
        let low = wait::wait(self, timeout, interval, move |ctl| {
            Box::pin(async move {
                or_negative(ctl.machine.hv_current().await, "HV current read")
                    .is_some_and(|current| current <= threshold)
            })
        })
        .await;
        if low {
            Ok(())
        } else {
            Err(BuildAbort::BeamCurrentTimeout)
        }
    }

    async fn prepare_layer(&mut self, index: usize) -> Result<(), BuildAbort> {
        self.wait_for_beam_current_low().await?;

        self.telemetry
            .publish_activity(&format!("Recoat cycle. Layer {}", index));
        let plan = Arc::clone(&self.plan);
        if !or_negative(self.machine.recoat_cycle(plan.layer_feed()).await, "Recoat") {
            return Err(BuildAbort::RecoatFailed { layer: index });
        }
        if !self.beam_is_on().await {
            self.telemetry
                .publish_activity("Beam was off after recoating. Turning it on!");
            if !self.restart_hv().await {
                return Err(BuildAbort::BeamRestartFailed { layer: index });
            }
        }
        self.transition(BuildEvent::Recoated);
        Ok(())
    }

    async fn expose_layer(&mut self, layer: &Layer, index: usize) -> Result<(), BuildAbort> {
        loop {
            let params = self.params.snapshot();
            debug!(
                "Layer {} parameters: pre heat {}, post heat {}",
                index, params.pre_heat_repetitions, params.post_heat_repetitions
            );
            let step = exposure::process_step(layer, &params);

            let retries = self.state.retry_count();
            if retries > 0 {
                self.telemetry.publish_activity(&format!(
                    "Exposing OBP files of layer {}. Retry {}",
                    index, retries
                ));
            } else {
                self.telemetry
                    .publish_activity(&format!("Exposing OBP files of layer {}.", index));
            }

            self.attempts += 1;
            let result = self
                .machine
                .start_process_step_exposures(&step)
                .await
                .map_err(|source| BuildAbort::ExposureFailed {
                    layer: index,
                    source,
                })?;

            let fault = FaultKind::classify(result);
            let Some(recovery) = fault.recovery() else {
                self.transition(BuildEvent::LayerCompleted);
                return Ok(());
            };

            self.telemetry.publish_activity(&fault.to_string());
            self.transition(BuildEvent::ArcTrip(fault));
            if !self.clear_queue().await {
                warn!("Exposure queue not cleared after {}", fault);
            }
            let timeout = self.config.arc_trip_recovery_timeout;
            let recovered = or_negative(
                self.machine
                    .restart_after_arc_trip(recovery.requires_fresh_powder, timeout)
                    .await,
                "Arc trip recovery",
            );
            if !recovered {
                return Err(BuildAbort::RecoveryFailed {
                    layer: index,
                    fault,
                });
            }

            if recovery.completes_layer {
                self.transition(BuildEvent::LayerCompleted);
                return Ok(());
            }

            self.transition(BuildEvent::RetryScheduled);
            self.total_retries += 1;
            let retries = self.state.retry_count();
            if !self.retry.should_retry(retries, fault) {
                return Err(BuildAbort::RetryLimitExceeded {
                    layer: index,
                    retries,
                });
            }
        }
    }

    async fn teardown(&mut self) -> Result<(), BuildAbort> {
        if !self.clear_queue().await {
            warn!("Exposure queue not cleared before teardown");
        }
        self.wait_for_beam_current_low().await?;

        self.telemetry.publish_activity("Turning off the beam");
        or_negative(self.machine.beam_off().await, "Beam off");
        self.telemetry.publish_activity("Turning off the PSU");
        or_negative(self.machine.power_off().await, "Power off");

        self.transition(BuildEvent::Finished);
        self.telemetry.publish_activity("Build finished");
        Ok(())
    }
}
