// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated machine backend for development and testing.
//!
//! Holds beam, queue, bed temperature and layer state in memory and answers
//! immediately. No hardware required. Arc trips and recoat failures can be
//! injected through [`SimulationConfig`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use obf_core::machine::{
    BuildMachine, ExposureResult, Machine, MachineFuture, MachineInfo, ProcessStep,
    UNBOUNDED_REPETITIONS,
};
use obf_core::plan::{LayerFeed, PatternGroup};

/// HV current reported right after an exposure step.
const EXPOSURE_HV_CURRENT: f64 = 15.0;
/// HV current reported while the beam is idle.
const IDLE_HV_CURRENT: f64 = 0.1;

/// One injected arc trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcTripInjection {
    /// 1-based layer on which the trip fires.
    pub layer: usize,
    pub group: PatternGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Whether the beam is already on when the build starts.
    pub beam_on_at_start: bool,
    /// Make every HV restart fail.
    pub restart_fails: bool,
    /// Bed temperature before preheating.
    pub initial_temperature: f64,
    /// Temperature gained per sensor reading while preheating.
    pub heating_rate: f64,
    /// Simulated duration of one process step.
    pub exposure_time_ms: u64,
    /// Layer whose recoat cycle fails.
    pub recoat_failure_layer: Option<usize>,
    pub arc_trips: Vec<ArcTripInjection>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            beam_on_at_start: false,
            restart_fails: false,
            initial_temperature: 20.0,
            heating_rate: 50.0,
            exposure_time_ms: 0,
            recoat_failure_layer: None,
            arc_trips: Vec::new(),
        }
    }
}

/// What a [`SimulatedMachine`] was asked to do.
///
/// Clones share one record, so it stays readable after the machine has been
/// handed to a controller.
#[derive(Debug, Clone, Default)]
pub struct SimulationLog {
    inner: Arc<Mutex<LogEntries>>,
}

#[derive(Debug, Default)]
struct LogEntries {
    steps: Vec<(usize, ProcessStep)>,
    layers_recoated: usize,
    fresh_powder_recoats: usize,
    powered_off: bool,
}

impl SimulationLog {
    fn with<T>(&self, f: impl FnOnce(&mut LogEntries) -> T) -> T {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    /// Submitted process steps with the layer they were exposed on.
    pub fn submitted_steps(&self) -> Vec<(usize, ProcessStep)> {
        self.with(|e| e.steps.clone())
    }

    pub fn layers_recoated(&self) -> usize {
        self.with(|e| e.layers_recoated)
    }

    pub fn fresh_powder_recoats(&self) -> usize {
        self.with(|e| e.fresh_powder_recoats)
    }

    pub fn powered_off(&self) -> bool {
        self.with(|e| e.powered_off)
    }
}

pub struct SimulatedMachine {
    info: MachineInfo,
    config: SimulationConfig,
    beam_on: bool,
    preheating: bool,
    temperature: f64,
    hv_current: f64,
    layer: usize,
    queued: usize,
    pending_trips: Vec<ArcTripInjection>,
    log: SimulationLog,
}

impl SimulatedMachine {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            info: MachineInfo {
                manufacturer: "obf-rs".to_string(),
                model: "simulated".to_string(),
                revision: env!("CARGO_PKG_VERSION").to_string(),
            },
            beam_on: config.beam_on_at_start,
            preheating: false,
            temperature: config.initial_temperature,
            hv_current: IDLE_HV_CURRENT,
            layer: 0,
            queued: 0,
            pending_trips: config.arc_trips.clone(),
            log: SimulationLog::default(),
            config,
        }
    }

    /// Shared handle on everything this machine records.
    pub fn log(&self) -> SimulationLog {
        self.log.clone()
    }

    pub fn is_beam_on(&self) -> bool {
        self.beam_on
    }

    /// Take the earliest-group trip injected for the current layer.
    fn take_trip(&mut self) -> Option<PatternGroup> {
        let layer = self.layer;
        let position = PatternGroup::ORDER.iter().find_map(|group| {
            self.pending_trips
                .iter()
                .position(|t| t.layer == layer && t.group == *group)
        })?;
        Some(self.pending_trips.remove(position).group)
    }
}

impl Machine for SimulatedMachine {
    fn info(&self) -> &MachineInfo {
        &self.info
    }
}

impl BuildMachine for SimulatedMachine {
    fn beam_is_on<'a>(&'a mut self) -> MachineFuture<'a, bool> {
        Box::pin(async move { Ok(self.beam_on) })
    }

    fn restart_hv<'a>(&'a mut self, timeout: Duration) -> MachineFuture<'a, bool> {
        Box::pin(async move {
            if self.config.restart_fails {
                info!("Simulated HV restart failed (timeout {:?})", timeout);
                return Ok(false);
            }
            self.beam_on = true;
            Ok(true)
        })
    }

    fn hv_current<'a>(&'a mut self) -> MachineFuture<'a, Option<f64>> {
        Box::pin(async move {
            let current = self.hv_current;
            self.hv_current = IDLE_HV_CURRENT;
            Ok(Some(current))
        })
    }

    fn temperature<'a>(&'a mut self, sensor: &'a str) -> MachineFuture<'a, Option<f64>> {
        Box::pin(async move {
            if self.preheating && self.beam_on {
                self.temperature += self.config.heating_rate;
            }
            debug!("Sensor {} reads {:.1}", sensor, self.temperature);
            Ok(Some(self.temperature))
        })
    }

    fn start_exposure<'a>(
        &'a mut self,
        file_ref: &'a str,
        repetitions: u32,
    ) -> MachineFuture<'a, ()> {
        Box::pin(async move {
            if repetitions == UNBOUNDED_REPETITIONS {
                self.preheating = true;
            }
            debug!("Queued {} x{}", file_ref, repetitions);
            self.queued += 1;
            Ok(())
        })
    }

    fn clear_exposure_queue<'a>(&'a mut self) -> MachineFuture<'a, bool> {
        Box::pin(async move {
            debug!("Cleared {} queued exposures", self.queued);
            self.queued = 0;
            self.preheating = false;
            Ok(true)
        })
    }

    fn recoat_cycle<'a>(&'a mut self, layer_feed: &'a LayerFeed) -> MachineFuture<'a, bool> {
        Box::pin(async move {
            let next = self.layer + 1;
            if self.config.recoat_failure_layer == Some(next) {
                info!("Simulated recoat failure on layer {}", next);
                return Ok(false);
            }
            debug!("Recoating layer {} with {} feed settings", next, layer_feed.len());
            self.layer = next;
            self.log.with(|e| e.layers_recoated = next);
            Ok(true)
        })
    }

    fn start_process_step_exposures<'a>(
        &'a mut self,
        step: &'a ProcessStep,
    ) -> MachineFuture<'a, ExposureResult> {
        Box::pin(async move {
            let layer = self.layer;
            self.log.with(|e| e.steps.push((layer, step.clone())));
            if self.config.exposure_time_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.exposure_time_ms)).await;
            }
            self.hv_current = EXPOSURE_HV_CURRENT;
            match self.take_trip() {
                Some(group) => {
                    info!("Simulated arc trip during {} on layer {}", group, self.layer);
                    self.beam_on = false;
                    Ok(ExposureResult::ArcTrip(group))
                }
                None => Ok(ExposureResult::Completed),
            }
        })
    }

    fn restart_after_arc_trip<'a>(
        &'a mut self,
        fresh_powder: bool,
        _timeout: Duration,
    ) -> MachineFuture<'a, bool> {
        Box::pin(async move {
            if fresh_powder {
                self.log.with(|e| e.fresh_powder_recoats += 1);
            }
            if self.config.restart_fails {
                return Ok(false);
            }
            self.beam_on = true;
            Ok(true)
        })
    }

    fn beam_off<'a>(&'a mut self) -> MachineFuture<'a, ()> {
        Box::pin(async move {
            self.beam_on = false;
            Ok(())
        })
    }

    fn power_off<'a>(&'a mut self) -> MachineFuture<'a, ()> {
        Box::pin(async move {
            self.beam_on = false;
            self.log.with(|e| e.powered_off = true);
            Ok(())
        })
    }
}
