// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Machine abstraction boundary.
//!
//! The controller never talks to hardware directly. Everything it needs from
//! the host runtime (beam, recoater, exposure queue, sensors) goes through
//! [`BuildMachine`], so builds can be driven against a simulator or a fake.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::{ExposurePattern, LayerFeed, PatternGroup};

/// Repetition count used for the open-ended preheat exposure.
pub const UNBOUNDED_REPETITIONS: u32 = u32::MAX;

/// Alias to reduce type complexity in BuildMachine.
pub type MachineFuture<'a, T> = Pin<Box<dyn Future<Output = MachineResult<T>> + Send + 'a>>;

pub type MachineResult<T> = Result<T, MachineError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MachineError {
    #[error("machine communication failed: {0}")]
    Communication(String),

    #[error("unrecognised exposure result code {0}")]
    UnknownExposureResult(u32),
}

/// Outcome of one submitted process step, covering all four groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureResult {
    Completed,
    /// Arc trip during the given group; later groups were not exposed.
    ArcTrip(PatternGroup),
}

impl ExposureResult {
    /// Decode the numeric result reported by hosts (0 = success, 1..=4 = group).
    pub fn from_code(code: u32) -> MachineResult<Self> {
        match code {
            0 => Ok(Self::Completed),
            1 => Ok(Self::ArcTrip(PatternGroup::JumpSafe)),
            2 => Ok(Self::ArcTrip(PatternGroup::SpatterSafe)),
            3 => Ok(Self::ArcTrip(PatternGroup::Melt)),
            4 => Ok(Self::ArcTrip(PatternGroup::HeatBalance)),
            other => Err(MachineError::UnknownExposureResult(other)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Completed => 0,
            Self::ArcTrip(PatternGroup::JumpSafe) => 1,
            Self::ArcTrip(PatternGroup::SpatterSafe) => 2,
            Self::ArcTrip(PatternGroup::Melt) => 3,
            Self::ArcTrip(PatternGroup::HeatBalance) => 4,
        }
    }
}

/// Pattern lists for one exposure attempt, submitted as a single step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub jump_safe: Vec<ExposurePattern>,
    pub spatter_safe: Vec<ExposurePattern>,
    pub melt: Vec<ExposurePattern>,
    pub heat_balance: Vec<ExposurePattern>,
}

impl ProcessStep {
    /// Groups in execution order.
    pub fn groups(&self) -> [(PatternGroup, &[ExposurePattern]); 4] {
        [
            (PatternGroup::JumpSafe, self.jump_safe.as_slice()),
            (PatternGroup::SpatterSafe, self.spatter_safe.as_slice()),
            (PatternGroup::Melt, self.melt.as_slice()),
            (PatternGroup::HeatBalance, self.heat_balance.as_slice()),
        ]
    }

    pub fn pattern_count(&self) -> usize {
        self.groups().iter().map(|(_, patterns)| patterns.len()).sum()
    }
}

/// Static info describing a machine backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineInfo {
    pub manufacturer: String,
    pub model: String,
    pub revision: String,
}

/// Common interface for machine backends.
pub trait Machine {
    fn info(&self) -> &MachineInfo;
}

/// Operations the build controller drives on the machine.
///
/// `Ok(false)` is a negative answer from the machine (timeout, refusal);
/// `Err` means the request itself could not be carried out.
pub trait BuildMachine: Machine + Send {
    fn beam_is_on<'a>(&'a mut self) -> MachineFuture<'a, bool>;

    /// Restart the high voltage supply, waiting up to `timeout` for the beam.
    fn restart_hv<'a>(&'a mut self, timeout: Duration) -> MachineFuture<'a, bool>;

    /// Current HV beam current; `None` when no reading is available.
    fn hv_current<'a>(&'a mut self) -> MachineFuture<'a, Option<f64>>;

    fn temperature<'a>(&'a mut self, sensor: &'a str) -> MachineFuture<'a, Option<f64>>;

    /// Queue a single pattern outside the per-layer process steps.
    fn start_exposure<'a>(&'a mut self, file_ref: &'a str, repetitions: u32)
        -> MachineFuture<'a, ()>;

    fn clear_exposure_queue<'a>(&'a mut self) -> MachineFuture<'a, bool>;

    fn recoat_cycle<'a>(&'a mut self, layer_feed: &'a LayerFeed) -> MachineFuture<'a, bool>;

    /// Expose all four groups of `step` in order and report the first failure.
    fn start_process_step_exposures<'a>(
        &'a mut self,
        step: &'a ProcessStep,
    ) -> MachineFuture<'a, ExposureResult>;

    fn restart_after_arc_trip<'a>(
        &'a mut self,
        fresh_powder: bool,
        timeout: Duration,
    ) -> MachineFuture<'a, bool>;

    fn beam_off<'a>(&'a mut self) -> MachineFuture<'a, ()>;

    fn power_off<'a>(&'a mut self) -> MachineFuture<'a, ()>;
}
