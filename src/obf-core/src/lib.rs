// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod controller;
pub mod machine;
pub mod params;
pub mod plan;
pub mod telemetry;
pub mod wait;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use controller::{
    BuildAbort, BuildController, BuildPhase, BuildReport, ControllerConfig, ControllerSnapshot,
    FaultKind,
};
pub use machine::{BuildMachine, ExposureResult, MachineError, MachineResult, ProcessStep};
pub use params::{ParameterChannel, ParameterSnapshot, RuntimeParameter};
pub use plan::{BuildPlan, ExposurePattern, Layer, PatternGroup, PlanError};
pub use telemetry::{
    BroadcastTelemetry, BuildStatus, TelemetryEvent, TelemetryListener, TelemetryPublisher,
};
