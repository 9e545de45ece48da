// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build controller components.
//!
//! This module contains the build state machine, fault classification,
//! retry policy and the controller that drives a plan against a machine.

pub mod build;
pub mod exposure;
pub mod fault;
pub mod policies;
pub mod state;

pub use build::{BuildAbort, BuildController, BuildReport, ControllerConfig};
pub use exposure::{adjusted_repetitions, process_step};
pub use fault::{FaultKind, RecoveryPolicy};
pub use policies::{BoundedRetry, NoRetry, RetryPolicy};
pub use state::{BuildEvent, BuildPhase, ControllerSnapshot, ControllerState};
