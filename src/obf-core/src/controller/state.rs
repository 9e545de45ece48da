// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build state machine.
//!
//! All mutable build progress (phase, layer index, retry counter) lives in
//! one [`ControllerState`] owned by the controller. Transitions are driven by
//! [`BuildEvent`]s; an event that is not legal in the current phase is
//! rejected and leaves the state untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::fault::FaultKind;

/// Phase of a build run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildPhase {
    #[default]
    Init,
    BeamIgnition,
    Preheat,
    Recoat,
    Exposure,
    Recover,
    LayerDone,
    Teardown,
    Completed,
    Aborted,
}

impl BuildPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildPhase::Completed | BuildPhase::Aborted)
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Events that can trigger state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    /// Beam was off at start; ignition begins.
    IgnitionRequested,
    /// Beam is on; preheating begins.
    BeamReady,
    /// Next layer entered (beam current low wait and recoat follow).
    LayerStarted,
    /// Powder spread for the current layer.
    Recoated,
    /// Attempt faulted; recovery follows.
    ArcTrip(FaultKind),
    /// Recovery done, the same layer is exposed again.
    RetryScheduled,
    /// The layer is done, either cleanly or after a heat balance trip.
    LayerCompleted,
    /// No layers left; teardown begins.
    LayersExhausted,
    /// Beam and supply are off.
    Finished,
    /// Unrecoverable failure.
    Abort,
}

/// Serializable view of the state, published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub phase: BuildPhase,
    pub total_layers: usize,
    pub current_layer: usize,
    pub retry_count: u32,
    pub last_fault: FaultKind,
    pub transition_count: u64,
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    phase: BuildPhase,
    total_layers: usize,
    current_layer: usize,
    retry_count: u32,
    last_fault: FaultKind,
    transition_count: u64,
}

impl ControllerState {
    pub fn new(total_layers: usize) -> Self {
        Self {
            phase: BuildPhase::Init,
            total_layers,
            current_layer: 0,
            retry_count: 0,
            last_fault: FaultKind::None,
            transition_count: 0,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn total_layers(&self) -> usize {
        self.total_layers
    }

    /// 1-based index of the layer in progress; 0 before the first layer.
    pub fn current_layer(&self) -> usize {
        self.current_layer
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_fault(&self) -> FaultKind {
        self.last_fault
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn has_next_layer(&self) -> bool {
        self.current_layer < self.total_layers
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            phase: self.phase,
            total_layers: self.total_layers,
            current_layer: self.current_layer,
            retry_count: self.retry_count,
            last_fault: self.last_fault,
            transition_count: self.transition_count,
        }
    }

    /// Process an event and potentially transition to a new state.
    /// Returns true if a transition occurred.
    pub fn process_event(&mut self, event: BuildEvent) -> bool {
        match self.next_state(&event) {
            Some(next) => {
                *self = next;
                self.transition_count += 1;
                true
            }
            None => {
                warn!("Rejected {:?} in phase {}", event, self.phase);
                false
            }
        }
    }

    fn with_phase(&self, phase: BuildPhase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }

    fn next_state(&self, event: &BuildEvent) -> Option<Self> {
        use BuildPhase::*;

        match (self.phase, event) {
            (Init, BuildEvent::IgnitionRequested) => Some(self.with_phase(BeamIgnition)),
            (Init | BeamIgnition, BuildEvent::BeamReady) => Some(self.with_phase(Preheat)),

            (Preheat | LayerDone, BuildEvent::LayerStarted) if self.has_next_layer() => {
                Some(Self {
                    phase: Recoat,
                    current_layer: self.current_layer + 1,
                    retry_count: 0,
                    last_fault: FaultKind::None,
                    ..self.clone()
                })
            }
            (Preheat | LayerDone, BuildEvent::LayersExhausted) if !self.has_next_layer() => {
                Some(self.with_phase(Teardown))
            }

            (Recoat, BuildEvent::Recoated) => Some(self.with_phase(Exposure)),

            (Exposure, BuildEvent::ArcTrip(fault)) if fault.is_fault() => Some(Self {
                phase: Recover,
                last_fault: *fault,
                ..self.clone()
            }),
            (Recover, BuildEvent::RetryScheduled) if !self.last_fault.completes_layer() => {
                Some(Self {
                    phase: Exposure,
                    retry_count: self.retry_count + 1,
                    ..self.clone()
                })
            }
            (Exposure, BuildEvent::LayerCompleted) => Some(Self {
                phase: LayerDone,
                retry_count: 0,
                ..self.clone()
            }),
            (Recover, BuildEvent::LayerCompleted) if self.last_fault.completes_layer() => {
                Some(Self {
                    phase: LayerDone,
                    retry_count: 0,
                    ..self.clone()
                })
            }

            (Teardown, BuildEvent::Finished) => Some(self.with_phase(Completed)),

            (phase, BuildEvent::Abort) if !phase.is_terminal() => Some(self.with_phase(Aborted)),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_first_exposure(total_layers: usize) -> ControllerState {
        let mut state = ControllerState::new(total_layers);
        assert!(state.process_event(BuildEvent::BeamReady));
        assert!(state.process_event(BuildEvent::LayerStarted));
        assert!(state.process_event(BuildEvent::Recoated));
        state
    }

    #[test]
    fn test_initial_state() {
        let state = ControllerState::new(3);
        assert_eq!(state.phase(), BuildPhase::Init);
        assert_eq!(state.current_layer(), 0);
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.transition_count(), 0);
    }

    #[test]
    fn test_ignition_path() {
        let mut state = ControllerState::new(1);
        assert!(state.process_event(BuildEvent::IgnitionRequested));
        assert_eq!(state.phase(), BuildPhase::BeamIgnition);
        assert!(state.process_event(BuildEvent::BeamReady));
        assert_eq!(state.phase(), BuildPhase::Preheat);
    }

    #[test]
    fn test_full_run_through_layers() {
        let mut state = at_first_exposure(2);
        assert_eq!(state.current_layer(), 1);
        assert!(state.process_event(BuildEvent::LayerCompleted));
        assert!(state.process_event(BuildEvent::LayerStarted));
        assert_eq!(state.current_layer(), 2);
        assert!(state.process_event(BuildEvent::Recoated));
        assert!(state.process_event(BuildEvent::LayerCompleted));
        assert!(!state.process_event(BuildEvent::LayerStarted));
        assert!(state.process_event(BuildEvent::LayersExhausted));
        assert!(state.process_event(BuildEvent::Finished));
        assert_eq!(state.phase(), BuildPhase::Completed);
    }

    #[test]
    fn test_zero_layers_goes_straight_to_teardown() {
        let mut state = ControllerState::new(0);
        assert!(state.process_event(BuildEvent::BeamReady));
        assert!(!state.process_event(BuildEvent::LayerStarted));
        assert!(state.process_event(BuildEvent::LayersExhausted));
        assert_eq!(state.phase(), BuildPhase::Teardown);
    }

    #[test]
    fn test_retry_counter_resets_only_on_completion() {
        let mut state = at_first_exposure(2);
        assert!(state.process_event(BuildEvent::ArcTrip(FaultKind::MeltTrip)));
        assert!(state.process_event(BuildEvent::RetryScheduled));
        assert!(state.process_event(BuildEvent::ArcTrip(FaultKind::JumpSafeTrip)));
        assert!(state.process_event(BuildEvent::RetryScheduled));
        assert_eq!(state.retry_count(), 2);
        assert_eq!(state.last_fault(), FaultKind::JumpSafeTrip);

        assert!(state.process_event(BuildEvent::LayerCompleted));
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.phase(), BuildPhase::LayerDone);
    }

    #[test]
    fn test_heat_balance_trip_completes_layer() {
        let mut state = at_first_exposure(1);
        assert!(state.process_event(BuildEvent::ArcTrip(FaultKind::HeatBalanceTrip)));
        assert!(!state.process_event(BuildEvent::RetryScheduled));
        assert!(state.process_event(BuildEvent::LayerCompleted));
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn test_melt_trip_cannot_complete_layer() {
        let mut state = at_first_exposure(1);
        assert!(state.process_event(BuildEvent::ArcTrip(FaultKind::MeltTrip)));
        assert!(!state.process_event(BuildEvent::LayerCompleted));
        assert_eq!(state.phase(), BuildPhase::Recover);
    }

    #[test]
    fn test_rejected_event_does_not_mutate() {
        let mut state = ControllerState::new(1);
        let before = state.snapshot();
        assert!(!state.process_event(BuildEvent::Recoated));
        assert!(!state.process_event(BuildEvent::ArcTrip(FaultKind::None)));
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_abort_from_any_non_terminal_phase() {
        let mut state = at_first_exposure(1);
        assert!(state.process_event(BuildEvent::Abort));
        assert_eq!(state.phase(), BuildPhase::Aborted);
        assert!(!state.process_event(BuildEvent::Abort));
        assert!(!state.process_event(BuildEvent::LayerStarted));
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = at_first_exposure(3);
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["phase"], "Exposure");
        assert_eq!(json["current_layer"], 1);
        assert_eq!(json["total_layers"], 3);
        assert_eq!(json["transition_count"], 3);
    }
}
