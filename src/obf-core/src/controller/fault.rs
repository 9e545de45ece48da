// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Exposure fault classification and recovery policy selection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::machine::ExposureResult;
use crate::plan::PatternGroup;

/// Fault attributed to one exposure attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    #[default]
    None,
    JumpSafeTrip,
    SpatterSafeTrip,
    MeltTrip,
    HeatBalanceTrip,
}

/// What the controller does after a faulted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Recoat a full new powder layer before retrying.
    pub requires_fresh_powder: bool,
    /// The layer counts as done despite the fault.
    pub completes_layer: bool,
}

impl FaultKind {
    /// Map a machine-reported exposure outcome to a fault kind.
    pub fn classify(result: ExposureResult) -> Self {
        match result {
            ExposureResult::Completed => FaultKind::None,
            ExposureResult::ArcTrip(group) => Self::from_group(group),
        }
    }

    pub fn from_group(group: PatternGroup) -> Self {
        match group {
            PatternGroup::JumpSafe => FaultKind::JumpSafeTrip,
            PatternGroup::SpatterSafe => FaultKind::SpatterSafeTrip,
            PatternGroup::Melt => FaultKind::MeltTrip,
            PatternGroup::HeatBalance => FaultKind::HeatBalanceTrip,
        }
    }

    pub fn group(self) -> Option<PatternGroup> {
        match self {
            FaultKind::None => None,
            FaultKind::JumpSafeTrip => Some(PatternGroup::JumpSafe),
            FaultKind::SpatterSafeTrip => Some(PatternGroup::SpatterSafe),
            FaultKind::MeltTrip => Some(PatternGroup::Melt),
            FaultKind::HeatBalanceTrip => Some(PatternGroup::HeatBalance),
        }
    }

    pub fn is_fault(self) -> bool {
        self != FaultKind::None
    }

    /// Only a melt fault leaves the bed needing a new powder layer.
    pub fn requires_fresh_powder(self) -> bool {
        matches!(self, FaultKind::MeltTrip)
    }

    /// A heat balance trip happens after melting finished, so the layer is kept.
    pub fn completes_layer(self) -> bool {
        matches!(self, FaultKind::None | FaultKind::HeatBalanceTrip)
    }

    /// Recovery to run after this fault; `None` for a clean attempt.
    pub fn recovery(self) -> Option<RecoveryPolicy> {
        self.is_fault().then(|| RecoveryPolicy {
            requires_fresh_powder: self.requires_fresh_powder(),
            completes_layer: self.completes_layer(),
        })
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.group() {
            None => f.write_str("None"),
            Some(group) => write!(f, "Arc trip during {} exposure", group),
        }
    }
}
