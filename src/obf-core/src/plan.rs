// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build plan data model.
//!
//! Mirrors the camelCase `buildInfo.json` document shipped inside a build
//! package. The plan is loaded once and never mutated; per-attempt pattern
//! lists are derived from it by the controller.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque recoater settings, handed to the machine unchanged.
pub type LayerFeed = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Failed to parse build info: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("startHeat.temperatureSensor must not be empty")]
    MissingSensor,

    #[error("startHeat.targetTemperature must be a finite number (got {0})")]
    InvalidTargetTemperature(f64),

    #[error("startHeat.timeout must be a positive number of seconds in range (got {0})")]
    InvalidTimeout(f64),

    #[error("{0} has an empty file reference")]
    EmptyFileRef(String),
}

/// Complete description of one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlan {
    pub start_heat: StartHeat,
    #[serde(default)]
    pub layer_defaults: LayerDefaults,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// Initial heating of the powder bed before the first layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartHeat {
    /// Pattern exposed open-ended while heating.
    #[serde(rename = "file")]
    pub preheat_pattern: String,
    pub temperature_sensor: String,
    pub target_temperature: f64,
    /// Seconds; may be fractional.
    #[serde(rename = "timeout")]
    pub timeout_secs: f64,
}

impl StartHeat {
    /// Zero for values `validate` rejects.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDefaults {
    #[serde(default)]
    pub layer_feed: LayerFeed,
}

/// The four pattern groups of a layer, exposed in this order every attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    #[serde(default)]
    pub jump_safe: Vec<ExposurePattern>,
    #[serde(default)]
    pub spatter_safe: Vec<ExposurePattern>,
    #[serde(default)]
    pub melt: Vec<ExposurePattern>,
    #[serde(default)]
    pub heat_balance: Vec<ExposurePattern>,
}

impl Layer {
    pub fn group(&self, group: PatternGroup) -> &[ExposurePattern] {
        match group {
            PatternGroup::JumpSafe => &self.jump_safe,
            PatternGroup::SpatterSafe => &self.spatter_safe,
            PatternGroup::Melt => &self.melt,
            PatternGroup::HeatBalance => &self.heat_balance,
        }
    }
}

/// A pre-loaded machine path file and how often to expose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposurePattern {
    #[serde(rename = "file")]
    pub file_ref: String,
    pub repetitions: u32,
}

impl ExposurePattern {
    pub fn new(file_ref: impl Into<String>, repetitions: u32) -> Self {
        Self {
            file_ref: file_ref.into(),
            repetitions,
        }
    }
}

/// Named phase of one layer's exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternGroup {
    JumpSafe,
    SpatterSafe,
    Melt,
    HeatBalance,
}

impl PatternGroup {
    /// Execution order within one exposure step.
    pub const ORDER: [PatternGroup; 4] = [
        PatternGroup::JumpSafe,
        PatternGroup::SpatterSafe,
        PatternGroup::Melt,
        PatternGroup::HeatBalance,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PatternGroup::JumpSafe => "Jump Safe",
            PatternGroup::SpatterSafe => "Spatter Safe",
            PatternGroup::Melt => "Melt",
            PatternGroup::HeatBalance => "Heat Balance",
        }
    }
}

impl fmt::Display for PatternGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl BuildPlan {
    /// Parse and validate a `buildInfo.json` document.
    pub fn from_json(input: &str) -> Result<Self, PlanError> {
        let plan: BuildPlan = serde_json::from_str(input)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn total_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_feed(&self) -> &LayerFeed {
        &self.layer_defaults.layer_feed
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let heat = &self.start_heat;
        if heat.temperature_sensor.trim().is_empty() {
            return Err(PlanError::MissingSensor);
        }
        if !heat.target_temperature.is_finite() {
            return Err(PlanError::InvalidTargetTemperature(heat.target_temperature));
        }
        if heat.timeout_secs <= 0.0 || Duration::try_from_secs_f64(heat.timeout_secs).is_err() {
            return Err(PlanError::InvalidTimeout(heat.timeout_secs));
        }
        if heat.preheat_pattern.trim().is_empty() {
            return Err(PlanError::EmptyFileRef("startHeat".to_string()));
        }

        for (index, layer) in self.layers.iter().enumerate() {
            for group in PatternGroup::ORDER {
                if layer
                    .group(group)
                    .iter()
                    .any(|p| p.file_ref.trim().is_empty())
                {
                    return Err(PlanError::EmptyFileRef(format!(
                        "layer {} {}",
                        index + 1,
                        group
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every distinct file reference used by the plan, preheat included.
    pub fn referenced_files(&self) -> BTreeSet<&str> {
        let mut files = BTreeSet::new();
        files.insert(self.start_heat.preheat_pattern.as_str());
        for layer in &self.layers {
            for group in PatternGroup::ORDER {
                files.extend(layer.group(group).iter().map(|p| p.file_ref.as_str()));
            }
        }
        files
    }
}
