// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-attempt pattern lists.

use crate::machine::ProcessStep;
use crate::params::ParameterSnapshot;
use crate::plan::{ExposurePattern, Layer};

/// Add a signed offset to a repetition count, clamped to `0..=u32::MAX`.
pub fn adjusted_repetitions(configured: u32, offset: i64) -> u32 {
    let total = i64::from(configured).saturating_add(offset);
    total.clamp(0, i64::from(u32::MAX)) as u32
}

fn with_offset(patterns: &[ExposurePattern], offset: i64) -> Vec<ExposurePattern> {
    patterns
        .iter()
        .map(|p| ExposurePattern::new(p.file_ref.clone(), adjusted_repetitions(p.repetitions, offset)))
        .collect()
}

/// Build the step submitted for one attempt on `layer`.
///
/// Jump safe repetitions get `PreHeatRepetitions` added, heat balance
/// repetitions get `PostHeatRepetitions` added; spatter safe and melt are
/// passed through. `params` must be read once per attempt.
pub fn process_step(layer: &Layer, params: &ParameterSnapshot) -> ProcessStep {
    ProcessStep {
        jump_safe: with_offset(&layer.jump_safe, params.pre_heat_repetitions),
        spatter_safe: layer.spatter_safe.clone(),
        melt: layer.melt.clone(),
        heat_balance: with_offset(&layer.heat_balance, params.post_heat_repetitions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Layer {
        Layer {
            jump_safe: vec![ExposurePattern::new("pre.obp", 2)],
            spatter_safe: vec![ExposurePattern::new("spatter.obp", 4)],
            melt: vec![ExposurePattern::new("melt.obp", 1)],
            heat_balance: vec![ExposurePattern::new("post.obp", 5)],
        }
    }

    #[test]
    fn test_offsets_are_additive() {
        let params = ParameterSnapshot {
            pre_heat_repetitions: 7,
            post_heat_repetitions: 3,
        };
        let step = process_step(&layer(), &params);
        assert_eq!(step.jump_safe, vec![ExposurePattern::new("pre.obp", 9)]);
        assert_eq!(step.heat_balance, vec![ExposurePattern::new("post.obp", 8)]);
    }

    #[test]
    fn test_spatter_safe_and_melt_use_own_lists() {
        let step = process_step(&layer(), &ParameterSnapshot::default());
        assert_eq!(step.spatter_safe, vec![ExposurePattern::new("spatter.obp", 4)]);
        assert_eq!(step.melt, vec![ExposurePattern::new("melt.obp", 1)]);
    }

    #[test]
    fn test_repetitions_clamped() {
        assert_eq!(adjusted_repetitions(2, -5), 0);
        assert_eq!(adjusted_repetitions(u32::MAX, 1), u32::MAX);
        assert_eq!(adjusted_repetitions(3, i64::MAX), u32::MAX);
        assert_eq!(adjusted_repetitions(3, i64::MIN), 0);
    }
}
