// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Runtime parameters adjustable by the operator during a build.
//!
//! Each parameter lives in its own watch channel: writes are last-write-wins
//! and never block, reads see the most recent value. The controller only
//! reads; operators write through the runner's listener.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Named values the controller consults before every exposure attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeParameter {
    /// Added to every jump safe pattern's configured repetitions.
    PreHeatRepetitions,
    /// Added to every heat balance pattern's configured repetitions.
    PostHeatRepetitions,
}

impl RuntimeParameter {
    pub const ALL: [RuntimeParameter; 2] = [
        RuntimeParameter::PreHeatRepetitions,
        RuntimeParameter::PostHeatRepetitions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuntimeParameter::PreHeatRepetitions => "PreHeatRepetitions",
            RuntimeParameter::PostHeatRepetitions => "PostHeatRepetitions",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn default_value(self) -> i64 {
        0
    }

    pub fn topic(self) -> String {
        format!("Parameters/Name/{}", self.name())
    }
}

impl fmt::Display for RuntimeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Both parameter values read together at the start of an attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub pre_heat_repetitions: i64,
    pub post_heat_repetitions: i64,
}

/// Latest-value store for the runtime parameters.
#[derive(Debug)]
pub struct ParameterChannel {
    pre_heat: watch::Sender<i64>,
    post_heat: watch::Sender<i64>,
}

impl Default for ParameterChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterChannel {
    /// Create a channel with every parameter at its default value.
    pub fn new() -> Self {
        let (pre_heat, _) = watch::channel(RuntimeParameter::PreHeatRepetitions.default_value());
        let (post_heat, _) =
            watch::channel(RuntimeParameter::PostHeatRepetitions.default_value());
        Self {
            pre_heat,
            post_heat,
        }
    }

    fn sender(&self, param: RuntimeParameter) -> &watch::Sender<i64> {
        match param {
            RuntimeParameter::PreHeatRepetitions => &self.pre_heat,
            RuntimeParameter::PostHeatRepetitions => &self.post_heat,
        }
    }

    pub fn get(&self, param: RuntimeParameter) -> i64 {
        *self.sender(param).borrow()
    }

    /// Look up a value by parameter name; `None` for unknown names.
    pub fn get_named(&self, name: &str) -> Option<i64> {
        RuntimeParameter::from_name(name).map(|p| self.get(p))
    }

    /// Publish a new value. Succeeds whether or not anyone is subscribed.
    pub fn set(&self, param: RuntimeParameter, value: i64) {
        self.sender(param).send_replace(value);
    }

    pub fn subscribe(&self, param: RuntimeParameter) -> watch::Receiver<i64> {
        self.sender(param).subscribe()
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            pre_heat_repetitions: self.get(RuntimeParameter::PreHeatRepetitions),
            post_heat_repetitions: self.get(RuntimeParameter::PostHeatRepetitions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_zero() {
        let params = ParameterChannel::new();
        assert_eq!(params.get(RuntimeParameter::PreHeatRepetitions), 0);
        assert_eq!(params.get(RuntimeParameter::PostHeatRepetitions), 0);
        assert_eq!(params.snapshot(), ParameterSnapshot::default());
    }

    #[test]
    fn test_last_write_wins_without_subscribers() {
        let params = ParameterChannel::new();
        params.set(RuntimeParameter::PreHeatRepetitions, 3);
        params.set(RuntimeParameter::PreHeatRepetitions, 7);
        params.set(RuntimeParameter::PostHeatRepetitions, -2);
        assert_eq!(
            params.snapshot(),
            ParameterSnapshot {
                pre_heat_repetitions: 7,
                post_heat_repetitions: -2,
            }
        );
    }

    #[test]
    fn test_get_named() {
        let params = ParameterChannel::new();
        params.set(RuntimeParameter::PostHeatRepetitions, 4);
        assert_eq!(params.get_named("PostHeatRepetitions"), Some(4));
        assert_eq!(params.get_named("postheatrepetitions"), Some(4));
        assert_eq!(params.get_named("BeamPower"), None);
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let params = ParameterChannel::new();
        let mut rx = params.subscribe(RuntimeParameter::PreHeatRepetitions);
        params.set(RuntimeParameter::PreHeatRepetitions, 5);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 5);
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(
            RuntimeParameter::PreHeatRepetitions.topic(),
            "Parameters/Name/PreHeatRepetitions"
        );
    }
}
