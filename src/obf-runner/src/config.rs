// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for obf-runner.
//!
//! Config is loaded from the `[obf-runner]` section of `obf-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./obf-rs.toml`
//! 3. `~/.config/obf-rs/obf-rs.toml`
//! 4. `/etc/obf-rs/obf-rs.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use obf_app::{parse_level, ConfigFile};
use obf_backend::SimulationConfig;
use obf_core::ControllerConfig;

/// Top-level runner configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub general: GeneralConfig,
    /// Machine backend selection
    pub machine: MachineConfig,
    /// Controller timings and retry bound
    pub controller: ControllerSection,
    /// Behaviour of the `simulated` backend
    pub simulation: SimulationConfig,
    /// Operator TCP listener
    pub listen: ListenConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Registered backend name (e.g. "simulated")
    pub backend: Option<String>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            backend: Some("simulated".to_string()),
        }
    }
}

/// Controller timings in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub beam_restart_timeout_secs: f64,
    pub arc_trip_recovery_timeout_secs: f64,
    pub beam_current_low_threshold: f64,
    pub beam_current_low_timeout_secs: f64,
    pub beam_current_poll_interval_secs: f64,
    pub preheat_poll_interval_secs: f64,
    pub max_layer_retries: u32,
}

impl Default for ControllerSection {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            beam_restart_timeout_secs: defaults.beam_restart_timeout.as_secs_f64(),
            arc_trip_recovery_timeout_secs: defaults.arc_trip_recovery_timeout.as_secs_f64(),
            beam_current_low_threshold: defaults.beam_current_low_threshold,
            beam_current_low_timeout_secs: defaults.beam_current_low_timeout.as_secs_f64(),
            beam_current_poll_interval_secs: defaults.beam_current_poll_interval.as_secs_f64(),
            preheat_poll_interval_secs: defaults.preheat_poll_interval.as_secs_f64(),
            max_layer_retries: defaults.max_layer_retries,
        }
    }
}

impl ControllerSection {
    /// Convert to controller settings. Out-of-range values that `validate`
    /// rejects fall back to the defaults.
    pub fn to_controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        ControllerConfig {
            beam_restart_timeout: secs_or(
                self.beam_restart_timeout_secs,
                defaults.beam_restart_timeout,
            ),
            arc_trip_recovery_timeout: secs_or(
                self.arc_trip_recovery_timeout_secs,
                defaults.arc_trip_recovery_timeout,
            ),
            beam_current_low_threshold: self.beam_current_low_threshold,
            beam_current_low_timeout: secs_or(
                self.beam_current_low_timeout_secs,
                defaults.beam_current_low_timeout,
            ),
            beam_current_poll_interval: secs_or(
                self.beam_current_poll_interval_secs,
                defaults.beam_current_poll_interval,
            ),
            preheat_poll_interval: secs_or(
                self.preheat_poll_interval_secs,
                defaults.preheat_poll_interval,
            ),
            max_layer_retries: self.max_layer_retries,
        }
    }
}

fn secs_or(value: f64, fallback: Duration) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => fallback,
    }
}

/// Operator TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub enabled: bool,
    pub listen: IpAddr,
    pub port: u16,
    pub auth: AuthConfig,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4540,
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration for the TCP listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Valid authentication tokens (empty = no auth required)
    pub tokens: Vec<String>,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if let Some(backend) = &self.machine.backend {
            if backend.trim().is_empty() {
                return Err("[machine].backend must not be empty".to_string());
            }
        }

        let c = &self.controller;
        for (name, value) in [
            ("beam_restart_timeout_secs", c.beam_restart_timeout_secs),
            ("arc_trip_recovery_timeout_secs", c.arc_trip_recovery_timeout_secs),
            ("beam_current_low_timeout_secs", c.beam_current_low_timeout_secs),
            ("beam_current_poll_interval_secs", c.beam_current_poll_interval_secs),
            ("preheat_poll_interval_secs", c.preheat_poll_interval_secs),
        ] {
            validate_duration_secs(name, value)?;
        }
        if !c.beam_current_low_threshold.is_finite() || c.beam_current_low_threshold < 0.0 {
            return Err("[controller].beam_current_low_threshold must be a finite number >= 0".to_string());
        }

        let sim = &self.simulation;
        if !sim.heating_rate.is_finite() || !sim.initial_temperature.is_finite() {
            return Err("[simulation] temperatures must be finite".to_string());
        }
        if sim.recoat_failure_layer == Some(0) || sim.arc_trips.iter().any(|t| t.layer == 0) {
            return Err("[simulation] layer numbers start at 1".to_string());
        }

        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0".to_string());
        }
        if self.listen.auth.tokens.iter().any(|t| t.trim().is_empty()) {
            return Err("[listen.auth].tokens must not contain empty tokens".to_string());
        }
        Ok(())
    }

    /// Generate an example configuration under the `[obf-runner]` header.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "obf-runner")]
            inner: RunnerConfig,
        }
        let example = RunnerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            ..RunnerConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    match level {
        Some(level) if parse_level(level).is_none() => Err(format!(
            "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
            level
        )),
        _ => Ok(()),
    }
}

fn validate_duration_secs(name: &str, value: f64) -> Result<(), String> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        _ => Err(format!(
            "[controller].{} must be a positive number of seconds in range (got {})",
            name, value
        )),
    }
}

impl ConfigFile for RunnerConfig {
    fn section_key() -> &'static str {
        "obf-runner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obf_core::PatternGroup;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.machine.backend.as_deref(), Some("simulated"));
        assert!(config.listen.enabled);
        assert_eq!(config.listen.port, 4540);
        assert!(config.listen.auth.tokens.is_empty());
        assert_eq!(
            config.controller.to_controller_config(),
            ControllerConfig::default()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_section() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [controller]
            max_layer_retries = 3
            preheat_poll_interval_secs = 0.25

            [[simulation.arc_trips]]
            layer = 1
            group = "heatBalance"

            [listen]
            port = 5000
        "#;
        let config: RunnerConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.controller.max_layer_retries, 3);
        assert_eq!(config.controller.beam_restart_timeout_secs, 60.0);
        let controller = config.controller.to_controller_config();
        assert_eq!(controller.preheat_poll_interval, Duration::from_millis(250));
        assert_eq!(config.simulation.arc_trips[0].group, PatternGroup::HeatBalance);
        assert_eq!(config.listen.port, 5000);
        assert!(config.listen.enabled);
    }

    #[test]
    fn test_validate_rejects_invalid_values() {
        let mut config = RunnerConfig::default();
        config.general.log_level = Some("loud".to_string());
        assert!(config.validate().unwrap_err().contains("log_level"));

        let mut config = RunnerConfig::default();
        config.controller.preheat_poll_interval_secs = 0.0;
        assert!(config
            .validate()
            .unwrap_err()
            .contains("preheat_poll_interval_secs"));

        let mut config = RunnerConfig::default();
        config.controller.beam_current_low_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.controller.beam_restart_timeout_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.listen.auth.tokens = vec!["  ".to_string()];
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.simulation.recoat_failure_layer = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_duration() {
        let mut config = RunnerConfig::default();
        config.controller.beam_current_low_timeout_secs = 1e30;
        let err = config.validate().unwrap_err();
        assert!(err.contains("beam_current_low_timeout_secs"));

        let controller = config.controller.to_controller_config();
        assert_eq!(
            controller.beam_current_low_timeout,
            ControllerConfig::default().beam_current_low_timeout
        );
    }

    #[test]
    fn test_example_toml_round_trips() {
        let example = RunnerConfig::example_toml();
        assert!(example.contains("obf-runner"));
        let table: toml::Table = toml::from_str(&example).unwrap();
        let section = toml::to_string(&table["obf-runner"]).unwrap();
        let parsed: RunnerConfig = toml::from_str(&section).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
