// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;

use obf_app::normalize_name;
use obf_core::{BuildMachine, DynResult};

mod simulated;

pub use simulated::{ArcTripInjection, SimulatedMachine, SimulationConfig, SimulationLog};

/// Settings handed to a backend factory.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub simulation: SimulationConfig,
}

pub type BackendFactory = fn(&BackendOptions) -> DynResult<Box<dyn BuildMachine>>;

/// Context for registering and instantiating machine backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "simulated").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(normalize_name(name), factory);
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a machine backend by name.
    pub fn build_machine(
        &self,
        name: &str,
        options: &BackendOptions,
    ) -> DynResult<Box<dyn BuildMachine>> {
        let factory = self
            .factories
            .get(&normalize_name(name))
            .ok_or_else(|| format!("Unknown machine backend: {}", name))?;
        factory(options)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all built-in backends on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("simulated", simulated_factory);
}

fn simulated_factory(options: &BackendOptions) -> DynResult<Box<dyn BuildMachine>> {
    Ok(Box::new(SimulatedMachine::new(options.simulation.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obf_core::machine::Machine;

    #[test]
    fn test_builtin_registration() {
        let mut context = RegistrationContext::new();
        register_builtin_backends_on(&mut context);
        assert_eq!(context.registered_backends(), vec!["simulated".to_string()]);
        assert!(context.is_backend_registered("Simulated"));
        assert!(!context.is_backend_registered("a2x"));
    }

    #[test]
    fn test_build_machine() {
        let mut context = RegistrationContext::default();
        register_builtin_backends_on(&mut context);
        let machine = context
            .build_machine("simulated", &BackendOptions::default())
            .unwrap();
        assert_eq!(machine.info().model, "simulated");

        let err = context
            .build_machine("arcam", &BackendOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Unknown machine backend: arcam");
    }
}
