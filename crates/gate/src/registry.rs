//! Registry of gates keyed by resource/service name
//!
//! Each protected downstream gets its own independent [`AdmissionGate`]. The
//! registry creates them lazily from its default configuration (or a
//! per-service override) and hands out shared references, so every caller
//! protecting the same service contends for the same permits.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::config::{BulkheadSettings, GateConfig};
use crate::error::{GateError, GateResult};
use crate::gate::{AdmissionGate, GateSnapshot};
use crate::observer::AdmissionObserver;

/// Name → gate map layered on top of [`AdmissionGate`]
///
/// # Examples
///
/// ```rust
/// use admission_gate::{GateConfig, GateRegistry};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = GateRegistry::new(GateConfig::default());
///
/// let auth = registry.get_or_create("auth")?;
/// let again = registry.get_or_create("auth")?;
/// assert!(std::sync::Arc::ptr_eq(&auth, &again));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GateRegistry {
    gates: DashMap<String, Arc<AdmissionGate>>,
    defaults: GateConfig,
    overrides: HashMap<String, GateConfig>,
    observer: Option<Arc<dyn AdmissionObserver>>,
}

impl GateRegistry {
    /// Create a registry building every gate from `defaults`
    pub fn new(defaults: GateConfig) -> Self {
        Self { gates: DashMap::new(), defaults, overrides: HashMap::new(), observer: None }
    }

    /// Create a registry from a `[bulkhead]` configuration section
    ///
    /// # Errors
    /// Returns [`GateError::Config`] if the defaults or any override are
    /// invalid.
    pub fn from_settings(settings: &BulkheadSettings) -> GateResult<Self> {
        settings.validate()?;
        let overrides = settings
            .services
            .keys()
            .map(|service| (service.clone(), settings.for_service(service)))
            .collect();

        Ok(Self {
            gates: DashMap::new(),
            defaults: settings.defaults.clone(),
            overrides,
            observer: None,
        })
    }

    /// Attach an observer to every gate this registry creates
    pub fn with_observer(mut self, observer: Arc<dyn AdmissionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Use `config` instead of the defaults for gates named `name`
    pub fn with_override(mut self, name: impl Into<String>, config: GateConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Effective configuration for gates named `name`
    pub fn config_for(&self, name: &str) -> &GateConfig {
        self.overrides.get(name).unwrap_or(&self.defaults)
    }

    /// Get the gate for `name`, creating it on first use
    ///
    /// Concurrent first calls for the same name all receive the same gate.
    ///
    /// # Errors
    /// Returns [`GateError::InvalidCapacity`] if the configuration for
    /// `name` is invalid.
    pub fn get_or_create(&self, name: &str) -> GateResult<Arc<AdmissionGate>> {
        if let Some(gate) = self.gates.get(name) {
            return Ok(Arc::clone(gate.value()));
        }

        match self.gates.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let gate = Arc::new(self.build_gate(name)?);
                info!(gate = name, capacity = gate.capacity(), "Registered admission gate");
                entry.insert(Arc::clone(&gate));
                Ok(gate)
            }
        }
    }

    /// Get the gate for `name` if it exists
    pub fn get(&self, name: &str) -> Option<Arc<AdmissionGate>> {
        self.gates.get(name).map(|gate| Arc::clone(gate.value()))
    }

    /// Register a gate built elsewhere under its own name
    ///
    /// # Errors
    /// Returns [`GateError::AlreadyRegistered`] if the name is taken.
    pub fn register(&self, gate: AdmissionGate) -> GateResult<Arc<AdmissionGate>> {
        match self.gates.entry(gate.name().to_string()) {
            Entry::Occupied(entry) => {
                Err(GateError::AlreadyRegistered { name: entry.key().clone() })
            }
            Entry::Vacant(entry) => {
                let gate = Arc::new(gate);
                entry.insert(Arc::clone(&gate));
                Ok(gate)
            }
        }
    }

    /// Remove and return the gate for `name`
    ///
    /// Callers still holding the gate keep using it; later lookups create a
    /// fresh one.
    pub fn remove(&self, name: &str) -> Option<Arc<AdmissionGate>> {
        self.gates.remove(name).map(|(_, gate)| gate)
    }

    /// Number of gates created so far
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Names of all gates, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gates.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot every gate, sorted by name
    pub fn snapshots(&self) -> Vec<GateSnapshot> {
        let mut snapshots: Vec<GateSnapshot> =
            self.gates.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn build_gate(&self, name: &str) -> GateResult<AdmissionGate> {
        let mut builder = AdmissionGate::builder().name(name).config(self.config_for(name));
        if let Some(observer) = &self.observer {
            builder = builder.observer(Arc::clone(observer));
        }
        builder.build()
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
