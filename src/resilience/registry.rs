//! Breaker registry.
//!
//! # Responsibilities
//! - Hand out one shared breaker per dependency name
//! - Resolve options: explicit > per-dependency override > defaults
//! - Snapshot and reset every breaker for diagnostics
//!
//! # Design Decisions
//! - An explicit object passed to call sites, never a global
//! - Breakers are created lazily and live for the process lifetime
//! - Reloaded config swaps defaults atomically; existing breakers keep theirs

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::{AppConfig, BreakerOptions, BreakerOverrides, ConfigError};
use crate::resilience::circuit_breaker::{BreakerStats, CircuitBreaker};

/// Options used for breakers requested without explicit options.
#[derive(Debug, Clone, Default)]
struct RegistrySettings {
    defaults: BreakerOptions,
    overrides: HashMap<String, BreakerOverrides>,
}

impl RegistrySettings {
    fn options_for(&self, name: &str) -> BreakerOptions {
        match self.overrides.get(name) {
            Some(overrides) => overrides.apply_to(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}

/// Process-local map of dependency name → shared circuit breaker.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: ArcSwap<RegistrySettings>,
}

impl BreakerRegistry {
    /// Create an empty registry with the given default options.
    pub fn new(defaults: BreakerOptions) -> Self {
        Self {
            breakers: DashMap::new(),
            settings: ArcSwap::from_pointee(RegistrySettings {
                defaults,
                overrides: HashMap::new(),
            }),
        }
    }

    /// Create an empty registry using the config's defaults and overrides.
    pub fn from_config(config: &AppConfig) -> Self {
        let registry = Self::new(config.defaults.clone());
        registry.apply_config(config);
        registry
    }

    /// Return the breaker for `name`, creating it on first request.
    ///
    /// `options` only matters on creation; later calls get the existing
    /// breaker unchanged.
    pub fn get_or_create(
        &self,
        name: &str,
        options: Option<BreakerOptions>,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(existing.value().clone());
        }

        match self.breakers.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let options = options.unwrap_or_else(|| self.settings.load().options_for(name));
                let breaker = Arc::new(CircuitBreaker::new(name, options)?);
                entry.insert(breaker.clone());
                tracing::info!(circuit = %name, "Registered circuit breaker");
                Ok(breaker)
            }
        }
    }

    /// Existing breaker for `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Stats of every breaker, sorted by name.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self.breakers.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset every registered breaker.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Options a breaker named `name` would be created with right now.
    pub fn effective_options(&self, name: &str) -> BreakerOptions {
        match self.get(name) {
            Some(breaker) => breaker.options().clone(),
            None => self.settings.load().options_for(name),
        }
    }

    /// Swap in new defaults and overrides. Applies to breakers created afterwards.
    pub fn apply_config(&self, config: &AppConfig) {
        self.settings.store(Arc::new(RegistrySettings {
            defaults: config.defaults.clone(),
            overrides: config.breakers.clone(),
        }));

        let pinned: Vec<String> = self
            .names()
            .into_iter()
            .filter(|name| self.effective_options(name) != config.options_for(name))
            .collect();
        if !pinned.is_empty() {
            tracing::info!(
                breakers = ?pinned,
                "Config applied; existing breakers keep their original options"
            );
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerOptions::default())
    }
}
