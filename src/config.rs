//! Configuration management for the Canopy gateway

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::notify::DeliveryDefaults;

/// Default instance namespace
const DEFAULT_NAMESPACE: &str = "local";

/// Canopy gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// This instance's federation namespace (must be unique per instance)
    pub namespace: String,

    /// Delivery-policy defaults applied to out-of-range subscribe parameters
    pub delivery: DeliveryConfig,

    /// Simulated-provider settings used by `canopy simulate`
    pub simulation: SimulationConfig,

    /// Log filter directive (overridden by `RUST_LOG`)
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            delivery: DeliveryConfig::default(),
            simulation: SimulationConfig::default(),
            log_filter: None,
        }
    }
}

/// Delivery-policy defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Buffer threshold substituted for out-of-range values
    pub buffer_threshold: usize,

    /// Schedule interval in milliseconds substituted for out-of-range values
    pub schedule_interval_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: 10,
            schedule_interval_ms: 1000,
        }
    }
}

impl DeliveryConfig {
    /// Convert into the propagator's defaults.
    ///
    /// Zero values fall back to the built-in defaults rather than producing
    /// a zero-period timer.
    #[must_use]
    pub const fn defaults(&self) -> DeliveryDefaults {
        let threshold = if self.buffer_threshold == 0 {
            10
        } else {
            self.buffer_threshold
        };
        let interval_ms = if self.schedule_interval_ms == 0 {
            1000
        } else {
            self.schedule_interval_ms
        };
        DeliveryDefaults {
            buffer_threshold: threshold,
            schedule_interval: Duration::from_millis(interval_ms),
        }
    }
}

/// Simulated-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Name of the simulated provider
    pub provider: String,

    /// Seconds between simulated sensor updates
    pub update_interval_secs: u64,

    /// Also spin up an in-process peer instance to demonstrate federation
    pub federate: bool,

    /// Namespace of the in-process peer instance
    pub peer_namespace: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            provider: "sim-thermometer".to_string(),
            update_interval_secs: 2,
            federate: false,
            peer_namespace: "twin".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `CANOPY_*` environment overrides.
    ///
    /// Reads `CANOPY_NAMESPACE` and `CANOPY_LOG`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(namespace) = std::env::var("CANOPY_NAMESPACE")
            && !namespace.is_empty()
        {
            self.namespace = namespace;
        }
        if let Ok(filter) = std::env::var("CANOPY_LOG")
            && !filter.is_empty()
        {
            self.log_filter = Some(filter);
        }
        self
    }
}
