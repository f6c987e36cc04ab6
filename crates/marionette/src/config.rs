//! # Configuration
//!
//! All tunables are loaded from one TOML file at startup. Every field has a
//! default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [scheduler]
//! command_delay_ticks = 7
//!
//! [stamina]
//! max = 200
//! regen_per_tick = 1
//! base_cost = 2
//! flat_cost = 1
//!
//! [lifecycle]
//! workers = 16
//! queue_capacity = 1024
//! handler_workers = 4
//!
//! [events]
//! channel_capacity = 4096
//! mailbox_capacity = 256
//!
//! [host]
//! tick_rate = 20
//!
//! [persistence]
//! inventory_dir = "data/inventories"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Command scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ticks a visible command (move, place, dig) takes.
    pub command_delay_ticks: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            command_delay_ticks: 7,
        }
    }
}

/// Stamina admission control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaminaConfig {
    /// Maximum (and starting) stamina.
    pub max: u32,
    /// Stamina regained per host tick.
    pub regen_per_tick: u32,
    /// Cost of a one-step movement.
    pub base_cost: u32,
    /// Cost of a block or item mutation.
    pub flat_cost: u32,
}

impl StaminaConfig {
    /// Cost of moving `steps` blocks in one command: `base + (steps - 1)`.
    #[must_use]
    pub const fn movement_cost(&self, steps: u32) -> u32 {
        self.base_cost.saturating_add(steps.saturating_sub(1))
    }
}

impl Default for StaminaConfig {
    fn default() -> Self {
        Self {
            max: 200,
            regen_per_tick: 1,
            base_cost: 2,
            flat_cost: 1,
        }
    }
}

/// Lifecycle callback pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Worker threads.
    pub workers: usize,
    /// Jobs that may wait for a worker.
    pub queue_capacity: usize,
    /// Threads running event handlers, separate from the callback workers.
    pub handler_workers: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            queue_capacity: 1024,
            handler_workers: 4,
        }
    }
}

/// Event delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// World events buffered between host ticks.
    pub channel_capacity: usize,
    /// Broadcast messages kept per session.
    pub mailbox_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
            mailbox_capacity: 256,
        }
    }
}

/// Authoritative loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Ticks per second.
    pub tick_rate: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { tick_rate: 20 }
    }
}

/// Inventory persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory for per-entity inventory files. Disabled when unset.
    pub inventory_dir: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarionetteConfig {
    /// `[scheduler]`
    pub scheduler: SchedulerConfig,
    /// `[stamina]`
    pub stamina: StaminaConfig,
    /// `[lifecycle]`
    pub lifecycle: LifecycleConfig,
    /// `[events]`
    pub events: EventsConfig,
    /// `[host]`
    pub host: HostConfig,
    /// `[persistence]`
    pub persistence: PersistenceConfig,
}

impl MarionetteConfig {
    /// Config for tests and tools: no command delay, small pools.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            scheduler: SchedulerConfig {
                command_delay_ticks: 0,
            },
            lifecycle: LifecycleConfig {
                workers: 4,
                queue_capacity: 64,
                handler_workers: 2,
            },
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` or `ConfigError::Invalid`.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`MarionetteConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rejects values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.tick_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "host.tick_rate",
                reason: "must be at least 1",
            });
        }
        if self.lifecycle.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "lifecycle.workers",
                reason: "must be at least 1",
            });
        }
        if self.lifecycle.handler_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "lifecycle.handler_workers",
                reason: "must be at least 1",
            });
        }
        if self.lifecycle.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "lifecycle.queue_capacity",
                reason: "must be at least 1",
            });
        }
        if self.stamina.max == 0 {
            return Err(ConfigError::Invalid {
                field: "stamina.max",
                reason: "must be positive",
            });
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "events.channel_capacity",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let config = MarionetteConfig::from_toml_str("").unwrap();
        assert_eq!(config, MarionetteConfig::default());
        assert_eq!(config.scheduler.command_delay_ticks, 7);
        assert_eq!(config.stamina.max, 200);
    }

    #[test]
    fn test_partial_sections() {
        let config = MarionetteConfig::from_toml_str(
            "[stamina]\nmax = 50\n\n[host]\ntick_rate = 60\n",
        )
        .unwrap();
        assert_eq!(config.stamina.max, 50);
        assert_eq!(config.stamina.base_cost, 2);
        assert_eq!(config.host.tick_rate, 60);
    }

    #[test]
    fn test_invalid_rejected() {
        let err = MarionetteConfig::from_toml_str("[host]\ntick_rate = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "host.tick_rate", .. }));
        assert!(matches!(
            MarionetteConfig::from_toml_str("[host]\ntick_rate = \"fast\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MarionetteConfig::from_toml_str("[lifecycle]\nhandler_workers = 0\n"),
            Err(ConfigError::Invalid { field: "lifecycle.handler_workers", .. })
        ));
    }

    #[test]
    fn test_movement_cost() {
        let stamina = StaminaConfig::default();
        assert_eq!(stamina.movement_cost(1), 2);
        assert_eq!(stamina.movement_cost(5), 6);
        assert_eq!(stamina.movement_cost(0), 2);
        assert_eq!(stamina.movement_cost(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = MarionetteConfig::default();
        config.persistence.inventory_dir = Some(PathBuf::from("inv"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(MarionetteConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = MarionetteConfig::load(Path::new("/nonexistent/marionette.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
