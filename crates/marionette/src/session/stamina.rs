//! # Stamina
//!
//! Per-session command budget. Spent before a command is scheduled,
//! regenerated once per host tick, never above the maximum.

use crate::config::StaminaConfig;
use marionette_core::{CommandError, CommandResult};

/// Command-rate budget for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stamina {
    current: u32,
    max: u32,
    regen_per_tick: u32,
}

impl Stamina {
    /// Full stamina.
    #[must_use]
    pub const fn new(config: &StaminaConfig) -> Self {
        Self {
            current: config.max,
            max: config.max,
            regen_per_tick: config.regen_per_tick,
        }
    }

    /// Stamina available now.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.current
    }

    /// Maximum stamina.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Spends `cost`, or rejects without spending anything.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::AdmissionRejected` if `cost` exceeds what is
    /// available.
    pub fn try_consume(&mut self, cost: u32) -> CommandResult<()> {
        if cost > self.current {
            return Err(CommandError::AdmissionRejected {
                cost,
                available: self.current,
            });
        }
        self.current -= cost;
        Ok(())
    }

    /// One tick of regeneration.
    pub fn regenerate(&mut self) {
        self.current = self.current.saturating_add(self.regen_per_tick).min(self.max);
    }
}
