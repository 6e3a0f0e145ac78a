// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad-phase tunables.

use crate::error::ConfigError;

/// Tunables for tree maintenance and pair discovery.
///
/// Both margins can be changed at runtime through
/// [`Simulation::set_config`](crate::Simulation::set_config).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BroadphaseConfig {
    /// Margin added around every box stored in a partition tree.
    ///
    /// Larger values absorb more movement without restructuring the tree at the cost of more
    /// false candidates per query.
    pub fat_margin: f64,
    /// Margin added around moving partitions and move-buffer boxes when probing other
    /// partitions for candidates.
    pub pair_margin: f64,
    /// Entries each new partition tree reserves up front.
    pub initial_capacity: usize,
    /// Entries a tree reserves whenever it runs out of room.
    pub growth: usize,
}

impl Default for BroadphaseConfig {
    fn default() -> Self {
        Self {
            fat_margin: 0.05,
            pair_margin: 0.1,
            initial_capacity: 256,
            growth: 64,
        }
    }
}

impl BroadphaseConfig {
    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("fat_margin", self.fat_margin),
            ("pair_margin", self.pair_margin),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidMargin { name, value });
            }
        }
        if self.growth == 0 {
            return Err(ConfigError::ZeroGrowth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(BroadphaseConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_values() {
        let bad = BroadphaseConfig {
            pair_margin: -1.0,
            ..Default::default()
        };
        assert_eq!(
            bad.validate(),
            Err(ConfigError::InvalidMargin {
                name: "pair_margin",
                value: -1.0
            })
        );
        let nan = BroadphaseConfig {
            fat_margin: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            nan.validate(),
            Err(ConfigError::InvalidMargin {
                name: "fat_margin",
                ..
            })
        ));
        let still = BroadphaseConfig {
            growth: 0,
            ..Default::default()
        };
        assert_eq!(still.validate(), Err(ConfigError::ZeroGrowth));
    }
}
