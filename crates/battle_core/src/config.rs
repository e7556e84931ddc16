//! Battle-wide tuning constants.
//!
//! A [`BattleConfig`] is fixed for the lifetime of a battle. The defaults
//! match the shipped game; the headless runner can override them per
//! scenario from RON.

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::math::{fixed_decimal, Fixed};

/// Ticks per simulated second.
pub const TICK_RATE: u32 = 60;

/// Duration of one nominal tick in simulated seconds.
#[must_use]
pub fn tick_dt() -> Fixed {
    Fixed::ONE / Fixed::from_num(TICK_RATE)
}

/// Tuning constants shared by every processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Battlefield width in world units.
    #[serde(with = "fixed_decimal")]
    pub battlefield_width: Fixed,
    /// Battlefield height in world units.
    #[serde(with = "fixed_decimal")]
    pub battlefield_height: Fixed,
    /// How far outside the battlefield a projectile may travel before it is
    /// deleted.
    #[serde(with = "fixed_decimal")]
    pub offfield_margin: Fixed,
    /// Rank advantage given to a unit's current target.
    #[serde(with = "fixed_decimal")]
    pub switch_bias: Fixed,
    /// Extra range granted to persistent conditions of an active attack.
    #[serde(with = "fixed_decimal")]
    pub grace_distance: Fixed,
    /// Upper bound on fleeing speed.
    #[serde(with = "fixed_decimal")]
    pub fleeing_speed: Fixed,
    /// Downward acceleration applied to lobbed carriers.
    #[serde(with = "fixed_decimal")]
    pub gravity: Fixed,
    /// Highest fraction of incoming damage armor can remove.
    #[serde(with = "fixed_decimal")]
    pub max_armor_reduction: Fixed,
    /// Broad-phase grid cell size.
    #[serde(with = "fixed_decimal")]
    pub spatial_cell_size: Fixed,
    /// Collision radius of projectiles.
    #[serde(with = "fixed_decimal")]
    pub projectile_radius: Fixed,
    /// Seconds a dead unit stays on the field before removal.
    #[serde(with = "fixed_decimal")]
    pub corpse_duration: Fixed,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            battlefield_width: Fixed::from_num(1920),
            battlefield_height: Fixed::from_num(1080),
            offfield_margin: Fixed::from_num(64),
            switch_bias: Fixed::from_num(10),
            grace_distance: Fixed::from_num(10),
            fleeing_speed: Fixed::from_num(120),
            gravity: Fixed::from_num(400),
            max_armor_reduction: Fixed::from_num(0.75),
            spatial_cell_size: Fixed::from_num(64),
            projectile_radius: Fixed::from_num(2),
            corpse_duration: Fixed::from_num(2),
        }
    }
}

impl BattleConfig {
    /// Parse a config from RON. Missing fields keep their defaults.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron).map_err(|e| BattleError::DataParseError {
            path: "<config>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the processors cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("battlefield_width", self.battlefield_width),
            ("battlefield_height", self.battlefield_height),
            ("spatial_cell_size", self.spatial_cell_size),
            ("gravity", self.gravity),
        ];
        for (name, value) in positive {
            if value <= Fixed::ZERO {
                return Err(BattleError::InvalidState(format!(
                    "config field {name} must be positive, got {value}"
                )));
            }
        }
        if self.max_armor_reduction < Fixed::ZERO || self.max_armor_reduction > Fixed::ONE {
            return Err(BattleError::InvalidState(format!(
                "max_armor_reduction must be within [0, 1], got {}",
                self.max_armor_reduction
            )));
        }
        Ok(())
    }

    /// Whether a point lies within the battlefield plus the off-field margin.
    #[must_use]
    pub fn in_bounds(&self, point: crate::math::Vec2Fixed) -> bool {
        let m = self.offfield_margin;
        point.x >= -m
            && point.y >= -m
            && point.x <= self.battlefield_width + m
            && point.y <= self.battlefield_height + m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2Fixed;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BattleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = BattleConfig::from_ron_str("(switch_bias: 25.0, gravity: 300.0)").unwrap();
        assert_eq!(config.switch_bias, Fixed::from_num(25));
        assert_eq!(config.gravity, Fixed::from_num(300));
        assert_eq!(config.battlefield_width, Fixed::from_num(1920));
    }

    #[test]
    fn test_invalid_armor_cap_rejected() {
        assert!(BattleConfig::from_ron_str("(max_armor_reduction: 1.5)").is_err());
    }

    #[test]
    fn test_in_bounds_respects_margin() {
        let config = BattleConfig::default();
        assert!(config.in_bounds(Vec2Fixed::from_ints(-10, 500)));
        assert!(!config.in_bounds(Vec2Fixed::from_ints(-100, 500)));
        assert!(!config.in_bounds(Vec2Fixed::from_ints(2100, 500)));
    }

    #[test]
    fn test_tick_dt_is_one_sixtieth() {
        let total = tick_dt() * Fixed::from_num(TICK_RATE);
        assert!((total - Fixed::ONE).abs() < Fixed::from_num(0.000_001));
    }
}
