//! Read-only views for renderers and replay tools.
//!
//! Views are plain copies taken after a tick. Nothing here can mutate the
//! battle.

use serde::{Deserialize, Serialize};

use crate::components::{Facing, Team, UnitState};
use crate::entity::EntityId;
use crate::error::{BattleError, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::store::Entity;
use crate::world::Outcome;

/// What a unit looks like this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitView {
    /// Entity id.
    pub id: EntityId,
    /// Template the unit was built from.
    pub unit_type: String,
    /// Side.
    pub team: Team,
    /// Position.
    pub position: Vec2Fixed,
    /// Orientation.
    pub facing: Facing,
    /// Lifecycle state.
    pub state: UnitState,
    /// Current health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Maximum health.
    #[serde(with = "fixed_serde")]
    pub max_health: Fixed,
    /// Animation frame of the running ability or attack.
    pub frame: u32,
    /// Seconds into the current animation.
    #[serde(with = "fixed_serde")]
    pub animation_time: Fixed,
}

impl UnitView {
    pub(crate) fn from_entity(entity: &Entity) -> Option<Self> {
        let state = entity.state?;
        let health = entity.health?;
        let animation = entity.animation.unwrap_or_default();
        Some(Self {
            id: entity.id,
            unit_type: entity.kind.as_ref().map(|k| k.0.clone()).unwrap_or_default(),
            team: entity.team?,
            position: entity.pos(),
            facing: entity.facing.unwrap_or(Facing::Right),
            state,
            health: health.current,
            max_health: health.max,
            frame: animation.frame,
            animation_time: animation.elapsed,
        })
    }
}

/// Carrier shape, for picking a sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierKind {
    /// Straight single-hit shot.
    Projectile,
    /// Area effect.
    Area,
    /// Aura around its owner.
    Aura,
    /// Ballistic shot.
    Lobbed,
    /// Volley shot.
    Volley,
}

/// What a carrier looks like this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierView {
    /// Entity id.
    pub id: EntityId,
    /// Shape.
    pub kind: CarrierKind,
    /// Side of the owner.
    pub team: Option<Team>,
    /// Drawn position. Lobbed shots are raised by their height.
    pub position: Vec2Fixed,
    /// Height above the ground; non-zero for lobbed shots only.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
    /// Radius of areas and auras, zero otherwise.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Orientation, if any.
    pub facing: Option<Facing>,
}

impl CarrierView {
    pub(crate) fn from_entity(entity: &Entity, gravity: Fixed) -> Option<Self> {
        let (kind, height, radius) = if entity.projectile.is_some() {
            (CarrierKind::Projectile, Fixed::ZERO, Fixed::ZERO)
        } else if let Some(area) = &entity.area {
            (CarrierKind::Area, Fixed::ZERO, area.radius)
        } else if let Some(aura) = &entity.aura {
            (CarrierKind::Aura, Fixed::ZERO, aura.radius)
        } else if let Some(lobbed) = &entity.lobbed {
            (
                CarrierKind::Lobbed,
                lobbed.height_at(lobbed.time, gravity).max(Fixed::ZERO),
                Fixed::ZERO,
            )
        } else if entity.volley.is_some() {
            (CarrierKind::Volley, Fixed::ZERO, Fixed::ZERO)
        } else {
            return None;
        };
        Some(Self {
            id: entity.id,
            kind,
            team: entity.team,
            position: entity.pos(),
            height,
            radius,
            facing: entity.facing,
        })
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSnapshot {
    /// Tick the snapshot was taken after.
    pub tick: u64,
    /// Simulated seconds so far.
    #[serde(with = "fixed_serde")]
    pub elapsed: Fixed,
    /// Units, dead ones included, in spawn order.
    pub units: Vec<UnitView>,
    /// Carriers in spawn order.
    pub carriers: Vec<CarrierView>,
    /// Decided outcome, if any.
    pub outcome: Option<Outcome>,
}

impl BattleSnapshot {
    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| BattleError::Snapshot(format!("Failed to encode snapshot: {e}")))
    }

    /// Decode from bincode.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| BattleError::Snapshot(format!("Failed to decode snapshot: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            BattleSnapshot::from_bytes(&[0xff, 0x01]),
            Err(BattleError::Snapshot(_))
        ));
    }
}
