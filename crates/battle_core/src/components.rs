//! Component definitions.
//!
//! Components are pure data. Behavior lives in the processors that read
//! and write them; see [`crate::world`] for the order they run in.

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::math::{fixed_decimal, fixed_serde, Fixed, Vec2Fixed};
use crate::targeting::TargetStrategy;

// ============================================================================
// Identity
// ============================================================================

/// Side of the battle an entity fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    /// Left side, spawned first.
    Team1,
    /// Right side.
    Team2,
}

impl Team {
    /// The opposing team.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Team1 => Self::Team2,
            Self::Team2 => Self::Team1,
        }
    }

    /// Direction a unit of this team faces when it has nothing to do.
    #[must_use]
    pub const fn home_facing(self) -> Facing {
        match self {
            Self::Team1 => Facing::Right,
            Self::Team2 => Facing::Left,
        }
    }

    /// Stable index for per-team tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Team1 => 0,
            Self::Team2 => 1,
        }
    }
}

/// Horizontal facing of a unit or carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    /// Facing negative x.
    Left,
    /// Facing positive x.
    Right,
}

impl Facing {
    /// `-1` for left, `1` for right.
    #[must_use]
    pub fn sign(self) -> Fixed {
        match self {
            Self::Left => -Fixed::ONE,
            Self::Right => Fixed::ONE,
        }
    }

    /// Facing that looks along `dx`, or `None` when `dx` is zero.
    #[must_use]
    pub fn from_dx(dx: Fixed) -> Option<Self> {
        if dx > Fixed::ZERO {
            Some(Self::Right)
        } else if dx < Fixed::ZERO {
            Some(Self::Left)
        } else {
            None
        }
    }
}

/// Template identifier of a unit (`"archer"`, `"swordsman"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKind(pub String);

// ============================================================================
// Spatial
// ============================================================================

/// Position component in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// World position.
    pub value: Vec2Fixed,
}

impl Position {
    /// Create a new position at the given coordinates.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }
}

/// Velocity component, in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Velocity {
    /// Velocity vector.
    pub value: Vec2Fixed,
}

impl Velocity {
    /// Create a new velocity.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }

    /// Zero velocity (stationary).
    pub const ZERO: Self = Self {
        value: Vec2Fixed::ZERO,
    };
}

/// Base movement speed of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Speed in world units per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
}

/// Axis-aligned hitbox centered on the entity position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hitbox {
    /// Full width.
    #[serde(with = "fixed_decimal")]
    pub width: Fixed,
    /// Full height.
    #[serde(with = "fixed_decimal")]
    pub height: Fixed,
}

impl Hitbox {
    /// Create a hitbox from integer dimensions.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width: Fixed::from_num(width),
            height: Fixed::from_num(height),
        }
    }

    /// Radius of the circle that encloses the box.
    #[must_use]
    pub fn bounding_radius(self) -> Fixed {
        Vec2Fixed::new(self.width / 2, self.height / 2).length()
    }

    /// Circle-versus-box overlap test.
    ///
    /// `center` is the box center; the circle is `(point, radius)`.
    #[must_use]
    pub fn overlaps_circle(self, center: Vec2Fixed, point: Vec2Fixed, radius: Fixed) -> bool {
        let half_w = self.width / 2;
        let half_h = self.height / 2;
        let closest = Vec2Fixed::new(
            crate::math::clamp(point.x, center.x - half_w, center.x + half_w),
            crate::math::clamp(point.y, center.y - half_h, center.y + half_h),
        );
        closest.distance_squared(point) <= radius.saturating_mul(radius)
    }
}

// ============================================================================
// Combat
// ============================================================================

/// Health component. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health.
    #[serde(with = "fixed_serde")]
    pub current: Fixed,
    /// Maximum health.
    #[serde(with = "fixed_serde")]
    pub max: Fixed,
}

/// What a single application of damage did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    /// Health actually removed.
    pub dealt: Fixed,
    /// Health went from positive to zero.
    pub killing_blow: bool,
}

impl Health {
    /// Create a new health component at full health.
    #[must_use]
    pub fn new(max: Fixed) -> Self {
        Self { current: max, max }
    }

    /// Apply damage, clamping at zero.
    pub fn apply_damage(&mut self, amount: Fixed) -> DamageOutcome {
        let was_alive = self.current > Fixed::ZERO;
        let before = self.current;
        self.current = (self.current - amount.max(Fixed::ZERO)).max(Fixed::ZERO);
        DamageOutcome {
            dealt: before - self.current,
            killing_blow: was_alive && self.current == Fixed::ZERO,
        }
    }

    /// Heal, clamping at maximum. Returns the amount restored.
    pub fn heal(&mut self, amount: Fixed) -> Fixed {
        let before = self.current;
        self.current = (self.current + amount.max(Fixed::ZERO)).min(self.max);
        self.current - before
    }

    /// Health is zero.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.current <= Fixed::ZERO
    }

    /// Health lost so far.
    #[must_use]
    pub fn missing(&self) -> Fixed {
        self.max - self.current
    }

    /// Current health as a fraction of maximum (0 to 1).
    #[must_use]
    pub fn fraction(&self) -> Fixed {
        if self.max <= Fixed::ZERO {
            return Fixed::ZERO;
        }
        self.current / self.max
    }
}

/// Damage mitigation: a flat reduction followed by a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Armor {
    /// Subtracted from each hit before the percentage applies.
    #[serde(with = "fixed_decimal")]
    pub flat: Fixed,
    /// Fraction of the remaining damage removed (0 to 1).
    #[serde(with = "fixed_decimal")]
    pub percent: Fixed,
}

impl Armor {
    /// Create armor from flat and percent reductions.
    #[must_use]
    pub fn new(flat: Fixed, percent: Fixed) -> Self {
        Self { flat, percent }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of a unit.
///
/// `Ability(k)` holds the index of the running ability (0 to 4). `Dead` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    /// No target; standing still.
    Idle,
    /// Moving toward the current target.
    Pursuing,
    /// Running the ability at this index.
    Ability(u8),
    /// Running away from a fear source.
    Fleeing,
    /// Being pulled toward a grabber.
    Grabbed,
    /// Holding a grabbed unit.
    Grabbing,
    /// Dead. Terminal.
    Dead,
}

impl UnitState {
    /// Maximum number of abilities a unit may carry.
    pub const MAX_ABILITIES: usize = 5;

    /// Whether this state is `Dead`.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }

    /// Whether abilities may be triggered from this state.
    #[must_use]
    pub const fn can_trigger_abilities(self) -> bool {
        matches!(self, Self::Idle | Self::Pursuing)
    }

    /// Running ability index, if any.
    #[must_use]
    pub const fn ability_index(self) -> Option<usize> {
        match self {
            Self::Ability(k) => Some(k as usize),
            _ => None,
        }
    }
}

/// Where a unit wants to stand relative to its current target.
///
/// The strategy's `target` is the unit's current target, refreshed by the
/// targeting pass every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// How the current target is chosen.
    pub strategy: TargetStrategy,
    /// Horizontal stand-off from the target on the unit's own side.
    #[serde(with = "fixed_serde")]
    pub x_offset: Fixed,
    /// Arrival tolerance.
    #[serde(with = "fixed_serde")]
    pub min_distance: Fixed,
    /// Whether the unit halted at its destination last tick.
    #[serde(default)]
    pub arrived: bool,
}

/// Animation clock of the running ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimationState {
    /// Seconds since the current animation started.
    #[serde(with = "fixed_serde")]
    pub elapsed: Fixed,
    /// Frame currently shown.
    pub frame: u32,
    /// Last frame whose effects were applied.
    pub last_fired: Option<u32>,
}

impl AnimationState {
    /// Restart from frame zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Remaining lifetime. Carriers are deleted and units die when it runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
    /// Seconds left.
    #[serde(with = "fixed_serde")]
    pub time_left: Fixed,
}

/// Only the oldest entity carrying a given key survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unique {
    /// Uniqueness key.
    pub key: String,
}

/// Keeps an entity glued to another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attached {
    /// Entity followed.
    pub parent: EntityId,
    /// Offset from the parent position.
    pub offset: Vec2Fixed,
}

/// Health hit zero this tick; the death is resolved at the end of the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dying {
    /// Entity credited with the killing blow.
    pub source: Option<EntityId>,
}

/// Remaining time a dead unit stays on the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpse {
    /// Seconds left.
    #[serde(with = "fixed_serde")]
    pub time_left: Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_clamps_and_reports_killing_blow() {
        let mut health = Health::new(Fixed::from_num(30));
        let first = health.apply_damage(Fixed::from_num(20));
        assert_eq!(first.dealt, Fixed::from_num(20));
        assert!(!first.killing_blow);

        let second = health.apply_damage(Fixed::from_num(50));
        assert_eq!(second.dealt, Fixed::from_num(10));
        assert!(second.killing_blow);
        assert_eq!(health.current, Fixed::ZERO);

        let third = health.apply_damage(Fixed::from_num(5));
        assert!(!third.killing_blow, "only the positive-to-zero hit counts");
    }

    #[test]
    fn test_health_heal_clamps_at_max() {
        let mut health = Health::new(Fixed::from_num(100));
        health.apply_damage(Fixed::from_num(10));
        assert_eq!(health.heal(Fixed::from_num(25)), Fixed::from_num(10));
        assert_eq!(health.current, health.max);
        assert_eq!(health.missing(), Fixed::ZERO);
    }

    #[test]
    fn test_hitbox_circle_overlap() {
        let hitbox = Hitbox::new(16, 32);
        let center = Vec2Fixed::from_ints(100, 100);
        assert!(hitbox.overlaps_circle(center, Vec2Fixed::from_ints(100, 115), Fixed::ONE));
        assert!(hitbox.overlaps_circle(center, Vec2Fixed::from_ints(110, 100), Fixed::from_num(3)));
        assert!(!hitbox.overlaps_circle(center, Vec2Fixed::from_ints(110, 100), Fixed::ONE));
        assert!(!hitbox.overlaps_circle(center, Vec2Fixed::from_ints(100, 120), Fixed::from_num(2)));
    }

    #[test]
    fn test_facing_from_dx() {
        assert_eq!(Facing::from_dx(Fixed::from_num(3)), Some(Facing::Right));
        assert_eq!(Facing::from_dx(Fixed::from_num(-1)), Some(Facing::Left));
        assert_eq!(Facing::from_dx(Fixed::ZERO), None);
        assert_eq!(Team::Team1.home_facing(), Facing::Right);
        assert_eq!(Team::Team2.other(), Team::Team1);
    }
}
