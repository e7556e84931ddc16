//! Effect carriers: transient entities that deliver an effect list.
//!
//! Projectiles and area effects are resolved by the collision pass.
//! Auras, lobbed shots and volley shots are driven by
//! the processors in this module.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::conditions::UnitCondition;
use crate::effects::{apply_effects, Effect, EffectContext};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::world::BattleWorld;

/// Single-hit carrier in straight-line flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Unit credited with the hit.
    pub owner: EntityId,
    /// Applied to the unit hit.
    pub effects: Vec<Effect>,
    /// Extra filter on top of "living enemy".
    pub condition: UnitCondition,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

/// Stationary carrier hitting every unit in range once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEffect {
    /// Unit credited with the hits.
    pub owner: EntityId,
    /// Radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Applied to each unit affected.
    pub effects: Vec<Effect>,
    /// Which units are affected.
    pub condition: UnitCondition,
    /// Units already affected.
    pub hit: BTreeSet<EntityId>,
}

/// Carrier that follows its owner and pulses periodically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aura {
    /// Unit the aura belongs to.
    pub owner: EntityId,
    /// Radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Seconds between pulses.
    #[serde(with = "fixed_serde")]
    pub period: Fixed,
    /// Seconds since creation.
    #[serde(with = "fixed_serde")]
    pub elapsed: Fixed,
    /// Pulses fired so far.
    pub pulses: u64,
    /// Applied to each unit in range on every pulse.
    pub effects: Vec<Effect>,
    /// Which units are affected.
    pub condition: UnitCondition,
}

/// Ballistic carrier.
///
/// The flight is a parabola over the ground: horizontal travel along
/// `direction` at `horizontal_speed`, height `z = vz·t − g·t²/2`. The drawn
/// position subtracts the height from y.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobbed {
    /// Unit credited with the landing.
    pub owner: EntityId,
    /// Launch point.
    pub origin: Vec2Fixed,
    /// Landing point.
    pub landing: Vec2Fixed,
    /// Unit ground direction.
    pub direction: Vec2Fixed,
    /// Ground distance to the landing point.
    #[serde(with = "fixed_serde")]
    pub distance: Fixed,
    /// Ground speed.
    #[serde(with = "fixed_serde")]
    pub horizontal_speed: Fixed,
    /// Initial vertical speed.
    #[serde(with = "fixed_serde")]
    pub vertical_speed: Fixed,
    /// Seconds in flight.
    #[serde(with = "fixed_serde")]
    pub time: Fixed,
    /// Applied on landing with the carrier as parent.
    pub effects: Vec<Effect>,
}

impl Lobbed {
    /// Height above ground after `time` seconds.
    #[must_use]
    pub fn height_at(&self, time: Fixed, gravity: Fixed) -> Fixed {
        let rise = self.vertical_speed.saturating_mul(time);
        let fall = gravity.saturating_mul(time).saturating_mul(time) / 2;
        rise - fall
    }

    /// Ground distance covered after `time` seconds.
    #[must_use]
    pub fn travelled_at(&self, time: Fixed) -> Fixed {
        self.horizontal_speed.saturating_mul(time)
    }

    /// Whether the shot has landed after `time` seconds.
    #[must_use]
    pub fn has_landed(&self, time: Fixed, gravity: Fixed) -> bool {
        (time > Fixed::ZERO && self.height_at(time, gravity) <= Fixed::ZERO)
            || self.travelled_at(time) >= self.distance
    }

    /// Drawn position after `time` seconds.
    #[must_use]
    pub fn projected_position(&self, time: Fixed, gravity: Fixed) -> Vec2Fixed {
        let travelled = self.travelled_at(time).min(self.distance);
        let ground = self.origin + self.direction.scale(travelled);
        Vec2Fixed::new(ground.x, ground.y - self.height_at(time, gravity).max(Fixed::ZERO))
    }
}

/// Straight-line carrier aimed at a fixed point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolleyShot {
    /// Unit credited with the landing.
    pub owner: EntityId,
    /// Landing point, fixed at launch.
    pub landing: Vec2Fixed,
    /// Flight speed.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Applied on arrival with the shot as parent.
    pub effects: Vec<Effect>,
}

/// Advance auras, pulsing them onto units in range. Auras whose owner is
/// gone or dead are removed.
pub(crate) fn run_aura_system(world: &mut BattleWorld, units: &[EntityId]) {
    let dt = world.dt;
    let now = world.elapsed;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        let Some(owner) = entity.aura.as_ref().map(|aura| aura.owner) else {
            continue;
        };
        let center = entity.pos();
        if !world.store.get(owner).is_some_and(|e| e.is_standing()) {
            world.store.remove(id);
            continue;
        }

        let Some(aura) = world.store.get_mut(id).and_then(|e| e.aura.as_mut()) else {
            continue;
        };
        aura.elapsed = aura.elapsed.saturating_add(dt);
        if aura.period <= Fixed::ZERO {
            continue;
        }
        let due = (aura.elapsed / aura.period).floor().to_num::<i64>().max(0) as u64;
        if due <= aura.pulses {
            continue;
        }
        aura.pulses = due;
        let radius = aura.radius;
        let condition = aura.condition.clone();
        let effects = aura.effects.clone();

        let victims: Vec<EntityId> = units
            .iter()
            .copied()
            .filter(|&unit| {
                world.store.get(unit).is_some_and(|e| {
                    e.is_alive() && e.pos().distance_squared(center) <= radius.saturating_mul(radius)
                }) && condition.check(&world.store, id, unit, now)
            })
            .collect();

        for victim in victims {
            world.events.emit(BattleEvent::AreaHit {
                carrier: id,
                target: victim,
            });
            apply_effects(
                world,
                &effects,
                EffectContext {
                    owner,
                    parent: id,
                    target: Some(victim),
                },
            );
        }
    }
}

/// Fly lobbed shots and resolve the ones that land.
pub(crate) fn run_lobbed_system(world: &mut BattleWorld) {
    let dt = world.dt;
    let gravity = world.config.gravity;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        let Some(lobbed) = entity.lobbed.as_mut() else {
            continue;
        };
        lobbed.time = lobbed.time.saturating_add(dt);
        let time = lobbed.time;
        if !lobbed.has_landed(time, gravity) {
            let position = lobbed.projected_position(time, gravity);
            if let Some(p) = entity.position.as_mut() {
                p.value = position;
            }
            continue;
        }

        let landing = lobbed.landing;
        let owner = lobbed.owner;
        let effects = std::mem::take(&mut lobbed.effects);
        if let Some(p) = entity.position.as_mut() {
            p.value = landing;
        }
        world.events.emit(BattleEvent::CarrierLanded { carrier: id });
        apply_effects(
            world,
            &effects,
            EffectContext {
                owner,
                parent: id,
                target: None,
            },
        );
        world.store.remove(id);
    }
}

/// Steer volley shots and resolve the ones that arrive this tick.
pub(crate) fn run_volley_system(world: &mut BattleWorld) {
    let dt = world.dt;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        let position = entity.pos();
        let Some(shot) = entity.volley.as_mut() else {
            continue;
        };
        let remaining = shot.landing - position;
        let reach = shot.speed.saturating_mul(dt);
        if remaining.length() > reach {
            let velocity = remaining.normalize().scale(shot.speed);
            if let Some(v) = entity.velocity.as_mut() {
                v.value = velocity;
            }
            continue;
        }

        let landing = shot.landing;
        let owner = shot.owner;
        let effects = std::mem::take(&mut shot.effects);
        if let Some(p) = entity.position.as_mut() {
            p.value = landing;
        }
        world.events.emit(BattleEvent::CarrierLanded { carrier: id });
        apply_effects(
            world,
            &effects,
            EffectContext {
                owner,
                parent: id,
                target: None,
            },
        );
        world.store.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ballistic_launch;

    fn lob(distance: i32) -> Lobbed {
        let gravity = Fixed::from_num(400);
        let max_range = Fixed::from_num(300);
        let speed = crate::math::fixed_sqrt(gravity * max_range);
        let (horizontal_speed, vertical_speed) =
            ballistic_launch(speed, gravity, Fixed::from_num(distance));
        Lobbed {
            owner: EntityId::new(0, 0),
            origin: Vec2Fixed::from_ints(0, 100),
            landing: Vec2Fixed::from_ints(distance, 100),
            direction: Vec2Fixed::from_ints(1, 0),
            distance: Fixed::from_num(distance),
            horizontal_speed,
            vertical_speed,
            time: Fixed::ZERO,
            effects: vec![],
        }
    }

    #[test]
    fn test_lobbed_rises_then_lands_near_target() {
        let gravity = Fixed::from_num(400);
        let shot = lob(200);
        let dt = crate::config::tick_dt();

        let mut time = Fixed::ZERO;
        let mut peak = Fixed::ZERO;
        let mut ticks = 0;
        loop {
            time += dt;
            ticks += 1;
            if shot.has_landed(time, gravity) {
                break;
            }
            peak = peak.max(shot.height_at(time, gravity));
            let drawn = shot.projected_position(time, gravity);
            assert!(drawn.y <= Fixed::from_num(100), "height is drawn upward");
            assert!(ticks < 10_000, "shot never landed");
        }
        assert!(peak > Fixed::ZERO);
        let travelled = shot.travelled_at(time);
        assert!((travelled - Fixed::from_num(200)).abs() < Fixed::from_num(8));
    }

    #[test]
    fn test_zero_distance_lands_immediately() {
        let gravity = Fixed::from_num(400);
        let shot = lob(0);
        assert!(shot.has_landed(Fixed::ZERO, gravity));
    }
}
