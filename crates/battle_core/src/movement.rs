//! Movement processors: idle, pursuit, fleeing, grab pulls, attachment and
//! position integration.
//!
//! Processors only set velocities; [`run_position_system`] is the single
//! place positions advance.

use crate::components::{Facing, Team, UnitState, Velocity};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::{Fixed, Vec2Fixed};
use crate::world::BattleWorld;

/// Idle units stand still facing the enemy side and pick up a target if the
/// targeting pass found one.
pub(crate) fn run_idle_system(world: &mut BattleWorld, units: &[EntityId]) {
    for &id in units {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        if entity.state != Some(UnitState::Idle) {
            continue;
        }
        entity.velocity = Some(Velocity::ZERO);
        if let Some(team) = entity.team {
            entity.facing = Some(team.home_facing());
        }
        let acquired = entity
            .destination
            .as_ref()
            .is_some_and(|d| d.strategy.target.is_some());
        if acquired && entity.is_alive() {
            world.events.emit(BattleEvent::TargetAcquired { entity: id });
        }
    }
}

/// Fleeing units run straight away from their fear source; grabbed units
/// are pulled toward their grabber.
pub(crate) fn run_forced_movement_system(world: &mut BattleWorld, units: &[EntityId]) {
    let now = world.elapsed;
    let fleeing_cap = world.config.fleeing_speed;
    for &id in units {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        let Some(statuses) = entity.statuses.as_ref() else {
            continue;
        };
        let position = entity.pos();
        let (velocity, facing) = match entity.state {
            Some(UnitState::Fleeing) => {
                let Some((source, fallback)) = statuses.fleeing_from(now) else {
                    continue;
                };
                let threat = world.store.get(source).map_or(fallback, |e| e.pos());
                let mut away = position - threat;
                if away == Vec2Fixed::ZERO {
                    away = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
                }
                let speed = entity
                    .movement
                    .map_or(fleeing_cap, |m| m.speed.min(fleeing_cap));
                (
                    away.normalize().scale(speed),
                    Some(if away.x < Fixed::ZERO {
                        Facing::Left
                    } else {
                        Facing::Right
                    }),
                )
            }
            Some(UnitState::Grabbed) => {
                let Some((grabber, speed)) = statuses.grabbed_by(now) else {
                    continue;
                };
                let Some(holder) = world.store.get(grabber) else {
                    continue;
                };
                let anchor = holder.pos();
                let contact = half_width(holder.hitbox) + half_width(entity.hitbox);
                let offset = anchor - position;
                let distance = offset.length();
                let velocity = if distance <= contact {
                    Vec2Fixed::ZERO
                } else {
                    clamped_velocity(offset, distance - contact, speed, world.dt)
                };
                (velocity, Facing::from_dx(offset.x))
            }
            _ => continue,
        };

        if let Some(entity) = world.store.get_mut(id) {
            entity.velocity = Some(Velocity::new(velocity));
            if let Some(facing) = facing {
                entity.facing = Some(facing);
            }
        }
    }
}

/// Pursuing units walk to a stand-off point beside their target.
pub(crate) fn run_pursuit_system(world: &mut BattleWorld, units: &[EntityId]) {
    let now = world.elapsed;
    let dt = world.dt;
    for &id in units {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        if entity.state != Some(UnitState::Pursuing) {
            continue;
        }
        let Some(destination) = entity.destination.as_ref() else {
            continue;
        };
        let target = destination
            .strategy
            .target
            .and_then(|t| world.store.get(t))
            .filter(|t| t.is_alive());
        let Some(target) = target else {
            if let Some(entity) = world.store.get_mut(id) {
                entity.velocity = Some(Velocity::ZERO);
            }
            world.events.emit(BattleEvent::TargetLost { entity: id });
            continue;
        };

        let position = entity.pos();
        let target_position = target.pos();
        let side = match Facing::from_dx(position.x - target_position.x) {
            Some(facing) => facing.sign(),
            None => match entity.team {
                Some(Team::Team2) => Fixed::ONE,
                _ => -Fixed::ONE,
            },
        };
        let goal = Vec2Fixed::new(
            target_position.x + destination.x_offset.saturating_mul(side),
            target_position.y,
        );
        let offset = goal - position;
        let distance = offset.length();
        let arrived = distance <= destination.min_distance;
        let speed = entity.movement.map_or(Fixed::ZERO, |m| m.speed).saturating_mul(
            entity
                .statuses
                .as_ref()
                .map_or(Fixed::ONE, |s| s.speed_multiplier(now)),
        );
        let velocity = if arrived {
            Vec2Fixed::ZERO
        } else {
            clamped_velocity(offset, distance, speed, dt)
        };
        let facing = Facing::from_dx(target_position.x - position.x);
        let newly_arrived = arrived && !destination.arrived;

        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        entity.velocity = Some(Velocity::new(velocity));
        if let Some(facing) = facing {
            entity.facing = Some(facing);
        }
        if let Some(destination) = entity.destination.as_mut() {
            destination.arrived = arrived;
        }
        if newly_arrived {
            world
                .events
                .emit(BattleEvent::DestinationReached { entity: id });
        }
    }
}

/// Snap attached entities to their parent; drop the ones whose parent is gone.
pub(crate) fn run_attached_system(world: &mut BattleWorld) {
    for id in world.store.ids_in_spawn_order() {
        let Some(attached) = world.store.get(id).and_then(|e| e.attached) else {
            continue;
        };
        let Some(parent_position) = world.store.get(attached.parent).and_then(|e| e.position) else {
            world.store.remove(id);
            continue;
        };
        if let Some(position) = world.store.get_mut(id).and_then(|e| e.position.as_mut()) {
            position.value = parent_position.value + attached.offset;
        }
    }
}

/// Advance every position by its velocity.
pub(crate) fn run_position_system(world: &mut BattleWorld) {
    let dt = world.dt;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        if entity.lobbed.is_some() || entity.attached.is_some() {
            continue;
        }
        let (Some(position), Some(velocity)) = (entity.position.as_mut(), entity.velocity) else {
            continue;
        };
        position.value += velocity.value.scale(dt);
    }
}

/// Velocity toward `offset` at `speed`, slowed so one tick never overshoots
/// the remaining `distance`.
fn clamped_velocity(offset: Vec2Fixed, distance: Fixed, speed: Fixed, dt: Fixed) -> Vec2Fixed {
    let direction = offset.normalize();
    if dt > Fixed::ZERO && speed.saturating_mul(dt) > distance {
        return direction.scale(distance / dt);
    }
    direction.scale(speed)
}

fn half_width(hitbox: Option<crate::components::Hitbox>) -> Fixed {
    hitbox.map_or(Fixed::ZERO, |h| h.width / 2)
}
