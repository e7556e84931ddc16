//! Projectile and area-effect resolution.
//!
//! Broad phase: one [`SpatialHash`] per team of living units, rebuilt each
//! pass. Narrow phase: circle against the defender's axis-aligned hitbox,
//! centered on its position.
//!
//! A projectile hits at most one unit: the first enemy in spawn order that
//! passes the narrow phase. It is consumed by the hit. An area effect may hit
//! many units per tick but records every victim and never hits one twice.

use crate::components::Team;
use crate::effects::{apply_effects, EffectContext};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::spatial::SpatialHash;
use crate::world::BattleWorld;

/// Resolve projectile hits, off-field projectiles and area effects.
pub(crate) fn run_collision_system(world: &mut BattleWorld, units: &[EntityId]) {
    let hashes = build_hashes(world, units);
    resolve_projectiles(world, &hashes);
    resolve_areas(world, &hashes);
}

fn build_hashes(world: &BattleWorld, units: &[EntityId]) -> [SpatialHash; 2] {
    let cell = world.config.spatial_cell_size;
    let mut hashes = [SpatialHash::new(cell), SpatialHash::new(cell)];
    for &id in units {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        if !entity.is_alive() {
            continue;
        }
        let (Some(team), Some(hitbox), Some(position)) = (entity.team, entity.hitbox, entity.position)
        else {
            continue;
        };
        hashes[team.index()].insert(id, entity.spawn_seq, position.value, hitbox.bounding_radius());
    }
    hashes
}

fn resolve_projectiles(world: &mut BattleWorld, hashes: &[SpatialHash; 2]) {
    let now = world.elapsed;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        let Some(projectile) = entity.projectile.as_ref() else {
            continue;
        };
        let center = entity.pos();
        if !world.config.in_bounds(center) {
            world.store.remove(id);
            continue;
        }
        let Some(team) = entity.team else {
            continue;
        };

        let victim = hashes[team.other().index()]
            .query_neighbors(center, projectile.radius)
            .into_iter()
            .find(|&candidate| {
                world.store.get(candidate).is_some_and(|unit| {
                    unit.is_alive()
                        && unit.team != Some(team)
                        && unit.hitbox.is_some_and(|hitbox| {
                            hitbox.overlaps_circle(unit.pos(), center, projectile.radius)
                        })
                }) && projectile.condition.check(&world.store, id, candidate, now)
            });
        let Some(victim) = victim else {
            continue;
        };

        let Some(projectile) = world.store.remove(id).and_then(|e| e.projectile) else {
            continue;
        };
        world.events.emit(BattleEvent::ProjectileHit {
            projectile: id,
            target: victim,
        });
        apply_effects(
            world,
            &projectile.effects,
            EffectContext {
                owner: projectile.owner,
                parent: id,
                target: Some(victim),
            },
        );
    }
}

fn resolve_areas(world: &mut BattleWorld, hashes: &[SpatialHash; 2]) {
    let now = world.elapsed;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        let Some(area) = entity.area.as_ref() else {
            continue;
        };
        let center = entity.pos();

        let mut candidates: Vec<EntityId> = [Team::Team1, Team::Team2]
            .iter()
            .flat_map(|team| hashes[team.index()].query_neighbors(center, area.radius))
            .collect();
        candidates.sort_by_key(|&candidate| world.store.spawn_seq(candidate));

        let victims: Vec<EntityId> = candidates
            .into_iter()
            .filter(|candidate| !area.hit.contains(candidate))
            .filter(|&candidate| {
                world.store.get(candidate).is_some_and(|unit| {
                    unit.is_alive()
                        && unit
                            .hitbox
                            .is_some_and(|hitbox| hitbox.overlaps_circle(unit.pos(), center, area.radius))
                }) && area.condition.check(&world.store, id, candidate, now)
            })
            .collect();
        if victims.is_empty() {
            continue;
        }

        let owner = area.owner;
        let effects = area.effects.clone();
        if let Some(area) = world.store.get_mut(id).and_then(|e| e.area.as_mut()) {
            area.hit.extend(victims.iter().copied());
        }
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

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::carriers::{AreaEffect, Projectile};
    use crate::components::Position;
    use crate::conditions::UnitCondition;
    use crate::config::BattleConfig;
    use crate::effects::{Effect, Recipient};
    use crate::math::{Fixed, Vec2Fixed};
    use crate::store::Entity;
    use crate::templates::{TemplateRegistry, UnitTemplate};

    /// One Team1 archer far away and two overlapping Team2 soldiers.
    fn world() -> (BattleWorld, Vec<EntityId>) {
        let mut registry = TemplateRegistry::new();
        registry
            .register(UnitTemplate::melee("soldier", 30, 0, 1, 10, 1.0))
            .unwrap();
        let world = BattleWorld::new(
            &[("soldier".to_string(), (100, 300))],
            &[
                ("soldier".to_string(), (504, 300)),
                ("soldier".to_string(), (500, 300)),
            ],
            Arc::new(registry),
            BattleConfig::default(),
            Fixed::from_num(60),
        )
        .unwrap();
        let ids = world.store.ids_in_spawn_order();
        (world, ids)
    }

    fn hit(damage: i32) -> Vec<Effect> {
        vec![Effect::Damages {
            damage: Fixed::from_num(damage),
            recipient: Recipient::Target,
        }]
    }

    fn carrier(x: i32, y: i32) -> Entity {
        let mut entity = Entity::new();
        entity.team = Some(Team::Team1);
        entity.position = Some(Position::new(Vec2Fixed::from_ints(x, y)));
        entity
    }

    fn projectile(world: &mut BattleWorld, owner: EntityId, x: i32, y: i32) -> EntityId {
        let mut entity = carrier(x, y);
        entity.projectile = Some(Projectile {
            owner,
            effects: hit(5),
            condition: UnitCondition::Always,
            radius: Fixed::from_num(4),
        });
        world.spawn(entity)
    }

    fn health(world: &BattleWorld, id: EntityId) -> Fixed {
        world.store.get(id).and_then(|e| e.health).unwrap().current
    }

    fn drain(world: &mut BattleWorld) -> Vec<BattleEvent> {
        std::iter::from_fn(|| world.events.pop()).collect()
    }

    #[test]
    fn test_projectile_hits_first_enemy_in_spawn_order() {
        let (mut world, ids) = world();
        let shot = projectile(&mut world, ids[0], 500, 300);
        run_collision_system(&mut world, &ids);

        assert!(!world.store.contains(shot));
        assert_eq!(health(&world, ids[1]), Fixed::from_num(25));
        assert_eq!(health(&world, ids[2]), Fixed::from_num(30));
        let events = drain(&mut world);
        assert_eq!(
            events,
            vec![BattleEvent::ProjectileHit {
                projectile: shot,
                target: ids[1],
            }]
        );
    }

    #[test]
    fn test_projectile_ignores_its_own_team() {
        let (mut world, ids) = world();
        let shot = projectile(&mut world, ids[0], 100, 300);
        run_collision_system(&mut world, &ids);
        assert!(world.store.contains(shot));
        assert_eq!(health(&world, ids[0]), Fixed::from_num(30));
        assert!(drain(&mut world).is_empty());
    }

    #[test]
    fn test_offfield_projectile_is_removed() {
        let (mut world, ids) = world();
        let shot = projectile(&mut world, ids[0], -200, 300);
        run_collision_system(&mut world, &ids);
        assert!(!world.store.contains(shot));
        assert!(drain(&mut world).is_empty());
    }

    #[test]
    fn test_area_hits_each_unit_once() {
        let (mut world, ids) = world();
        let mut entity = carrier(500, 300);
        entity.area = Some(AreaEffect {
            owner: ids[0],
            radius: Fixed::from_num(40),
            effects: hit(5),
            condition: UnitCondition::Enemy,
            hit: BTreeSet::new(),
        });
        let area = world.spawn(entity);

        run_collision_system(&mut world, &ids);
        let hits: Vec<EntityId> = drain(&mut world)
            .into_iter()
            .filter_map(|event| match event {
                BattleEvent::AreaHit { carrier, target } if carrier == area => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(hits, vec![ids[1], ids[2]]);

        run_collision_system(&mut world, &ids);
        assert!(drain(&mut world).is_empty());
        assert_eq!(health(&world, ids[1]), Fixed::from_num(25));
        assert_eq!(health(&world, ids[2]), Fixed::from_num(25));
    }
}
