//! End-of-tick bookkeeping: expiration, uniqueness, deaths and corpses.

use std::collections::BTreeMap;

use tracing::debug;

use crate::components::Dying;
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::Fixed;
use crate::world::BattleWorld;

/// Count down lifetimes. Expired carriers are deleted; expired units die.
pub(crate) fn run_expiration_system(world: &mut BattleWorld) {
    let dt = world.dt;
    for id in world.store.ids_in_spawn_order() {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        let Some(expiration) = entity.expiration.as_mut() else {
            continue;
        };
        expiration.time_left = expiration.time_left.saturating_sub(dt);
        if expiration.time_left > Fixed::ZERO {
            continue;
        }
        entity.expiration = None;
        if !entity.is_unit() {
            world.store.remove(id);
            continue;
        }
        if entity.is_standing() && entity.dying.is_none() {
            if let Some(health) = entity.health.as_mut() {
                health.current = Fixed::ZERO;
            }
            entity.dying = Some(Dying { source: None });
        }
    }
}

/// Keep only the oldest entity per uniqueness key.
pub(crate) fn run_unique_system(world: &mut BattleWorld) {
    let mut seen: BTreeMap<String, EntityId> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for entity in world.store.iter() {
        let Some(unique) = entity.unique.as_ref() else {
            continue;
        };
        if seen.contains_key(&unique.key) {
            duplicates.push(entity.id);
        } else {
            seen.insert(unique.key.clone(), entity.id);
        }
    }
    for id in duplicates {
        world.store.remove(id);
    }
}

/// Turn pending deaths into `Death` events, in spawn order.
pub(crate) fn run_dying_system(world: &mut BattleWorld) {
    let dying: Vec<EntityId> = world
        .store
        .iter()
        .filter(|e| e.dying.is_some() && e.is_standing())
        .map(|e| e.id)
        .collect();
    for entity in dying {
        debug!(%entity, "death");
        world.events.emit(BattleEvent::Death { entity });
    }
}

/// Remove corpses whose time is up.
pub(crate) fn run_corpse_system(world: &mut BattleWorld) {
    let dt = world.dt;
    for id in world.store.ids_in_spawn_order() {
        let Some(corpse) = world.store.get_mut(id).and_then(|e| e.corpse.as_mut()) else {
            continue;
        };
        corpse.time_left = corpse.time_left.saturating_sub(dt);
        if corpse.time_left <= Fixed::ZERO {
            world.store.remove(id);
        }
    }
}
