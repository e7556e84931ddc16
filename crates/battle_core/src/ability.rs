//! Abilities: triggering, persistence checks and frame effects.
//!
//! Abilities are ordered by priority (index 0 first). A unit that is idle or
//! pursuing triggers at most one ability per tick: the first one whose
//! trigger conditions all hold. Triggering locks the ability's target; the
//! lock holds until the ability completes or is interrupted and is never
//! re-resolved in between.
//!
//! While the ability runs, its persistent conditions are re-checked every
//! tick against the locked target. The animation clock maps elapsed time to
//! frames; each frame's effects fire exactly once, even if a long tick skips
//! past several frames.
//!
//! Instant abilities are checked first, whatever the unit is doing. They
//! have no animation and never change the unit's state: the first one whose
//! trigger conditions hold applies its effects on the spot.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::{Facing, Velocity};
use crate::conditions::UnitCondition;
use crate::effects::{apply_effects, Effect, EffectContext};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::{fixed_decimal, Fixed};
use crate::store::EntityStore;
use crate::targeting::{find_target, TargetStrategy, TargetingScope};
use crate::world::BattleWorld;

/// Gate on triggering or continuing an ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityCondition {
    /// At least this many seconds since the ability last triggered.
    Cooldown(#[serde(with = "fixed_decimal")] Fixed),
    /// There is a target and it satisfies the condition.
    HasTarget(UnitCondition),
    /// The caster itself satisfies the condition.
    SatisfiesUnitCondition(UnitCondition),
}

impl AbilityCondition {
    /// Evaluate for `caster` aiming at `target`.
    #[must_use]
    pub fn check(
        &self,
        store: &EntityStore,
        caster: EntityId,
        target: Option<EntityId>,
        last_used: Option<Fixed>,
        now: Fixed,
    ) -> bool {
        match self {
            Self::Cooldown(cooldown) => {
                last_used.map_or(true, |used| now.saturating_sub(used) >= *cooldown)
            }
            Self::HasTarget(condition) => target.is_some_and(|target| {
                store.contains(target) && condition.check(store, caster, target, now)
            }),
            Self::SatisfiesUnitCondition(condition) => condition.check(store, caster, caster, now),
        }
    }
}

/// Static definition of an ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityDef {
    /// Display name.
    pub name: String,
    /// How the target is found at trigger time.
    pub strategy: TargetStrategy,
    /// All must hold to trigger.
    #[serde(default)]
    pub trigger_conditions: Vec<AbilityCondition>,
    /// All must hold every tick while running.
    #[serde(default)]
    pub persistent_conditions: Vec<AbilityCondition>,
    /// Number of animation frames.
    pub frame_count: u32,
    /// Animation length in seconds.
    #[serde(with = "fixed_decimal")]
    pub duration: Fixed,
    /// Effects fired when a frame is reached.
    #[serde(default)]
    pub frame_effects: BTreeMap<u32, Vec<Effect>>,
}

impl AbilityDef {
    /// Seconds per frame.
    #[must_use]
    pub fn frame_time(&self) -> Fixed {
        if self.frame_count == 0 {
            return self.duration;
        }
        self.duration / Fixed::from_num(self.frame_count)
    }

    /// Frame shown after `elapsed` seconds (unclamped).
    #[must_use]
    pub fn frame_at(&self, elapsed: Fixed) -> u32 {
        let frame_time = self.frame_time();
        if frame_time <= Fixed::ZERO {
            return self.frame_count;
        }
        (elapsed / frame_time).floor().to_num::<i64>().clamp(0, i64::from(u32::MAX)) as u32
    }
}

/// Effects fired without an animation, in any living state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantAbilityDef {
    /// Display name.
    pub name: String,
    /// How the target is found.
    pub strategy: TargetStrategy,
    /// All must hold to fire.
    #[serde(default)]
    pub trigger_conditions: Vec<AbilityCondition>,
    /// Applied with the unit as owner and parent.
    pub effects: Vec<Effect>,
}

/// A unit's instant abilities and when each last fired.
#[derive(Debug, Clone)]
pub struct InstantAbilities {
    /// Shared definitions, in priority order.
    pub defs: Arc<[InstantAbilityDef]>,
    /// Battle time of the last use, parallel to `defs`.
    pub last_used: Vec<Option<Fixed>>,
}

impl InstantAbilities {
    /// Fresh runtime state for a definition list.
    #[must_use]
    pub fn new(defs: Arc<[InstantAbilityDef]>) -> Self {
        let last_used = vec![None; defs.len()];
        Self { defs, last_used }
    }
}

/// Per-ability runtime data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbilityRuntime {
    /// Battle time of the last trigger.
    pub last_used: Option<Fixed>,
    /// Locked target. Set only while the ability runs.
    pub target: Option<EntityId>,
}

/// A unit's abilities, in priority order.
#[derive(Debug, Clone)]
pub struct Abilities {
    /// Shared definitions.
    pub defs: Arc<[AbilityDef]>,
    /// Runtime data, parallel to `defs`.
    pub runtime: Vec<AbilityRuntime>,
}

impl Abilities {
    /// Fresh runtime state for a definition list.
    #[must_use]
    pub fn new(defs: Arc<[AbilityDef]>) -> Self {
        let runtime = vec![AbilityRuntime::default(); defs.len()];
        Self { defs, runtime }
    }

    /// Number of abilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether there are none.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Locked target of the ability at `index`.
    #[must_use]
    pub fn locked_target(&self, index: usize) -> Option<EntityId> {
        self.runtime.get(index).and_then(|r| r.target)
    }

    /// Release every lock.
    pub fn clear_targets(&mut self) {
        for runtime in &mut self.runtime {
            runtime.target = None;
        }
    }
}

/// Fire instant abilities, trigger abilities for idle or pursuing units and
/// re-check persistent conditions for units already running one.
pub(crate) fn run_ability_system(world: &mut BattleWorld, units: &[EntityId]) {
    let now = world.elapsed;
    for &id in units {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        let Some(state) = entity.state else {
            continue;
        };
        if !entity.is_alive() || entity.dying.is_some() {
            continue;
        }
        let current = entity
            .destination
            .as_ref()
            .and_then(|d| d.strategy.target);
        if let Some(instant) = entity.instant_abilities.as_ref() {
            let defs = Arc::clone(&instant.defs);
            let last_used = instant.last_used.clone();
            fire_instant(world, units, id, &defs, &last_used, current, now);
        }

        let Some(abilities) = world.store.get(id).and_then(|e| e.abilities.as_ref()) else {
            continue;
        };
        let defs = Arc::clone(&abilities.defs);
        let runtime = abilities.runtime.clone();

        if state.can_trigger_abilities() {
            trigger(world, units, id, &defs, &runtime, current, now);
        } else if let Some(index) = state.ability_index() {
            persist(world, id, index, &defs, &runtime, now);
        }
    }
}

fn fire_instant(
    world: &mut BattleWorld,
    units: &[EntityId],
    id: EntityId,
    defs: &[InstantAbilityDef],
    last_used: &[Option<Fixed>],
    current: Option<EntityId>,
    now: Fixed,
) {
    let scope = TargetingScope {
        units,
        switch_bias: world.config.switch_bias,
        now,
    };
    for (index, def) in defs.iter().enumerate() {
        let candidate = find_target(&world.store, id, &def.strategy, current, scope);
        let ready = def
            .trigger_conditions
            .iter()
            .all(|condition| condition.check(&world.store, id, candidate, last_used[index], now));
        if !ready {
            continue;
        }
        if let Some(slot) = world
            .store
            .get_mut(id)
            .and_then(|e| e.instant_abilities.as_mut())
            .and_then(|a| a.last_used.get_mut(index))
        {
            *slot = Some(now);
        }
        world
            .events
            .emit(BattleEvent::InstantAbilityTriggered { entity: id, index });
        apply_effects(world, &def.effects, EffectContext::from_unit(id, candidate));
        break;
    }
}

fn trigger(
    world: &mut BattleWorld,
    units: &[EntityId],
    id: EntityId,
    defs: &[AbilityDef],
    runtime: &[AbilityRuntime],
    current: Option<EntityId>,
    now: Fixed,
) {
    let scope = TargetingScope {
        units,
        switch_bias: world.config.switch_bias,
        now,
    };
    for (index, def) in defs.iter().enumerate() {
        let last_used = runtime[index].last_used;
        let candidate = find_target(&world.store, id, &def.strategy, current, scope);
        let ready = def
            .trigger_conditions
            .iter()
            .all(|condition| condition.check(&world.store, id, candidate, last_used, now));
        if !ready {
            continue;
        }
        if let Some(slot) = world
            .store
            .get_mut(id)
            .and_then(|e| e.abilities.as_mut())
            .and_then(|a| a.runtime.get_mut(index))
        {
            slot.target = candidate;
            slot.last_used = Some(now);
        }
        world
            .events
            .emit(BattleEvent::AbilityTriggered { entity: id, index });
        break;
    }
}

fn persist(
    world: &mut BattleWorld,
    id: EntityId,
    index: usize,
    defs: &[AbilityDef],
    runtime: &[AbilityRuntime],
    now: Fixed,
) {
    let (Some(def), Some(slot)) = (defs.get(index), runtime.get(index)) else {
        unreachable!("{id} is running ability {index} of {}", defs.len());
    };
    let holds = def.persistent_conditions.iter().all(|condition| {
        condition.check(&world.store, id, slot.target, slot.last_used, now)
    });
    if !holds {
        world
            .events
            .emit(BattleEvent::AbilityInterrupted { entity: id, index });
        return;
    }

    let target_position = slot
        .target
        .and_then(|t| world.store.get(t))
        .and_then(|e| e.position);
    let Some(entity) = world.store.get_mut(id) else {
        return;
    };
    entity.velocity = Some(Velocity::ZERO);
    if let (Some(own), Some(target)) = (entity.position, target_position) {
        if let Some(facing) = Facing::from_dx(target.value.x - own.value.x) {
            entity.facing = Some(facing);
        }
    }
}

/// Advance animation clocks and fire the effects of every frame reached.
pub(crate) fn run_animation_system(world: &mut BattleWorld, units: &[EntityId]) {
    let dt = world.dt;
    for &id in units {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        let Some(state) = entity.state else {
            continue;
        };
        if state.is_dead() {
            continue;
        }
        let Some(animation) = entity.animation.as_mut() else {
            continue;
        };
        animation.elapsed = animation.elapsed.saturating_add(dt);

        let Some(index) = state.ability_index() else {
            continue;
        };
        let Some(abilities) = entity.abilities.as_ref() else {
            continue;
        };
        let defs = Arc::clone(&abilities.defs);
        let target = abilities.locked_target(index);
        let Some(def) = defs.get(index) else {
            continue;
        };

        let reached = def.frame_at(animation.elapsed);
        let last_frame = def.frame_count.saturating_sub(1);
        let first_pending = animation.last_fired.map_or(0, |f| f + 1);
        let upto = reached.min(last_frame);
        animation.frame = upto;
        if first_pending <= upto {
            animation.last_fired = Some(upto);
        }

        if first_pending <= upto {
            let ctx = EffectContext::from_unit(id, target);
            for (&frame, effects) in def.frame_effects.range(first_pending..=upto) {
                world.events.emit(BattleEvent::AbilityActivated {
                    entity: id,
                    index,
                    frame,
                });
                apply_effects(world, effects, ctx);
            }
        }

        if reached >= def.frame_count {
            world
                .events
                .emit(BattleEvent::AbilityCompleted { entity: id, index });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Health, Position, Team, UnitState};
    use crate::math::Vec2Fixed;
    use crate::store::Entity;

    fn def(frame_count: u32, duration: f64) -> AbilityDef {
        AbilityDef {
            name: "swing".to_string(),
            strategy: TargetStrategy::nearest_enemy(None),
            trigger_conditions: vec![],
            persistent_conditions: vec![],
            frame_count,
            duration: Fixed::from_num(duration),
            frame_effects: BTreeMap::new(),
        }
    }

    #[test]
    fn test_frame_at() {
        let ability = def(4, 1.0);
        assert_eq!(ability.frame_time(), Fixed::from_num(0.25));
        assert_eq!(ability.frame_at(Fixed::ZERO), 0);
        assert_eq!(ability.frame_at(Fixed::from_num(0.3)), 1);
        assert_eq!(ability.frame_at(Fixed::from_num(1.0)), 4);
    }

    #[test]
    fn test_cooldown_condition() {
        let store = EntityStore::new();
        let caster = EntityId::new(0, 0);
        let cooldown = AbilityCondition::Cooldown(Fixed::from_num(2));
        assert!(cooldown.check(&store, caster, None, None, Fixed::ZERO));
        assert!(!cooldown.check(&store, caster, None, Some(Fixed::ONE), Fixed::from_num(2)));
        assert!(cooldown.check(&store, caster, None, Some(Fixed::ONE), Fixed::from_num(3)));
    }

    #[test]
    fn test_has_target_requires_existing_target() {
        let mut store = EntityStore::new();
        let mut caster = Entity::new();
        caster.team = Some(Team::Team1);
        caster.position = Some(Position::new(Vec2Fixed::ZERO));
        let caster = store.insert(caster);
        let mut enemy = Entity::new();
        enemy.team = Some(Team::Team2);
        enemy.state = Some(UnitState::Idle);
        enemy.health = Some(Health::new(Fixed::ONE));
        enemy.position = Some(Position::new(Vec2Fixed::from_ints(10, 0)));
        let enemy = store.insert(enemy);

        let condition = AbilityCondition::HasTarget(UnitCondition::all([
            UnitCondition::Alive,
            UnitCondition::within(Fixed::from_num(20)),
        ]));
        let now = Fixed::ZERO;
        assert!(condition.check(&store, caster, Some(enemy), None, now));
        assert!(!condition.check(&store, caster, None, None, now));
        store.remove(enemy);
        assert!(!condition.check(&store, caster, Some(enemy), None, now));
    }

    #[test]
    fn test_self_condition() {
        let mut store = EntityStore::new();
        let mut caster = Entity::new();
        caster.health = Some(Health::new(Fixed::from_num(10)));
        let caster = store.insert(caster);
        let wounded = AbilityCondition::SatisfiesUnitCondition(UnitCondition::HealthBelowPercent(
            Fixed::from_num(0.5),
        ));
        assert!(!wounded.check(&store, caster, None, None, Fixed::ZERO));
        store
            .get_mut(caster)
            .unwrap()
            .health
            .as_mut()
            .unwrap()
            .apply_damage(Fixed::from_num(6));
        assert!(wounded.check(&store, caster, None, None, Fixed::ZERO));
    }

    #[test]
    fn test_instant_abilities_start_unused() {
        let heal = InstantAbilityDef {
            name: "blessing".to_string(),
            strategy: TargetStrategy::new(UnitCondition::IsSelf, vec![]),
            trigger_conditions: vec![AbilityCondition::Cooldown(Fixed::from_num(2))],
            effects: vec![],
        };
        let instant = InstantAbilities::new(Arc::from(vec![heal.clone(), heal]));
        assert_eq!(instant.last_used, vec![None, None]);
    }

    #[test]
    fn test_abilities_lock_bookkeeping() {
        let defs: Arc<[AbilityDef]> = Arc::from(vec![def(2, 0.5), def(3, 1.0)]);
        let mut abilities = Abilities::new(defs);
        assert_eq!(abilities.len(), 2);
        abilities.runtime[1].target = Some(EntityId::new(3, 0));
        assert_eq!(abilities.locked_target(1), Some(EntityId::new(3, 0)));
        abilities.clear_targets();
        assert_eq!(abilities.locked_target(1), None);
        assert_eq!(abilities.locked_target(7), None);
    }
}
