//! The battle world and its tick pipeline.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ability::{
    run_ability_system, run_animation_system, Abilities, AbilityDef, InstantAbilities,
    InstantAbilityDef,
};
use crate::carriers::{run_aura_system, run_lobbed_system, run_volley_system};
use crate::collision::run_collision_system;
use crate::components::{
    AnimationState, Destination, Expiration, Health, Movement, Position, Team, UnitKind,
    UnitState, Velocity,
};
use crate::config::BattleConfig;
use crate::entity::EntityId;
use crate::error::{BattleError, Result};
use crate::events::{EventQueue, TickEvents};
use crate::lifecycle::{run_corpse_system, run_dying_system, run_expiration_system, run_unique_system};
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{
    run_attached_system, run_forced_movement_system, run_idle_system, run_position_system,
    run_pursuit_system,
};
use crate::state_machine::drain_events;
use crate::status::{run_status_system, StatusEffects};
use crate::store::{Entity, EntityStore};
use crate::targeting::run_targeting_system;
use crate::templates::TemplateRegistry;
use crate::view::{BattleSnapshot, CarrierView, UnitView};

/// Result of a finished battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Team 1 has units standing and team 2 has none. Also the result when
    /// both sides are eliminated together.
    Team1Victory,
    /// Team 2 has units standing and team 1 has none.
    Team2Victory,
    /// Time ran out with both sides standing.
    Timeout,
}

/// One roster entry: unit type and integer spawn position.
pub type Placement = (String, (i32, i32));

/// Per-unit-type data derived from a template once per battle.
#[derive(Debug, Clone)]
struct CompiledUnit {
    abilities: Arc<[AbilityDef]>,
    instant: Arc<[InstantAbilityDef]>,
    destination: Destination,
}

/// A single battle.
///
/// Owns every entity, the event queue and the battle clock. Independent
/// battles share nothing but their (immutable) template registry, so many can
/// run on separate threads.
///
/// # System Execution Order
///
/// Each tick runs, in order: targeting, idle, status, forced movement
/// (fleeing and grabbed), ability triggering, pursuit, animation (frame
/// effects), aura, lobbed, volley, attached, position integration, collision
/// and areas, expiration, unique, dying and corpse cleanup. Pending events
/// are handed to the state machine after every step.
#[derive(Debug, Clone)]
pub struct BattleWorld {
    pub(crate) store: EntityStore,
    pub(crate) config: BattleConfig,
    templates: Arc<TemplateRegistry>,
    compiled: BTreeMap<String, CompiledUnit>,
    pub(crate) events: EventQueue,
    pub(crate) tick_events: TickEvents,
    tick: u64,
    pub(crate) elapsed: Fixed,
    remaining: Fixed,
    pub(crate) dt: Fixed,
    outcome: Option<Outcome>,
}

impl BattleWorld {
    /// Set up a battle. Team 1 is spawned first, each roster in order.
    ///
    /// # Errors
    ///
    /// Fails if the config or any template is invalid, or a roster names an
    /// unknown unit type.
    pub fn new(
        team1: &[Placement],
        team2: &[Placement],
        templates: Arc<TemplateRegistry>,
        config: BattleConfig,
        max_duration: Fixed,
    ) -> Result<Self> {
        config.validate()?;
        templates.validate()?;
        if max_duration <= Fixed::ZERO {
            return Err(BattleError::InvalidState(format!(
                "max_duration must be positive, got {max_duration}"
            )));
        }

        let mut world = Self {
            store: EntityStore::new(),
            config,
            templates,
            compiled: BTreeMap::new(),
            events: EventQueue::new(),
            tick_events: TickEvents::default(),
            tick: 0,
            elapsed: Fixed::ZERO,
            remaining: max_duration,
            dt: Fixed::ZERO,
            outcome: None,
        };
        for (team, roster) in [(Team::Team1, team1), (Team::Team2, team2)] {
            for (unit_type, (x, y)) in roster {
                world.spawn_unit(unit_type, team, Vec2Fixed::from_ints(*x, *y))?;
            }
        }
        debug!(
            team1 = team1.len(),
            team2 = team2.len(),
            %max_duration,
            "battle created"
        );
        Ok(world)
    }

    /// Advance the battle by `dt` seconds.
    ///
    /// Returns the outcome once it is decided; from then on every call returns
    /// the same outcome without touching the state.
    pub fn advance(&mut self, dt: Fixed) -> Option<Outcome> {
        if let Some(outcome) = self.outcome {
            return Some(outcome);
        }

        self.remaining = self.remaining.saturating_sub(dt);
        let decided = if self.remaining <= Fixed::ZERO {
            Some(Outcome::Timeout)
        } else {
            self.elimination()
        };
        if let Some(outcome) = decided {
            info!(?outcome, tick = self.tick, elapsed = %self.elapsed, "battle decided");
            self.outcome = Some(outcome);
            return Some(outcome);
        }

        self.run_tick(dt);
        None
    }

    fn elimination(&self) -> Option<Outcome> {
        let mut standing = [false; 2];
        for entity in self.store.iter() {
            if let (true, Some(team)) = (entity.is_standing(), entity.team) {
                standing[team.index()] = true;
            }
        }
        match standing {
            [true, true] => None,
            [true, false] => Some(Outcome::Team1Victory),
            [false, true] => Some(Outcome::Team2Victory),
            [false, false] => Some(Outcome::Team1Victory),
        }
    }

    fn run_tick(&mut self, dt: Fixed) {
        self.tick += 1;
        self.dt = dt;
        self.elapsed = self.elapsed.saturating_add(dt);
        self.tick_events = TickEvents {
            tick: self.tick,
            events: Vec::new(),
        };

        // Units present at the start of the tick, in spawn order. Units
        // summoned mid-tick join on the next one.
        let units: Vec<EntityId> = self
            .store
            .iter()
            .filter(|e| e.is_unit())
            .map(|e| e.id)
            .collect();

        run_targeting_system(self, &units);
        drain_events(self);
        run_idle_system(self, &units);
        drain_events(self);
        run_status_system(self, &units);
        drain_events(self);
        run_forced_movement_system(self, &units);
        drain_events(self);
        run_ability_system(self, &units);
        drain_events(self);
        run_pursuit_system(self, &units);
        drain_events(self);
        run_animation_system(self, &units);
        drain_events(self);
        run_aura_system(self, &units);
        drain_events(self);
        run_lobbed_system(self);
        drain_events(self);
        run_volley_system(self);
        drain_events(self);
        run_attached_system(self);
        drain_events(self);
        run_position_system(self);
        drain_events(self);
        run_collision_system(self, &units);
        drain_events(self);
        run_expiration_system(self);
        drain_events(self);
        run_unique_system(self);
        drain_events(self);
        run_dying_system(self);
        drain_events(self);
        run_corpse_system(self);
        drain_events(self);

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            debug!(tick = self.tick, state_hash = hash, "battle state hash");
        }

        #[cfg(feature = "debug-validation")]
        self.validate_invariants();
    }

    #[cfg(feature = "debug-validation")]
    fn validate_invariants(&self) {
        for entity in self.store.iter() {
            let Some(state) = entity.state else {
                continue;
            };
            if let Some(health) = entity.health {
                assert!(
                    health.current >= Fixed::ZERO && health.current <= health.max,
                    "{}: health {} outside [0, {}]",
                    entity.id,
                    health.current,
                    health.max
                );
            }
            if state.is_dead() {
                assert!(
                    entity.velocity.map_or(true, |v| v.value == Vec2Fixed::ZERO),
                    "{}: dead unit is moving",
                    entity.id
                );
                assert!(
                    entity.destination.as_ref().map_or(true, |d| d.strategy.target.is_none()),
                    "{}: dead unit holds a target",
                    entity.id
                );
            }
            if let (Some(index), Some(abilities)) = (state.ability_index(), entity.abilities.as_ref()) {
                assert!(index < abilities.len(), "{}: ability {index} out of range", entity.id);
            } else if let Some(abilities) = entity.abilities.as_ref() {
                assert!(
                    abilities.runtime.iter().all(|r| r.target.is_none()),
                    "{}: target locked outside an ability",
                    entity.id
                );
            }
        }
    }

    /// Insert a fully built entity.
    pub(crate) fn spawn(&mut self, entity: Entity) -> EntityId {
        self.store.insert(entity)
    }

    /// Spawn a unit of `unit_type` for `team` at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::UnknownUnitType`] if no template is registered.
    pub(crate) fn spawn_unit(
        &mut self,
        unit_type: &str,
        team: Team,
        position: Vec2Fixed,
    ) -> Result<EntityId> {
        let template = self.templates.get(unit_type)?;
        let compiled = match self.compiled.get(unit_type) {
            Some(compiled) => compiled.clone(),
            None => {
                let compiled = CompiledUnit {
                    abilities: template.compile_abilities(&self.config),
                    instant: Arc::from(template.instant_abilities.clone()),
                    destination: Destination {
                        strategy: template.target_strategy(),
                        x_offset: template.stand_off(),
                        min_distance: Fixed::ONE,
                        arrived: false,
                    },
                };
                self.compiled.insert(unit_type.to_string(), compiled.clone());
                compiled
            }
        };

        let mut entity = Entity::new();
        entity.kind = Some(UnitKind(template.id.clone()));
        entity.team = Some(team);
        entity.position = Some(Position::new(position));
        entity.velocity = Some(Velocity::ZERO);
        entity.facing = Some(team.home_facing());
        entity.health = Some(Health::new(template.health));
        entity.armor = template.armor;
        entity.movement = Some(Movement {
            speed: template.speed,
        });
        entity.hitbox = Some(template.hitbox);
        entity.state = Some(UnitState::Idle);
        entity.destination = Some(compiled.destination);
        entity.abilities = Some(Abilities::new(compiled.abilities));
        entity.instant_abilities =
            (!compiled.instant.is_empty()).then(|| InstantAbilities::new(compiled.instant));
        entity.animation = Some(AnimationState::default());
        entity.statuses = Some(StatusEffects::new());
        entity.expiration = template.lifetime.map(|time_left| Expiration { time_left });

        let id = self.spawn(entity);
        debug!(%id, unit_type, ?team, x = %position.x, y = %position.y, "unit spawned");
        Ok(id)
    }

    /// Unit that exists, is not dead and has health left.
    pub(crate) fn is_living_unit(&self, id: EntityId) -> bool {
        self.store.get(id).is_some_and(Entity::is_alive)
    }

    /// Decided outcome, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Simulated seconds so far.
    #[must_use]
    pub fn elapsed(&self) -> Fixed {
        self.elapsed
    }

    /// Simulated seconds left before a timeout.
    #[must_use]
    pub fn remaining_time(&self) -> Fixed {
        self.remaining
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Battle-wide tuning.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Template registry the battle was built from.
    #[must_use]
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Read-only entity storage.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// View of one unit.
    #[must_use]
    pub fn view(&self, id: EntityId) -> Option<UnitView> {
        self.store.get(id).and_then(UnitView::from_entity)
    }

    /// Every unit, dead ones included, in spawn order.
    #[must_use]
    pub fn units(&self) -> Vec<UnitView> {
        self.store.iter().filter_map(UnitView::from_entity).collect()
    }

    /// Every carrier in spawn order.
    #[must_use]
    pub fn carriers(&self) -> Vec<CarrierView> {
        let gravity = self.config.gravity;
        self.store
            .iter()
            .filter_map(|e| CarrierView::from_entity(e, gravity))
            .collect()
    }

    /// Units on `team` that are not dead.
    #[must_use]
    pub fn standing_count(&self, team: Team) -> usize {
        self.store
            .iter()
            .filter(|e| e.team == Some(team) && e.is_standing())
            .count()
    }

    /// Events from the most recent tick.
    #[must_use]
    pub fn last_events(&self) -> &TickEvents {
        &self.tick_events
    }

    /// Calculate a hash of the gameplay state.
    ///
    /// Two battles in identical states hash identically; used by the
    /// determinism harness.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.elapsed.to_bits().hash(&mut hasher);
        self.store.len().hash(&mut hasher);

        for entity in self.store.iter() {
            entity.id.hash(&mut hasher);
            entity.spawn_seq.hash(&mut hasher);
            if let Some(position) = entity.position {
                position.value.hash(&mut hasher);
            }
            if let Some(velocity) = entity.velocity {
                velocity.value.hash(&mut hasher);
            }
            entity.facing.hash(&mut hasher);
            entity.state.hash(&mut hasher);
            if let Some(health) = entity.health {
                health.current.to_bits().hash(&mut hasher);
                health.max.to_bits().hash(&mut hasher);
            }
            if let Some(destination) = &entity.destination {
                destination.strategy.target.hash(&mut hasher);
            }
            if let Some(abilities) = &entity.abilities {
                for runtime in &abilities.runtime {
                    runtime.last_used.map(Fixed::to_bits).hash(&mut hasher);
                    runtime.target.hash(&mut hasher);
                }
            }
            if let Some(instant) = &entity.instant_abilities {
                for last_used in &instant.last_used {
                    last_used.map(Fixed::to_bits).hash(&mut hasher);
                }
            }
            if let Some(animation) = entity.animation {
                animation.elapsed.to_bits().hash(&mut hasher);
                animation.last_fired.hash(&mut hasher);
            }
            if let Some(statuses) = &entity.statuses {
                for kind in crate::status::StatusKind::ALL {
                    for instance in statuses.instances(kind) {
                        instance.created_at.to_bits().hash(&mut hasher);
                        instance.duration.to_bits().hash(&mut hasher);
                        instance.source.hash(&mut hasher);
                    }
                }
            }
            entity.grab_link.hash(&mut hasher);
            if let Some(area) = &entity.area {
                area.hit.hash(&mut hasher);
            }
            if let Some(aura) = &entity.aura {
                aura.pulses.hash(&mut hasher);
            }
            if let Some(lobbed) = &entity.lobbed {
                lobbed.time.to_bits().hash(&mut hasher);
            }
            if let Some(expiration) = entity.expiration {
                expiration.time_left.to_bits().hash(&mut hasher);
            }
            if let Some(corpse) = entity.corpse {
                corpse.time_left.to_bits().hash(&mut hasher);
            }
        }

        hasher.finish()
    }

    /// Copy of everything a renderer needs.
    #[must_use]
    pub fn snapshot(&self) -> BattleSnapshot {
        BattleSnapshot {
            tick: self.tick,
            elapsed: self.elapsed,
            units: self.units(),
            carriers: self.carriers(),
            outcome: self.outcome,
        }
    }
}
