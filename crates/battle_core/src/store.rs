//! Entity storage.
//!
//! Entities are records of optional components held in generation-checked
//! slots. Iteration always goes through [`EntityStore::ids_in_spawn_order`],
//! which orders by the spawn sequence number rather than by slot index, so
//! recycled slots never reorder processing.

use crate::ability::{Abilities, InstantAbilities};
use crate::carriers::{AreaEffect, Aura, Lobbed, Projectile, VolleyShot};
use crate::components::{
    Armor, Attached, AnimationState, Corpse, Destination, Dying, Expiration, Facing, Health,
    Hitbox, Movement, Position, Team, UnitKind, UnitState, Unique, Velocity,
};
use crate::entity::{EntityAllocator, EntityId};
use crate::error::{BattleError, Result};
use crate::status::StatusEffects;

/// An entity: an identifier plus whichever components it carries.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Unique identifier.
    pub id: EntityId,
    /// Spawn order; the deterministic iteration and tie-break key.
    pub spawn_seq: u64,
    /// Template the unit was built from.
    pub kind: Option<UnitKind>,
    /// Team affiliation. Carriers inherit their owner's team.
    pub team: Option<Team>,
    /// World position.
    pub position: Option<Position>,
    /// Current velocity.
    pub velocity: Option<Velocity>,
    /// Horizontal orientation.
    pub facing: Option<Facing>,
    /// Health.
    pub health: Option<Health>,
    /// Damage mitigation.
    pub armor: Option<Armor>,
    /// Base speed.
    pub movement: Option<Movement>,
    /// Hit-test box.
    pub hitbox: Option<Hitbox>,
    /// Lifecycle state. Present on units only.
    pub state: Option<UnitState>,
    /// Targeting and stand-off data.
    pub destination: Option<Destination>,
    /// Ability list and runtime data.
    pub abilities: Option<Abilities>,
    /// Animation-free abilities.
    pub instant_abilities: Option<InstantAbilities>,
    /// Animation clock.
    pub animation: Option<AnimationState>,
    /// Status effects.
    pub statuses: Option<StatusEffects>,
    /// Grabber currently holding this unit.
    pub grab_link: Option<EntityId>,
    /// Single-hit projectile carrier.
    pub projectile: Option<Projectile>,
    /// Area-of-effect carrier.
    pub area: Option<AreaEffect>,
    /// Pulsing aura carrier.
    pub aura: Option<Aura>,
    /// Ballistic carrier.
    pub lobbed: Option<Lobbed>,
    /// Straight-line carrier aimed at a point.
    pub volley: Option<VolleyShot>,
    /// Follows another entity.
    pub attached: Option<Attached>,
    /// Lifetime limit.
    pub expiration: Option<Expiration>,
    /// Singleton key.
    pub unique: Option<Unique>,
    /// Pending death.
    pub dying: Option<Dying>,
    /// Corpse timer.
    pub corpse: Option<Corpse>,
}

impl Entity {
    /// Create an empty entity. The id and spawn sequence are assigned on insert.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: EntityId::default(),
            spawn_seq: 0,
            kind: None,
            team: None,
            position: None,
            velocity: None,
            facing: None,
            health: None,
            armor: None,
            movement: None,
            hitbox: None,
            state: None,
            destination: None,
            abilities: None,
            instant_abilities: None,
            animation: None,
            statuses: None,
            grab_link: None,
            projectile: None,
            area: None,
            aura: None,
            lobbed: None,
            volley: None,
            attached: None,
            expiration: None,
            unique: None,
            dying: None,
            corpse: None,
        }
    }

    /// Whether this entity is a unit (has a lifecycle state).
    #[must_use]
    pub fn is_unit(&self) -> bool {
        self.state.is_some()
    }

    /// Unit with positive health that is not dead.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self.state, Some(state) if !state.is_dead())
            && self.health.is_some_and(|h| !h.is_depleted())
    }

    /// Unit that is not in the `Dead` state, regardless of health.
    #[must_use]
    pub fn is_standing(&self) -> bool {
        matches!(self.state, Some(state) if !state.is_dead())
    }

    /// Position, or the origin when the entity has none.
    #[must_use]
    pub fn pos(&self) -> crate::math::Vec2Fixed {
        self.position.map(|p| p.value).unwrap_or_default()
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

/// Generational entity storage.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    allocator: EntityAllocator,
    slots: Vec<Option<Entity>>,
    next_seq: u64,
}

impl EntityStore {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity and return its new id.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = self.allocator.allocate();
        entity.id = id;
        entity.spawn_seq = self.next_seq;
        self.next_seq += 1;

        let index = id.index() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(entity);
        id
    }

    /// Remove an entity. Stale or unknown ids return `None`.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        if !self.allocator.is_alive(id) {
            return None;
        }
        let entity = self.slots.get_mut(id.index() as usize)?.take();
        self.allocator.deallocate(id);
        entity
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        if !self.allocator.is_alive(id) {
            return None;
        }
        self.slots.get(id.index() as usize)?.as_ref()
    }

    /// Get a mutable reference to an entity by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if !self.allocator.is_alive(id) {
            return None;
        }
        self.slots.get_mut(id.index() as usize)?.as_mut()
    }

    /// Get an entity, distinguishing stale handles from unknown ones.
    pub fn lookup(&self, id: EntityId) -> Result<&Entity> {
        if self.allocator.is_stale(id) {
            return Err(BattleError::StaleEntity(id));
        }
        self.get(id).ok_or(BattleError::EntityNotFound(id))
    }

    /// Whether `id` names a live entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity ids ordered by spawn sequence.
    #[must_use]
    pub fn ids_in_spawn_order(&self) -> Vec<EntityId> {
        let mut live: Vec<(u64, EntityId)> = self
            .slots
            .iter()
            .flatten()
            .map(|entity| (entity.spawn_seq, entity.id))
            .collect();
        live.sort_unstable_by_key(|&(seq, _)| seq);
        live.into_iter().map(|(_, id)| id).collect()
    }

    /// Entities ordered by spawn sequence.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        let mut live: Vec<&Entity> = self.slots.iter().flatten().collect();
        live.sort_unstable_by_key(|entity| entity.spawn_seq);
        live.into_iter()
    }

    /// Spawn sequence of an entity, `u64::MAX` when it is gone.
    #[must_use]
    pub fn spawn_seq(&self, id: EntityId) -> u64 {
        self.get(id).map_or(u64::MAX, |entity| entity.spawn_seq)
    }
}
