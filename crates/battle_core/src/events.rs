//! Battle events.
//!
//! Processors never change a unit's lifecycle state directly. They push a
//! [`BattleEvent`] onto the world's [`EventQueue`]; after every processor
//! the queue is drained through the state machine, so a transition caused
//! by one processor is visible to the next one in the same tick.
//!
//! Every drained event, plus the state-change notifications the state
//! machine produces, is recorded in [`TickEvents`] for consumers such as a
//! renderer or the headless metrics collector.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::components::UnitState;
use crate::entity::EntityId;

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleEvent {
    /// An idle unit found a target.
    TargetAcquired {
        /// Unit.
        entity: EntityId,
    },
    /// A pursuing unit's target disappeared.
    TargetLost {
        /// Unit.
        entity: EntityId,
    },
    /// A pursuing unit halted at its stand-off point.
    DestinationReached {
        /// Unit.
        entity: EntityId,
    },
    /// An ability's trigger conditions all held and its target was locked.
    AbilityTriggered {
        /// Caster.
        entity: EntityId,
        /// Ability index.
        index: usize,
    },
    /// An ability frame with effects was reached.
    AbilityActivated {
        /// Caster.
        entity: EntityId,
        /// Ability index.
        index: usize,
        /// Frame whose effects were applied.
        frame: u32,
    },
    /// The ability animation ran to its end.
    AbilityCompleted {
        /// Caster.
        entity: EntityId,
        /// Ability index.
        index: usize,
    },
    /// A persistent condition failed mid-ability.
    AbilityInterrupted {
        /// Caster.
        entity: EntityId,
        /// Ability index.
        index: usize,
    },
    /// An instant ability fired and applied its effects.
    InstantAbilityTriggered {
        /// Caster.
        entity: EntityId,
        /// Instant ability index.
        index: usize,
    },
    /// A fleeing status became active.
    FleeingStarted {
        /// Unit.
        entity: EntityId,
    },
    /// The last fleeing status ran out.
    FleeingExpired {
        /// Unit.
        entity: EntityId,
    },
    /// A unit started being pulled by a grabber.
    GrabStarted {
        /// Grabbed unit.
        entity: EntityId,
        /// Grabbing unit.
        grabber: EntityId,
    },
    /// A grab ended.
    GrabReleased {
        /// Formerly grabbed unit.
        entity: EntityId,
        /// Grabber, if it still exists.
        grabber: Option<EntityId>,
    },
    /// Health went from positive to zero.
    KillingBlow {
        /// Victim.
        entity: EntityId,
        /// Owner of the effect that dealt the blow.
        source: Option<EntityId>,
    },
    /// A unit died.
    Death {
        /// Unit.
        entity: EntityId,
    },
    /// A projectile struck a unit and was consumed.
    ProjectileHit {
        /// Consumed projectile.
        projectile: EntityId,
        /// Unit struck.
        target: EntityId,
    },
    /// An area carrier (AoE or aura) affected a unit.
    AreaHit {
        /// Carrier.
        carrier: EntityId,
        /// Unit affected.
        target: EntityId,
    },
    /// A lobbed or volley carrier reached its landing point.
    CarrierLanded {
        /// Carrier.
        carrier: EntityId,
    },
    /// A unit was summoned mid-battle.
    Summoned {
        /// New unit.
        entity: EntityId,
        /// Owner of the summoning effect.
        summoner: EntityId,
    },
    /// Audio cue for the presentation layer.
    SoundPlayed {
        /// Entity the sound comes from.
        entity: EntityId,
        /// Sound name.
        sound: String,
    },
    /// A unit's lifecycle state changed.
    StateChanged {
        /// Unit.
        entity: EntityId,
        /// Previous state.
        from: UnitState,
        /// New state.
        to: UnitState,
    },
}

/// FIFO of events waiting for the state machine.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    pending: VecDeque<BattleEvent>,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event.
    pub fn emit(&mut self, event: BattleEvent) {
        self.pending.push_back(event);
    }

    /// Take the oldest pending event.
    pub fn pop(&mut self) -> Option<BattleEvent> {
        self.pending.pop_front()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Events generated during one tick, in the order they were handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick these events belong to.
    pub tick: u64,
    /// Every event, in order.
    pub events: Vec<BattleEvent>,
}

impl TickEvents {
    /// Units that died this tick, in the order they died.
    pub fn deaths(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.events.iter().filter_map(|event| match event {
            BattleEvent::Death { entity } => Some(*entity),
            _ => None,
        })
    }

    /// Killing blows landed this tick as `(victim, source)`.
    pub fn killing_blows(&self) -> impl Iterator<Item = (EntityId, Option<EntityId>)> + '_ {
        self.events.iter().filter_map(|event| match event {
            BattleEvent::KillingBlow { entity, source } => Some((*entity, *source)),
            _ => None,
        })
    }

    /// State transitions this tick as `(entity, from, to)`.
    pub fn state_changes(&self) -> impl Iterator<Item = (EntityId, UnitState, UnitState)> + '_ {
        self.events.iter().filter_map(|event| match event {
            BattleEvent::StateChanged { entity, from, to } => Some((*entity, *from, *to)),
            _ => None,
        })
    }
}
