//! Status effect engine.
//!
//! A unit may carry several concurrent instances of each status kind. Only
//! one instance per kind is *active* (Healing is the exception: every
//! healing instance contributes):
//!
//! | Kind | Active instance |
//! |---|---|
//! | `DamageOverTime` | highest damage per second |
//! | `Empowered`, `Weakened`, `MovementSpeed` | oldest |
//! | `Fleeing`, `Grabbed`, `ZombieInfection` | most recently applied |
//! | `Healing` | all of them |
//!
//! Instances live in a fixed slot array indexed by [`StatusKind`]. Expiry is
//! measured from each instance's own creation time; expired instances are
//! filtered out of every query and physically pruned once per tick by the
//! status processor.

use serde::{Deserialize, Serialize};

use crate::combat::{deal_damage, heal};
use crate::components::{Team, UnitState};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::{fixed_decimal, fixed_serde, Fixed, Vec2Fixed};
use crate::world::BattleWorld;

/// Status kinds, used as slot indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusKind {
    /// Ignite: continuous damage.
    DamageOverTime,
    /// Outgoing damage bonus.
    Empowered,
    /// Outgoing damage penalty.
    Weakened,
    /// Movement speed bonus.
    MovementSpeed,
    /// Running away from an entity.
    Fleeing,
    /// Continuous healing.
    Healing,
    /// Pulled toward a grabber.
    Grabbed,
    /// Rises as a zombie on death.
    ZombieInfection,
}

impl StatusKind {
    /// Number of kinds.
    pub const COUNT: usize = 8;

    /// Every kind, in slot order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::DamageOverTime,
        Self::Empowered,
        Self::Weakened,
        Self::MovementSpeed,
        Self::Fleeing,
        Self::Healing,
        Self::Grabbed,
        Self::ZombieInfection,
    ];

    /// Slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A live status effect on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEffect {
    /// Continuous damage.
    DamageOverTime {
        /// Damage per second.
        #[serde(with = "fixed_serde")]
        dps: Fixed,
    },
    /// Outgoing damage multiplied by `1 + percent`.
    Empowered {
        /// Bonus fraction.
        #[serde(with = "fixed_serde")]
        percent: Fixed,
    },
    /// Outgoing damage multiplied by `1 - percent`.
    Weakened {
        /// Penalty fraction.
        #[serde(with = "fixed_serde")]
        percent: Fixed,
    },
    /// Movement speed multiplied by `1 + percent`.
    MovementSpeed {
        /// Bonus fraction.
        #[serde(with = "fixed_serde")]
        percent: Fixed,
    },
    /// Run away from `entity`.
    Fleeing {
        /// Fear source.
        entity: EntityId,
        /// Where the fear source stood when applied; used once it is gone.
        from: Vec2Fixed,
    },
    /// Continuous healing.
    Healing {
        /// Health per second.
        #[serde(with = "fixed_serde")]
        dps: Fixed,
    },
    /// Move toward `entity` at `speed`.
    Grabbed {
        /// Grabber.
        entity: EntityId,
        /// Pull speed.
        #[serde(with = "fixed_serde")]
        speed: Fixed,
    },
    /// Revive as a zombie for `team` if the unit dies while infected.
    ZombieInfection {
        /// Team the zombie fights for.
        team: Team,
    },
}

impl StatusEffect {
    /// Kind of this effect.
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        match self {
            Self::DamageOverTime { .. } => StatusKind::DamageOverTime,
            Self::Empowered { .. } => StatusKind::Empowered,
            Self::Weakened { .. } => StatusKind::Weakened,
            Self::MovementSpeed { .. } => StatusKind::MovementSpeed,
            Self::Fleeing { .. } => StatusKind::Fleeing,
            Self::Healing { .. } => StatusKind::Healing,
            Self::Grabbed { .. } => StatusKind::Grabbed,
            Self::ZombieInfection { .. } => StatusKind::ZombieInfection,
        }
    }
}

/// Content-side description of a status, before it knows who applied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSpec {
    /// See [`StatusEffect::DamageOverTime`].
    DamageOverTime {
        /// Damage per second.
        #[serde(with = "fixed_decimal")]
        dps: Fixed,
    },
    /// See [`StatusEffect::Empowered`].
    Empowered {
        /// Bonus fraction.
        #[serde(with = "fixed_decimal")]
        percent: Fixed,
    },
    /// See [`StatusEffect::Weakened`].
    Weakened {
        /// Penalty fraction.
        #[serde(with = "fixed_decimal")]
        percent: Fixed,
    },
    /// See [`StatusEffect::MovementSpeed`].
    MovementSpeed {
        /// Bonus fraction.
        #[serde(with = "fixed_decimal")]
        percent: Fixed,
    },
    /// Flee from whoever applied the status.
    Fleeing,
    /// See [`StatusEffect::Healing`].
    Healing {
        /// Health per second.
        #[serde(with = "fixed_decimal")]
        dps: Fixed,
    },
    /// Be pulled toward whoever applied the status.
    Grabbed {
        /// Pull speed.
        #[serde(with = "fixed_decimal")]
        speed: Fixed,
    },
    /// Infect on behalf of whoever applied the status.
    ZombieInfection,
}

impl StatusSpec {
    /// Kind this status produces.
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        match self {
            Self::DamageOverTime { .. } => StatusKind::DamageOverTime,
            Self::Empowered { .. } => StatusKind::Empowered,
            Self::Weakened { .. } => StatusKind::Weakened,
            Self::MovementSpeed { .. } => StatusKind::MovementSpeed,
            Self::Fleeing => StatusKind::Fleeing,
            Self::Healing { .. } => StatusKind::Healing,
            Self::Grabbed { .. } => StatusKind::Grabbed,
            Self::ZombieInfection => StatusKind::ZombieInfection,
        }
    }

    /// Bind the status to the entity that applied it.
    ///
    /// An infection needs the applier's team; without one it yields `None`.
    #[must_use]
    pub fn instantiate(
        &self,
        applier: EntityId,
        applier_position: Vec2Fixed,
        applier_team: Option<Team>,
    ) -> Option<StatusEffect> {
        let effect = match *self {
            Self::DamageOverTime { dps } => StatusEffect::DamageOverTime { dps },
            Self::Empowered { percent } => StatusEffect::Empowered { percent },
            Self::Weakened { percent } => StatusEffect::Weakened { percent },
            Self::MovementSpeed { percent } => StatusEffect::MovementSpeed { percent },
            Self::Fleeing => StatusEffect::Fleeing {
                entity: applier,
                from: applier_position,
            },
            Self::Healing { dps } => StatusEffect::Healing { dps },
            Self::Grabbed { speed } => StatusEffect::Grabbed {
                entity: applier,
                speed,
            },
            Self::ZombieInfection => StatusEffect::ZombieInfection {
                team: applier_team?,
            },
        };
        Some(effect)
    }
}

/// One applied instance of a status effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInstance {
    /// The effect.
    pub effect: StatusEffect,
    /// Battle time at application.
    #[serde(with = "fixed_serde")]
    pub created_at: Fixed,
    /// Lifetime in seconds.
    #[serde(with = "fixed_serde")]
    pub duration: Fixed,
    /// Entity credited with the effect.
    pub source: Option<EntityId>,
    /// Application order on this unit; breaks creation-time ties.
    pub order: u64,
}

impl StatusInstance {
    /// Battle time at which the instance stops applying.
    #[must_use]
    pub fn expires_at(&self) -> Fixed {
        self.created_at.saturating_add(self.duration)
    }

    /// Whether the instance has run out at battle time `now`.
    #[must_use]
    pub fn is_expired(&self, now: Fixed) -> bool {
        now >= self.expires_at()
    }
}

/// Per-unit status bookkeeping: one instance list per [`StatusKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffects {
    slots: [Vec<StatusInstance>; StatusKind::COUNT],
    next_order: u64,
}

impl StatusEffects {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance applied at `now`.
    pub fn add(
        &mut self,
        effect: StatusEffect,
        duration: Fixed,
        now: Fixed,
        source: Option<EntityId>,
    ) {
        let order = self.next_order;
        self.next_order += 1;
        self.slots[effect.kind().index()].push(StatusInstance {
            effect,
            created_at: now,
            duration,
            source,
            order,
        });
    }

    /// Drop every instance that has expired at `now`.
    pub fn prune(&mut self, now: Fixed) {
        for slot in &mut self.slots {
            slot.retain(|instance| !instance.is_expired(now));
        }
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    /// All stored instances of a kind, expired or not, oldest first.
    #[must_use]
    pub fn instances(&self, kind: StatusKind) -> &[StatusInstance] {
        &self.slots[kind.index()]
    }

    /// Unexpired instances of a kind, oldest first.
    pub fn live(&self, kind: StatusKind, now: Fixed) -> impl Iterator<Item = &StatusInstance> + '_ {
        self.slots[kind.index()]
            .iter()
            .filter(move |instance| !instance.is_expired(now))
    }

    /// The instance of `kind` that currently governs the unit.
    #[must_use]
    pub fn active(&self, kind: StatusKind, now: Fixed) -> Option<&StatusInstance> {
        let mut live = self.live(kind, now);
        match kind {
            StatusKind::DamageOverTime => live.fold(None, |best: Option<&StatusInstance>, candidate| {
                match best {
                    Some(current) if dps_of(current) >= dps_of(candidate) => Some(current),
                    _ => Some(candidate),
                }
            }),
            StatusKind::Empowered
            | StatusKind::Weakened
            | StatusKind::MovementSpeed
            | StatusKind::Healing => live.next(),
            StatusKind::Fleeing | StatusKind::Grabbed | StatusKind::ZombieInfection => {
                live.max_by_key(|i| (i.created_at, i.order))
            }
        }
    }

    /// Whether any instance of `kind` is active.
    #[must_use]
    pub fn has_active(&self, kind: StatusKind, now: Fixed) -> bool {
        self.active(kind, now).is_some()
    }

    /// Summed healing per second over every live healing instance.
    #[must_use]
    pub fn healing_per_second(&self, now: Fixed) -> Fixed {
        self.live(StatusKind::Healing, now)
            .map(|instance| match instance.effect {
                StatusEffect::Healing { dps } => dps,
                _ => Fixed::ZERO,
            })
            .fold(Fixed::ZERO, Fixed::saturating_add)
    }

    /// Multiplier on outgoing damage from Empowered and Weakened.
    #[must_use]
    pub fn damage_multiplier(&self, now: Fixed) -> Fixed {
        let mut multiplier = Fixed::ONE;
        if let Some(StatusInstance {
            effect: StatusEffect::Empowered { percent },
            ..
        }) = self.active(StatusKind::Empowered, now)
        {
            multiplier *= Fixed::ONE + *percent;
        }
        if let Some(StatusInstance {
            effect: StatusEffect::Weakened { percent },
            ..
        }) = self.active(StatusKind::Weakened, now)
        {
            multiplier *= (Fixed::ONE - *percent).max(Fixed::ZERO);
        }
        multiplier
    }

    /// Multiplier on movement speed.
    #[must_use]
    pub fn speed_multiplier(&self, now: Fixed) -> Fixed {
        match self.active(StatusKind::MovementSpeed, now) {
            Some(StatusInstance {
                effect: StatusEffect::MovementSpeed { percent },
                ..
            }) => Fixed::ONE + *percent,
            _ => Fixed::ONE,
        }
    }

    /// Fear source and its fallback position, if fleeing.
    #[must_use]
    pub fn fleeing_from(&self, now: Fixed) -> Option<(EntityId, Vec2Fixed)> {
        match self.active(StatusKind::Fleeing, now)?.effect {
            StatusEffect::Fleeing { entity, from } => Some((entity, from)),
            _ => None,
        }
    }

    /// Grabber and pull speed, if grabbed.
    #[must_use]
    pub fn grabbed_by(&self, now: Fixed) -> Option<(EntityId, Fixed)> {
        match self.active(StatusKind::Grabbed, now)?.effect {
            StatusEffect::Grabbed { entity, speed } => Some((entity, speed)),
            _ => None,
        }
    }

    /// Team an infected unit would rise for.
    #[must_use]
    pub fn infected_by(&self, now: Fixed) -> Option<Team> {
        match self.active(StatusKind::ZombieInfection, now)?.effect {
            StatusEffect::ZombieInfection { team } => Some(team),
            _ => None,
        }
    }

    /// Whether no instance of any kind is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }
}

fn dps_of(instance: &StatusInstance) -> Fixed {
    match instance.effect {
        StatusEffect::DamageOverTime { dps } => dps,
        _ => Fixed::ZERO,
    }
}

/// Expire statuses, tick damage and healing, and raise flee/grab events.
pub(crate) fn run_status_system(world: &mut BattleWorld, entity_ids: &[EntityId]) {
    let now = world.elapsed;
    let dt = world.dt;

    for &id in entity_ids {
        let Some(entity) = world.store.get_mut(id) else {
            continue;
        };
        let Some(state) = entity.state else {
            continue;
        };
        if state.is_dead() {
            continue;
        }
        let Some(statuses) = entity.statuses.as_mut() else {
            continue;
        };

        statuses.prune(now);
        let ignite = statuses
            .active(StatusKind::DamageOverTime, now)
            .map(|instance| (dps_of(instance), instance.source));
        let healing = statuses.healing_per_second(now);
        let fleeing = statuses.has_active(StatusKind::Fleeing, now);
        let grab = statuses.grabbed_by(now).map(|(grabber, _)| grabber);

        if let Some((dps, source)) = ignite {
            deal_damage(world, id, dps * dt, source);
        }
        if healing > Fixed::ZERO {
            heal(world, id, healing * dt);
        }

        let grabber_alive = grab.is_some_and(|grabber| world.is_living_unit(grabber));
        match state {
            UnitState::Grabbed if !grabber_alive => {
                let grabber = world.store.get(id).and_then(|e| e.grab_link);
                world.events.emit(BattleEvent::GrabReleased {
                    entity: id,
                    grabber,
                });
            }
            UnitState::Grabbed => {}
            _ if grabber_alive => {
                if let Some(grabber) = grab {
                    world.events.emit(BattleEvent::GrabStarted {
                        entity: id,
                        grabber,
                    });
                }
            }
            UnitState::Fleeing if !fleeing => {
                world.events.emit(BattleEvent::FleeingExpired { entity: id });
            }
            UnitState::Fleeing => {}
            _ if fleeing => {
                world.events.emit(BattleEvent::FleeingStarted { entity: id });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn dot(dps: i32) -> StatusEffect {
        StatusEffect::DamageOverTime { dps: secs(dps) }
    }

    #[test]
    fn test_damage_over_time_resolves_to_highest_dps() {
        let mut statuses = StatusEffects::new();
        statuses.add(dot(5), secs(10), secs(0), None);
        statuses.add(dot(12), secs(2), secs(0), None);
        statuses.add(dot(8), secs(10), secs(0), None);

        let active = statuses.active(StatusKind::DamageOverTime, secs(1)).unwrap();
        assert_eq!(active.effect, dot(12));

        // Strongest expired: next strongest takes over.
        let active = statuses.active(StatusKind::DamageOverTime, secs(3)).unwrap();
        assert_eq!(active.effect, dot(8));
    }

    #[test]
    fn test_buff_resolves_to_oldest() {
        let mut statuses = StatusEffects::new();
        let first = StatusEffect::Empowered {
            percent: Fixed::from_num(0.5),
        };
        let second = StatusEffect::Empowered {
            percent: Fixed::from_num(0.25),
        };
        statuses.add(first, secs(5), secs(0), None);
        statuses.add(second, secs(5), secs(1), None);

        assert_eq!(
            statuses.active(StatusKind::Empowered, secs(2)).unwrap().effect,
            first
        );
        assert_eq!(statuses.damage_multiplier(secs(2)), Fixed::from_num(1.5));
        assert_eq!(statuses.damage_multiplier(secs(5)), Fixed::from_num(1.25));
        assert_eq!(statuses.damage_multiplier(secs(7)), Fixed::ONE);
    }

    #[test]
    fn test_fleeing_resolves_to_most_recent() {
        let mut statuses = StatusEffects::new();
        let old_source = EntityId::new(1, 0);
        let new_source = EntityId::new(2, 0);
        statuses.add(
            StatusEffect::Fleeing {
                entity: old_source,
                from: Vec2Fixed::ZERO,
            },
            secs(10),
            secs(0),
            None,
        );
        statuses.add(
            StatusEffect::Fleeing {
                entity: new_source,
                from: Vec2Fixed::ZERO,
            },
            secs(1),
            secs(2),
            None,
        );

        assert_eq!(statuses.fleeing_from(secs(2)).map(|(e, _)| e), Some(new_source));
        // Newer fear expired: the older one governs again.
        assert_eq!(statuses.fleeing_from(secs(4)).map(|(e, _)| e), Some(old_source));
    }

    #[test]
    fn test_healing_instances_all_contribute() {
        let mut statuses = StatusEffects::new();
        statuses.add(StatusEffect::Healing { dps: secs(3) }, secs(5), secs(0), None);
        statuses.add(StatusEffect::Healing { dps: secs(4) }, secs(1), secs(0), None);
        assert_eq!(statuses.healing_per_second(Fixed::from_num(0.5)), secs(7));
        assert_eq!(statuses.healing_per_second(secs(2)), secs(3));
    }

    #[test]
    fn test_prune_removes_expired_instances() {
        let mut statuses = StatusEffects::new();
        statuses.add(dot(1), secs(1), secs(0), None);
        statuses.add(
            StatusEffect::MovementSpeed {
                percent: Fixed::from_num(0.5),
            },
            secs(3),
            secs(0),
            None,
        );
        statuses.prune(secs(1));
        assert!(statuses.instances(StatusKind::DamageOverTime).is_empty());
        assert_eq!(statuses.instances(StatusKind::MovementSpeed).len(), 1);
        assert_eq!(statuses.speed_multiplier(secs(2)), Fixed::from_num(1.5));
        statuses.prune(secs(3));
        assert!(statuses.is_empty());
    }

    #[test]
    fn test_instantiation_binds_applier() {
        let applier = EntityId::new(4, 1);
        let spot = Vec2Fixed::from_ints(10, 20);
        assert_eq!(
            StatusSpec::Fleeing.instantiate(applier, spot, None),
            Some(StatusEffect::Fleeing {
                entity: applier,
                from: spot
            })
        );
        assert_eq!(StatusSpec::Grabbed { speed: secs(50) }.kind(), StatusKind::Grabbed);
        assert_eq!(
            StatusSpec::ZombieInfection.instantiate(applier, spot, Some(Team::Team2)),
            Some(StatusEffect::ZombieInfection { team: Team::Team2 })
        );
        assert_eq!(StatusSpec::ZombieInfection.instantiate(applier, spot, None), None);
    }

    #[test]
    fn test_infection_resolves_to_most_recent() {
        let mut statuses = StatusEffects::new();
        statuses.add(
            StatusEffect::ZombieInfection { team: Team::Team1 },
            secs(10),
            secs(0),
            None,
        );
        statuses.add(
            StatusEffect::ZombieInfection { team: Team::Team2 },
            secs(2),
            secs(1),
            None,
        );
        assert_eq!(statuses.infected_by(secs(2)), Some(Team::Team2));
        assert_eq!(statuses.infected_by(secs(3)), Some(Team::Team1));
        assert_eq!(statuses.infected_by(secs(10)), None);
    }
}
