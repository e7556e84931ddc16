//! Target selection.
//!
//! A [`TargetStrategy`] filters candidate units with a [`UnitCondition`] and
//! orders the survivors by a tuple of [`Ranking`] keys, compared
//! lexicographically. Every key is normalized so that lower is better:
//! descending rankings are negated. Candidates are visited in spawn order and
//! only a strictly better key tuple replaces the best so far, so exact ties
//! go to the earliest spawned unit.
//!
//! The currently held target gets the switch bias subtracted from its first
//! distance key. A unit therefore keeps its target until a rival is closer
//! by more than the bias.

use serde::{Deserialize, Serialize};

use crate::conditions::{biased, UnitCondition};
use crate::entity::EntityId;
use crate::math::{fixed_decimal, option_fixed_decimal, Fixed};
use crate::store::EntityStore;
use crate::world::BattleWorld;

fn ascending_default() -> bool {
    true
}

/// One component of a target's ranking key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ranking {
    /// Distance from the subject.
    ByDistance {
        /// Vertical stretch factor.
        #[serde(default, with = "option_fixed_decimal")]
        y_bias: Option<Fixed>,
        /// Nearest first when true.
        #[serde(default = "ascending_default")]
        ascending: bool,
    },
    /// Health lost so far.
    ByMissingHealth {
        /// Least wounded first when true.
        #[serde(default = "ascending_default")]
        ascending: bool,
    },
    /// Maximum health.
    ByMaxHealth {
        /// Smallest first when true.
        #[serde(default = "ascending_default")]
        ascending: bool,
    },
    /// Current health.
    ByCurrentHealth {
        /// Lowest first when true.
        #[serde(default = "ascending_default")]
        ascending: bool,
    },
    /// Weighted sum of other rankings.
    Weighted {
        /// `(ranking, weight)` pairs. Each inner key is already normalized.
        parts: Vec<WeightedPart>,
        /// Negate the sum when false.
        #[serde(default = "ascending_default")]
        ascending: bool,
    },
    /// Adds `penalty` to candidates satisfying `condition`.
    ConditionPenalty {
        /// Penalized condition.
        condition: UnitCondition,
        /// Added to the key when the condition holds.
        #[serde(with = "fixed_decimal")]
        penalty: Fixed,
    },
}

/// A weighted term of [`Ranking::Weighted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedPart {
    /// Inner ranking.
    pub ranking: Ranking,
    /// Multiplier.
    #[serde(with = "fixed_decimal")]
    pub weight: Fixed,
}

impl Ranking {
    /// Nearest first, plain Euclidean distance.
    #[must_use]
    pub const fn nearest() -> Self {
        Self::ByDistance {
            y_bias: None,
            ascending: true,
        }
    }

    /// Normalized key of `candidate` from `subject`'s point of view.
    #[must_use]
    pub fn key(&self, store: &EntityStore, subject: EntityId, candidate: EntityId, now: Fixed) -> Fixed {
        let health = store.get(candidate).and_then(|e| e.health);
        let (raw, ascending) = match self {
            Self::ByDistance { y_bias, ascending } => {
                let from = store.get(subject).map(|e| e.pos());
                let to = store.get(candidate).map(|e| e.pos());
                let distance = match (from, to) {
                    (Some(from), Some(to)) => biased(from, to, *y_bias),
                    _ => Fixed::MAX,
                };
                (distance, *ascending)
            }
            Self::ByMissingHealth { ascending } => {
                (health.map_or(Fixed::ZERO, |h| h.missing()), *ascending)
            }
            Self::ByMaxHealth { ascending } => (health.map_or(Fixed::ZERO, |h| h.max), *ascending),
            Self::ByCurrentHealth { ascending } => {
                (health.map_or(Fixed::ZERO, |h| h.current), *ascending)
            }
            Self::Weighted { parts, ascending } => {
                let sum = parts.iter().fold(Fixed::ZERO, |acc, part| {
                    acc.saturating_add(
                        part.ranking
                            .key(store, subject, candidate, now)
                            .saturating_mul(part.weight),
                    )
                });
                (sum, *ascending)
            }
            Self::ConditionPenalty { condition, penalty } => {
                let hit = condition.check(store, subject, candidate, now);
                (if hit { *penalty } else { Fixed::ZERO }, true)
            }
        };
        if ascending {
            raw
        } else {
            raw.saturating_neg()
        }
    }

    fn is_distance(&self) -> bool {
        matches!(self, Self::ByDistance { .. })
    }
}

/// How a unit or ability picks its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStrategy {
    /// Eligibility filter.
    pub condition: UnitCondition,
    /// Ranking tuple, most significant first.
    pub rankings: Vec<Ranking>,
    /// Most recently found target. Runtime state.
    #[serde(skip)]
    pub target: Option<EntityId>,
}

impl TargetStrategy {
    /// Strategy with no target yet.
    #[must_use]
    pub fn new(condition: UnitCondition, rankings: Vec<Ranking>) -> Self {
        Self {
            condition,
            rankings,
            target: None,
        }
    }

    /// Nearest living enemy, with vertical distance stretched by `y_bias`.
    #[must_use]
    pub fn nearest_enemy(y_bias: Option<Fixed>) -> Self {
        Self::new(
            UnitCondition::all([UnitCondition::Alive, UnitCondition::Enemy]),
            vec![Ranking::ByDistance {
                y_bias,
                ascending: true,
            }],
        )
    }
}

/// The candidate set and tuning a target search runs against.
#[derive(Debug, Clone, Copy)]
pub struct TargetingScope<'a> {
    /// Candidate unit ids in spawn order.
    pub units: &'a [EntityId],
    /// Advantage given to the currently held target.
    pub switch_bias: Fixed,
    /// Battle time, for status conditions.
    pub now: Fixed,
}

/// Find the best-ranked eligible target for `subject`.
///
/// `current` is the target the subject already holds; it receives the
/// switch bias if it is still eligible.
#[must_use]
pub fn find_target(
    store: &EntityStore,
    subject: EntityId,
    strategy: &TargetStrategy,
    current: Option<EntityId>,
    scope: TargetingScope<'_>,
) -> Option<EntityId> {
    let bias_slot = strategy.rankings.iter().position(Ranking::is_distance);
    let mut best: Option<(Vec<Fixed>, EntityId)> = None;

    for &candidate in scope.units {
        if !strategy.condition.check(store, subject, candidate, scope.now) {
            continue;
        }
        let mut keys: Vec<Fixed> = strategy
            .rankings
            .iter()
            .map(|ranking| ranking.key(store, subject, candidate, scope.now))
            .collect();
        if Some(candidate) == current {
            if let Some(slot) = bias_slot {
                keys[slot] = keys[slot].saturating_sub(scope.switch_bias);
            }
        }
        let better = match &best {
            None => true,
            Some((best_keys, _)) => keys < *best_keys,
        };
        if better {
            best = Some((keys, candidate));
        }
    }

    best.map(|(_, id)| id)
}

/// Refresh every living unit's current target.
pub(crate) fn run_targeting_system(world: &mut BattleWorld, units: &[EntityId]) {
    let scope = TargetingScope {
        units,
        switch_bias: world.config.switch_bias,
        now: world.elapsed,
    };
    for &id in units {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        if !entity.is_standing() {
            continue;
        }
        let Some(destination) = entity.destination.as_ref() else {
            continue;
        };
        let found = find_target(
            &world.store,
            id,
            &destination.strategy,
            destination.strategy.target,
            scope,
        );
        if let Some(destination) = world.store.get_mut(id).and_then(|e| e.destination.as_mut()) {
            destination.strategy.target = found;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Health, Position, Team, UnitState};
    use crate::math::Vec2Fixed;
    use crate::store::Entity;

    fn unit(store: &mut EntityStore, team: Team, x: i32, y: i32, hp: i32) -> EntityId {
        let mut entity = Entity::new();
        entity.team = Some(team);
        entity.position = Some(Position::new(Vec2Fixed::from_ints(x, y)));
        entity.state = Some(UnitState::Idle);
        entity.health = Some(Health::new(Fixed::from_num(hp)));
        store.insert(entity)
    }

    fn scope(units: &[EntityId], bias: i32) -> TargetingScope<'_> {
        TargetingScope {
            units,
            switch_bias: Fixed::from_num(bias),
            now: Fixed::ZERO,
        }
    }

    #[test]
    fn test_nearest_enemy_selected() {
        let mut store = EntityStore::new();
        let me = unit(&mut store, Team::Team1, 0, 0, 10);
        let far = unit(&mut store, Team::Team2, 100, 0, 10);
        let near = unit(&mut store, Team::Team2, 50, 0, 10);
        let friend = unit(&mut store, Team::Team1, 5, 0, 10);
        let units = [me, far, near, friend];

        let strategy = TargetStrategy::nearest_enemy(None);
        assert_eq!(find_target(&store, me, &strategy, None, scope(&units, 0)), Some(near));
    }

    #[test]
    fn test_no_candidates_returns_none() {
        let mut store = EntityStore::new();
        let me = unit(&mut store, Team::Team1, 0, 0, 10);
        let units = [me];
        let strategy = TargetStrategy::nearest_enemy(None);
        assert_eq!(find_target(&store, me, &strategy, None, scope(&units, 0)), None);
    }

    #[test]
    fn test_exact_tie_goes_to_earliest_spawn() {
        let mut store = EntityStore::new();
        let me = unit(&mut store, Team::Team1, 0, 0, 10);
        let first = unit(&mut store, Team::Team2, 0, 40, 10);
        let second = unit(&mut store, Team::Team2, 0, -40, 10);
        let units = [me, first, second];

        let strategy = TargetStrategy::nearest_enemy(None);
        assert_eq!(find_target(&store, me, &strategy, None, scope(&units, 0)), Some(first));
    }

    #[test]
    fn test_switch_bias_keeps_current_target() {
        let mut store = EntityStore::new();
        let me = unit(&mut store, Team::Team1, 0, 0, 10);
        let held = unit(&mut store, Team::Team2, 58, 0, 10);
        let rival = unit(&mut store, Team::Team2, 50, 0, 10);
        let units = [me, held, rival];
        let strategy = TargetStrategy::nearest_enemy(None);

        // Rival closer by 8 < bias 10: keep the held target.
        assert_eq!(find_target(&store, me, &strategy, Some(held), scope(&units, 10)), Some(held));
        // Without a held target the rival wins.
        assert_eq!(find_target(&store, me, &strategy, None, scope(&units, 10)), Some(rival));

        // Rival now closer by 18 > bias: switch.
        store.get_mut(rival).unwrap().position = Some(Position::new(Vec2Fixed::from_ints(40, 0)));
        assert_eq!(find_target(&store, me, &strategy, Some(held), scope(&units, 10)), Some(rival));
    }

    #[test]
    fn test_dead_current_target_is_dropped() {
        let mut store = EntityStore::new();
        let me = unit(&mut store, Team::Team1, 0, 0, 10);
        let held = unit(&mut store, Team::Team2, 10, 0, 10);
        let other = unit(&mut store, Team::Team2, 90, 0, 10);
        let units = [me, held, other];
        store.get_mut(held).unwrap().state = Some(UnitState::Dead);

        let strategy = TargetStrategy::nearest_enemy(None);
        assert_eq!(find_target(&store, me, &strategy, Some(held), scope(&units, 10)), Some(other));
    }

    #[test]
    fn test_descending_missing_health_prefers_most_wounded() {
        let mut store = EntityStore::new();
        let healer = unit(&mut store, Team::Team1, 0, 0, 10);
        let scratched = unit(&mut store, Team::Team1, 10, 0, 100);
        let wounded = unit(&mut store, Team::Team1, 90, 0, 100);
        store.get_mut(scratched).unwrap().health.as_mut().unwrap().apply_damage(Fixed::from_num(5));
        store.get_mut(wounded).unwrap().health.as_mut().unwrap().apply_damage(Fixed::from_num(50));
        let units = [healer, scratched, wounded];

        let strategy = TargetStrategy::new(
            UnitCondition::all([
                UnitCondition::Alive,
                UnitCondition::Ally,
                UnitCondition::not(UnitCondition::IsSelf),
            ]),
            vec![
                Ranking::ByMissingHealth { ascending: false },
                Ranking::nearest(),
            ],
        );
        assert_eq!(find_target(&store, healer, &strategy, None, scope(&units, 0)), Some(wounded));
    }

    #[test]
    fn test_weighted_and_penalty_rankings() {
        let mut store = EntityStore::new();
        let me = unit(&mut store, Team::Team1, 0, 0, 10);
        let near_big = unit(&mut store, Team::Team2, 20, 0, 500);
        let far_small = unit(&mut store, Team::Team2, 60, 0, 50);
        let units = [me, near_big, far_small];

        // distance + 0.5 * max health: 20 + 250 vs 60 + 25.
        let weighted = TargetStrategy::new(
            UnitCondition::Enemy,
            vec![Ranking::Weighted {
                parts: vec![
                    WeightedPart {
                        ranking: Ranking::nearest(),
                        weight: Fixed::ONE,
                    },
                    WeightedPart {
                        ranking: Ranking::ByMaxHealth { ascending: true },
                        weight: Fixed::from_num(0.5),
                    },
                ],
                ascending: true,
            }],
        );
        assert_eq!(find_target(&store, me, &weighted, None, scope(&units, 0)), Some(far_small));

        let penalized = TargetStrategy::new(
            UnitCondition::Enemy,
            vec![
                Ranking::ConditionPenalty {
                    condition: UnitCondition::within(Fixed::from_num(30)),
                    penalty: Fixed::from_num(1000),
                },
                Ranking::nearest(),
            ],
        );
        assert_eq!(find_target(&store, me, &penalized, None, scope(&units, 0)), Some(far_small));
    }
}
