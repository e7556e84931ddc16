//! Unit conditions.
//!
//! A [`UnitCondition`] is a predicate over a *candidate* entity, evaluated
//! relative to a *subject*: the unit or carrier that owns the condition.
//! Team and distance checks compare the two.

use serde::{Deserialize, Serialize};

use crate::components::Team;
use crate::entity::EntityId;
use crate::math::{fixed_decimal, option_fixed_decimal, Fixed, Vec2Fixed};
use crate::status::StatusKind;
use crate::store::EntityStore;

/// Predicate over a candidate unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitCondition {
    /// Always holds.
    Always,
    /// Negation.
    Not(Box<UnitCondition>),
    /// Every inner condition holds. Empty is true.
    All(Vec<UnitCondition>),
    /// At least one inner condition holds. Empty is false.
    Any(Vec<UnitCondition>),
    /// Candidate is a unit that is not dead and has positive health.
    Alive,
    /// Candidate is the subject itself.
    IsSelf,
    /// Candidate is on the given team.
    OnTeam(Team),
    /// Candidate is on the other team from the subject.
    Enemy,
    /// Candidate is on the subject's team.
    Ally,
    /// Candidate's health fraction is strictly below the threshold.
    HealthBelowPercent(#[serde(with = "fixed_decimal")] Fixed),
    /// Candidate is within `distance` of the subject.
    MaximumDistance {
        /// Inclusive limit.
        #[serde(with = "fixed_decimal")]
        distance: Fixed,
        /// Vertical stretch factor for the distance.
        #[serde(default, with = "option_fixed_decimal")]
        y_bias: Option<Fixed>,
    },
    /// Candidate is at least `distance` from the subject.
    MinimumDistance {
        /// Inclusive limit.
        #[serde(with = "fixed_decimal")]
        distance: Fixed,
        /// Vertical stretch factor for the distance.
        #[serde(default, with = "option_fixed_decimal")]
        y_bias: Option<Fixed>,
    },
    /// Candidate is in front of the subject, inside a cone of the given
    /// slope (`|dy| <= |dx| * max_slope`).
    InFacingCone {
        /// Cone half-width as a slope.
        #[serde(with = "fixed_decimal")]
        max_slope: Fixed,
    },
    /// Candidate has an active status of the given kind.
    HasStatus(StatusKind),
}

impl UnitCondition {
    /// Conjunction helper.
    #[must_use]
    pub fn all(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::All(conditions.into_iter().collect())
    }

    /// Negation helper.
    #[must_use]
    pub fn not(condition: Self) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Plain distance limit.
    #[must_use]
    pub fn within(distance: Fixed) -> Self {
        Self::MaximumDistance {
            distance,
            y_bias: None,
        }
    }

    /// Evaluate against `candidate` from `subject`'s point of view at battle
    /// time `now`. Missing entities make every entity-dependent check fail.
    #[must_use]
    pub fn check(
        &self,
        store: &EntityStore,
        subject: EntityId,
        candidate: EntityId,
        now: Fixed,
    ) -> bool {
        match self {
            Self::Always => true,
            Self::Not(inner) => !inner.check(store, subject, candidate, now),
            Self::All(inner) => inner
                .iter()
                .all(|condition| condition.check(store, subject, candidate, now)),
            Self::Any(inner) => inner
                .iter()
                .any(|condition| condition.check(store, subject, candidate, now)),
            Self::Alive => store.get(candidate).is_some_and(|e| e.is_alive()),
            Self::IsSelf => subject == candidate,
            Self::OnTeam(team) => store
                .get(candidate)
                .is_some_and(|e| e.team == Some(*team)),
            Self::Enemy => teams(store, subject, candidate).is_some_and(|(s, c)| s != c),
            Self::Ally => teams(store, subject, candidate).is_some_and(|(s, c)| s == c),
            Self::HealthBelowPercent(threshold) => store
                .get(candidate)
                .and_then(|e| e.health)
                .is_some_and(|h| h.fraction() < *threshold),
            Self::MaximumDistance { distance, y_bias } => {
                measure(store, subject, candidate, *y_bias).is_some_and(|d| d <= *distance)
            }
            Self::MinimumDistance { distance, y_bias } => {
                measure(store, subject, candidate, *y_bias).is_some_and(|d| d >= *distance)
            }
            Self::InFacingCone { max_slope } => {
                let Some(subject_entity) = store.get(subject) else {
                    return false;
                };
                let (Some(facing), Some(from)) = (subject_entity.facing, subject_entity.position)
                else {
                    return false;
                };
                let Some(to) = store.get(candidate).and_then(|e| e.position) else {
                    return false;
                };
                let offset = to.value - from.value;
                offset.x.saturating_mul(facing.sign()) >= Fixed::ZERO
                    && offset.y.abs() <= offset.x.abs().saturating_mul(*max_slope)
            }
            Self::HasStatus(kind) => store
                .get(candidate)
                .and_then(|e| e.statuses.as_ref())
                .is_some_and(|s| s.has_active(*kind, now)),
        }
    }
}

fn teams(store: &EntityStore, subject: EntityId, candidate: EntityId) -> Option<(Team, Team)> {
    Some((store.get(subject)?.team?, store.get(candidate)?.team?))
}

/// Distance from `subject` to `candidate`, optionally y-biased.
pub(crate) fn measure(
    store: &EntityStore,
    subject: EntityId,
    candidate: EntityId,
    y_bias: Option<Fixed>,
) -> Option<Fixed> {
    let from = store.get(subject)?.position?.value;
    let to = store.get(candidate)?.position?.value;
    Some(biased(from, to, y_bias))
}

pub(crate) fn biased(from: Vec2Fixed, to: Vec2Fixed, y_bias: Option<Fixed>) -> Fixed {
    match y_bias {
        Some(bias) => from.biased_distance(to, bias),
        None => from.distance(to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Facing, Health, Position, UnitState};
    use crate::store::Entity;

    fn unit(store: &mut EntityStore, team: Team, x: i32, y: i32, facing: Facing) -> EntityId {
        let mut entity = Entity::new();
        entity.team = Some(team);
        entity.position = Some(Position::new(Vec2Fixed::from_ints(x, y)));
        entity.facing = Some(facing);
        entity.state = Some(UnitState::Idle);
        entity.health = Some(Health::new(Fixed::from_num(100)));
        store.insert(entity)
    }

    #[test]
    fn test_team_relations() {
        let mut store = EntityStore::new();
        let a = unit(&mut store, Team::Team1, 0, 0, Facing::Right);
        let b = unit(&mut store, Team::Team2, 10, 0, Facing::Left);
        let c = unit(&mut store, Team::Team1, 20, 0, Facing::Right);
        let now = Fixed::ZERO;

        assert!(UnitCondition::Enemy.check(&store, a, b, now));
        assert!(!UnitCondition::Enemy.check(&store, a, c, now));
        assert!(UnitCondition::Ally.check(&store, a, c, now));
        assert!(UnitCondition::Ally.check(&store, a, a, now));
        assert!(UnitCondition::OnTeam(Team::Team2).check(&store, a, b, now));
    }

    #[test]
    fn test_distance_limits_with_bias() {
        let mut store = EntityStore::new();
        let a = unit(&mut store, Team::Team1, 0, 0, Facing::Right);
        let b = unit(&mut store, Team::Team2, 0, 30, Facing::Left);
        let now = Fixed::ZERO;

        assert!(UnitCondition::within(Fixed::from_num(30)).check(&store, a, b, now));
        let biased = UnitCondition::MaximumDistance {
            distance: Fixed::from_num(30),
            y_bias: Some(Fixed::from_num(2)),
        };
        assert!(!biased.check(&store, a, b, now));
        let minimum = UnitCondition::MinimumDistance {
            distance: Fixed::from_num(50),
            y_bias: Some(Fixed::from_num(2)),
        };
        assert!(minimum.check(&store, a, b, now));
    }

    #[test]
    fn test_facing_cone() {
        let mut store = EntityStore::new();
        let a = unit(&mut store, Team::Team1, 100, 100, Facing::Right);
        let ahead = unit(&mut store, Team::Team2, 120, 110, Facing::Left);
        let steep = unit(&mut store, Team::Team2, 105, 130, Facing::Left);
        let behind = unit(&mut store, Team::Team2, 80, 100, Facing::Left);
        let cone = UnitCondition::InFacingCone {
            max_slope: Fixed::ONE,
        };
        let now = Fixed::ZERO;

        assert!(cone.check(&store, a, ahead, now));
        assert!(!cone.check(&store, a, steep, now));
        assert!(!cone.check(&store, a, behind, now));
    }

    #[test]
    fn test_composites_and_alive() {
        let mut store = EntityStore::new();
        let a = unit(&mut store, Team::Team1, 0, 0, Facing::Right);
        let b = unit(&mut store, Team::Team2, 5, 0, Facing::Left);
        let now = Fixed::ZERO;

        let live_enemy = UnitCondition::all([UnitCondition::Alive, UnitCondition::Enemy]);
        assert!(live_enemy.check(&store, a, b, now));
        assert!(UnitCondition::All(vec![]).check(&store, a, b, now));
        assert!(!UnitCondition::Any(vec![]).check(&store, a, b, now));
        assert!(UnitCondition::not(UnitCondition::IsSelf).check(&store, a, b, now));

        store.get_mut(b).unwrap().state = Some(UnitState::Dead);
        assert!(!live_enemy.check(&store, a, b, now));

        store.remove(b);
        assert!(!UnitCondition::Enemy.check(&store, a, b, now));
    }

    #[test]
    fn test_health_below_percent() {
        let mut store = EntityStore::new();
        let a = unit(&mut store, Team::Team1, 0, 0, Facing::Right);
        store
            .get_mut(a)
            .unwrap()
            .health
            .as_mut()
            .unwrap()
            .apply_damage(Fixed::from_num(60));
        let now = Fixed::ZERO;
        assert!(UnitCondition::HealthBelowPercent(Fixed::from_num(0.5)).check(&store, a, a, now));
        assert!(!UnitCondition::HealthBelowPercent(Fixed::from_num(0.4)).check(&store, a, a, now));
    }
}
