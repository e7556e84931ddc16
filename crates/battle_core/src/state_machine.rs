//! Unit lifecycle state machine.
//!
//! Transitions are driven only by [`BattleEvent`]s. The world drains its
//! queue through [`drain_events`] after every processor, recording each event
//! in the tick's [`TickEvents`](crate::events::TickEvents). Events that do not
//! apply to the unit's current state are ignored.

use tracing::{debug, warn};

use crate::components::{Corpse, Team, UnitState, Velocity};
use crate::effects::{apply_effects, EffectContext};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::Vec2Fixed;
use crate::status::StatusKind;
use crate::templates::{UnitTemplate, ZOMBIE_UNIT_TYPE};
use crate::world::BattleWorld;

/// Handle every pending event, including ones raised while handling.
pub(crate) fn drain_events(world: &mut BattleWorld) {
    while let Some(event) = world.events.pop() {
        world.tick_events.events.push(event.clone());
        handle(world, &event);
    }
}

fn handle(world: &mut BattleWorld, event: &BattleEvent) {
    match *event {
        BattleEvent::TargetAcquired { entity } => {
            if state_of(world, entity) == Some(UnitState::Idle) {
                set_state(world, entity, UnitState::Pursuing);
            }
        }
        BattleEvent::TargetLost { entity } => {
            if state_of(world, entity) == Some(UnitState::Pursuing) {
                set_state(world, entity, UnitState::Idle);
            }
        }
        BattleEvent::AbilityTriggered { entity, index } => {
            let Some(state) = state_of(world, entity) else {
                return;
            };
            if !state.can_trigger_abilities() {
                return;
            }
            let count = world
                .store
                .get(entity)
                .and_then(|e| e.abilities.as_ref())
                .map_or(0, |a| a.len());
            assert!(
                index < count,
                "{entity}: ability index {index} outside its {count} abilities"
            );
            match u8::try_from(index) {
                Ok(k) if index < UnitState::MAX_ABILITIES => {
                    set_state(world, entity, UnitState::Ability(k));
                }
                _ => unreachable!("{entity}: ability index {index} has no state"),
            }
        }
        BattleEvent::AbilityCompleted { entity, index }
        | BattleEvent::AbilityInterrupted { entity, index } => {
            if state_of(world, entity).and_then(UnitState::ability_index) == Some(index) {
                release_lock(world, entity, index);
                set_state(world, entity, UnitState::Idle);
            }
        }
        BattleEvent::FleeingStarted { entity } => match state_of(world, entity) {
            Some(UnitState::Dead | UnitState::Grabbed | UnitState::Fleeing) | None => {}
            Some(previous) => {
                if let Some(index) = previous.ability_index() {
                    release_lock(world, entity, index);
                }
                set_state(world, entity, UnitState::Fleeing);
            }
        },
        BattleEvent::FleeingExpired { entity } => {
            if state_of(world, entity) == Some(UnitState::Fleeing) {
                if let Some(unit) = world.store.get_mut(entity) {
                    unit.velocity = Some(Velocity::ZERO);
                }
                set_state(world, entity, UnitState::Idle);
            }
        }
        BattleEvent::GrabStarted { entity, grabber } => {
            match state_of(world, entity) {
                Some(UnitState::Dead | UnitState::Grabbed) | None => return,
                Some(previous) => {
                    if let Some(index) = previous.ability_index() {
                        release_lock(world, entity, index);
                    }
                }
            }
            if let Some(victim) = world.store.get_mut(entity) {
                victim.grab_link = Some(grabber);
            }
            set_state(world, entity, UnitState::Grabbed);
            match state_of(world, grabber) {
                Some(UnitState::Dead | UnitState::Grabbed | UnitState::Grabbing) | None => {}
                Some(previous) => {
                    if let Some(index) = previous.ability_index() {
                        release_lock(world, grabber, index);
                    }
                    set_state(world, grabber, UnitState::Grabbing);
                }
            }
        }
        BattleEvent::GrabReleased { entity, grabber } => {
            if let Some(victim) = world.store.get_mut(entity) {
                victim.grab_link = None;
            }
            if state_of(world, entity) == Some(UnitState::Grabbed) {
                set_state(world, entity, UnitState::Idle);
            }
            if let Some(grabber) = grabber {
                if state_of(world, grabber) == Some(UnitState::Grabbing) && !holds_anyone(world, grabber) {
                    set_state(world, grabber, UnitState::Idle);
                }
            }
        }
        BattleEvent::Death { entity } => on_death(world, entity),
        BattleEvent::KillingBlow { .. }
        | BattleEvent::DestinationReached { .. }
        | BattleEvent::AbilityActivated { .. }
        | BattleEvent::InstantAbilityTriggered { .. }
        | BattleEvent::ProjectileHit { .. }
        | BattleEvent::AreaHit { .. }
        | BattleEvent::CarrierLanded { .. }
        | BattleEvent::Summoned { .. }
        | BattleEvent::SoundPlayed { .. }
        | BattleEvent::StateChanged { .. } => {}
    }
}

fn on_death(world: &mut BattleWorld, entity: EntityId) {
    let Some(previous) = state_of(world, entity) else {
        return;
    };
    if previous.is_dead() {
        return;
    }
    let now = world.elapsed;
    let template = world
        .store
        .get(entity)
        .and_then(|e| e.kind.as_ref())
        .and_then(|kind| world.templates().get(&kind.0).ok());
    let last_effects = template
        .and_then(|t| t.on_death.as_ref())
        .filter(|on_death| {
            on_death
                .condition
                .as_ref()
                .map_or(true, |condition| condition.check(&world.store, entity, entity, now))
        })
        .map(|on_death| on_death.effects.clone());
    let rising = if template.is_some_and(UnitTemplate::can_be_infected) {
        infection(world, entity)
    } else {
        None
    };

    let corpse_duration = world.config.corpse_duration;
    let held_by = {
        let Some(unit) = world.store.get_mut(entity) else {
            return;
        };
        unit.velocity = Some(Velocity::ZERO);
        if let Some(destination) = unit.destination.as_mut() {
            destination.strategy.target = None;
            destination.arrived = false;
        }
        if let Some(abilities) = unit.abilities.as_mut() {
            abilities.clear_targets();
        }
        if let Some(statuses) = unit.statuses.as_mut() {
            statuses.clear();
        }
        unit.dying = None;
        unit.corpse = Some(Corpse {
            time_left: corpse_duration,
        });
        unit.grab_link.take()
    };
    set_state(world, entity, UnitState::Dead);
    debug!(%entity, ?previous, "unit died");

    // A dead grabber lets go of everyone it holds; a dead victim frees its grabber.
    for victim in world.store.ids_in_spawn_order() {
        if world.store.get(victim).and_then(|e| e.grab_link) == Some(entity) {
            world.events.emit(BattleEvent::GrabReleased {
                entity: victim,
                grabber: Some(entity),
            });
        }
    }
    if let Some(grabber) = held_by {
        if state_of(world, grabber) == Some(UnitState::Grabbing) && !holds_anyone(world, grabber) {
            set_state(world, grabber, UnitState::Idle);
        }
    }

    if let Some(effects) = last_effects {
        apply_effects(world, &effects, EffectContext::from_unit(entity, None));
    }
    if let Some(infection) = rising {
        rise(world, entity, infection);
    }
}

/// Active infection on a dying unit: team, infector and where it fell.
struct Infection {
    team: Team,
    source: Option<EntityId>,
    position: Vec2Fixed,
}

fn infection(world: &BattleWorld, entity: EntityId) -> Option<Infection> {
    let now = world.elapsed;
    let unit = world.store.get(entity)?;
    let statuses = unit.statuses.as_ref()?;
    let team = statuses.infected_by(now)?;
    let source = statuses.active(StatusKind::ZombieInfection, now)?.source;
    Some(Infection {
        team,
        source,
        position: unit.position?.value,
    })
}

/// Replace the corpse with a zombie fighting for the infecting team.
fn rise(world: &mut BattleWorld, corpse: EntityId, infection: Infection) {
    match world.spawn_unit(ZOMBIE_UNIT_TYPE, infection.team, infection.position) {
        Ok(zombie) => {
            debug!(%corpse, %zombie, team = ?infection.team, "corpse rose");
            world.store.remove(corpse);
            world.events.emit(BattleEvent::Summoned {
                entity: zombie,
                summoner: infection.source.unwrap_or(corpse),
            });
        }
        Err(error) => warn!(%error, "infected corpse stayed down"),
    }
}

fn holds_anyone(world: &BattleWorld, grabber: EntityId) -> bool {
    world
        .store
        .iter()
        .any(|e| e.grab_link == Some(grabber) && e.state == Some(UnitState::Grabbed))
}

fn release_lock(world: &mut BattleWorld, entity: EntityId, index: usize) {
    if let Some(runtime) = world
        .store
        .get_mut(entity)
        .and_then(|e| e.abilities.as_mut())
        .and_then(|a| a.runtime.get_mut(index))
    {
        runtime.target = None;
    }
}

fn state_of(world: &BattleWorld, entity: EntityId) -> Option<UnitState> {
    world.store.get(entity)?.state
}

/// Change a unit's state, restart its animation and record the transition.
pub(crate) fn set_state(world: &mut BattleWorld, entity: EntityId, to: UnitState) {
    let Some(unit) = world.store.get_mut(entity) else {
        return;
    };
    let Some(from) = unit.state else {
        return;
    };
    if from == to {
        return;
    }
    unit.state = Some(to);
    if let Some(animation) = unit.animation.as_mut() {
        animation.reset();
    }
    if let Some(destination) = unit.destination.as_mut() {
        destination.arrived = false;
    }
    debug!(%entity, ?from, ?to, "state change");
    world
        .tick_events
        .events
        .push(BattleEvent::StateChanged { entity, from, to });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BattleConfig;
    use crate::math::Fixed;
    use crate::templates::TemplateRegistry;

    fn world() -> (BattleWorld, EntityId, EntityId) {
        let world = BattleWorld::new(
            &[("swordsman".to_string(), (100, 100))],
            &[("swordsman".to_string(), (1000, 100))],
            Arc::new(TemplateRegistry::builtin()),
            BattleConfig::default(),
            Fixed::from_num(60),
        )
        .unwrap();
        let ids = world.store.ids_in_spawn_order();
        (world, ids[0], ids[1])
    }

    fn send(world: &mut BattleWorld, event: BattleEvent) {
        world.events.emit(event);
        drain_events(world);
    }

    #[test]
    fn test_target_events_toggle_pursuit() {
        let (mut world, a, _) = world();
        send(&mut world, BattleEvent::TargetAcquired { entity: a });
        assert_eq!(state_of(&world, a), Some(UnitState::Pursuing));
        send(&mut world, BattleEvent::TargetLost { entity: a });
        assert_eq!(state_of(&world, a), Some(UnitState::Idle));
        // Not pursuing: ignored.
        send(&mut world, BattleEvent::TargetLost { entity: a });
        assert_eq!(state_of(&world, a), Some(UnitState::Idle));
    }

    #[test]
    #[should_panic(expected = "ability index 4")]
    fn test_out_of_range_ability_aborts() {
        let (mut world, a, _) = world();
        send(&mut world, BattleEvent::AbilityTriggered { entity: a, index: 4 });
    }

    #[test]
    fn test_fleeing_expiry_stops_the_unit() {
        let (mut world, a, b) = world();
        send(&mut world, BattleEvent::FleeingStarted { entity: a });
        assert_eq!(state_of(&world, a), Some(UnitState::Fleeing));
        if let Some(unit) = world.store.get_mut(a) {
            unit.velocity = Some(Velocity::new(Vec2Fixed::from_ints(-60, 0)));
        }
        send(&mut world, BattleEvent::FleeingExpired { entity: a });
        assert_eq!(state_of(&world, a), Some(UnitState::Idle));
        assert_eq!(world.store.get(a).and_then(|e| e.velocity), Some(Velocity::ZERO));
        // A unit that is not fleeing keeps its velocity.
        if let Some(unit) = world.store.get_mut(b) {
            unit.velocity = Some(Velocity::new(Vec2Fixed::from_ints(30, 0)));
        }
        send(&mut world, BattleEvent::FleeingExpired { entity: b });
        assert_eq!(
            world.store.get(b).and_then(|e| e.velocity),
            Some(Velocity::new(Vec2Fixed::from_ints(30, 0)))
        );
    }

    #[test]
    fn test_completion_of_running_ability_releases_lock() {
        let (mut world, a, b) = world();
        send(&mut world, BattleEvent::AbilityTriggered { entity: a, index: 0 });
        assert_eq!(state_of(&world, a), Some(UnitState::Ability(0)));
        if let Some(runtime) = world
            .store
            .get_mut(a)
            .and_then(|e| e.abilities.as_mut())
            .and_then(|abilities| abilities.runtime.get_mut(0))
        {
            runtime.target = Some(b);
        }

        // A completion for another index changes nothing.
        send(&mut world, BattleEvent::AbilityCompleted { entity: a, index: 1 });
        assert_eq!(state_of(&world, a), Some(UnitState::Ability(0)));

        send(&mut world, BattleEvent::AbilityCompleted { entity: a, index: 0 });
        assert_eq!(state_of(&world, a), Some(UnitState::Idle));
        let abilities = world.store.get(a).and_then(|e| e.abilities.as_ref()).unwrap();
        assert_eq!(abilities.locked_target(0), None);
    }

    #[test]
    fn test_grab_pairs_and_release() {
        let (mut world, a, b) = world();
        send(&mut world, BattleEvent::GrabStarted { entity: a, grabber: b });
        assert_eq!(state_of(&world, a), Some(UnitState::Grabbed));
        assert_eq!(state_of(&world, b), Some(UnitState::Grabbing));
        assert_eq!(world.store.get(a).and_then(|e| e.grab_link), Some(b));

        send(
            &mut world,
            BattleEvent::GrabReleased {
                entity: a,
                grabber: Some(b),
            },
        );
        assert_eq!(state_of(&world, a), Some(UnitState::Idle));
        assert_eq!(state_of(&world, b), Some(UnitState::Idle));
        assert_eq!(world.store.get(a).and_then(|e| e.grab_link), None);
    }

    #[test]
    fn test_grabber_death_frees_victim() {
        let (mut world, a, b) = world();
        send(&mut world, BattleEvent::GrabStarted { entity: a, grabber: b });
        send(&mut world, BattleEvent::Death { entity: b });
        assert_eq!(state_of(&world, b), Some(UnitState::Dead));
        assert_eq!(state_of(&world, a), Some(UnitState::Idle));
        let grabber = world.store.get(b).unwrap();
        assert!(grabber.corpse.is_some());
        assert_eq!(grabber.velocity, Some(Velocity::ZERO));
    }

    #[test]
    fn test_victim_death_frees_grabber() {
        let (mut world, a, b) = world();
        send(&mut world, BattleEvent::GrabStarted { entity: a, grabber: b });
        send(&mut world, BattleEvent::Death { entity: a });
        assert_eq!(state_of(&world, a), Some(UnitState::Dead));
        assert_eq!(state_of(&world, b), Some(UnitState::Idle));
    }

    #[test]
    fn test_dead_is_terminal() {
        let (mut world, a, _) = world();
        send(&mut world, BattleEvent::Death { entity: a });
        for event in [
            BattleEvent::TargetAcquired { entity: a },
            BattleEvent::FleeingStarted { entity: a },
            BattleEvent::AbilityTriggered { entity: a, index: 0 },
            BattleEvent::Death { entity: a },
        ] {
            send(&mut world, event);
            assert_eq!(state_of(&world, a), Some(UnitState::Dead));
        }
        let dead_transitions = world
            .tick_events
            .state_changes()
            .filter(|&(entity, _, to)| entity == a && to == UnitState::Dead)
            .count();
        assert_eq!(dead_transitions, 1);
    }
}
