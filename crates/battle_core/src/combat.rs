//! Damage and healing application.
//!
//! All health changes go through here so that killing blows are detected in
//! exactly one place. A killing blow marks the victim [`Dying`]; the death
//! itself is resolved at the end of the tick.

use tracing::trace;

use crate::armor::reduce_damage;
use crate::components::{DamageOutcome, Dying};
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::Fixed;
use crate::world::BattleWorld;

/// Damage from an effect: scaled by the owner's damage modifiers, then
/// mitigated by the target's armor.
pub(crate) fn strike(
    world: &mut BattleWorld,
    owner: EntityId,
    target: EntityId,
    raw: Fixed,
) -> Option<DamageOutcome> {
    let now = world.elapsed;
    let multiplier = world
        .store
        .get(owner)
        .and_then(|e| e.statuses.as_ref())
        .map_or(Fixed::ONE, |s| s.damage_multiplier(now));
    let scaled = raw.saturating_mul(multiplier);
    let armor = world.store.get(target)?.armor.unwrap_or_default();
    let reduced = reduce_damage(scaled, armor, world.config.max_armor_reduction);
    deal_damage(world, target, reduced, Some(owner))
}

/// Remove health without mitigation. Dead units are skipped.
pub(crate) fn deal_damage(
    world: &mut BattleWorld,
    target: EntityId,
    amount: Fixed,
    source: Option<EntityId>,
) -> Option<DamageOutcome> {
    let entity = world.store.get_mut(target)?;
    if !entity.is_standing() {
        return None;
    }
    let outcome = entity.health.as_mut()?.apply_damage(amount);
    trace!(%target, dealt = %outcome.dealt, "damage");
    if outcome.killing_blow {
        if entity.dying.is_none() {
            entity.dying = Some(Dying { source });
        }
        world.events.emit(BattleEvent::KillingBlow {
            entity: target,
            source,
        });
    }
    Some(outcome)
}

/// Restore health. Dead and dying units are not healed.
pub(crate) fn heal(world: &mut BattleWorld, target: EntityId, amount: Fixed) -> Fixed {
    let Some(entity) = world.store.get_mut(target) else {
        return Fixed::ZERO;
    };
    if !entity.is_standing() || entity.dying.is_some() {
        return Fixed::ZERO;
    }
    let restored = entity.health.as_mut().map_or(Fixed::ZERO, |h| h.heal(amount));
    trace!(%target, restored = %restored, "heal");
    restored
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::components::Armor;
    use crate::config::BattleConfig;
    use crate::status::StatusEffect;
    use crate::templates::{TemplateRegistry, UnitTemplate};

    fn world() -> (BattleWorld, EntityId, EntityId) {
        let mut knight = UnitTemplate::melee("knight", 100, 0, 10, 25, 1.0);
        knight.armor = Some(Armor::new(Fixed::from_num(4), Fixed::from_num(0.5)));
        let mut registry = TemplateRegistry::new();
        registry
            .register(UnitTemplate::melee("squire", 40, 0, 10, 25, 1.0))
            .unwrap();
        registry.register(knight).unwrap();
        let world = BattleWorld::new(
            &[("squire".to_string(), (100, 100))],
            &[("knight".to_string(), (900, 100))],
            Arc::new(registry),
            BattleConfig::default(),
            Fixed::from_num(60),
        )
        .unwrap();
        let ids = world.store.ids_in_spawn_order();
        (world, ids[0], ids[1])
    }

    fn health(world: &BattleWorld, id: EntityId) -> Fixed {
        world.store.get(id).and_then(|e| e.health).unwrap().current
    }

    #[test]
    fn test_strike_applies_armor() {
        let (mut world, squire, knight) = world();
        let outcome = strike(&mut world, squire, knight, Fixed::from_num(20)).unwrap();
        assert_eq!(outcome.dealt, Fixed::from_num(8));
        assert_eq!(health(&world, knight), Fixed::from_num(92));
    }

    #[test]
    fn test_strike_scales_by_owner_modifiers() {
        let (mut world, squire, knight) = world();
        if let Some(statuses) = world.store.get_mut(squire).and_then(|e| e.statuses.as_mut()) {
            statuses.add(
                StatusEffect::Empowered {
                    percent: Fixed::from_num(0.5),
                },
                Fixed::from_num(5),
                Fixed::ZERO,
                None,
            );
        }
        // 20 * 1.5 = 30, minus 4 flat, halved.
        strike(&mut world, squire, knight, Fixed::from_num(20));
        assert_eq!(health(&world, knight), Fixed::from_num(87));
    }

    #[test]
    fn test_killing_blow_is_reported_once() {
        let (mut world, squire, knight) = world();
        let first = deal_damage(&mut world, squire, Fixed::from_num(50), Some(knight)).unwrap();
        assert!(first.killing_blow);
        assert_eq!(first.dealt, Fixed::from_num(40));
        let second = deal_damage(&mut world, squire, Fixed::from_num(5), None).unwrap();
        assert!(!second.killing_blow);
        assert_eq!(second.dealt, Fixed::ZERO);

        assert_eq!(
            world.store.get(squire).and_then(|e| e.dying),
            Some(Dying {
                source: Some(knight)
            })
        );
        let mut blows = 0;
        while let Some(event) = world.events.pop() {
            if matches!(event, BattleEvent::KillingBlow { entity, .. } if entity == squire) {
                blows += 1;
            }
        }
        assert_eq!(blows, 1);
    }

    #[test]
    fn test_dying_units_are_not_healed() {
        let (mut world, squire, _) = world();
        deal_damage(&mut world, squire, Fixed::from_num(10), None);
        assert_eq!(heal(&mut world, squire, Fixed::from_num(25)), Fixed::from_num(10));
        assert_eq!(health(&world, squire), Fixed::from_num(40));

        deal_damage(&mut world, squire, Fixed::from_num(40), None);
        assert_eq!(heal(&mut world, squire, Fixed::from_num(25)), Fixed::ZERO);
        assert_eq!(health(&world, squire), Fixed::ZERO);
    }
}
