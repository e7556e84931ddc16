//! Effects.
//!
//! An [`Effect`] is one mutation step applied against an
//! [`EffectContext`]: the *owner* (the unit credited with it), the *parent*
//! (the entity it originates from: the caster, or a carrier), and an optional
//! *target*. Effects never search for targets themselves; carriers and
//! abilities hand them a resolved triple.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::carriers::{AreaEffect, Aura, Lobbed, Projectile, VolleyShot};
use crate::combat::{heal, strike};
use crate::components::{Attached, Expiration, Facing, Position, Unique, Velocity};
use crate::conditions::UnitCondition;
use crate::entity::EntityId;
use crate::events::BattleEvent;
use crate::math::{
    ballistic_launch, fixed_decimal, fixed_sqrt, option_fixed_decimal, vec2_decimal, Fixed,
    Vec2Fixed,
};
use crate::status::StatusSpec;
use crate::store::Entity;
use crate::templates::ZOMBIE_UNIT_TYPE;
use crate::world::BattleWorld;

fn always() -> UnitCondition {
    UnitCondition::Always
}

/// Which entity of the context an effect lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    /// The unit credited with the effect.
    Owner,
    /// The entity the effect originates from.
    Parent,
    /// The context target.
    Target,
}

/// The `(owner, parent, target)` triple an effect is applied against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectContext {
    /// Unit credited with the effect.
    pub owner: EntityId,
    /// Entity the effect originates from.
    pub parent: EntityId,
    /// Target, if any.
    pub target: Option<EntityId>,
}

impl EffectContext {
    /// Context for a unit acting on its own behalf.
    #[must_use]
    pub const fn from_unit(unit: EntityId, target: Option<EntityId>) -> Self {
        Self {
            owner: unit,
            parent: unit,
            target,
        }
    }

    /// Resolve a recipient role.
    #[must_use]
    pub const fn resolve(&self, recipient: Recipient) -> Option<EntityId> {
        match recipient {
            Recipient::Owner => Some(self.owner),
            Recipient::Parent => Some(self.parent),
            Recipient::Target => self.target,
        }
    }
}

/// A single mutation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Damage the recipient (owner modifiers and recipient armor apply).
    Damages {
        /// Raw damage.
        #[serde(with = "fixed_decimal")]
        damage: Fixed,
        /// Who takes it.
        recipient: Recipient,
    },
    /// Heal the recipient.
    Heals {
        /// Health restored.
        #[serde(with = "fixed_decimal")]
        amount: Fixed,
        /// Who receives it.
        recipient: Recipient,
    },
    /// Apply a status for `duration` seconds, credited to the owner.
    AppliesStatus {
        /// Status to apply.
        status: StatusSpec,
        /// Lifetime in seconds.
        #[serde(with = "fixed_decimal")]
        duration: Fixed,
        /// Who receives it.
        recipient: Recipient,
    },
    /// Spawn a unit on the owner's team next to the parent.
    Summons {
        /// Template of the new unit.
        unit_type: String,
        /// Offset from the parent, mirrored by its facing.
        #[serde(with = "vec2_decimal")]
        offset: Vec2Fixed,
    },
    /// Spawn an area carrier at the parent's position.
    CreatesAoE {
        /// Applied once to each unit in range.
        effects: Vec<Effect>,
        /// Radius.
        #[serde(with = "fixed_decimal")]
        radius: Fixed,
        /// Lifetime in seconds.
        #[serde(with = "fixed_decimal")]
        duration: Fixed,
        /// Which units are affected.
        #[serde(default = "always")]
        unit_condition: UnitCondition,
    },
    /// Spawn a pulsing aura that follows the owner.
    CreatesAura {
        /// Applied to each unit in range on every pulse.
        effects: Vec<Effect>,
        /// Radius.
        #[serde(with = "fixed_decimal")]
        radius: Fixed,
        /// Seconds between pulses.
        #[serde(with = "fixed_decimal")]
        period: Fixed,
        /// Lifetime; `None` lasts as long as the owner.
        #[serde(default, with = "option_fixed_decimal")]
        duration: Option<Fixed>,
        /// Which units are affected.
        #[serde(default = "always")]
        unit_condition: UnitCondition,
        /// At most one aura per owner with this key survives.
        #[serde(default)]
        unique_key: Option<String>,
    },
    /// Fire a projectile at the target.
    CreatesProjectile {
        /// Applied to the single unit hit.
        effects: Vec<Effect>,
        /// Flight speed.
        #[serde(with = "fixed_decimal")]
        speed: Fixed,
        /// Muzzle offset from the parent, mirrored by its facing.
        #[serde(default, with = "vec2_decimal")]
        offset: Vec2Fixed,
        /// Which units it may hit, besides being a living enemy.
        #[serde(default = "always")]
        unit_condition: UnitCondition,
    },
    /// Lob a ballistic carrier onto the target's current position.
    CreatesLobbed {
        /// Applied on landing with the carrier as parent.
        effects: Vec<Effect>,
        /// Range reached by a 45 degree throw; sets the launch speed.
        #[serde(with = "fixed_decimal")]
        max_range: Fixed,
        /// Launch offset from the parent, mirrored by its facing.
        #[serde(default, with = "vec2_decimal")]
        offset: Vec2Fixed,
    },
    /// Fire `count` straight shots spread horizontally around the target's
    /// current position.
    CreatesVolley {
        /// Applied on arrival with each shot as parent.
        effects: Vec<Effect>,
        /// Flight speed.
        #[serde(with = "fixed_decimal")]
        speed: Fixed,
        /// Number of shots.
        count: u32,
        /// Horizontal gap between landing points.
        #[serde(with = "fixed_decimal")]
        spread: Fixed,
        /// Launch offset from the parent, mirrored by its facing.
        #[serde(default, with = "vec2_decimal")]
        offset: Vec2Fixed,
    },
    /// Grab the target: it is pulled toward the owner for `duration`.
    Grabs {
        /// Pull speed.
        #[serde(with = "fixed_decimal")]
        speed: Fixed,
        /// Grab duration in seconds.
        #[serde(with = "fixed_decimal")]
        duration: Fixed,
    },
    /// Presentation-only audio cue.
    PlaySound(String),
}

impl Effect {
    /// Every unit type this effect can bring onto the field, including
    /// nested effects. An infection counts as raising a zombie.
    pub fn summoned_types<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Summons { unit_type, .. } => out.push(unit_type),
            Self::AppliesStatus {
                status: StatusSpec::ZombieInfection,
                ..
            } => out.push(ZOMBIE_UNIT_TYPE),
            Self::CreatesAoE { effects, .. }
            | Self::CreatesAura { effects, .. }
            | Self::CreatesProjectile { effects, .. }
            | Self::CreatesLobbed { effects, .. }
            | Self::CreatesVolley { effects, .. } => {
                for effect in effects {
                    effect.summoned_types(out);
                }
            }
            _ => {}
        }
    }
}

/// Apply `effect` against `ctx`.
pub fn apply_effect(world: &mut BattleWorld, effect: &Effect, ctx: EffectContext) {
    trace!(owner = %ctx.owner, parent = %ctx.parent, ?effect, "apply effect");
    match effect {
        Effect::Damages { damage, recipient } => {
            if let Some(recipient) = ctx.resolve(*recipient) {
                strike(world, ctx.owner, recipient, *damage);
            }
        }
        Effect::Heals { amount, recipient } => {
            if let Some(recipient) = ctx.resolve(*recipient) {
                heal(world, recipient, *amount);
            }
        }
        Effect::AppliesStatus {
            status,
            duration,
            recipient,
        } => {
            if let Some(recipient) = ctx.resolve(*recipient) {
                apply_status(world, ctx.owner, recipient, status, *duration);
            }
        }
        Effect::Summons { unit_type, offset } => summon(world, ctx, unit_type, *offset),
        Effect::CreatesAoE {
            effects,
            radius,
            duration,
            unit_condition,
        } => {
            let Some(center) = position_of(world, ctx.parent) else {
                return;
            };
            let mut entity = carrier_base(world, ctx.owner, center);
            entity.area = Some(AreaEffect {
                owner: ctx.owner,
                radius: *radius,
                effects: effects.clone(),
                condition: unit_condition.clone(),
                hit: Default::default(),
            });
            entity.expiration = Some(Expiration {
                time_left: *duration,
            });
            world.spawn(entity);
        }
        Effect::CreatesAura {
            effects,
            radius,
            period,
            duration,
            unit_condition,
            unique_key,
        } => {
            let Some(center) = position_of(world, ctx.owner) else {
                return;
            };
            let mut entity = carrier_base(world, ctx.owner, center);
            entity.aura = Some(Aura {
                owner: ctx.owner,
                radius: *radius,
                period: *period,
                elapsed: Fixed::ZERO,
                pulses: 0,
                effects: effects.clone(),
                condition: unit_condition.clone(),
            });
            entity.attached = Some(Attached {
                parent: ctx.owner,
                offset: Vec2Fixed::ZERO,
            });
            entity.expiration = duration.map(|time_left| Expiration { time_left });
            entity.unique = unique_key.as_ref().map(|key| Unique {
                key: format!("{key}@{}", ctx.owner),
            });
            world.spawn(entity);
        }
        Effect::CreatesProjectile {
            effects,
            speed,
            offset,
            unit_condition,
        } => {
            let Some(target) = ctx.target.and_then(|t| position_of(world, t)) else {
                return;
            };
            let Some((origin, facing)) = muzzle(world, ctx.parent, *offset) else {
                return;
            };
            let heading = target - origin;
            let velocity = if heading == Vec2Fixed::ZERO {
                Vec2Fixed::new(speed.saturating_mul(facing.sign()), Fixed::ZERO)
            } else {
                heading.normalize().scale(*speed)
            };
            let mut entity = carrier_base(world, ctx.owner, origin);
            entity.velocity = Some(Velocity::new(velocity));
            entity.facing = Facing::from_dx(velocity.x).or(Some(facing));
            entity.projectile = Some(Projectile {
                owner: ctx.owner,
                effects: effects.clone(),
                condition: unit_condition.clone(),
                radius: world.config.projectile_radius,
            });
            world.spawn(entity);
        }
        Effect::CreatesLobbed {
            effects,
            max_range,
            offset,
        } => {
            let Some(landing) = ctx.target.and_then(|t| position_of(world, t)) else {
                return;
            };
            let Some((origin, facing)) = muzzle(world, ctx.parent, *offset) else {
                return;
            };
            let gravity = world.config.gravity;
            let speed = fixed_sqrt(gravity.saturating_mul(*max_range));
            let distance = origin.distance(landing);
            let direction = if distance == Fixed::ZERO {
                Vec2Fixed::new(facing.sign(), Fixed::ZERO)
            } else {
                (landing - origin).normalize()
            };
            let (horizontal_speed, vertical_speed) = ballistic_launch(speed, gravity, distance);
            let mut entity = carrier_base(world, ctx.owner, origin);
            entity.facing = Facing::from_dx(direction.x).or(Some(facing));
            entity.lobbed = Some(Lobbed {
                owner: ctx.owner,
                origin,
                landing,
                direction,
                distance,
                horizontal_speed,
                vertical_speed,
                time: Fixed::ZERO,
                effects: effects.clone(),
            });
            world.spawn(entity);
        }
        Effect::CreatesVolley {
            effects,
            speed,
            count,
            spread,
            offset,
        } => {
            let Some(center) = ctx.target.and_then(|t| position_of(world, t)) else {
                return;
            };
            let Some((origin, facing)) = muzzle(world, ctx.parent, *offset) else {
                return;
            };
            let shots = i64::from(*count);
            for shot in 0..shots {
                // Landing points are centered on the target: offsets of
                // (shot - (count - 1) / 2) * spread.
                let twice = Fixed::from_num(2 * shot - (shots - 1));
                let landing = Vec2Fixed::new(center.x + spread.saturating_mul(twice) / 2, center.y);
                let heading = landing - origin;
                let velocity = if heading == Vec2Fixed::ZERO {
                    Vec2Fixed::ZERO
                } else {
                    heading.normalize().scale(*speed)
                };
                let mut entity = carrier_base(world, ctx.owner, origin);
                entity.velocity = Some(Velocity::new(velocity));
                entity.facing = Facing::from_dx(velocity.x).or(Some(facing));
                entity.volley = Some(VolleyShot {
                    owner: ctx.owner,
                    landing,
                    speed: *speed,
                    effects: effects.clone(),
                });
                world.spawn(entity);
            }
        }
        Effect::Grabs { speed, duration } => {
            let Some(target) = ctx.target else {
                return;
            };
            apply_status(
                world,
                ctx.owner,
                target,
                &StatusSpec::Grabbed { speed: *speed },
                *duration,
            );
        }
        Effect::PlaySound(sound) => {
            world.events.emit(BattleEvent::SoundPlayed {
                entity: ctx.parent,
                sound: sound.clone(),
            });
        }
    }
}

/// Apply every effect of a list, in order.
pub fn apply_effects(world: &mut BattleWorld, effects: &[Effect], ctx: EffectContext) {
    for effect in effects {
        apply_effect(world, effect, ctx);
    }
}

fn apply_status(
    world: &mut BattleWorld,
    applier: EntityId,
    recipient: EntityId,
    status: &StatusSpec,
    duration: Fixed,
) {
    let now = world.elapsed;
    let applier_position = position_of(world, applier).unwrap_or_default();
    let applier_team = world.store.get(applier).and_then(|e| e.team);
    let Some(effect) = status.instantiate(applier, applier_position, applier_team) else {
        return;
    };
    let Some(entity) = world.store.get_mut(recipient) else {
        return;
    };
    if !entity.is_standing() {
        return;
    }
    let Some(statuses) = entity.statuses.as_mut() else {
        return;
    };
    statuses.add(effect, duration, now, Some(applier));
}

fn summon(world: &mut BattleWorld, ctx: EffectContext, unit_type: &str, offset: Vec2Fixed) {
    let Some(team) = world.store.get(ctx.owner).and_then(|e| e.team) else {
        return;
    };
    let Some((position, _)) = muzzle(world, ctx.parent, offset) else {
        return;
    };
    match world.spawn_unit(unit_type, team, position) {
        Ok(entity) => world.events.emit(BattleEvent::Summoned {
            entity,
            summoner: ctx.owner,
        }),
        Err(error) => warn!(%error, "summon skipped"),
    }
}

fn position_of(world: &BattleWorld, id: EntityId) -> Option<Vec2Fixed> {
    world.store.get(id)?.position.map(|p| p.value)
}

/// Parent position plus an offset mirrored by the parent's facing.
fn muzzle(world: &BattleWorld, parent: EntityId, offset: Vec2Fixed) -> Option<(Vec2Fixed, Facing)> {
    let entity = world.store.get(parent)?;
    let facing = entity.facing.unwrap_or(Facing::Right);
    let base = entity.position?.value;
    Some((
        Vec2Fixed::new(base.x + offset.x.saturating_mul(facing.sign()), base.y + offset.y),
        facing,
    ))
}

fn carrier_base(world: &BattleWorld, owner: EntityId, position: Vec2Fixed) -> Entity {
    let mut entity = Entity::new();
    if let Some(owner) = world.store.get(owner) {
        entity.team = owner.team;
        entity.facing = owner.facing;
    }
    entity.position = Some(Position::new(position));
    entity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_resolution() {
        let owner = EntityId::new(1, 0);
        let parent = EntityId::new(2, 0);
        let ctx = EffectContext {
            owner,
            parent,
            target: None,
        };
        assert_eq!(ctx.resolve(Recipient::Owner), Some(owner));
        assert_eq!(ctx.resolve(Recipient::Parent), Some(parent));
        assert_eq!(ctx.resolve(Recipient::Target), None);
        assert_eq!(EffectContext::from_unit(owner, None).parent, owner);
    }

    #[test]
    fn test_summoned_types_walks_nested_effects() {
        let effect = Effect::CreatesAoE {
            effects: vec![
                Effect::Summons {
                    unit_type: "skeleton".to_string(),
                    offset: Vec2Fixed::ZERO,
                },
                Effect::PlaySound("rise".to_string()),
            ],
            radius: Fixed::from_num(10),
            duration: Fixed::ONE,
            unit_condition: UnitCondition::Always,
        };
        let mut found = Vec::new();
        effect.summoned_types(&mut found);
        assert_eq!(found, vec!["skeleton"]);

        let bite = Effect::AppliesStatus {
            status: StatusSpec::ZombieInfection,
            duration: Fixed::from_num(5),
            recipient: Recipient::Target,
        };
        let mut found = Vec::new();
        bite.summoned_types(&mut found);
        assert_eq!(found, vec![ZOMBIE_UNIT_TYPE]);
    }

    #[test]
    fn test_effect_parses_from_ron() {
        let effect: Effect = ron::from_str(
            "CreatesProjectile(effects: [Damages(damage: 15.0, recipient: Target)], speed: 150.0)",
        )
        .unwrap();
        match effect {
            Effect::CreatesProjectile {
                effects,
                speed,
                offset,
                unit_condition,
            } => {
                assert_eq!(speed, Fixed::from_num(150));
                assert_eq!(offset, Vec2Fixed::ZERO);
                assert_eq!(unit_condition, UnitCondition::Always);
                assert_eq!(effects.len(), 1);
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }
}
