//! Unit templates.
//!
//! A [`UnitTemplate`] holds the numeric stats and effect graph of a unit
//! type. Templates are validated when registered; a battle built from a
//! [`TemplateRegistry`] never meets malformed content while ticking.
//!
//! The basic attack is described by an [`AttackProfile`] and compiled into a
//! regular ability that runs after the template's special abilities.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ability::{AbilityCondition, AbilityDef, InstantAbilityDef};
use crate::components::{Armor, Hitbox, UnitState};
use crate::conditions::UnitCondition;
use crate::config::BattleConfig;
use crate::effects::{Effect, Recipient};
use crate::error::{BattleError, Result};
use crate::math::{fixed_decimal, option_fixed_decimal, Fixed, Vec2Fixed};
use crate::status::StatusSpec;
use crate::targeting::TargetStrategy;

/// Vertical stretch used by the default targeting strategy.
pub const DEFAULT_TARGET_Y_BIAS: i32 = 2;

/// Unit type an infected unit rises as.
pub const ZOMBIE_UNIT_TYPE: &str = "zombie";

/// Lifetime of the short-lived area carriers produced by attacks.
fn impact_duration() -> Fixed {
    Fixed::from_num(0.1)
}

/// Delivery mechanism of a basic attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackKind {
    /// Direct hit on the target.
    Melee,
    /// Hits every enemy in front of the attacker within `radius`.
    Cleave {
        /// Sweep radius.
        #[serde(with = "fixed_decimal")]
        radius: Fixed,
    },
    /// Straight single-hit projectile.
    Projectile {
        /// Flight speed.
        #[serde(with = "fixed_decimal")]
        speed: Fixed,
    },
    /// Ballistic shot exploding on landing.
    Lobbed {
        /// Explosion radius.
        #[serde(with = "fixed_decimal")]
        aoe_radius: Fixed,
    },
    /// Spread of straight shots exploding on arrival.
    Volley {
        /// Flight speed.
        #[serde(with = "fixed_decimal")]
        speed: Fixed,
        /// Shots per attack.
        count: u32,
        /// Gap between landing points.
        #[serde(with = "fixed_decimal")]
        spread: Fixed,
        /// Explosion radius per shot.
        #[serde(with = "fixed_decimal")]
        aoe_radius: Fixed,
    },
}

/// Basic attack stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackProfile {
    /// Delivery.
    pub kind: AttackKind,
    /// Trigger range.
    #[serde(with = "fixed_decimal")]
    pub range: Fixed,
    /// Raw damage per hit.
    #[serde(with = "fixed_decimal")]
    pub damage: Fixed,
    /// Seconds between attacks.
    #[serde(with = "fixed_decimal")]
    pub cooldown: Fixed,
    /// Animation frames.
    pub frame_count: u32,
    /// Animation length in seconds.
    #[serde(with = "fixed_decimal")]
    pub duration: Fixed,
    /// Frame on which the attack is released.
    pub hit_frame: u32,
    /// Extra effects applied to every unit the attack damages.
    #[serde(default)]
    pub on_hit: Vec<Effect>,
}

impl AttackProfile {
    fn is_close_combat(&self) -> bool {
        matches!(self.kind, AttackKind::Melee | AttackKind::Cleave { .. })
    }

    fn impact(&self) -> Vec<Effect> {
        let mut effects = vec![Effect::Damages {
            damage: self.damage,
            recipient: Recipient::Target,
        }];
        effects.extend(self.on_hit.iter().cloned());
        effects
    }

    fn explosion(&self, radius: Fixed) -> Effect {
        Effect::CreatesAoE {
            effects: self.impact(),
            radius,
            duration: impact_duration(),
            unit_condition: UnitCondition::all([UnitCondition::Alive, UnitCondition::Enemy]),
        }
    }

    fn release(&self) -> Vec<Effect> {
        match &self.kind {
            AttackKind::Melee => self.impact(),
            AttackKind::Cleave { radius } => vec![Effect::CreatesAoE {
                effects: self.impact(),
                radius: *radius,
                duration: impact_duration(),
                unit_condition: UnitCondition::all([
                    UnitCondition::Alive,
                    UnitCondition::Enemy,
                    UnitCondition::InFacingCone {
                        max_slope: Fixed::ONE,
                    },
                ]),
            }],
            AttackKind::Projectile { speed } => vec![Effect::CreatesProjectile {
                effects: self.impact(),
                speed: *speed,
                offset: Vec2Fixed::ZERO,
                unit_condition: UnitCondition::Always,
            }],
            AttackKind::Lobbed { aoe_radius } => vec![Effect::CreatesLobbed {
                effects: vec![self.explosion(*aoe_radius)],
                max_range: self.range,
                offset: Vec2Fixed::ZERO,
            }],
            AttackKind::Volley {
                speed,
                count,
                spread,
                aoe_radius,
            } => vec![Effect::CreatesVolley {
                effects: vec![self.explosion(*aoe_radius)],
                speed: *speed,
                count: *count,
                spread: *spread,
                offset: Vec2Fixed::ZERO,
            }],
        }
    }

    /// Compile into an ability aimed with `strategy`.
    #[must_use]
    pub fn to_ability(&self, strategy: &TargetStrategy, config: &BattleConfig) -> AbilityDef {
        let mut reach = vec![
            UnitCondition::Alive,
            UnitCondition::Enemy,
            UnitCondition::within(self.range),
        ];
        if self.is_close_combat() {
            reach.push(UnitCondition::InFacingCone {
                max_slope: Fixed::ONE,
            });
        }
        let mut frame_effects = BTreeMap::new();
        frame_effects.insert(self.hit_frame, self.release());
        AbilityDef {
            name: "attack".to_string(),
            strategy: strategy.clone(),
            trigger_conditions: vec![
                AbilityCondition::Cooldown(self.cooldown),
                AbilityCondition::HasTarget(UnitCondition::All(reach)),
            ],
            persistent_conditions: vec![AbilityCondition::HasTarget(UnitCondition::all([
                UnitCondition::Alive,
                UnitCondition::within(self.range.saturating_add(config.grace_distance)),
            ]))],
            frame_count: self.frame_count,
            duration: self.duration,
            frame_effects,
        }
    }
}

/// Effects applied when a unit dies, with the dead unit as owner and parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDeath {
    /// Effects to apply.
    pub effects: Vec<Effect>,
    /// Checked on the unit itself just before it dies.
    #[serde(default)]
    pub condition: Option<UnitCondition>,
}

/// Stats and behavior of a unit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTemplate {
    /// Unit type identifier.
    pub id: String,
    /// Maximum health.
    #[serde(with = "fixed_decimal")]
    pub health: Fixed,
    /// Movement speed.
    #[serde(with = "fixed_decimal")]
    pub speed: Fixed,
    /// Hit-test box.
    pub hitbox: Hitbox,
    /// Damage mitigation.
    #[serde(default)]
    pub armor: Option<Armor>,
    /// Basic attack, run after the special abilities.
    #[serde(default)]
    pub attack: Option<AttackProfile>,
    /// Special abilities in priority order.
    #[serde(default)]
    pub abilities: Vec<AbilityDef>,
    /// Pursuit and attack targeting; nearest enemy when absent.
    #[serde(default)]
    pub targeting: Option<TargetStrategy>,
    /// Units with a lifetime die when it runs out.
    #[serde(default, with = "option_fixed_decimal")]
    pub lifetime: Option<Fixed>,
    /// Animation-free abilities checked in any living state.
    #[serde(default)]
    pub instant_abilities: Vec<InstantAbilityDef>,
    /// Effects applied on death.
    #[serde(default)]
    pub on_death: Option<OnDeath>,
    /// Never rises as a zombie.
    #[serde(default)]
    pub infection_immune: bool,
}

impl UnitTemplate {
    /// Melee unit with no armor or specials.
    #[must_use]
    pub fn melee(id: &str, health: i32, speed: i32, damage: i32, range: i32, cooldown: f64) -> Self {
        Self::basic(id, health, speed, AttackKind::Melee, damage, range, cooldown)
    }

    /// Projectile unit with no armor or specials.
    #[must_use]
    pub fn ranged(
        id: &str,
        health: i32,
        speed: i32,
        damage: i32,
        range: i32,
        cooldown: f64,
        projectile_speed: i32,
    ) -> Self {
        Self::basic(
            id,
            health,
            speed,
            AttackKind::Projectile {
                speed: Fixed::from_num(projectile_speed),
            },
            damage,
            range,
            cooldown,
        )
    }

    fn basic(
        id: &str,
        health: i32,
        speed: i32,
        kind: AttackKind,
        damage: i32,
        range: i32,
        cooldown: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            health: Fixed::from_num(health),
            speed: Fixed::from_num(speed),
            hitbox: Hitbox::new(16, 32),
            armor: None,
            attack: Some(AttackProfile {
                kind,
                range: Fixed::from_num(range),
                damage: Fixed::from_num(damage),
                cooldown: Fixed::from_num(cooldown),
                frame_count: 4,
                duration: Fixed::from_num(0.4),
                hit_frame: 2,
                on_hit: vec![],
            }),
            abilities: vec![],
            targeting: None,
            lifetime: None,
            instant_abilities: vec![],
            on_death: None,
            infection_immune: false,
        }
    }

    /// Targeting strategy used for pursuit and the basic attack.
    #[must_use]
    pub fn target_strategy(&self) -> TargetStrategy {
        self.targeting.clone().unwrap_or_else(|| {
            TargetStrategy::nearest_enemy(Some(Fixed::from_num(DEFAULT_TARGET_Y_BIAS)))
        })
    }

    /// Horizontal stand-off from the target while pursuing.
    #[must_use]
    pub fn stand_off(&self) -> Fixed {
        match &self.attack {
            Some(attack) if attack.is_close_combat() => attack.range * 2 / 3,
            _ => Fixed::ZERO,
        }
    }

    /// Full ability list: specials first, then the basic attack.
    #[must_use]
    pub fn compile_abilities(&self, config: &BattleConfig) -> Arc<[AbilityDef]> {
        let mut abilities = self.abilities.clone();
        if let Some(attack) = &self.attack {
            abilities.push(attack.to_ability(&self.target_strategy(), config));
        }
        Arc::from(abilities)
    }

    /// Whether a unit of this type rises when it dies infected.
    #[must_use]
    pub fn can_be_infected(&self) -> bool {
        !self.infection_immune
    }

    /// Check the template's numbers and effect graph.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| BattleError::InvalidTemplate {
            unit_type: self.id.clone(),
            reason,
        };
        if self.health <= Fixed::ZERO {
            return Err(invalid(format!("health must be positive, got {}", self.health)));
        }
        if self.speed < Fixed::ZERO {
            return Err(invalid(format!("speed must not be negative, got {}", self.speed)));
        }
        if self.hitbox.width <= Fixed::ZERO || self.hitbox.height <= Fixed::ZERO {
            return Err(invalid("hitbox must have positive size".to_string()));
        }
        if let Some(armor) = self.armor {
            check_fraction(armor.percent, "armor percent").map_err(invalid)?;
            if armor.flat < Fixed::ZERO {
                return Err(invalid("flat armor must not be negative".to_string()));
            }
        }
        if let Some(lifetime) = self.lifetime {
            if lifetime <= Fixed::ZERO {
                return Err(invalid("lifetime must be positive".to_string()));
            }
        }
        let total = self.abilities.len() + usize::from(self.attack.is_some());
        if total > UnitState::MAX_ABILITIES {
            return Err(invalid(format!(
                "at most {} abilities allowed, got {total}",
                UnitState::MAX_ABILITIES
            )));
        }
        if let Some(attack) = &self.attack {
            if attack.range <= Fixed::ZERO {
                return Err(invalid("attack range must be positive".to_string()));
            }
            if attack.hit_frame >= attack.frame_count {
                return Err(invalid(format!(
                    "attack hit frame {} outside {} frames",
                    attack.hit_frame, attack.frame_count
                )));
            }
            check_timing(attack.frame_count, attack.duration, "attack").map_err(invalid)?;
            for effect in attack.release() {
                check_effect(&effect).map_err(invalid)?;
            }
        }
        for ability in &self.abilities {
            check_timing(ability.frame_count, ability.duration, &ability.name).map_err(invalid)?;
            for (&frame, effects) in &ability.frame_effects {
                if frame >= ability.frame_count {
                    return Err(invalid(format!(
                        "ability '{}' fires on frame {frame} of {}",
                        ability.name, ability.frame_count
                    )));
                }
                for effect in effects {
                    check_effect(effect).map_err(invalid)?;
                }
            }
        }
        for instant in &self.instant_abilities {
            for effect in &instant.effects {
                check_effect(effect).map_err(invalid)?;
            }
        }
        if let Some(on_death) = &self.on_death {
            for effect in &on_death.effects {
                check_effect(effect).map_err(invalid)?;
            }
        }
        Ok(())
    }

    /// Unit types this template can summon.
    #[must_use]
    pub fn summoned_types(&self) -> Vec<String> {
        let mut found = Vec::new();
        for ability in &self.abilities {
            for effect in ability.frame_effects.values().flatten() {
                effect.summoned_types(&mut found);
            }
        }
        if let Some(attack) = &self.attack {
            for effect in &attack.on_hit {
                effect.summoned_types(&mut found);
            }
        }
        for instant in &self.instant_abilities {
            for effect in &instant.effects {
                effect.summoned_types(&mut found);
            }
        }
        if let Some(on_death) = &self.on_death {
            for effect in &on_death.effects {
                effect.summoned_types(&mut found);
            }
        }
        found.into_iter().map(str::to_string).collect()
    }
}

fn check_fraction(value: Fixed, what: &str) -> std::result::Result<(), String> {
    if value < Fixed::ZERO || value > Fixed::ONE {
        return Err(format!("{what} must be within [0, 1], got {value}"));
    }
    Ok(())
}

fn check_timing(frame_count: u32, duration: Fixed, what: &str) -> std::result::Result<(), String> {
    if frame_count == 0 {
        return Err(format!("'{what}' needs at least one frame"));
    }
    if duration <= Fixed::ZERO {
        return Err(format!("'{what}' duration must be positive"));
    }
    Ok(())
}

fn check_effect(effect: &Effect) -> std::result::Result<(), String> {
    match effect {
        Effect::AppliesStatus {
            status, duration, ..
        } => {
            if *duration <= Fixed::ZERO {
                return Err("status duration must be positive".to_string());
            }
            match status {
                StatusSpec::Empowered { percent } => check_fraction(*percent, "empower percent"),
                StatusSpec::Weakened { percent } => check_fraction(*percent, "weaken percent"),
                StatusSpec::MovementSpeed { percent } if *percent < -Fixed::ONE => {
                    Err("movement speed percent below -1".to_string())
                }
                _ => Ok(()),
            }
        }
        Effect::CreatesAura {
            effects, period, ..
        } => {
            if *period <= Fixed::ZERO {
                return Err("aura period must be positive".to_string());
            }
            effects.iter().try_for_each(check_effect)
        }
        Effect::CreatesAoE { effects, .. } | Effect::CreatesProjectile { effects, .. } => {
            effects.iter().try_for_each(check_effect)
        }
        Effect::CreatesLobbed {
            effects, max_range, ..
        } => {
            if *max_range <= Fixed::ZERO {
                return Err("lobbed max range must be positive".to_string());
            }
            effects.iter().try_for_each(check_effect)
        }
        Effect::CreatesVolley {
            effects, speed, ..
        } => {
            if *speed <= Fixed::ZERO {
                return Err("volley speed must be positive".to_string());
            }
            effects.iter().try_for_each(check_effect)
        }
        _ => Ok(()),
    }
}

/// Validated unit templates keyed by unit type.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, UnitTemplate>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in unit type.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for template in crate::builtin::templates() {
            registry.templates.insert(template.id.clone(), template);
        }
        registry
    }

    /// Validate and add a template, replacing any with the same id.
    pub fn register(&mut self, template: UnitTemplate) -> Result<()> {
        template.validate()?;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// Parse a RON list of templates and register each one.
    ///
    /// `label` names the content in error messages.
    pub fn load_ron_str(&mut self, label: &str, ron: &str) -> Result<usize> {
        let templates: Vec<UnitTemplate> =
            ron::from_str(ron).map_err(|e| BattleError::DataParseError {
                path: label.to_string(),
                message: e.to_string(),
            })?;
        let count = templates.len();
        for template in templates {
            self.register(template)?;
        }
        Ok(count)
    }

    /// Look up a template.
    pub fn get(&self, unit_type: &str) -> Result<&UnitTemplate> {
        self.templates
            .get(unit_type)
            .ok_or_else(|| BattleError::UnknownUnitType(unit_type.to_string()))
    }

    /// Whether a unit type is registered.
    #[must_use]
    pub fn contains(&self, unit_type: &str) -> bool {
        self.templates.contains_key(unit_type)
    }

    /// Registered unit types, sorted.
    pub fn unit_types(&self) -> impl Iterator<Item = &str> + '_ {
        self.templates.keys().map(String::as_str)
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Check every template, including that summoned unit types exist.
    pub fn validate(&self) -> Result<()> {
        for template in self.templates.values() {
            template.validate()?;
            for summoned in template.summoned_types() {
                if !self.contains(&summoned) {
                    return Err(BattleError::InvalidTemplate {
                        unit_type: template.id.clone(),
                        reason: format!("summons unknown unit type '{summoned}'"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = TemplateRegistry::builtin();
        registry.validate().unwrap();
        for unit_type in ["swordsman", "archer", "catapult", "necromancer", "grabber"] {
            assert!(registry.contains(unit_type), "missing {unit_type}");
        }
    }

    #[test]
    fn test_unknown_unit_type() {
        let registry = TemplateRegistry::builtin();
        assert!(matches!(
            registry.get("dragon"),
            Err(BattleError::UnknownUnitType(name)) if name == "dragon"
        ));
    }

    #[test]
    fn test_invalid_templates_rejected() {
        let mut registry = TemplateRegistry::new();

        let mut dead_on_arrival = UnitTemplate::melee("ghost", 10, 10, 5, 20, 1.0);
        dead_on_arrival.health = Fixed::ZERO;
        assert!(registry.register(dead_on_arrival).is_err());

        let mut late_hit = UnitTemplate::melee("slow", 10, 10, 5, 20, 1.0);
        if let Some(attack) = late_hit.attack.as_mut() {
            attack.hit_frame = 9;
        }
        assert!(registry.register(late_hit).is_err());

        let mut overarmored = UnitTemplate::melee("tank", 10, 10, 5, 20, 1.0);
        overarmored.armor = Some(Armor::new(Fixed::ZERO, Fixed::from_num(1.5)));
        assert!(registry.register(overarmored).is_err());

        assert!(registry.is_empty());
    }

    #[test]
    fn test_summon_of_unknown_type_rejected() {
        let mut registry = TemplateRegistry::new();
        let mut summoner = UnitTemplate::melee("summoner", 10, 10, 5, 20, 1.0);
        let mut frame_effects = BTreeMap::new();
        frame_effects.insert(
            0,
            vec![Effect::Summons {
                unit_type: "imp".to_string(),
                offset: Vec2Fixed::ZERO,
            }],
        );
        summoner.abilities.push(AbilityDef {
            name: "summon".to_string(),
            strategy: TargetStrategy::new(UnitCondition::IsSelf, vec![]),
            trigger_conditions: vec![AbilityCondition::Cooldown(Fixed::from_num(5))],
            persistent_conditions: vec![],
            frame_count: 2,
            duration: Fixed::ONE,
            frame_effects,
        });
        registry.register(summoner).unwrap();
        assert!(registry.validate().is_err());

        registry
            .register(UnitTemplate::melee("imp", 5, 10, 1, 10, 1.0))
            .unwrap();
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_infection_requires_zombie_template() {
        let mut registry = TemplateRegistry::new();
        let mut biter = UnitTemplate::melee("biter", 40, 40, 5, 20, 1.0);
        if let Some(attack) = biter.attack.as_mut() {
            attack.on_hit.push(Effect::AppliesStatus {
                status: StatusSpec::ZombieInfection,
                duration: Fixed::from_num(5),
                recipient: Recipient::Target,
            });
        }
        registry.register(biter).unwrap();
        assert!(registry.validate().is_err());

        let mut zombie = UnitTemplate::melee(ZOMBIE_UNIT_TYPE, 30, 30, 4, 20, 1.0);
        zombie.infection_immune = true;
        assert!(!zombie.can_be_infected());
        registry.register(zombie).unwrap();
        registry.validate().unwrap();
    }

    #[test]
    fn test_on_death_summons_are_validated() {
        let mut registry = TemplateRegistry::new();
        let mut brood = UnitTemplate::melee("brood", 40, 40, 5, 20, 1.0);
        brood.on_death = Some(OnDeath {
            effects: vec![Effect::Summons {
                unit_type: "hatchling".to_string(),
                offset: Vec2Fixed::ZERO,
            }],
            condition: None,
        });
        registry.register(brood).unwrap();
        assert!(registry.validate().is_err());
        registry
            .register(UnitTemplate::melee("hatchling", 5, 60, 2, 15, 1.0))
            .unwrap();
        registry.validate().unwrap();
    }

    #[test]
    fn test_attack_compiles_after_specials() {
        let registry = TemplateRegistry::builtin();
        let config = BattleConfig::default();
        let necromancer = registry.get("necromancer").unwrap();
        let abilities = necromancer.compile_abilities(&config);
        assert_eq!(abilities.last().map(|a| a.name.as_str()), Some("attack"));
        assert!(abilities.len() >= 2);
    }

    #[test]
    fn test_melee_stand_off_is_two_thirds_of_range() {
        let swordsman = UnitTemplate::melee("s", 100, 50, 20, 30, 1.0);
        assert_eq!(swordsman.stand_off(), Fixed::from_num(20));
        let archer = UnitTemplate::ranged("a", 100, 50, 15, 200, 1.0, 150);
        assert_eq!(archer.stand_off(), Fixed::ZERO);
    }

    #[test]
    fn test_templates_load_from_ron() {
        let ron = r#"[
            (
                id: "militia",
                health: 60.0,
                speed: 40.0,
                hitbox: (width: 16.0, height: 30.0),
                armor: Some((flat: 1.0, percent: 0.1)),
                attack: Some((
                    kind: Melee,
                    range: 20.0,
                    damage: 8.0,
                    cooldown: 1.2,
                    frame_count: 4,
                    duration: 0.5,
                    hit_frame: 2,
                )),
            ),
        ]"#;
        let mut registry = TemplateRegistry::new();
        assert_eq!(registry.load_ron_str("militia.ron", ron).unwrap(), 1);
        let militia = registry.get("militia").unwrap();
        assert_eq!(militia.health, Fixed::from_num(60));
        assert!(militia.abilities.is_empty());
        assert!(militia.instant_abilities.is_empty());
        assert!(militia.can_be_infected());

        let broken = registry.load_ron_str("broken.ron", "[ (id: 3) ]");
        assert!(matches!(broken, Err(BattleError::DataParseError { path, .. }) if path == "broken.ron"));
    }
}
