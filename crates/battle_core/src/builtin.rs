//! Built-in unit roster.
//!
//! Every unit type the shipped game fields. Scenario files may add or
//! override templates on top of these.

use std::collections::BTreeMap;

use crate::ability::{AbilityCondition, AbilityDef, InstantAbilityDef};
use crate::components::{Armor, Hitbox};
use crate::conditions::UnitCondition;
use crate::effects::{Effect, Recipient};
use crate::math::{Fixed, Vec2Fixed};
use crate::status::StatusSpec;
use crate::targeting::{Ranking, TargetStrategy};
use crate::templates::{AttackKind, AttackProfile, OnDeath, UnitTemplate, ZOMBIE_UNIT_TYPE};

fn fx(value: f64) -> Fixed {
    Fixed::from_num(value)
}

fn attack(kind: AttackKind, range: f64, damage: f64, cooldown: f64) -> AttackProfile {
    AttackProfile {
        kind,
        range: fx(range),
        damage: fx(damage),
        cooldown: fx(cooldown),
        frame_count: 4,
        duration: fx(0.4),
        hit_frame: 2,
        on_hit: vec![],
    }
}

fn unit(id: &str, health: f64, speed: f64, attack: AttackProfile) -> UnitTemplate {
    UnitTemplate {
        id: id.to_string(),
        health: fx(health),
        speed: fx(speed),
        hitbox: Hitbox::new(16, 32),
        armor: None,
        attack: Some(attack),
        abilities: vec![],
        targeting: None,
        lifetime: None,
        instant_abilities: vec![],
        on_death: None,
        infection_immune: false,
    }
}

fn single_frame(frame_count: u32, frame: u32, effects: Vec<Effect>) -> BTreeMap<u32, Vec<Effect>> {
    let mut frames = BTreeMap::new();
    debug_assert!(frame < frame_count);
    frames.insert(frame, effects);
    frames
}

fn on_self() -> TargetStrategy {
    TargetStrategy::new(UnitCondition::IsSelf, vec![])
}

/// The shipped templates.
pub(crate) fn templates() -> Vec<UnitTemplate> {
    vec![
        swordsman(),
        archer(),
        barbarian(),
        catapult(),
        crossbow_volley(),
        banner_bearer(),
        pyromancer(),
        cleric(),
        terror_knight(),
        necromancer(),
        skeleton(),
        grabber(),
        guardian_angel(),
        zombie(),
        zombie_brute(),
    ]
}

fn infect() -> Effect {
    Effect::AppliesStatus {
        status: StatusSpec::ZombieInfection,
        duration: fx(5.0),
        recipient: Recipient::Target,
    }
}

fn swordsman() -> UnitTemplate {
    let mut template = unit("swordsman", 100.0, 50.0, attack(AttackKind::Melee, 25.0, 20.0, 1.0));
    template.armor = Some(Armor::new(fx(2.0), fx(0.1)));
    template
}

fn archer() -> UnitTemplate {
    unit(
        "archer",
        60.0,
        45.0,
        attack(AttackKind::Projectile { speed: fx(150.0) }, 200.0, 15.0, 1.5),
    )
}

fn barbarian() -> UnitTemplate {
    let mut template = unit(
        "barbarian",
        140.0,
        45.0,
        attack(AttackKind::Cleave { radius: fx(35.0) }, 30.0, 16.0, 1.4),
    );
    template.hitbox = Hitbox::new(20, 34);
    template
}

fn catapult() -> UnitTemplate {
    let mut template = unit(
        "catapult",
        120.0,
        20.0,
        attack(AttackKind::Lobbed { aoe_radius: fx(40.0) }, 400.0, 30.0, 4.0),
    );
    template.hitbox = Hitbox::new(40, 30);
    if let Some(attack) = template.attack.as_mut() {
        attack.frame_count = 6;
        attack.duration = fx(1.0);
        attack.hit_frame = 4;
    }
    template
}

fn crossbow_volley() -> UnitTemplate {
    unit(
        "crossbow_volley",
        70.0,
        40.0,
        attack(
            AttackKind::Volley {
                speed: fx(220.0),
                count: 3,
                spread: fx(20.0),
                aoe_radius: fx(12.0),
            },
            260.0,
            9.0,
            3.0,
        ),
    )
}

fn banner_bearer() -> UnitTemplate {
    let mut template = unit("banner_bearer", 90.0, 45.0, attack(AttackKind::Melee, 22.0, 8.0, 1.2));
    let rally = Effect::CreatesAura {
        effects: vec![Effect::AppliesStatus {
            status: StatusSpec::Empowered { percent: fx(0.25) },
            duration: fx(1.5),
            recipient: Recipient::Target,
        }],
        radius: fx(120.0),
        period: fx(1.0),
        duration: Some(fx(10.0)),
        unit_condition: UnitCondition::all([UnitCondition::Alive, UnitCondition::Ally]),
        unique_key: Some("rally".to_string()),
    };
    template.abilities.push(AbilityDef {
        name: "rally".to_string(),
        strategy: on_self(),
        trigger_conditions: vec![AbilityCondition::Cooldown(fx(10.0))],
        persistent_conditions: vec![],
        frame_count: 2,
        duration: fx(0.5),
        frame_effects: single_frame(2, 1, vec![rally, Effect::PlaySound("horn".to_string())]),
    });
    template
}

fn pyromancer() -> UnitTemplate {
    let mut firebolt = attack(AttackKind::Projectile { speed: fx(180.0) }, 180.0, 8.0, 2.0);
    firebolt.on_hit.push(Effect::AppliesStatus {
        status: StatusSpec::DamageOverTime { dps: fx(6.0) },
        duration: fx(3.0),
        recipient: Recipient::Target,
    });
    unit("pyromancer", 55.0, 42.0, firebolt)
}

fn cleric() -> UnitTemplate {
    let mut template = unit("cleric", 65.0, 42.0, attack(AttackKind::Melee, 20.0, 5.0, 1.5));
    let wounded_ally = UnitCondition::all([
        UnitCondition::Alive,
        UnitCondition::Ally,
        UnitCondition::HealthBelowPercent(fx(0.9)),
        UnitCondition::within(fx(150.0)),
    ]);
    template.abilities.push(AbilityDef {
        name: "mend".to_string(),
        strategy: TargetStrategy::new(
            wounded_ally.clone(),
            vec![
                Ranking::ByMissingHealth { ascending: false },
                Ranking::nearest(),
            ],
        ),
        trigger_conditions: vec![
            AbilityCondition::Cooldown(fx(3.0)),
            AbilityCondition::HasTarget(wounded_ally),
        ],
        persistent_conditions: vec![AbilityCondition::HasTarget(UnitCondition::Alive)],
        frame_count: 3,
        duration: fx(0.6),
        frame_effects: single_frame(
            3,
            2,
            vec![
                Effect::Heals {
                    amount: fx(12.0),
                    recipient: Recipient::Target,
                },
                Effect::AppliesStatus {
                    status: StatusSpec::Healing { dps: fx(3.0) },
                    duration: fx(3.0),
                    recipient: Recipient::Target,
                },
            ],
        ),
    });
    template
}

fn terror_knight() -> UnitTemplate {
    let mut strike = attack(AttackKind::Melee, 25.0, 14.0, 1.6);
    strike.on_hit.push(Effect::AppliesStatus {
        status: StatusSpec::Fleeing,
        duration: fx(2.0),
        recipient: Recipient::Target,
    });
    let mut template = unit("terror_knight", 130.0, 55.0, strike);
    template.armor = Some(Armor::new(fx(3.0), fx(0.2)));
    template.hitbox = Hitbox::new(24, 36);
    template
}

fn necromancer() -> UnitTemplate {
    let mut template = unit(
        "necromancer",
        70.0,
        38.0,
        attack(AttackKind::Projectile { speed: fx(140.0) }, 170.0, 6.0, 2.0),
    );
    template.abilities.push(AbilityDef {
        name: "raise_dead".to_string(),
        strategy: on_self(),
        trigger_conditions: vec![AbilityCondition::Cooldown(fx(6.0))],
        persistent_conditions: vec![],
        frame_count: 4,
        duration: fx(1.0),
        frame_effects: single_frame(
            4,
            3,
            vec![Effect::Summons {
                unit_type: "skeleton".to_string(),
                offset: Vec2Fixed::from_ints(24, 0),
            }],
        ),
    });
    template
}

fn skeleton() -> UnitTemplate {
    let mut template = unit("skeleton", 30.0, 55.0, attack(AttackKind::Melee, 20.0, 6.0, 1.0));
    template.lifetime = Some(fx(15.0));
    template
}

fn grabber() -> UnitTemplate {
    let mut template = unit("grabber", 110.0, 45.0, attack(AttackKind::Melee, 25.0, 12.0, 1.2));
    let in_reach = UnitCondition::all([
        UnitCondition::Alive,
        UnitCondition::Enemy,
        UnitCondition::MinimumDistance {
            distance: fx(60.0),
            y_bias: None,
        },
        UnitCondition::within(fx(200.0)),
    ]);
    template.abilities.push(AbilityDef {
        name: "hook".to_string(),
        strategy: TargetStrategy::new(in_reach.clone(), vec![Ranking::nearest()]),
        trigger_conditions: vec![
            AbilityCondition::Cooldown(fx(8.0)),
            AbilityCondition::HasTarget(in_reach),
        ],
        persistent_conditions: vec![AbilityCondition::HasTarget(UnitCondition::Alive)],
        frame_count: 3,
        duration: fx(0.6),
        frame_effects: single_frame(
            3,
            1,
            vec![Effect::Grabs {
                speed: fx(200.0),
                duration: fx(1.5),
            }],
        ),
    });
    template
}

fn guardian_angel() -> UnitTemplate {
    let mut template = unit("guardian_angel", 80.0, 60.0, attack(AttackKind::Melee, 22.0, 10.0, 1.2));
    let wounded_ally = UnitCondition::all([
        UnitCondition::Alive,
        UnitCondition::Ally,
        UnitCondition::not(UnitCondition::IsSelf),
        UnitCondition::HealthBelowPercent(fx(1.0)),
        UnitCondition::within(fx(120.0)),
    ]);
    template.instant_abilities.push(InstantAbilityDef {
        name: "blessing".to_string(),
        strategy: TargetStrategy::new(
            wounded_ally.clone(),
            vec![Ranking::ByMissingHealth { ascending: false }, Ranking::nearest()],
        ),
        trigger_conditions: vec![
            AbilityCondition::Cooldown(fx(2.0)),
            AbilityCondition::HasTarget(wounded_ally),
        ],
        effects: vec![
            Effect::AppliesStatus {
                status: StatusSpec::Healing { dps: fx(5.0) },
                duration: fx(2.0),
                recipient: Recipient::Target,
            },
            Effect::PlaySound("heal".to_string()),
        ],
    });
    template
}

fn zombie() -> UnitTemplate {
    let mut bite = attack(AttackKind::Melee, 20.0, 7.0, 1.0);
    bite.on_hit.push(infect());
    let mut template = unit(ZOMBIE_UNIT_TYPE, 50.0, 35.0, bite);
    template.infection_immune = true;
    template
}

fn zombie_brute() -> UnitTemplate {
    let mut slam = attack(AttackKind::Melee, 26.0, 18.0, 1.6);
    slam.on_hit.push(infect());
    let mut template = unit("zombie_brute", 160.0, 30.0, slam);
    template.hitbox = Hitbox::new(24, 48);
    template.infection_immune = true;
    template.on_death = Some(OnDeath {
        effects: [10, -10]
            .into_iter()
            .map(|dy| Effect::Summons {
                unit_type: ZOMBIE_UNIT_TYPE.to_string(),
                offset: Vec2Fixed::from_ints(0, dy),
            })
            .collect(),
        condition: None,
    });
    template
}
