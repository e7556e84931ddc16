//! Scenario loading and configuration.
//!
//! A scenario names two rosters, a time limit and optionally a config
//! override and an extra template file. Scenarios are RON files; a few are
//! also built in so the CLI works without any files on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use battle_core::config::BattleConfig;
use battle_core::error::BattleError;
use battle_core::math::{fixed_decimal, Fixed};
use battle_core::templates::TemplateRegistry;
use battle_core::world::{BattleWorld, Placement};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::jitter::SpawnRng;

/// Vertical gap between copies of a placement with `count > 1`.
pub const STACK_SPACING: i32 = 40;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The battle could not be set up.
    #[error("Invalid battle: {0}")]
    Battle(#[from] BattleError),
}

/// Placement of one or more units at battle start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type identifier.
    pub unit_type: String,
    /// Horizontal position.
    pub x: i32,
    /// Vertical position of the first copy.
    pub y: i32,
    /// Number of units, stacked downward.
    #[serde(default = "one")]
    pub count: u32,
}

fn one() -> u32 {
    1
}

impl UnitPlacement {
    /// Create a new unit placement.
    #[must_use]
    pub fn new(unit_type: impl Into<String>, x: i32, y: i32, count: u32) -> Self {
        Self {
            unit_type: unit_type.into(),
            x,
            y,
            count,
        }
    }

    fn expand(&self, out: &mut Vec<Placement>) {
        for i in 0..self.count {
            let y = self.y + STACK_SPACING * i as i32;
            out.push((self.unit_type.clone(), (self.x, y)));
        }
    }
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Battle time limit in seconds.
    #[serde(with = "fixed_decimal")]
    pub max_duration: Fixed,
    /// Left side.
    pub team1: Vec<UnitPlacement>,
    /// Right side.
    pub team2: Vec<UnitPlacement>,
    /// Battle tuning; defaults when absent.
    #[serde(default)]
    pub config: Option<BattleConfig>,
    /// Extra RON template file, relative to the scenario file.
    #[serde(default)]
    pub templates: Option<PathBuf>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// A relative `templates` path is resolved against the scenario's
    /// directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        if let (Some(templates), Some(dir)) = (scenario.templates.as_mut(), path.parent()) {
            if templates.is_relative() {
                *templates = dir.join(&*templates);
            }
        }
        debug!(path = %path.display(), name = %scenario.name, "scenario loaded");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// A built-in scenario by name, or a scenario file by path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match name_or_path {
            "skirmish" => Ok(Self::skirmish()),
            "duel" => Ok(Self::duel()),
            "kiting" => Ok(Self::kiting()),
            path => Self::load(path),
        }
    }

    /// Names accepted by [`Scenario::resolve`] without a file.
    pub const BUILTIN: [&'static str; 3] = ["skirmish", "duel", "kiting"];

    /// Mixed armies of every role.
    #[must_use]
    pub fn skirmish() -> Self {
        Self {
            name: "skirmish".to_string(),
            description: "Mixed 8v8 with melee, ranged, support and summoners".to_string(),
            max_duration: Fixed::from_num(120),
            team1: vec![
                UnitPlacement::new("swordsman", 360, 420, 3),
                UnitPlacement::new("archer", 220, 440, 2),
                UnitPlacement::new("cleric", 260, 560, 1),
                UnitPlacement::new("banner_bearer", 300, 500, 1),
                UnitPlacement::new("catapult", 120, 500, 1),
            ],
            team2: vec![
                UnitPlacement::new("barbarian", 1560, 420, 2),
                UnitPlacement::new("terror_knight", 1580, 520, 1),
                UnitPlacement::new("grabber", 1540, 600, 1),
                UnitPlacement::new("crossbow_volley", 1700, 440, 2),
                UnitPlacement::new("pyromancer", 1720, 540, 1),
                UnitPlacement::new("necromancer", 1760, 500, 1),
            ],
            config: None,
            templates: None,
        }
    }

    /// One swordsman against another.
    #[must_use]
    pub fn duel() -> Self {
        Self {
            name: "duel".to_string(),
            description: "Mirror match of two swordsmen".to_string(),
            max_duration: Fixed::from_num(60),
            team1: vec![UnitPlacement::new("swordsman", 800, 540, 1)],
            team2: vec![UnitPlacement::new("swordsman", 1120, 540, 1)],
            config: None,
            templates: None,
        }
    }

    /// Archers against a charging melee line.
    #[must_use]
    pub fn kiting() -> Self {
        Self {
            name: "kiting".to_string(),
            description: "Three archers hold off a line of swordsmen".to_string(),
            max_duration: Fixed::from_num(90),
            team1: vec![UnitPlacement::new("swordsman", 300, 460, 4)],
            team2: vec![UnitPlacement::new("archer", 1600, 480, 3)],
            config: None,
            templates: None,
        }
    }

    /// Built-in templates plus the scenario's extra template file.
    pub fn registry(&self) -> Result<Arc<TemplateRegistry>, ScenarioError> {
        let mut registry = TemplateRegistry::builtin();
        if let Some(path) = &self.templates {
            if !path.exists() {
                return Err(ScenarioError::FileNotFound(path.display().to_string()));
            }
            let contents = std::fs::read_to_string(path)?;
            let loaded = registry.load_ron_str(&path.display().to_string(), &contents)?;
            debug!(path = %path.display(), loaded, "extra templates loaded");
        }
        registry.validate()?;
        Ok(Arc::new(registry))
    }

    /// Both rosters, optionally nudged by up to `jitter` units per axis with
    /// a seeded generator.
    #[must_use]
    pub fn rosters(&self, seed: Option<u64>, jitter: i32) -> (Vec<Placement>, Vec<Placement>) {
        let mut team1 = Vec::new();
        let mut team2 = Vec::new();
        for placement in &self.team1 {
            placement.expand(&mut team1);
        }
        for placement in &self.team2 {
            placement.expand(&mut team2);
        }
        if let (Some(seed), true) = (seed, jitter > 0) {
            let mut rng = SpawnRng::new(seed);
            rng.jitter(&mut team1, jitter);
            rng.jitter(&mut team2, jitter);
        }
        (team1, team2)
    }

    /// Total unit count per side.
    #[must_use]
    pub fn team_sizes(&self) -> (u32, u32) {
        let count = |side: &[UnitPlacement]| side.iter().map(|p| p.count).sum();
        (count(&self.team1), count(&self.team2))
    }

    /// Set up the battle.
    pub fn build(
        &self,
        templates: &Arc<TemplateRegistry>,
        seed: Option<u64>,
        jitter: i32,
    ) -> Result<BattleWorld, ScenarioError> {
        let (team1, team2) = self.rosters(seed, jitter);
        let world = BattleWorld::new(
            &team1,
            &team2,
            Arc::clone(templates),
            self.config.clone().unwrap_or_default(),
            self.max_duration,
        )?;
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenarios_build() {
        for name in Scenario::BUILTIN {
            let scenario = Scenario::resolve(name).unwrap();
            let registry = scenario.registry().unwrap();
            let world = scenario.build(&registry, None, 0).unwrap();
            let (left, right) = scenario.team_sizes();
            assert_eq!(world.units().len(), (left + right) as usize, "{name}");
        }
    }

    #[test]
    fn test_count_stacks_vertically() {
        let scenario = Scenario::duel();
        let mut stacked = scenario.clone();
        stacked.team1[0].count = 3;
        let (team1, _) = stacked.rosters(None, 0);
        let ys: Vec<i32> = team1.iter().map(|(_, (_, y))| *y).collect();
        assert_eq!(ys, vec![540, 580, 620]);
    }

    #[test]
    fn test_jitter_is_seeded() {
        let scenario = Scenario::skirmish();
        let plain = scenario.rosters(None, 30);
        let a = scenario.rosters(Some(7), 30);
        let b = scenario.rosters(Some(7), 30);
        let c = scenario.rosters(Some(8), 30);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, plain);
        for ((_, (x0, y0)), (_, (x1, y1))) in plain.0.iter().zip(&a.0) {
            assert!((x0 - x1).abs() <= 30 && (y0 - y1).abs() <= 30);
        }
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                max_duration: 30.5,
                team1: [(unit_type: "swordsman", x: 100, y: 200)],
                team2: [(unit_type: "archer", x: 900, y: 200, count: 2)],
                config: Some((switch_bias: 12.0)),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.max_duration, Fixed::from_num(30.5));
        assert_eq!(scenario.team1[0].count, 1);
        assert_eq!(scenario.team_sizes(), (1, 2));
        let config = scenario.config.unwrap();
        assert_eq!(config.switch_bias, Fixed::from_num(12));
        assert_eq!(config.fleeing_speed, BattleConfig::default().fleeing_speed);
    }

    #[test]
    fn test_unknown_unit_type_is_reported() {
        let mut scenario = Scenario::duel();
        scenario.team2[0].unit_type = "dragon".to_string();
        let registry = scenario.registry().unwrap();
        let error = scenario.build(&registry, None, 0).unwrap_err();
        assert!(matches!(error, ScenarioError::Battle(BattleError::UnknownUnitType(ref t)) if t == "dragon"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::resolve("/definitely/not/here.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_load_resolves_templates_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("extra.ron"),
            r#"[(
                id: "militia",
                health: 60.0,
                speed: 40.0,
                hitbox: (width: 16.0, height: 30.0),
                attack: Some((
                    kind: Melee,
                    range: 20.0,
                    damage: 8.0,
                    cooldown: 1.2,
                    frame_count: 4,
                    duration: 0.5,
                    hit_frame: 2,
                )),
            )]"#,
        )
        .unwrap();
        let path = dir.path().join("militia.ron");
        std::fs::write(
            &path,
            r#"Scenario(
                name: "militia",
                max_duration: 20.0,
                team1: [(unit_type: "militia", x: 500, y: 500, count: 3)],
                team2: [(unit_type: "swordsman", x: 700, y: 520)],
                templates: Some("extra.ron"),
            )"#,
        )
        .unwrap();

        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.templates.as_deref(), Some(dir.path().join("extra.ron").as_path()));
        let registry = scenario.registry().unwrap();
        assert!(registry.contains("militia"));
        assert!(registry.contains("swordsman"));
        assert_eq!(scenario.build(&registry, Some(1), 10).unwrap().units().len(), 4);
    }
}
