//! # Battle Core
//!
//! Deterministic battle simulation for a side-on tactics game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No randomness
//! - No floating-point math in simulation state (uses fixed-point)
//!
//! Two rosters are placed on a battlefield and [`BattleWorld::advance`] is
//! called once per tick until it returns an [`Outcome`]. The same rosters and
//! the same tick sequence always produce bit-identical battles, which is what
//! lets the headless runner evaluate thousands of battles for balance work.
//!
//! ## Crate Structure
//!
//! - [`world`] - The battle world and the fixed per-tick processor order
//! - [`templates`] - Unit templates and the template registry
//! - [`targeting`] / [`conditions`] - Ranked target selection
//! - [`ability`] / [`effects`] - Ability triggering and effect application
//! - [`status`] - Status effects and their resolution rules
//! - [`carriers`] - Projectiles, areas, auras, lobbed and volley shots
//! - [`events`] - Events that drive the unit lifecycle
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ability;
pub mod armor;
mod builtin;
pub mod carriers;
mod collision;
mod combat;
pub mod components;
pub mod conditions;
pub mod config;
pub mod effects;
pub mod entity;
pub mod error;
pub mod events;
mod lifecycle;
pub mod math;
mod movement;
mod spatial;
mod state_machine;
pub mod status;
pub mod store;
pub mod targeting;
pub mod templates;
pub mod view;
pub mod world;

pub use world::{BattleWorld, Outcome, Placement};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ability::{AbilityCondition, AbilityDef, InstantAbilityDef};
    pub use crate::components::{Facing, Team, UnitState};
    pub use crate::conditions::UnitCondition;
    pub use crate::config::{tick_dt, BattleConfig, TICK_RATE};
    pub use crate::effects::{Effect, Recipient};
    pub use crate::entity::EntityId;
    pub use crate::error::{BattleError, Result};
    pub use crate::events::{BattleEvent, TickEvents};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::status::{StatusKind, StatusSpec};
    pub use crate::targeting::{Ranking, TargetStrategy};
    pub use crate::templates::{AttackKind, AttackProfile, OnDeath, TemplateRegistry, UnitTemplate};
    pub use crate::view::{BattleSnapshot, CarrierView, UnitView};
    pub use crate::world::{BattleWorld, Outcome, Placement};
}
