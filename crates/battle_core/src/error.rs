//! Error types for the battle simulation.
//!
//! Only construction and content loading can fail. A validated
//! [`BattleWorld`](crate::world::BattleWorld) ticks without errors.

use thiserror::Error;

use crate::entity::EntityId;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for all battle simulation errors.
#[derive(Debug, Error)]
pub enum BattleError {
    /// A roster referenced a unit type with no registered template.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// A unit template failed validation.
    #[error("Invalid template '{unit_type}': {reason}")]
    InvalidTemplate {
        /// Template identifier.
        unit_type: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Entity handle refers to a recycled slot.
    #[error("Stale entity handle: {0}")]
    StaleEntity(EntityId),

    /// Content file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the content that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid battle state.
    #[error("Invalid battle state: {0}")]
    InvalidState(String),

    /// Snapshot encoding or decoding failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}
