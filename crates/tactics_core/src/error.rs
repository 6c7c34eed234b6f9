//! Error types for the tactics rules engine.
//!
//! Every error here is recoverable: a rejected command leaves the
//! [`BattleState`](crate::battle::BattleState) untouched so the host can show
//! the message as a transient notice and carry on.

use thiserror::Error;

use crate::math::GridPos;
use crate::unit::UnitId;

/// Result type alias using [`TacticsError`].
pub type Result<T> = std::result::Result<T, TacticsError>;

/// Top-level error type for the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TacticsError {
    /// Command issued in the wrong phase, or the command is disabled.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Movement target cannot be reached this turn.
    #[error("Invalid move: no legal path from {from} to {to}")]
    NoLegalPath {
        /// Tile the unit stands on.
        from: GridPos,
        /// Requested destination.
        to: GridPos,
    },

    /// Confirmed ability would not affect anyone.
    #[error("No valid targets at {cursor}")]
    NoValidTargets {
        /// Cursor tile the ability was aimed at.
        cursor: GridPos,
    },

    /// Unit identifier does not exist in the roster.
    #[error("Unknown unit ID: {0}")]
    UnknownUnit(UnitId),

    /// Coordinates outside the map.
    #[error("Position ({x}, {y}) is outside the map")]
    OutOfBounds {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
    },

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the data source that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Invalid battle state (snapshot or replay mismatch).
    #[error("Invalid battle state: {0}")]
    InvalidState(String),
}

impl TacticsError {
    /// Whether the targeting context survives this error.
    ///
    /// Path and target failures let the player pick another tile.
    #[must_use]
    pub const fn keeps_targeting(&self) -> bool {
        matches!(self, Self::NoLegalPath { .. } | Self::NoValidTargets { .. })
    }
}
