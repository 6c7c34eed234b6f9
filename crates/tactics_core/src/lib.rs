//! # Tactics Core
//!
//! Deterministic rules engine for turn-based grid tactics.
//!
//! This crate contains **only** rules logic:
//! - No rendering
//! - No IO
//! - No system randomness (every roll comes from a seeded stream)
//! - Fixed-point charge time and heights
//!
//! This separation enables:
//! - Headless AI-vs-AI simulation for tuning
//! - Replays and snapshots
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`timeline`] - Charge-time turn scheduler and forecast
//! - [`battle`] - Battle state machine and command intake
//! - [`targeting`] / [`resolution`] - Ability previews and effect rolls
//! - [`pathfinding`] - Breadth-first movement search
//! - [`ai`] - Computer-controlled turns
//! - [`facade`] - Read-only queries and the shared command interface
//! - [`data`] - Jobs, abilities and rule tunables

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod battle;
pub mod data;
pub mod error;
pub mod facade;
pub mod grid;
pub mod math;
pub mod pathfinding;
pub mod replay;
pub mod resolution;
pub mod scenario;
pub mod targeting;
pub mod timeline;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{decide, AiAction, AiDecision, Archetype};
    pub use crate::battle::{BattleEvent, BattleState, Command, Phase, PlayerInput, TargetingContext};
    pub use crate::data::{Ability, AbilityKind, JobKind, JobTable, Rules};
    pub use crate::error::{Result, TacticsError};
    pub use crate::facade::{CommandOption, PlayerFacade, TeamFacade, TileInfo};
    pub use crate::grid::{BattleMap, Tile};
    pub use crate::math::{Facing, Fixed, GridPos};
    pub use crate::replay::{Replay, ReplayPlayer, ReplayRecorder};
    pub use crate::scenario::town_fort_encounter;
    pub use crate::targeting::EffectPreview;
    pub use crate::timeline::TimelineEntry;
    pub use crate::unit::{Roster, Team, UnitId, UnitSnapshot};
}
