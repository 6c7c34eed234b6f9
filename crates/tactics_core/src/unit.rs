//! Combatants and the roster arena that owns them.
//!
//! Units are addressed by a stable [`UnitId`]. Defeated units stay in the
//! roster with `alive == false` so ids held elsewhere (active unit, AI
//! targets, pending effects) never dangle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::JobKind;
use crate::math::{fixed_serde, Facing, Fixed, GridPos};

/// Unique identifier for units. Ids are assigned in roster order.
pub type UnitId = u32;

/// The two sides of an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    /// Player side in the default encounter.
    Blue,
    /// Opposing side in the default encounter.
    Red,
}

impl Team {
    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Blue => Self::Red,
            Self::Red => Self::Blue,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Blue => "Blue",
            Self::Red => "Red",
        }
    }
}

/// Live stat block of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stats {
    /// Current level.
    pub level: u32,
    /// Experience towards the next level.
    pub exp: u32,
    /// Job points.
    pub jp: u32,
    /// Current hit points, `0..=max_hp`.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Charge gained per unit of time.
    pub speed: u32,
    /// Movement budget in steps.
    pub move_range: u32,
    /// Largest height difference a single step may cross.
    #[serde(with = "fixed_serde")]
    pub jump_height: Fixed,
    /// Physical power.
    pub attack_power: u32,
    /// Magical power.
    pub magic_power: u32,
}

impl Stats {
    /// Missing hit points.
    #[must_use]
    pub const fn missing_hp(&self) -> u32 {
        self.max_hp - self.hp
    }

    /// Hit point ratio in `[0, 1]`.
    #[must_use]
    pub fn hp_ratio(&self) -> f64 {
        if self.max_hp == 0 {
            return 0.0;
        }
        self.hp as f64 / self.max_hp as f64
    }
}

/// A combatant.
///
/// Abilities are not stored per unit; they are shared through the
/// [`JobTable`](crate::data::JobTable) entry for the unit's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Stable identifier.
    pub id: UnitId,
    /// Display name.
    pub name: String,
    /// Side.
    pub team: Team,
    /// Job, which determines the ability set.
    pub job: JobKind,
    /// Tile the unit stands on.
    pub position: GridPos,
    /// Cardinal facing.
    pub facing: Facing,
    /// Live stats.
    pub stats: Stats,
    /// Charge time, the turn order key. May be negative after costly actions.
    #[serde(with = "fixed_serde")]
    pub ct: Fixed,
    /// Cleared when damage brings `hp` to zero. Heals never set it back.
    pub alive: bool,
    /// Movement already used this turn.
    pub has_moved: bool,
    /// Action already used this turn.
    pub has_acted: bool,
}

impl Unit {
    /// Reset per-turn resource flags at the start of a turn.
    pub fn begin_turn(&mut self) {
        self.has_moved = false;
        self.has_acted = false;
    }

    /// Whether two units fight on the same side.
    #[must_use]
    pub fn is_ally_of(&self, other: &Self) -> bool {
        self.team == other.team
    }

    /// Read-only view for the presentation layer.
    #[must_use]
    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            name: self.name.clone(),
            team: self.team,
            job: self.job,
            position: self.position,
            facing: self.facing,
            stats: self.stats,
            ct: self.ct,
            alive: self.alive,
            has_moved: self.has_moved,
            has_acted: self.has_acted,
        }
    }
}

/// Read-only copy of a unit handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    /// Unit identifier.
    pub id: UnitId,
    /// Display name.
    pub name: String,
    /// Side.
    pub team: Team,
    /// Job.
    pub job: JobKind,
    /// Current tile.
    pub position: GridPos,
    /// Facing.
    pub facing: Facing,
    /// Stats at the time of the snapshot.
    pub stats: Stats,
    /// Charge time.
    pub ct: Fixed,
    /// Alive flag.
    pub alive: bool,
    /// Movement used this turn.
    pub has_moved: bool,
    /// Action used this turn.
    pub has_acted: bool,
}

/// Parameters for adding a unit to a roster.
#[derive(Debug, Clone)]
pub struct UnitSpawnParams {
    /// Display name.
    pub name: String,
    /// Side.
    pub team: Team,
    /// Job.
    pub job: JobKind,
    /// Starting tile.
    pub position: GridPos,
    /// Starting facing.
    pub facing: Facing,
    /// Starting stats.
    pub stats: Stats,
    /// Starting charge time.
    pub ct: Fixed,
}

/// Arena of units keyed by id.
///
/// Iteration is always in id order, which is also roster order, so every
/// tie-break that depends on "roster order" is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    units: BTreeMap<UnitId, Unit>,
    next_id: UnitId,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Add a unit and return its id.
    pub fn insert(&mut self, params: UnitSpawnParams) -> UnitId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.units.insert(
            id,
            Unit {
                id,
                name: params.name,
                team: params.team,
                job: params.job,
                position: params.position,
                facing: params.facing,
                stats: params.stats,
                ct: params.ct,
                alive: params.stats.hp > 0,
                has_moved: false,
                has_acted: false,
            },
        );
        id
    }

    /// Get a unit by id.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Get a mutable unit by id.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Number of units, living or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All units in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// All units in roster order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.values_mut()
    }

    /// Living units in roster order.
    pub fn living(&self) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(|u| u.alive)
    }

    /// Living unit standing on a tile.
    #[must_use]
    pub fn living_at(&self, pos: GridPos) -> Option<&Unit> {
        self.living().find(|u| u.position == pos)
    }

    /// Whether any living unit of the team remains.
    #[must_use]
    pub fn team_alive(&self, team: Team) -> bool {
        self.living().any(|u| u.team == team)
    }

    /// Ids in roster order.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitId> {
        self.units.keys().copied().collect()
    }
}
