//! Encounter-wide tunables.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TacticsError};
use crate::unit::Team;

/// Charge value at which a unit is granted a turn.
pub const CT_THRESHOLD: i32 = 100;

/// Largest charge cost an action may carry.
pub const MAX_CT_COST: u32 = 10_000;

/// Lowest final hit chance of an entry that has line of sight.
pub const MIN_HIT_CHANCE: f64 = 0.05;

/// Highest final hit chance.
pub const MAX_HIT_CHANCE: f64 = 0.98;

/// Stat increases applied on each level-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpGains {
    /// Added to max hp. The unit is also fully healed.
    pub max_hp: u32,
    /// Added to attack power.
    pub attack_power: u32,
    /// Added to magic power.
    pub magic_power: u32,
    /// Added to speed when the new level is even.
    pub speed_on_even_level: u32,
}

impl Default for LevelUpGains {
    fn default() -> Self {
        Self {
            max_hp: 6,
            attack_power: 1,
            magic_power: 1,
            speed_on_even_level: 1,
        }
    }
}

/// Rule tunables for an encounter.
///
/// # Example RON
///
/// ```ron
/// Rules(
///     wait_ct_cost: 10,
///     move_jp: 5,
///     action_jp: 8,
///     ai_teams: [Red],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Charge cost of the wait command.
    pub wait_ct_cost: u32,
    /// Charge cost of the synthetic move ability. Moving never applies it.
    pub move_ct_cost: u32,
    /// Job points for a completed move.
    pub move_jp: u32,
    /// Job points for a resolved action.
    pub action_jp: u32,
    /// Minimum exp awarded per resolved action.
    pub min_exp: u32,
    /// Exp cap per healed target.
    pub heal_exp_cap: u32,
    /// Exp cap per damaged target.
    pub damage_exp_cap: u32,
    /// Exp bonus per defeated target.
    pub kill_bonus: u32,
    /// Exp needed for one level.
    pub level_threshold: u32,
    /// Gains per level.
    pub level_up: LevelUpGains,
    /// Presentation ticks per tile walked.
    pub move_ticks_per_tile: u32,
    /// Presentation ticks for an ability animation.
    pub action_ticks: u32,
    /// Ticks an AI unit waits between moving and acting.
    pub ai_think_ticks: u32,
    /// Teams whose turns are taken by the AI.
    pub ai_teams: Vec<Team>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            wait_ct_cost: 10,
            move_ct_cost: 10,
            move_jp: 5,
            action_jp: 8,
            min_exp: 10,
            heal_exp_cap: 15,
            damage_exp_cap: 30,
            kill_bonus: 20,
            level_threshold: 100,
            level_up: LevelUpGains::default(),
            move_ticks_per_tile: 4,
            action_ticks: 12,
            ai_think_ticks: 8,
            ai_teams: vec![Team::Red],
        }
    }
}

impl Rules {
    /// Parse rules from RON text. Missing fields take their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| TacticsError::DataParseError {
            source_name: "rules".to_string(),
            message: e.to_string(),
        })
    }

    /// Rules with no presentation delays, for headless runs.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            move_ticks_per_tile: 0,
            action_ticks: 0,
            ai_think_ticks: 0,
            ..Self::default()
        }
    }

    /// Whether the AI controls a team.
    #[must_use]
    pub fn is_ai_team(&self, team: Team) -> bool {
        self.ai_teams.contains(&team)
    }
}
