//! Job and ability definitions.

use serde::{Deserialize, Serialize};

use crate::data::MAX_CT_COST;
use crate::error::{Result, TacticsError};
use crate::math::{height_serde, Fixed};

/// Job archetype of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobKind {
    /// Armoured melee fighter.
    Knight,
    /// Long-range physical attacker.
    Archer,
    /// Area damage caster.
    Mage,
    /// Healer.
    Priest,
}

impl JobKind {
    /// All jobs in table order.
    pub const ALL: [Self; 4] = [Self::Knight, Self::Archer, Self::Mage, Self::Priest];

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Knight => "Knight",
            Self::Archer => "Archer",
            Self::Mage => "Mage",
            Self::Priest => "Priest",
        }
    }
}

/// What an ability does when it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityKind {
    /// Lowers enemy hit points.
    Damage,
    /// Restores allied hit points.
    Heal,
    /// Relocates the caster.
    Move,
}

/// Damage reduction for shots beyond a comfortable distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFalloff {
    /// Distance that suffers no reduction.
    pub free_range: u32,
    /// Fraction of damage lost per tile beyond `free_range`.
    pub per_tile: f64,
}

/// Immutable ability definition.
///
/// # Example RON
///
/// ```ron
/// Ability(
///     id: "fire",
///     name: "Fire",
///     kind: Damage,
///     range: 3,
///     aoe_radius: 1,
///     ct_cost: 40,
///     power: 16,
///     base_hit_chance: 0.95,
///     requires_line_of_sight: false,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Effect kind.
    pub kind: AbilityKind,
    /// Maximum Manhattan distance from origin to cursor.
    pub range: u32,
    /// Manhattan radius around the cursor that is affected.
    #[serde(default)]
    pub aoe_radius: u32,
    /// Charge cost applied when the ability ends the turn.
    pub ct_cost: u32,
    /// Flat power added to the scaled stat.
    #[serde(default)]
    pub power: u32,
    /// Hit chance before modifiers.
    #[serde(default = "default_hit_chance")]
    pub base_hit_chance: f64,
    /// Whether ranged use is blocked by terrain between caster and target.
    #[serde(default = "default_true")]
    pub requires_line_of_sight: bool,
    /// Optional distance falloff.
    #[serde(default)]
    pub falloff: Option<RangeFalloff>,
}

const fn default_hit_chance() -> f64 {
    0.75
}

const fn default_true() -> bool {
    true
}

impl Ability {
    /// Damage ability with line of sight required and no falloff.
    #[must_use]
    pub fn damage(id: &str, name: &str, range: u32, ct_cost: u32, power: u32, hit: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: AbilityKind::Damage,
            range,
            aoe_radius: 0,
            ct_cost,
            power,
            base_hit_chance: hit,
            requires_line_of_sight: true,
            falloff: None,
        }
    }

    /// Heal ability; heals never check line of sight.
    #[must_use]
    pub fn heal(id: &str, name: &str, range: u32, ct_cost: u32, power: u32, hit: f64) -> Self {
        Self {
            kind: AbilityKind::Heal,
            requires_line_of_sight: false,
            ..Self::damage(id, name, range, ct_cost, power, hit)
        }
    }

    /// Synthetic movement ability for a unit with the given move range.
    #[must_use]
    pub fn movement(move_range: u32, ct_cost: u32) -> Self {
        Self {
            id: "move".to_string(),
            name: "Move".to_string(),
            kind: AbilityKind::Move,
            range: move_range,
            aoe_radius: 0,
            ct_cost,
            power: 0,
            base_hit_chance: 1.0,
            requires_line_of_sight: false,
            falloff: None,
        }
    }

    /// Set the area radius.
    #[must_use]
    pub fn with_aoe(mut self, radius: u32) -> Self {
        self.aoe_radius = radius;
        self
    }

    /// Set whether line of sight is required.
    #[must_use]
    pub fn with_line_of_sight(mut self, required: bool) -> Self {
        self.requires_line_of_sight = required;
        self
    }

    /// Attach a range falloff.
    #[must_use]
    pub fn with_falloff(mut self, free_range: u32, per_tile: f64) -> Self {
        self.falloff = Some(RangeFalloff {
            free_range,
            per_tile,
        });
        self
    }

    /// Whether this ability ends the turn and costs charge time.
    #[must_use]
    pub fn is_action(&self) -> bool {
        self.kind != AbilityKind::Move
    }
}

/// Starting stats shared by every unit of a job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseStats {
    /// Starting and maximum hit points.
    pub hp: u32,
    /// Base speed before the spawn roll.
    pub speed: u32,
    /// Extra speed rolled uniformly in `0..=speed_variance` at spawn.
    #[serde(default)]
    pub speed_variance: u32,
    /// Movement budget.
    pub move_range: u32,
    /// Jump height.
    #[serde(with = "height_serde")]
    pub jump_height: Fixed,
    /// Physical power.
    pub attack_power: u32,
    /// Magical power.
    pub magic_power: u32,
}

/// Data-driven job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    /// Which job this entry defines.
    pub kind: JobKind,
    /// Basic attack, always available as the "Attack" command.
    pub attack: Ability,
    /// Special abilities, listed after "Attack" in the command menu.
    #[serde(default)]
    pub abilities: Vec<Ability>,
    /// Starting stats.
    pub base: BaseStats,
}

/// Lookup table from job to its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTable {
    jobs: Vec<JobData>,
}

impl JobTable {
    /// Build a table from explicit entries. Later duplicates shadow earlier ones.
    #[must_use]
    pub fn new(jobs: Vec<JobData>) -> Self {
        Self { jobs }
    }

    /// Parse a table from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`TacticsError::DataParseError`] on malformed RON or when an
    /// ability costs more than [`MAX_CT_COST`].
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let table: Self = ron::from_str(source).map_err(|e| TacticsError::DataParseError {
            source_name: "job table".to_string(),
            message: e.to_string(),
        })?;
        let costly = table
            .jobs
            .iter()
            .flat_map(|job| std::iter::once(&job.attack).chain(&job.abilities))
            .find(|ability| ability.ct_cost > MAX_CT_COST);
        if let Some(ability) = costly {
            return Err(TacticsError::DataParseError {
                source_name: "job table".to_string(),
                message: format!(
                    "ability {} costs {} CT, above the limit of {MAX_CT_COST}",
                    ability.id, ability.ct_cost
                ),
            });
        }
        Ok(table)
    }

    /// Definition of a job.
    #[must_use]
    pub fn get(&self, kind: JobKind) -> Option<&JobData> {
        self.jobs.iter().rev().find(|j| j.kind == kind)
    }

    /// Basic attack of a job.
    #[must_use]
    pub fn basic_attack(&self, kind: JobKind) -> Option<&Ability> {
        self.get(kind).map(|j| &j.attack)
    }

    /// Special abilities of a job (empty for unknown jobs).
    #[must_use]
    pub fn abilities(&self, kind: JobKind) -> &[Ability] {
        self.get(kind).map_or(&[], |j| j.abilities.as_slice())
    }

    /// Whether an ability is the basic attack of the job.
    #[must_use]
    pub fn is_basic_attack(&self, kind: JobKind, ability: &Ability) -> bool {
        self.basic_attack(kind).is_some_and(|a| a.id == ability.id)
    }
}

impl Default for JobTable {
    /// The standard four jobs.
    fn default() -> Self {
        let base = |move_range: u32, jump: i32, attack_power: u32, magic_power: u32| BaseStats {
            hp: 40,
            speed: 8,
            speed_variance: 2,
            move_range,
            jump_height: Fixed::from_num(jump),
            attack_power,
            magic_power,
        };

        Self::new(vec![
            JobData {
                kind: JobKind::Knight,
                attack: Ability::damage("attack", "Slash", 1, 25, 12, 0.85),
                abilities: vec![Ability::damage("smite", "Smite", 1, 35, 18, 0.8)],
                base: base(4, 2, 8, 3),
            },
            JobData {
                kind: JobKind::Archer,
                attack: Ability::damage("attack", "Arrow", 5, 30, 10, 0.75).with_falloff(3, 0.1),
                abilities: vec![Ability::damage("aim", "Power Shot", 5, 45, 18, 0.7)],
                base: base(4, 1, 7, 3),
            },
            JobData {
                kind: JobKind::Mage,
                attack: Ability::damage("attack", "Bonk", 1, 25, 6, 0.85),
                abilities: vec![Ability::damage("fire", "Fire", 3, 40, 16, 0.95)
                    .with_aoe(1)
                    .with_line_of_sight(false)],
                base: base(3, 1, 4, 8),
            },
            JobData {
                kind: JobKind::Priest,
                attack: Ability::damage("attack", "Staff", 1, 25, 6, 0.85),
                abilities: vec![Ability::heal("cure", "Cure", 3, 35, 14, 1.0)],
                base: base(3, 1, 4, 7),
            },
        ])
    }
}
