//! Read-only queries for the presentation layer and the shared command
//! interface for human players and the AI.
//!
//! Queries never mutate the battle and are cheap enough to call every frame
//! for hover feedback. All mutation goes through [`PlayerFacade`], which
//! human input handling and the AI use identically. There is no private
//! mutation path for either.

use crate::battle::{BattleState, Command, Phase, TargetingContext};
use crate::data::Ability;
use crate::error::{Result, TacticsError};
use crate::math::{Fixed, GridPos};
use crate::pathfinding::{reachable_tiles, MoveProfile};
use crate::targeting::{affected_units, tiles_in_range, EffectPreview};
use crate::timeline::{predict, HypotheticalCost, TimelineEntry};
use crate::unit::{Team, UnitId, UnitSnapshot};

/// Height and passability of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileInfo {
    /// Elevation.
    pub height: Fixed,
    /// Whether units can stand here.
    pub passable: bool,
}

/// One entry of a unit's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOption {
    /// Command issued when the entry is chosen.
    pub command: Command,
    /// Menu label.
    pub label: String,
    /// Short description.
    pub detail: String,
    /// Whether the entry can be chosen now.
    pub enabled: bool,
}

impl BattleState {
    /// Height and passability at `(x, y)`.
    pub fn tile_info(&self, x: i32, y: i32) -> Result<TileInfo> {
        let tile = self.map.try_tile(GridPos::new(x, y))?;
        Ok(TileInfo {
            height: tile.height,
            passable: tile.passable,
        })
    }

    /// Living unit standing at `(x, y)`.
    #[must_use]
    pub fn unit_at(&self, x: i32, y: i32) -> Option<UnitSnapshot> {
        self.roster.living_at(GridPos::new(x, y)).map(|u| u.snapshot())
    }

    /// Snapshot of any unit, living or not.
    pub fn unit(&self, id: UnitId) -> Result<UnitSnapshot> {
        self.roster
            .get(id)
            .map(|u| u.snapshot())
            .ok_or(TacticsError::UnknownUnit(id))
    }

    /// Unit holding the turn.
    #[must_use]
    pub const fn active_unit(&self) -> Option<UnitId> {
        self.active
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Ordered command menu of a unit: Move, Attack, the job's abilities,
    /// then Wait.
    pub fn available_commands(&self, unit_id: UnitId) -> Result<Vec<CommandOption>> {
        let unit = self
            .roster
            .get(unit_id)
            .ok_or(TacticsError::UnknownUnit(unit_id))?;

        let mut options = vec![CommandOption {
            command: Command::Move,
            label: "Move".to_string(),
            detail: format!("Up to {}", unit.stats.move_range),
            enabled: !unit.has_moved,
        }];
        if let Some(attack) = self.jobs.basic_attack(unit.job) {
            options.push(CommandOption {
                command: Command::Attack,
                label: "Attack".to_string(),
                detail: format!("Rng {}, CT +{}", attack.range, attack.ct_cost),
                enabled: !unit.has_acted,
            });
        }
        for (index, ability) in self.jobs.abilities(unit.job).iter().enumerate() {
            options.push(CommandOption {
                command: Command::Ability(index),
                label: ability.name.clone(),
                detail: format!(
                    "Rng {} AOE {} CT +{}",
                    ability.range, ability.aoe_radius, ability.ct_cost
                ),
                enabled: !unit.has_acted,
            });
        }
        options.push(CommandOption {
            command: Command::Wait,
            label: "Wait".to_string(),
            detail: "End turn".to_string(),
            enabled: true,
        });
        Ok(options)
    }

    /// Tiles an ability could be aimed at from `origin`.
    #[must_use]
    pub fn preview_ability_tiles(&self, origin: GridPos, ability: &Ability) -> Vec<GridPos> {
        tiles_in_range(&self.map, origin, ability)
    }

    /// Tiles the active unit could walk to, its own tile first.
    ///
    /// Empty when no unit holds the turn or it already moved.
    #[must_use]
    pub fn preview_move_tiles(&self) -> Vec<GridPos> {
        match self.active_unit_ref() {
            Ok(unit) if !unit.has_moved => {
                reachable_tiles(&self.map, &self.roster, MoveProfile::of(unit), unit.position)
            }
            _ => Vec::new(),
        }
    }

    /// Predicted outcome of a targeting context for the active unit.
    ///
    /// Empty when no unit holds the turn.
    #[must_use]
    pub fn preview_effect_at(&self, ctx: &TargetingContext) -> Vec<EffectPreview> {
        match self.active_unit_ref() {
            Ok(caster) => affected_units(
                &self.map,
                &self.roster,
                caster,
                &ctx.ability,
                ctx.origin,
                ctx.cursor,
            ),
            Err(_) => Vec::new(),
        }
    }

    /// Forecast of the next `count` turns.
    ///
    /// While an action is being aimed, the forecast assumes the active unit
    /// pays that action's cost.
    #[must_use]
    pub fn predict_timeline(&self, count: usize) -> Vec<TimelineEntry> {
        let hypothetical = match (self.phase, self.active, &self.targeting) {
            (Phase::Targeting, Some(unit_id), Some(ctx)) if ctx.ability.is_action() => {
                Some(HypotheticalCost {
                    unit_id,
                    cost: ctx.ability.ct_cost,
                    note: ctx.ability.name.clone(),
                })
            }
            _ => None,
        };
        predict(&self.roster, count, hypothetical)
    }
}

/// Command interface shared by human players and the AI.
pub trait PlayerFacade {
    /// Side this facade controls.
    fn team(&self) -> Team;

    /// Move the shared cursor.
    fn set_cursor(&mut self, pos: GridPos) -> Result<()>;

    /// Select a command for the active unit.
    fn submit_command(&mut self, command: Command) -> Result<()>;

    /// Confirm the current phase.
    fn confirm(&mut self) -> Result<()>;

    /// Back out of the current phase.
    fn cancel(&mut self) -> Result<()>;

    /// Select a command, aim it at `cursor` and confirm.
    fn use_command_at(&mut self, command: Command, cursor: GridPos) -> Result<()> {
        self.submit_command(command)?;
        self.set_cursor(cursor)?;
        self.confirm()
    }

    /// Living units of this side.
    fn own_units(&self) -> Vec<UnitId>;
}

/// [`PlayerFacade`] for one team over a borrowed battle.
///
/// Commands are refused unless a unit of the team holds the turn.
pub struct TeamFacade<'a> {
    state: &'a mut BattleState,
    team: Team,
}

impl<'a> TeamFacade<'a> {
    /// Create a facade for `team`.
    pub fn new(state: &'a mut BattleState, team: Team) -> Self {
        Self { state, team }
    }

    /// The underlying battle.
    #[must_use]
    pub fn state(&self) -> &BattleState {
        self.state
    }

    fn ensure_turn(&self) -> Result<()> {
        let holder = self.state.active.and_then(|id| self.state.roster.get(id));
        match holder {
            Some(unit) if unit.team == self.team => Ok(()),
            _ => Err(TacticsError::InvalidCommand(format!(
                "{} does not hold the turn",
                self.team.display_name()
            ))),
        }
    }
}

impl PlayerFacade for TeamFacade<'_> {
    fn team(&self) -> Team {
        self.team
    }

    fn set_cursor(&mut self, pos: GridPos) -> Result<()> {
        self.state.set_cursor(pos)
    }

    fn submit_command(&mut self, command: Command) -> Result<()> {
        self.ensure_turn()?;
        self.state.submit_command(command)
    }

    fn confirm(&mut self) -> Result<()> {
        self.ensure_turn()?;
        self.state.confirm_targeting()
    }

    fn cancel(&mut self) -> Result<()> {
        self.ensure_turn()?;
        self.state.cancel_targeting()
    }

    fn own_units(&self) -> Vec<UnitId> {
        self.state
            .roster
            .living()
            .filter(|u| u.team == self.team)
            .map(|u| u.id)
            .collect()
    }
}
