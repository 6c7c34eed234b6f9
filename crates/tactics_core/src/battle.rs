//! Battle state machine.
//!
//! [`BattleState`] is the single owned root of an encounter. The host calls
//! [`BattleState::step`] once per frame and feeds player input through the
//! command intake methods; the AI uses the very same methods.
//!
//! # Phases
//!
//! ```text
//! Idle -> UnitStart -> Command -> Targeting -> Anim       -> UnitStart
//!                                           -> AnimAction -> Idle
//! ```
//!
//! The scheduler is only polled in `Idle`. Confirmed actions mutate state
//! immediately and then park in a [`PendingAction`] for a fixed number of
//! presentation ticks; the turn bookkeeping (job points, experience, charge
//! cost) is finalized when the counter runs out.
//!
//! # Determinism
//!
//! All randomness comes from a seeded [`ChaCha8Rng`] owned by the state, and
//! every iteration runs in roster order, so the same inputs on the same tick
//! always produce the same [`state_hash`](BattleState::state_hash).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{self, AiPlan};
use crate::data::{Ability, JobTable, Rules};
use crate::error::{Result, TacticsError};
use crate::grid::BattleMap;
use crate::math::{Facing, GridPos};
use crate::pathfinding::{find_path, MoveProfile};
use crate::resolution::{award_exp, award_jp, resolve_effects, EffectOutcome};
use crate::targeting::affected_units;
use crate::timeline;
use crate::unit::{Roster, Team, Unit, UnitId};

/// Phase of the battle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// No unit holds the turn; the scheduler is polled.
    #[default]
    Idle,
    /// A unit was just granted the turn or finished moving.
    UnitStart,
    /// The command menu is open.
    Command,
    /// A command is selected and waits for a target tile.
    Targeting,
    /// Movement is being presented.
    Anim,
    /// An ability is being presented.
    AnimAction,
}

impl Phase {
    /// Whether commands may be selected.
    #[must_use]
    pub const fn accepts_commands(self) -> bool {
        matches!(self, Self::UnitStart | Self::Command)
    }

    /// Whether a presentation-only phase is running.
    #[must_use]
    pub const fn is_animating(self) -> bool {
        matches!(self, Self::Anim | Self::AnimAction)
    }
}

/// A command the active unit can be given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Walk to a tile. Does not end the turn.
    Move,
    /// The job's basic attack.
    Attack,
    /// A job special ability by index.
    Ability(usize),
    /// End the turn at the wait cost.
    Wait,
    /// End the turn at a chosen cost, never cheaper than waiting.
    EndTurn {
        /// Requested charge cost.
        ct_cost: u32,
    },
}

impl Command {
    /// Whether the command uses the unit's action for the turn.
    #[must_use]
    pub const fn is_action(self) -> bool {
        matches!(self, Self::Attack | Self::Ability(_))
    }
}

/// Ability and tiles of the command currently being aimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingContext {
    /// Command that opened targeting.
    pub command: Command,
    /// Ability being aimed.
    pub ability: Ability,
    /// Tile the ability is cast from.
    pub origin: GridPos,
    /// Tile the ability is aimed at. Follows the shared cursor.
    pub cursor: GridPos,
}

/// State change that has already been applied and awaits finalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommittedEffect {
    /// A unit walked along a path.
    Move {
        /// Mover.
        unit: UnitId,
        /// Tiles walked, start included.
        path: Vec<GridPos>,
    },
    /// A unit resolved an ability.
    Ability {
        /// Caster.
        unit: UnitId,
        /// Charge cost to apply when the turn ends.
        ct_cost: u32,
        /// Experience earned, before the per-action minimum.
        exp: u32,
    },
}

/// A committed effect plus the presentation ticks left before it finalizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingAction {
    /// What was committed.
    pub effect: CommittedEffect,
    /// Ticks until finalization.
    pub remaining_ticks: u32,
}

/// Something the host may want to present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleEvent {
    /// A unit was granted the turn.
    TurnStarted {
        /// Actor.
        unit: UnitId,
    },
    /// A unit walked.
    Moved {
        /// Mover.
        unit: UnitId,
        /// Tiles walked, start included.
        path: Vec<GridPos>,
    },
    /// One target of an ability was resolved.
    EffectResolved {
        /// Caster.
        caster: UnitId,
        /// Ability name.
        ability: String,
        /// Outcome on the target.
        outcome: EffectOutcome,
    },
    /// A unit reached zero hit points.
    UnitDefeated {
        /// Defeated unit.
        unit: UnitId,
    },
    /// A unit gained a level.
    LeveledUp {
        /// Unit.
        unit: UnitId,
        /// New level.
        level: u32,
    },
    /// A turn ended.
    TurnEnded {
        /// Actor.
        unit: UnitId,
        /// Charge cost applied.
        ct_cost: u32,
    },
    /// Transient user-facing message.
    Notice(String),
}

/// Input from the host, human or recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerInput {
    /// Move the cursor.
    SetCursor(GridPos),
    /// Select a command directly.
    SelectCommand(Command),
    /// Select a command by its position in the command list.
    SelectCommandIndex(usize),
    /// Confirm the current phase.
    Confirm,
    /// Back out of the current phase.
    Cancel,
    /// Let the AI take the active unit's turn.
    AutoBattle,
}

/// The mutable root of one encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleState {
    pub(crate) map: BattleMap,
    pub(crate) roster: Roster,
    pub(crate) jobs: JobTable,
    pub(crate) rules: Rules,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) tick: u64,
    pub(crate) phase: Phase,
    pub(crate) active: Option<UnitId>,
    pub(crate) selected_command: usize,
    pub(crate) cursor: GridPos,
    pub(crate) targeting: Option<TargetingContext>,
    pub(crate) pending: Option<PendingAction>,
    pub(crate) ai_plan: Option<AiPlan>,
    #[serde(skip)]
    pub(crate) events: Vec<BattleEvent>,
}

impl BattleState {
    /// Create an encounter.
    ///
    /// # Errors
    ///
    /// Returns [`TacticsError::InvalidState`] if a unit starts on a tile it
    /// cannot stand on, two living units share a tile, a unit's job has no
    /// entry in `jobs`, or the wait cost is above the CT cost limit.
    pub fn new(map: BattleMap, roster: Roster, jobs: JobTable, rules: Rules, seed: u64) -> Result<Self> {
        timeline::charge_after_cost(rules.wait_ct_cost)
            .map_err(|err| TacticsError::InvalidState(err.to_string()))?;
        for unit in roster.iter() {
            if !map.is_passable(unit.position) {
                return Err(TacticsError::InvalidState(format!(
                    "{} starts on unstandable tile {}",
                    unit.name, unit.position
                )));
            }
            if jobs.get(unit.job).is_none() {
                return Err(TacticsError::InvalidState(format!(
                    "no job data for {}",
                    unit.job.display_name()
                )));
            }
            if unit.alive
                && roster
                    .living()
                    .any(|other| other.id != unit.id && other.position == unit.position)
            {
                return Err(TacticsError::InvalidState(format!(
                    "{} shares tile {} with another unit",
                    unit.name, unit.position
                )));
            }
        }

        let cursor = roster.iter().next().map_or_else(GridPos::default, |u| u.position);
        info!(units = roster.len(), seed, "battle created");

        Ok(Self {
            map,
            roster,
            jobs,
            rules,
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
            phase: Phase::Idle,
            active: None,
            selected_command: 0,
            cursor,
            targeting: None,
            pending: None,
            ai_plan: None,
            events: Vec::new(),
        })
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// The battle map.
    #[must_use]
    pub const fn map(&self) -> &BattleMap {
        &self.map
    }

    /// All units.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Job definitions.
    #[must_use]
    pub const fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Rule tunables.
    #[must_use]
    pub const fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Shared cursor tile.
    #[must_use]
    pub const fn cursor(&self) -> GridPos {
        self.cursor
    }

    /// Targeting context, if a command is being aimed.
    #[must_use]
    pub const fn targeting(&self) -> Option<&TargetingContext> {
        self.targeting.as_ref()
    }

    /// Action awaiting finalization.
    #[must_use]
    pub const fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Index of the highlighted command in the command list.
    #[must_use]
    pub const fn selected_command(&self) -> usize {
        self.selected_command
    }

    /// Winning team once the other side has no living units.
    #[must_use]
    pub fn outcome(&self) -> Option<Team> {
        let blue = self.roster.team_alive(Team::Blue);
        let red = self.roster.team_alive(Team::Red);
        match (blue, red) {
            (true, false) => Some(Team::Blue),
            (false, true) => Some(Team::Red),
            _ => None,
        }
    }

    /// Take all events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<BattleEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advance the encounter by one tick.
    ///
    /// Pending presentation counters tick down first and finalize at zero.
    /// Otherwise, in `Idle` the scheduler grants the next turn, and during an
    /// AI-controlled turn the AI plan advances.
    pub fn step(&mut self) {
        self.tick += 1;

        if let Some(pending) = self.pending.as_mut() {
            pending.remaining_ticks = pending.remaining_ticks.saturating_sub(1);
            if pending.remaining_ticks == 0 {
                self.finalize_pending();
            }
            return;
        }

        if self.phase == Phase::Idle {
            if self.outcome().is_some() {
                return;
            }
            if let Some(id) = timeline::advance(&mut self.roster) {
                self.grant_turn(id);
            }
            return;
        }

        if self.ai_plan.is_some() {
            ai::drive(self);
        }
    }

    /// Run until one side wins or `max_steps` ticks pass.
    pub fn run_until_outcome(&mut self, max_steps: u64) -> Option<Team> {
        for _ in 0..max_steps {
            if let Some(winner) = self.outcome() {
                if self.pending.is_none() {
                    return Some(winner);
                }
            }
            self.step();
        }
        self.outcome()
    }

    /// Apply one host input.
    ///
    /// Inputs other than cursor movement are refused while an AI-controlled
    /// unit holds the turn.
    pub fn apply_input(&mut self, input: PlayerInput) -> Result<()> {
        if !matches!(input, PlayerInput::SetCursor(_)) && self.ai_plan.is_some() {
            return self.reject(TacticsError::InvalidCommand(
                "the AI is taking this turn".to_string(),
            ));
        }
        match input {
            PlayerInput::SetCursor(pos) => self.set_cursor(pos),
            PlayerInput::SelectCommand(command) => self.submit_command(command),
            PlayerInput::SelectCommandIndex(index) => self.select_command_index(index),
            PlayerInput::Confirm => self.confirm_targeting(),
            PlayerInput::Cancel => self.cancel_targeting(),
            PlayerInput::AutoBattle => ai::take_turn(self),
        }
    }

    /// Move the shared cursor. The targeting context follows it.
    pub fn set_cursor(&mut self, pos: GridPos) -> Result<()> {
        if !self.map.in_bounds(pos) {
            return Err(TacticsError::OutOfBounds { x: pos.x, y: pos.y });
        }
        self.cursor = pos;
        if let Some(ctx) = self.targeting.as_mut() {
            ctx.cursor = pos;
        }
        Ok(())
    }

    /// Select a command for the active unit.
    ///
    /// Movement and ability commands open targeting; wait and end-turn end
    /// the turn immediately.
    pub fn submit_command(&mut self, command: Command) -> Result<()> {
        if !self.phase.accepts_commands() {
            return self.reject(TacticsError::InvalidCommand(format!(
                "cannot select a command during {:?}",
                self.phase
            )));
        }
        let (unit_id, origin) = match self.active_unit_ref() {
            Ok(unit) => (unit.id, unit.position),
            Err(err) => return self.reject(err),
        };
        if let Err(err) = self.check_command(unit_id, command) {
            return self.reject(err);
        }

        match command {
            Command::Wait => {
                self.end_turn(unit_id, self.rules.wait_ct_cost);
                Ok(())
            }
            Command::EndTurn { ct_cost } => {
                self.end_turn(unit_id, ct_cost.max(self.rules.wait_ct_cost));
                Ok(())
            }
            _ => {
                let ability = match self.ability_for(unit_id, command) {
                    Ok(ability) => ability,
                    Err(err) => return self.reject(err),
                };
                if ability.is_action() {
                    if let Err(err) = timeline::charge_after_cost(ability.ct_cost) {
                        return self.reject(err);
                    }
                }
                if let Some(index) = self.command_index(unit_id, command) {
                    self.selected_command = index;
                }
                debug!(unit = unit_id, ?command, "targeting opened");
                self.targeting = Some(TargetingContext {
                    command,
                    ability,
                    origin,
                    cursor: self.cursor,
                });
                self.phase = Phase::Targeting;
                Ok(())
            }
        }
    }

    /// Select a command by its index in the command list.
    pub fn select_command_index(&mut self, index: usize) -> Result<()> {
        let unit_id = match self.active_unit_ref() {
            Ok(unit) => unit.id,
            Err(err) => return self.reject(err),
        };
        let options = self.available_commands(unit_id)?;
        match options.get(index) {
            Some(option) => self.submit_command(option.command),
            None => self.reject(TacticsError::InvalidCommand(format!(
                "no command at index {index}"
            ))),
        }
    }

    /// Confirm the current phase.
    ///
    /// In `UnitStart` this opens the command menu; in `Command` it re-opens
    /// targeting for the highlighted command; in `Targeting` it commits the
    /// aimed command. Path and target failures keep targeting open.
    pub fn confirm_targeting(&mut self) -> Result<()> {
        match self.phase {
            Phase::UnitStart => {
                if let Err(err) = self.active_unit_ref() {
                    return self.reject(err);
                }
                self.phase = Phase::Command;
                Ok(())
            }
            Phase::Command => self.select_command_index(self.selected_command),
            Phase::Targeting => {
                let Some(ctx) = self.targeting.clone() else {
                    return self.reject(TacticsError::InvalidState(
                        "targeting without a context".to_string(),
                    ));
                };
                let result = if ctx.command == Command::Move {
                    self.confirm_move(&ctx)
                } else {
                    self.confirm_ability(&ctx)
                };
                match result {
                    Ok(()) => Ok(()),
                    Err(err) => self.reject(err),
                }
            }
            phase => self.reject(TacticsError::InvalidCommand(format!(
                "nothing to confirm during {phase:?}"
            ))),
        }
    }

    /// Back out one phase: `Targeting` to `Command`, `Command` to
    /// `UnitStart`. A no-op in `UnitStart`.
    pub fn cancel_targeting(&mut self) -> Result<()> {
        match self.phase {
            Phase::Targeting => {
                self.targeting = None;
                self.phase = Phase::Command;
                Ok(())
            }
            Phase::Command => {
                self.phase = Phase::UnitStart;
                Ok(())
            }
            Phase::UnitStart => Ok(()),
            phase => self.reject(TacticsError::InvalidCommand(format!(
                "nothing to cancel during {phase:?}"
            ))),
        }
    }

    /// Hash of all simulation state, for determinism checks.
    ///
    /// Covers tick, phase, active unit, cursor, targeting, pending action,
    /// AI plan, RNG position and every unit in roster order. The event
    /// queue is presentation output and is not hashed.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.active.hash(&mut hasher);
        self.selected_command.hash(&mut hasher);
        self.cursor.hash(&mut hasher);

        if let Some(ctx) = &self.targeting {
            ctx.command.hash(&mut hasher);
            ctx.ability.id.hash(&mut hasher);
            ctx.origin.hash(&mut hasher);
            ctx.cursor.hash(&mut hasher);
        }
        self.pending.hash(&mut hasher);
        self.ai_plan.hash(&mut hasher);
        self.rng.get_word_pos().hash(&mut hasher);

        self.roster.len().hash(&mut hasher);
        for unit in self.roster.iter() {
            unit.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the state for snapshots.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| TacticsError::InvalidState(format!("Failed to serialize battle: {e}")))
    }

    /// Restore a state serialized with [`serialize`](Self::serialize).
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| TacticsError::InvalidState(format!("Failed to deserialize battle: {e}")))
    }

    pub(crate) fn active_unit_ref(&self) -> Result<&Unit> {
        let id = self
            .active
            .ok_or_else(|| TacticsError::InvalidCommand("no unit holds the turn".to_string()))?;
        self.roster.get(id).ok_or(TacticsError::UnknownUnit(id))
    }

    /// Ability a command aims for a unit.
    pub(crate) fn ability_for(&self, unit_id: UnitId, command: Command) -> Result<Ability> {
        let unit = self.roster.get(unit_id).ok_or(TacticsError::UnknownUnit(unit_id))?;
        let missing = || {
            TacticsError::InvalidCommand(format!(
                "{} has no such ability",
                unit.job.display_name()
            ))
        };
        match command {
            Command::Move => Ok(Ability::movement(
                unit.stats.move_range,
                self.rules.move_ct_cost,
            )),
            Command::Attack => self.jobs.basic_attack(unit.job).cloned().ok_or_else(missing),
            Command::Ability(index) => self
                .jobs
                .abilities(unit.job)
                .get(index)
                .cloned()
                .ok_or_else(missing),
            Command::Wait | Command::EndTurn { .. } => Err(TacticsError::InvalidCommand(
                "command does not aim an ability".to_string(),
            )),
        }
    }

    fn check_command(&self, unit_id: UnitId, command: Command) -> Result<()> {
        let unit = self.roster.get(unit_id).ok_or(TacticsError::UnknownUnit(unit_id))?;
        match command {
            Command::Move if unit.has_moved => Err(TacticsError::InvalidCommand(
                "Move already used this turn".to_string(),
            )),
            Command::Attack | Command::Ability(_) if unit.has_acted => Err(
                TacticsError::InvalidCommand("Action already used this turn".to_string()),
            ),
            Command::Wait => timeline::charge_after_cost(self.rules.wait_ct_cost).map(drop),
            Command::EndTurn { ct_cost } => {
                timeline::charge_after_cost(ct_cost.max(self.rules.wait_ct_cost)).map(drop)
            }
            _ => Ok(()),
        }
    }

    fn command_index(&self, unit_id: UnitId, command: Command) -> Option<usize> {
        self.available_commands(unit_id)
            .ok()?
            .iter()
            .position(|o| o.command == command)
    }

    fn confirm_move(&mut self, ctx: &TargetingContext) -> Result<()> {
        let unit = self.active_unit_ref()?;
        let (unit_id, from) = (unit.id, unit.position);
        let path = find_path(&self.map, &self.roster, MoveProfile::of(unit), from, ctx.cursor)
            .filter(|path| path.len() > 1)
            .ok_or(TacticsError::NoLegalPath { from, to: ctx.cursor })?;

        let steps = (path.len() - 1) as u32;
        let destination = path[path.len() - 1];
        let last_step = path[path.len() - 2];
        let unit = self
            .roster
            .get_mut(unit_id)
            .ok_or(TacticsError::UnknownUnit(unit_id))?;
        unit.position = destination;
        unit.has_moved = true;
        if let Some(facing) = Facing::towards(last_step, destination) {
            unit.facing = facing;
        }

        debug!(unit = unit_id, from = %from, to = %destination, steps, "unit moved");
        self.events.push(BattleEvent::Moved {
            unit: unit_id,
            path: path.clone(),
        });
        self.targeting = None;
        self.phase = Phase::Anim;
        self.pending = Some(PendingAction {
            effect: CommittedEffect::Move {
                unit: unit_id,
                path,
            },
            remaining_ticks: steps * self.rules.move_ticks_per_tile,
        });
        if self.rules.move_ticks_per_tile == 0 {
            self.finalize_pending();
        }
        Ok(())
    }

    fn confirm_ability(&mut self, ctx: &TargetingContext) -> Result<()> {
        let caster = self.active_unit_ref()?.clone();
        let previews = affected_units(
            &self.map,
            &self.roster,
            &caster,
            &ctx.ability,
            ctx.origin,
            ctx.cursor,
        );
        if previews.is_empty() {
            return Err(TacticsError::NoValidTargets { cursor: ctx.cursor });
        }

        let resolution = resolve_effects(&mut self.roster, &self.rules, &previews, &mut self.rng);
        for outcome in &resolution.outcomes {
            self.events.push(BattleEvent::EffectResolved {
                caster: caster.id,
                ability: ctx.ability.name.clone(),
                outcome: *outcome,
            });
            if outcome.defeated {
                self.events.push(BattleEvent::UnitDefeated {
                    unit: outcome.target_id,
                });
                if let Some(target) = self.roster.get(outcome.target_id) {
                    self.events.push(BattleEvent::Notice(format!("{} is KO!", target.name)));
                }
            }
        }

        if let Some(unit) = self.roster.get_mut(caster.id) {
            if let Some(facing) = Facing::towards(unit.position, ctx.cursor) {
                unit.facing = facing;
            }
            unit.has_acted = true;
        }

        debug!(
            unit = caster.id,
            ability = %ctx.ability.name,
            targets = previews.len(),
            hits = resolution.outcomes.iter().filter(|o| o.hit).count(),
            "ability resolved"
        );
        self.targeting = None;
        self.phase = Phase::AnimAction;
        self.pending = Some(PendingAction {
            effect: CommittedEffect::Ability {
                unit: caster.id,
                ct_cost: ctx.ability.ct_cost,
                exp: resolution.exp,
            },
            remaining_ticks: self.rules.action_ticks,
        });
        if self.rules.action_ticks == 0 {
            self.finalize_pending();
        }
        Ok(())
    }

    fn finalize_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.effect {
            CommittedEffect::Move { unit, .. } => {
                if let Some(mover) = self.roster.get_mut(unit) {
                    award_jp(mover, self.rules.move_jp);
                }
                self.phase = Phase::UnitStart;
            }
            CommittedEffect::Ability { unit, ct_cost, exp } => {
                if let Some(caster) = self.roster.get_mut(unit) {
                    let levels = award_exp(caster, &self.rules, exp.max(self.rules.min_exp));
                    award_jp(caster, self.rules.action_jp);
                    if levels > 0 {
                        let (level, name) = (caster.stats.level, caster.name.clone());
                        self.events.push(BattleEvent::LeveledUp { unit, level });
                        self.events.push(BattleEvent::Notice(format!("{name} leveled up!")));
                    }
                }
                self.end_turn(unit, ct_cost);
            }
        }
    }

    fn grant_turn(&mut self, id: UnitId) {
        let Some(unit) = self.roster.get_mut(id) else {
            return;
        };
        unit.begin_turn();
        let (name, team, position) = (unit.name.clone(), unit.team, unit.position);

        self.active = Some(id);
        self.phase = Phase::UnitStart;
        self.selected_command = 0;
        self.cursor = position;
        self.targeting = None;

        info!(unit = id, name = %name, tick = self.tick, "turn started");
        self.events.push(BattleEvent::TurnStarted { unit: id });
        self.events.push(BattleEvent::Notice(format!("{name}'s turn")));

        if self.rules.is_ai_team(team) {
            self.ai_plan = Some(AiPlan::new(id, self.rules.ai_think_ticks));
        }
    }

    pub(crate) fn end_turn(&mut self, unit: UnitId, ct_cost: u32) {
        if let Err(err) = timeline::apply_cost(&mut self.roster, unit, ct_cost) {
            warn!(%err, "turn cost not applied");
        }
        info!(unit, ct_cost, "turn ended");
        self.events.push(BattleEvent::TurnEnded { unit, ct_cost });
        self.active = None;
        self.phase = Phase::Idle;
        self.targeting = None;
        self.pending = None;
        self.ai_plan = None;
    }

    fn reject<T>(&mut self, err: TacticsError) -> Result<T> {
        warn!(%err, phase = ?self.phase, "command rejected");
        let notice = match &err {
            TacticsError::NoLegalPath { .. } => "Invalid move".to_string(),
            TacticsError::NoValidTargets { .. } => "No valid targets".to_string(),
            TacticsError::InvalidCommand(message) => message.clone(),
            other => other.to_string(),
        };
        self.events.push(BattleEvent::Notice(notice));
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::JobKind;
    use crate::math::Fixed;
    use crate::unit::{Stats, UnitSpawnParams};
    use rand::Rng;

    fn spawn(roster: &mut Roster, team: Team, job: JobKind, pos: (i32, i32), ct: i32) -> UnitId {
        roster.insert(UnitSpawnParams {
            name: format!("{team:?} {job:?}"),
            team,
            job,
            position: GridPos::new(pos.0, pos.1),
            facing: if team == Team::Blue { Facing::North } else { Facing::South },
            stats: Stats {
                level: 1,
                exp: 0,
                jp: 0,
                hp: 40,
                max_hp: 40,
                speed: 8,
                move_range: 4,
                jump_height: Fixed::from_num(2),
                attack_power: 8,
                magic_power: 7,
            },
            ct: Fixed::from_num(ct),
        })
    }

    fn no_ai_rules() -> Rules {
        Rules {
            ai_teams: Vec::new(),
            ..Rules::instant()
        }
    }

    /// Knight (Blue) next to an archer (Red); the knight acts first.
    fn duel(seed: u64) -> (BattleState, UnitId, UnitId) {
        let mut roster = Roster::new();
        let knight = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 4), 50);
        let archer = spawn(&mut roster, Team::Red, JobKind::Archer, (3, 3), 0);
        let state = BattleState::new(BattleMap::new(8, 8), roster, JobTable::default(), no_ai_rules(), seed).unwrap();
        (state, knight, archer)
    }

    fn seed_with_first_roll(accept: impl Fn(f64) -> bool) -> u64 {
        (0..10_000)
            .find(|&s| accept(ChaCha8Rng::seed_from_u64(s).gen::<f64>()))
            .unwrap()
    }

    #[test]
    fn test_first_step_grants_turn() {
        let (mut state, knight, _) = duel(1);
        assert_eq!(state.phase, Phase::Idle);
        state.step();
        assert_eq!(state.phase, Phase::UnitStart);
        assert_eq!(state.active, Some(knight));
        assert_eq!(state.cursor, GridPos::new(3, 4));
        let events = state.drain_events();
        assert!(events.contains(&BattleEvent::TurnStarted { unit: knight }));
        assert!(events.contains(&BattleEvent::Notice("Blue Knight's turn".to_string())));
    }

    #[test]
    fn test_move_then_act_in_one_turn() {
        let (mut state, knight, archer) = duel(seed_with_first_roll(|r| r <= 0.8));
        state.step();

        state.submit_command(Command::Move).unwrap();
        assert_eq!(state.phase, Phase::Targeting);
        state.set_cursor(GridPos::new(4, 3)).unwrap();
        state.confirm_targeting().unwrap();

        // Instant rules finalize straight away
        assert_eq!(state.phase, Phase::UnitStart);
        let unit = state.roster.get(knight).unwrap();
        assert_eq!(unit.position, GridPos::new(4, 3));
        assert_eq!(unit.facing, Facing::North);
        assert!(unit.has_moved);
        assert_eq!(unit.stats.jp, 5);

        // Move is spent, attacking still allowed
        assert!(state.submit_command(Command::Move).is_err());
        state.submit_command(Command::Attack).unwrap();
        state.set_cursor(GridPos::new(3, 3)).unwrap();
        state.confirm_targeting().unwrap();

        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.active, None);
        let unit = state.roster.get(knight).unwrap();
        assert_eq!(unit.ct, Fixed::from_num(-25));
        assert_eq!(unit.facing, Facing::West);
        assert_eq!(unit.stats.jp, 13);
        // Attacked from the side: round(21 * 1.1) = 23
        assert_eq!(state.roster.get(archer).unwrap().stats.hp, 17);
    }

    #[test]
    fn test_wait_ends_turn_with_fixed_cost() {
        let (mut state, knight, _) = duel(3);
        state.step();
        state.submit_command(Command::Wait).unwrap();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.roster.get(knight).unwrap().ct, Fixed::from_num(-10));
    }

    #[test]
    fn test_end_turn_never_cheaper_than_wait() {
        let (mut state, knight, _) = duel(3);
        state.step();
        state.submit_command(Command::EndTurn { ct_cost: 2 }).unwrap();
        assert_eq!(state.roster.get(knight).unwrap().ct, Fixed::from_num(-10));
    }

    #[test]
    fn test_oversized_wait_cost_is_refused_at_setup() {
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 4), 0);
        let rules = Rules {
            wait_ct_cost: u32::MAX,
            ..no_ai_rules()
        };
        let err = BattleState::new(BattleMap::new(8, 8), roster, JobTable::default(), rules, 0).unwrap_err();
        assert!(matches!(err, TacticsError::InvalidState(_)));
    }

    #[test]
    fn test_cancel_walks_back_without_mutation() {
        let (mut state, _, _) = duel(3);
        state.step();
        let roster_before = state.roster.clone();

        state.submit_command(Command::Attack).unwrap();
        state.cancel_targeting().unwrap();
        assert_eq!(state.phase, Phase::Command);
        assert!(state.targeting.is_none());
        state.cancel_targeting().unwrap();
        assert_eq!(state.phase, Phase::UnitStart);
        state.cancel_targeting().unwrap();
        assert_eq!(state.phase, Phase::UnitStart);
        assert_eq!(state.roster, roster_before);
    }

    #[test]
    fn test_confirm_opens_menu_then_highlighted_command() {
        let (mut state, _, _) = duel(3);
        state.step();
        state.confirm_targeting().unwrap();
        assert_eq!(state.phase, Phase::Command);
        state.confirm_targeting().unwrap();
        assert_eq!(state.phase, Phase::Targeting);
        assert_eq!(state.targeting.as_ref().unwrap().command, Command::Move);
    }

    #[test]
    fn test_no_valid_targets_keeps_targeting() {
        let (mut state, _, _) = duel(3);
        state.step();
        state.submit_command(Command::Attack).unwrap();
        state.set_cursor(GridPos::new(4, 4)).unwrap();
        let hash = state.state_hash();

        let err = state.confirm_targeting().unwrap_err();
        assert_eq!(err, TacticsError::NoValidTargets { cursor: GridPos::new(4, 4) });
        assert!(err.keeps_targeting());
        assert_eq!(state.phase, Phase::Targeting);
        assert_eq!(state.state_hash(), hash);
        assert!(state
            .drain_events()
            .contains(&BattleEvent::Notice("No valid targets".to_string())));
    }

    #[test]
    fn test_illegal_move_keeps_targeting() {
        let (mut state, _, _) = duel(3);
        state.step();
        state.submit_command(Command::Move).unwrap();
        state.set_cursor(GridPos::new(3, 3)).unwrap();
        let hash = state.state_hash();

        let err = state.confirm_targeting().unwrap_err();
        assert!(matches!(err, TacticsError::NoLegalPath { .. }));
        assert_eq!(state.phase, Phase::Targeting);
        assert_eq!(state.state_hash(), hash);
    }

    #[test]
    fn test_commands_rejected_while_idle() {
        let (mut state, _, _) = duel(3);
        let hash = state.state_hash();
        assert!(matches!(
            state.submit_command(Command::Attack),
            Err(TacticsError::InvalidCommand(_))
        ));
        assert!(state.confirm_targeting().is_err());
        assert!(state.cancel_targeting().is_err());
        assert_eq!(state.state_hash(), hash);
    }

    #[test]
    fn test_cursor_rejects_out_of_bounds() {
        let (mut state, _, _) = duel(3);
        assert_eq!(
            state.set_cursor(GridPos::new(8, 0)),
            Err(TacticsError::OutOfBounds { x: 8, y: 0 })
        );
    }

    #[test]
    fn test_animation_blocks_commands_until_finalized() {
        let (mut state, knight, _) = duel(3);
        state.rules.move_ticks_per_tile = 2;
        state.step();
        state.submit_command(Command::Move).unwrap();
        state.set_cursor(GridPos::new(3, 6)).unwrap();
        state.confirm_targeting().unwrap();

        assert_eq!(state.phase, Phase::Anim);
        // Position is committed even while the walk is presented
        assert_eq!(state.roster.get(knight).unwrap().position, GridPos::new(3, 6));
        assert_eq!(state.pending.as_ref().unwrap().remaining_ticks, 4);
        assert!(state.submit_command(Command::Attack).is_err());

        for _ in 0..4 {
            state.step();
        }
        assert_eq!(state.phase, Phase::UnitStart);
        assert!(state.pending.is_none());
        assert_eq!(state.roster.get(knight).unwrap().stats.jp, 5);
    }

    #[test]
    fn test_serialize_round_trip_preserves_hash() {
        let (mut state, _, _) = duel(9);
        state.step();
        state.submit_command(Command::Attack).unwrap();
        let bytes = state.serialize().unwrap();
        let restored = BattleState::deserialize(&bytes).unwrap();
        assert_eq!(restored.state_hash(), state.state_hash());
    }

    #[test]
    fn test_new_rejects_unit_on_blocked_tile() {
        let mut map = BattleMap::new(4, 4);
        map.set_tile(GridPos::new(1, 1), crate::grid::Tile::blocked(Fixed::ZERO));
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, JobKind::Knight, (1, 1), 0);
        assert!(matches!(
            BattleState::new(map, roster, JobTable::default(), Rules::default(), 0),
            Err(TacticsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_outcome_and_scheduler_stop() {
        let (mut state, _, archer) = duel(3);
        state.roster.get_mut(archer).unwrap().alive = false;
        state.roster.get_mut(archer).unwrap().stats.hp = 0;
        assert_eq!(state.outcome(), Some(Team::Blue));
        state.step();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.active, None);
    }
}
