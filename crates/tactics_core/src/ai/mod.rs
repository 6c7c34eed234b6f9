//! Computer-controlled turns.
//!
//! Each job maps to one [`Archetype`], and each archetype is a pure decision
//! function over the battle. Decisions are carried out through
//! [`TeamFacade`], the same command surface human input uses, paced by an
//! [`AiPlan`] that waits a few ticks before each stage so the host can
//! present it.

pub mod candidates;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::battle::{BattleState, Command, Phase};
use crate::data::{AbilityKind, JobKind};
use crate::error::{Result, TacticsError};
use crate::facade::{PlayerFacade, TeamFacade};
use crate::math::GridPos;
use crate::pathfinding::{find_path, MoveProfile};
use crate::unit::{Unit, UnitId};

use candidates::{
    best_candidate, candidate_tiles, most_injured_ally, nearest_enemy, reposition, Candidate,
    Preference, Weighting,
};

/// Minimum value for an area spell to be worth casting.
const CASTER_THRESHOLD: f64 = 5.0;
/// Distance ranged units try to keep from their target.
const PREFERRED_RANGE: u32 = 4;
/// Charge cost when a melee unit ends its turn without striking.
const MELEE_IDLE_COST: u32 = 15;
/// Charge cost when other archetypes reposition without acting.
const REPOSITION_IDLE_COST: u32 = 12;
/// Charge cost when a support unit has nobody to tend.
const SUPPORT_IDLE_COST: u32 = 10;
/// Path length penalty per step when choosing a flanking tile.
const FLANK_STEP_PENALTY: f64 = 0.1;

/// Closed set of AI behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Archetype {
    /// Closes in and flanks.
    Melee,
    /// Shoots from the best tile in reach, otherwise holds a distance band.
    Ranged,
    /// Area spells that avoid allies.
    Caster,
    /// Heals the most valuable ally.
    Support,
}

impl Archetype {
    /// Behaviour of a job.
    #[must_use]
    pub const fn for_job(job: JobKind) -> Self {
        match job {
            JobKind::Knight => Self::Melee,
            JobKind::Archer => Self::Ranged,
            JobKind::Mage => Self::Caster,
            JobKind::Priest => Self::Support,
        }
    }
}

/// Final act of an AI turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiAction {
    /// Aim a command at a tile and confirm it.
    Use {
        /// Command to select.
        command: Command,
        /// Tile to aim at.
        cursor: GridPos,
    },
    /// End the turn.
    EndTurn {
        /// Charge cost.
        ct_cost: u32,
    },
}

/// What a unit intends to do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AiDecision {
    /// Tile to walk to first, if any.
    pub move_to: Option<GridPos>,
    /// What to do afterwards.
    pub action: AiAction,
}

impl AiDecision {
    fn end_turn(ct_cost: u32) -> Self {
        Self {
            move_to: None,
            action: AiAction::EndTurn { ct_cost },
        }
    }

    fn at(unit: &Unit, dest: GridPos, action: AiAction) -> Self {
        Self {
            move_to: (dest != unit.position).then_some(dest),
            action,
        }
    }

    fn strike(unit: &Unit, candidate: Candidate) -> Self {
        Self::at(
            unit,
            candidate.from,
            AiAction::Use {
                command: candidate.command,
                cursor: candidate.cursor,
            },
        )
    }
}

/// Stage of an AI turn in progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiStage {
    /// Nothing issued yet.
    Decide,
    /// Moved already; the follow-up action remains.
    Act(AiAction),
}

/// AI turn in progress, owned by the battle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AiPlan {
    /// Unit being driven.
    pub unit: UnitId,
    /// Ticks to wait before the next stage.
    pub wait_ticks: u32,
    /// Next stage.
    pub stage: AiStage,
}

impl AiPlan {
    /// Fresh plan that decides after `wait_ticks`.
    #[must_use]
    pub const fn new(unit: UnitId, wait_ticks: u32) -> Self {
        Self {
            unit,
            wait_ticks,
            stage: AiStage::Decide,
        }
    }
}

/// Decide a unit's turn without touching the battle.
pub fn decide(state: &BattleState, unit_id: UnitId) -> Result<AiDecision> {
    let unit = state
        .roster()
        .get(unit_id)
        .ok_or(TacticsError::UnknownUnit(unit_id))?;
    if !unit.alive {
        return Err(TacticsError::InvalidState(format!("{} cannot act", unit.name)));
    }

    let archetype = Archetype::for_job(unit.job);
    let decision = match archetype {
        Archetype::Melee => melee(state, unit),
        Archetype::Ranged => ranged(state, unit),
        Archetype::Caster => caster(state, unit),
        Archetype::Support => support(state, unit),
    };
    debug!(unit = unit_id, ?archetype, ?decision, "AI decided");
    Ok(decision)
}

fn special_commands(state: &BattleState, unit: &Unit, kind: AbilityKind) -> Vec<Command> {
    state
        .jobs()
        .abilities(unit.job)
        .iter()
        .enumerate()
        .filter(|(_, a)| a.kind == kind)
        .map(|(i, _)| Command::Ability(i))
        .collect()
}

/// Best damaging action from `dest`, otherwise end the turn there.
fn follow_up(state: &BattleState, unit: &Unit, dest: GridPos, commands: &[Command], idle_cost: u32) -> AiDecision {
    match best_candidate(state, unit, &[dest], commands, Weighting::EnemyDamage, 0.0) {
        Some(candidate) => AiDecision::strike(unit, candidate),
        None => AiDecision::at(unit, dest, AiAction::EndTurn { ct_cost: idle_cost }),
    }
}

/// Special first; the basic attack only when no special lands.
fn melee_strike(state: &BattleState, unit: &Unit, from: GridPos) -> Option<Candidate> {
    let specials = special_commands(state, unit, AbilityKind::Damage);
    best_candidate(state, unit, &[from], &specials, Weighting::EnemyDamage, 0.0).or_else(|| {
        best_candidate(state, unit, &[from], &[Command::Attack], Weighting::EnemyDamage, 0.0)
    })
}

/// Reachable tile around `target`, behind it preferred over the sides and
/// the sides over the front.
fn flank_tile(state: &BattleState, unit: &Unit, target: &Unit) -> Option<GridPos> {
    if unit.has_moved {
        return None;
    }
    let (fx, fy) = target.facing.delta();
    let spots = [
        ((-fx, -fy), 3.0),
        ((fy, -fx), 2.0),
        ((-fy, fx), 2.0),
        ((fx, fy), 1.0),
    ];

    let mut best: Option<(GridPos, f64)> = None;
    for ((dx, dy), weight) in spots {
        let tile = target.position.offset(dx, dy);
        let Some(path) = find_path(
            state.map(),
            state.roster(),
            MoveProfile::of(unit),
            unit.position,
            tile,
        ) else {
            continue;
        };
        let score = weight - (path.len() - 1) as f64 * FLANK_STEP_PENALTY;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((tile, score));
        }
    }
    best.map(|(tile, _)| tile)
}

fn melee(state: &BattleState, unit: &Unit) -> AiDecision {
    if let Some(candidate) = melee_strike(state, unit, unit.position) {
        return AiDecision::strike(unit, candidate);
    }
    let Some(target) = nearest_enemy(state.roster(), unit) else {
        return AiDecision::end_turn(MELEE_IDLE_COST);
    };
    let dest = flank_tile(state, unit, target)
        .or_else(|| {
            reposition(
                state,
                &candidate_tiles(state, unit),
                target.position,
                Preference::Approach,
            )
        })
        .unwrap_or(unit.position);

    match melee_strike(state, unit, dest) {
        Some(candidate) => AiDecision::strike(unit, candidate),
        None => AiDecision::at(unit, dest, AiAction::EndTurn { ct_cost: MELEE_IDLE_COST }),
    }
}

fn ranged(state: &BattleState, unit: &Unit) -> AiDecision {
    let tiles = candidate_tiles(state, unit);
    let mut commands = special_commands(state, unit, AbilityKind::Damage);
    commands.push(Command::Attack);
    if let Some(candidate) = best_candidate(state, unit, &tiles, &commands, Weighting::EnemyDamage, 0.0) {
        return AiDecision::strike(unit, candidate);
    }

    let Some(target) = nearest_enemy(state.roster(), unit) else {
        return AiDecision::end_turn(REPOSITION_IDLE_COST);
    };
    let dest = reposition(
        state,
        &tiles,
        target.position,
        Preference::HoldDistance(PREFERRED_RANGE),
    )
    .unwrap_or(unit.position);
    follow_up(state, unit, dest, &[Command::Attack], REPOSITION_IDLE_COST)
}

fn caster(state: &BattleState, unit: &Unit) -> AiDecision {
    let here = [unit.position];
    let spells = special_commands(state, unit, AbilityKind::Damage);
    if let Some(candidate) = best_candidate(
        state,
        unit,
        &here,
        &spells,
        Weighting::AvoidFriendlyFire,
        CASTER_THRESHOLD,
    ) {
        return AiDecision::strike(unit, candidate);
    }
    if let Some(candidate) = best_candidate(state, unit, &here, &[Command::Attack], Weighting::EnemyDamage, 0.0) {
        return AiDecision::strike(unit, candidate);
    }

    let Some(target) = nearest_enemy(state.roster(), unit) else {
        return AiDecision::end_turn(REPOSITION_IDLE_COST);
    };
    let dest = reposition(
        state,
        &candidate_tiles(state, unit),
        target.position,
        Preference::Approach,
    )
    .unwrap_or(unit.position);
    follow_up(state, unit, dest, &[Command::Attack], REPOSITION_IDLE_COST)
}

fn support(state: &BattleState, unit: &Unit) -> AiDecision {
    let heals = special_commands(state, unit, AbilityKind::Heal);
    if let Some(candidate) = best_candidate(state, unit, &[unit.position], &heals, Weighting::AllyBenefit, 0.0) {
        return AiDecision::strike(unit, candidate);
    }

    let Some(patient) = most_injured_ally(state.roster(), unit) else {
        return AiDecision::end_turn(SUPPORT_IDLE_COST);
    };
    let dest = reposition(
        state,
        &candidate_tiles(state, unit),
        patient.position,
        Preference::Approach,
    )
    .unwrap_or(unit.position);
    follow_up(state, unit, dest, &[Command::Attack], REPOSITION_IDLE_COST)
}

/// Advance the AI plan of the active unit by one tick.
pub(crate) fn drive(state: &mut BattleState) {
    let Some(plan) = state.ai_plan.as_mut() else {
        return;
    };
    if plan.wait_ticks > 0 {
        plan.wait_ticks -= 1;
        return;
    }
    let plan = plan.clone();
    if state.active != Some(plan.unit) || !state.phase.accepts_commands() {
        return;
    }

    match plan.stage {
        AiStage::Decide => {
            let decision = decide(state, plan.unit).unwrap_or_else(|err| {
                warn!(unit = plan.unit, %err, "AI could not decide");
                AiDecision::end_turn(state.rules.wait_ct_cost)
            });
            match decision.move_to {
                Some(dest) => {
                    let walk = AiAction::Use {
                        command: Command::Move,
                        cursor: dest,
                    };
                    if carry_out(state, plan.unit, walk) {
                        let think = state.rules.ai_think_ticks;
                        state.ai_plan = Some(AiPlan {
                            unit: plan.unit,
                            wait_ticks: think,
                            stage: AiStage::Act(decision.action),
                        });
                    }
                }
                None => {
                    carry_out(state, plan.unit, decision.action);
                }
            }
        }
        AiStage::Act(action) => {
            carry_out(state, plan.unit, action);
        }
    }
}

/// Issue one action through the team's facade.
///
/// On failure the turn ends at the wait cost. Returns whether the action
/// went through.
fn carry_out(state: &mut BattleState, unit: UnitId, action: AiAction) -> bool {
    let Some(team) = state.roster.get(unit).map(|u| u.team) else {
        state.ai_plan = None;
        return false;
    };
    let wait_cost = state.rules.wait_ct_cost;

    let mut facade = TeamFacade::new(state, team);
    let result = match action {
        AiAction::Use { command, cursor } => facade.use_command_at(command, cursor),
        AiAction::EndTurn { ct_cost } => facade.submit_command(Command::EndTurn { ct_cost }),
    };
    let Err(err) = result else {
        return true;
    };

    warn!(unit, %err, ?action, "AI action failed, ending turn");
    let cancelled = match facade.state().phase() {
        Phase::Targeting => facade.cancel(),
        _ => Ok(()),
    };
    let fallback =
        cancelled.and_then(|()| facade.submit_command(Command::EndTurn { ct_cost: wait_cost }));
    if let Err(err) = fallback {
        warn!(unit, %err, "AI fallback failed, forcing turn end");
        state.end_turn(unit, wait_cost);
    }
    false
}

/// Hand the active unit's turn to the AI (auto-battle).
///
/// An open targeting context is cancelled first. The plan runs from the
/// next step without a thinking delay.
pub(crate) fn take_turn(state: &mut BattleState) -> Result<()> {
    let unit = state.active_unit_ref()?.id;
    if state.phase == Phase::Targeting {
        state.cancel_targeting()?;
    }
    if !state.phase.accepts_commands() {
        return Err(TacticsError::InvalidCommand(format!(
            "cannot auto-battle during {:?}",
            state.phase
        )));
    }
    debug!(unit, "auto-battle engaged");
    state.ai_plan = Some(AiPlan::new(unit, 0));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::BattleEvent;
    use crate::data::{JobTable, Rules};
    use crate::grid::BattleMap;
    use crate::math::{Facing, Fixed};
    use crate::unit::{Roster, Stats, Team, UnitSpawnParams};

    fn spawn(roster: &mut Roster, team: Team, job: JobKind, pos: (i32, i32), hp: u32, ct: i32) -> UnitId {
        let base = JobTable::default().get(job).unwrap().base;
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
                hp,
                max_hp: base.hp,
                speed: base.speed,
                move_range: base.move_range,
                jump_height: base.jump_height,
                attack_power: base.attack_power,
                magic_power: base.magic_power,
            },
            ct: Fixed::from_num(ct),
        })
    }

    fn battle(map: BattleMap, roster: Roster, ai_teams: Vec<Team>) -> BattleState {
        let rules = Rules {
            ai_teams,
            ..Rules::instant()
        };
        BattleState::new(map, roster, JobTable::default(), rules, 11).unwrap()
    }

    #[test]
    fn test_archetype_per_job() {
        assert_eq!(Archetype::for_job(JobKind::Knight), Archetype::Melee);
        assert_eq!(Archetype::for_job(JobKind::Archer), Archetype::Ranged);
        assert_eq!(Archetype::for_job(JobKind::Mage), Archetype::Caster);
        assert_eq!(Archetype::for_job(JobKind::Priest), Archetype::Support);
    }

    #[test]
    fn test_knight_strikes_adjacent_enemy_in_place() {
        let mut roster = Roster::new();
        let knight = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 4), 40, 0);
        spawn(&mut roster, Team::Red, JobKind::Archer, (3, 3), 40, 0);
        let state = battle(BattleMap::new(8, 8), roster, Vec::new());

        let decision = decide(&state, knight).unwrap();
        assert_eq!(decision.move_to, None);
        assert_eq!(
            decision.action,
            AiAction::Use {
                command: Command::Ability(0),
                cursor: GridPos::new(3, 3)
            }
        );
    }

    #[test]
    fn test_knight_flanks_before_striking() {
        let mut roster = Roster::new();
        let knight = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 6), 40, 0);
        spawn(&mut roster, Team::Red, JobKind::Archer, (3, 3), 40, 0);
        let state = battle(BattleMap::new(8, 8), roster, Vec::new());

        // Behind (3, 2) is out of reach around the archer; a side tile is not
        let decision = decide(&state, knight).unwrap();
        let dest = decision.move_to.unwrap();
        assert!(dest == GridPos::new(2, 3) || dest == GridPos::new(4, 3), "{dest}");
        assert_eq!(
            decision.action,
            AiAction::Use {
                command: Command::Ability(0),
                cursor: GridPos::new(3, 3)
            }
        );
    }

    #[test]
    fn test_priest_heals_injured_ally() {
        let mut roster = Roster::new();
        let priest = spawn(&mut roster, Team::Blue, JobKind::Priest, (1, 1), 40, 0);
        spawn(&mut roster, Team::Blue, JobKind::Knight, (1, 3), 10, 0);
        spawn(&mut roster, Team::Red, JobKind::Knight, (6, 6), 40, 0);
        let state = battle(BattleMap::new(8, 8), roster, Vec::new());

        let decision = decide(&state, priest).unwrap();
        assert_eq!(
            decision,
            AiDecision {
                move_to: None,
                action: AiAction::Use {
                    command: Command::Ability(0),
                    cursor: GridPos::new(1, 3)
                }
            }
        );
    }

    #[test]
    fn test_priest_with_nobody_to_heal_waits() {
        let mut roster = Roster::new();
        let priest = spawn(&mut roster, Team::Blue, JobKind::Priest, (1, 1), 40, 0);
        spawn(&mut roster, Team::Red, JobKind::Knight, (6, 6), 40, 0);
        let state = battle(BattleMap::new(8, 8), roster, Vec::new());
        assert_eq!(decide(&state, priest).unwrap(), AiDecision::end_turn(10));
    }

    #[test]
    fn test_archer_moves_into_range() {
        let mut roster = Roster::new();
        let archer = spawn(&mut roster, Team::Blue, JobKind::Archer, (0, 0), 40, 0);
        spawn(&mut roster, Team::Red, JobKind::Knight, (9, 0), 40, 0);
        let state = battle(BattleMap::new(10, 1), roster, Vec::new());

        let decision = decide(&state, archer).unwrap();
        assert_eq!(decision.move_to, Some(GridPos::new(4, 0)));
        assert!(matches!(
            decision.action,
            AiAction::Use { cursor, .. } if cursor == GridPos::new(9, 0)
        ));
    }

    #[test]
    fn test_decide_unknown_unit() {
        let state = battle(BattleMap::new(4, 4), Roster::new(), Vec::new());
        assert_eq!(decide(&state, 7), Err(TacticsError::UnknownUnit(7)));
    }

    #[test]
    fn test_ai_turn_runs_through_steps() {
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, JobKind::Archer, (3, 3), 40, 0);
        let knight = spawn(&mut roster, Team::Red, JobKind::Knight, (3, 2), 40, 90);
        let mut state = battle(BattleMap::new(8, 8), roster, vec![Team::Red]);

        state.step();
        assert_eq!(state.active_unit(), Some(knight));
        assert!(state.ai_plan.is_some());
        // Humans cannot act for the AI
        assert!(state.apply_input(crate::battle::PlayerInput::Confirm).is_err());

        state.step();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.roster().get(knight).unwrap().ct, Fixed::from_num(-35));
        assert!(state
            .drain_events()
            .contains(&BattleEvent::TurnEnded { unit: knight, ct_cost: 35 }));
    }

    #[test]
    fn test_ai_waits_think_ticks_between_move_and_act() {
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, JobKind::Archer, (3, 7), 40, 0);
        let knight = spawn(&mut roster, Team::Red, JobKind::Knight, (3, 1), 40, 90);
        let mut state = battle(BattleMap::new(8, 8), roster, vec![Team::Red]);
        state.rules.ai_think_ticks = 2;

        state.step();
        // Thinking
        state.step();
        state.step();
        assert_eq!(state.roster().get(knight).unwrap().position, GridPos::new(3, 1));
        state.step();
        let unit = state.roster().get(knight).unwrap();
        assert!(unit.has_moved);
        assert!(matches!(state.ai_plan.as_ref().unwrap().stage, AiStage::Act(_)));
    }

    #[test]
    fn test_auto_battle_takes_over_human_turn() {
        let mut roster = Roster::new();
        let knight = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 4), 40, 90);
        spawn(&mut roster, Team::Red, JobKind::Archer, (3, 3), 40, 0);
        let mut state = battle(BattleMap::new(8, 8), roster, Vec::new());

        state.step();
        state.submit_command(Command::Attack).unwrap();
        state.apply_input(crate::battle::PlayerInput::AutoBattle).unwrap();
        assert_eq!(state.phase(), Phase::Command);

        state.step();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.roster().get(knight).unwrap().has_acted);
    }
}
