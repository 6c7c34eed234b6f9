//! Balance testing utilities for headless encounters.
//!
//! This module runs many AI-vs-AI battles across seeds, and provides a
//! closed-form time-to-defeat matrix for the default jobs' basic attacks.

use std::ops::Range;

use tactics_core::battle::BattleState;
use tactics_core::data::{JobKind, JobTable, CT_THRESHOLD};
use tactics_core::targeting::base_amount;
use tactics_core::unit::{Roster, Team};
use tracing::debug;

use crate::fixtures::spawn;

/// Result of a simulated battle.
#[derive(Debug, Clone)]
pub struct BattleResult {
    /// The winning side (None on timeout).
    pub winner: Option<Team>,
    /// Ticks elapsed.
    pub ticks: u64,
    /// Starting hit points of Blue.
    pub starting_hp_blue: u32,
    /// Starting hit points of Red.
    pub starting_hp_red: u32,
    /// Remaining hit points of Blue.
    pub remaining_hp_blue: u32,
    /// Remaining hit points of Red.
    pub remaining_hp_red: u32,
}

impl BattleResult {
    /// Winner's remaining hit points over its starting hit points.
    pub fn remaining_ratio(&self) -> Option<f64> {
        let (remaining, starting) = match self.winner? {
            Team::Blue => (self.remaining_hp_blue, self.starting_hp_blue),
            Team::Red => (self.remaining_hp_red, self.starting_hp_red),
        };
        (starting > 0).then(|| f64::from(remaining) / f64::from(starting))
    }
}

/// Statistics for a set of battles.
#[derive(Debug, Clone, Default)]
pub struct BattleStats {
    /// Total battles run.
    pub total_battles: u32,
    /// Wins for Blue.
    pub wins_blue: u32,
    /// Wins for Red.
    pub wins_red: u32,
    /// Timeouts.
    pub draws: u32,
    /// Average ticks to resolution.
    pub avg_ticks: f64,
    /// Average winner's remaining hit point ratio.
    pub avg_remaining_ratio: f64,
}

impl BattleStats {
    /// Aggregate individual results.
    pub fn from_results(results: &[BattleResult]) -> Self {
        let mut stats = Self {
            total_battles: results.len() as u32,
            ..Self::default()
        };
        if results.is_empty() {
            return stats;
        }

        let mut ratio_sum = 0.0;
        let mut ratio_count = 0u32;
        for result in results {
            match result.winner {
                Some(Team::Blue) => stats.wins_blue += 1,
                Some(Team::Red) => stats.wins_red += 1,
                None => stats.draws += 1,
            }
            if let Some(ratio) = result.remaining_ratio() {
                ratio_sum += ratio;
                ratio_count += 1;
            }
        }
        stats.avg_ticks =
            results.iter().map(|r| r.ticks as f64).sum::<f64>() / results.len() as f64;
        if ratio_count > 0 {
            stats.avg_remaining_ratio = ratio_sum / f64::from(ratio_count);
        }
        stats
    }

    /// Calculate win rate for Blue (0.0 to 1.0).
    pub fn win_rate_blue(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        self.wins_blue as f64 / self.total_battles as f64
    }

    /// Calculate win rate for Red (0.0 to 1.0).
    pub fn win_rate_red(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        self.wins_red as f64 / self.total_battles as f64
    }

    /// Check if the matchup is balanced (Blue's win rate within range).
    pub fn is_balanced(&self, min_rate: f64, max_rate: f64) -> bool {
        let rate = self.win_rate_blue();
        rate >= min_rate && rate <= max_rate
    }
}

fn team_hp(state: &BattleState, team: Team) -> u32 {
    state
        .roster()
        .iter()
        .filter(|u| u.team == team)
        .map(|u| u.stats.hp)
        .sum()
}

/// Play a battle to its outcome or `max_ticks`.
pub fn run_battle(mut state: BattleState, max_ticks: u64) -> BattleResult {
    let starting_hp_blue = team_hp(&state, Team::Blue);
    let starting_hp_red = team_hp(&state, Team::Red);
    let start_tick = state.tick();

    let winner = state.run_until_outcome(max_ticks);
    let _ = state.drain_events();
    let ticks = state.tick() - start_tick;
    debug!(?winner, ticks, "balance battle finished");

    BattleResult {
        winner,
        ticks,
        starting_hp_blue,
        starting_hp_red,
        remaining_hp_blue: team_hp(&state, Team::Blue),
        remaining_hp_red: team_hp(&state, Team::Red),
    }
}

/// Play one battle per seed and aggregate the results.
///
/// `setup` builds the encounter for a seed; battles whose setup fails are
/// skipped.
pub fn run_seeds<F, E>(setup: F, seeds: Range<u64>, max_ticks: u64) -> BattleStats
where
    F: Fn(u64) -> Result<BattleState, E>,
{
    let results: Vec<BattleResult> = seeds
        .filter_map(|seed| {
            let state = setup(seed).ok();
            if state.is_none() {
                debug!(seed, "encounter setup failed, skipping seed");
            }
            state
        })
        .map(|state| run_battle(state, max_ticks))
        .collect();
    BattleStats::from_results(&results)
}

/// Closed-form duel figures for one job's basic attack against another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matchup {
    /// Attacking job.
    pub attacker: JobKind,
    /// Defending job.
    pub defender: JobKind,
    /// Hits needed to defeat the defender from the front.
    pub hits_to_defeat: u32,
    /// Time units between two of the attacker's turns when attacking every turn.
    pub turn_interval: f64,
    /// Expected time units to defeat the defender, misses included.
    pub time_to_defeat: f64,
}

/// Basic-attack matchup between two default jobs at base speed.
///
/// # Panics
///
/// Panics if the default job table lacks either job.
pub fn matchup(attacker: JobKind, defender: JobKind) -> Matchup {
    let jobs = JobTable::default();
    let mut roster = Roster::new();
    let a = spawn(&mut roster, Team::Blue, attacker, (0, 0), 0);
    let d = spawn(&mut roster, Team::Red, defender, (0, 1), 0);
    let (Some(a), Some(d)) = (roster.get(a), roster.get(d)) else {
        unreachable!("units were just inserted");
    };
    let attack = jobs.basic_attack(attacker).expect("job has a basic attack");

    let amount = base_amount(attack, a).max(1);
    let hits_to_defeat = d.stats.hp.div_ceil(amount);
    let turn_interval = f64::from(CT_THRESHOLD as u32 + attack.ct_cost) / f64::from(a.stats.speed);
    let time_to_defeat = f64::from(hits_to_defeat) / attack.base_hit_chance * turn_interval;

    Matchup {
        attacker,
        defender,
        hits_to_defeat,
        turn_interval,
        time_to_defeat,
    }
}

/// Generate the matchup matrix for all job pairs.
pub fn generate_matchup_matrix() -> Vec<Matchup> {
    let jobs = [JobKind::Knight, JobKind::Archer, JobKind::Mage, JobKind::Priest];
    let mut results = Vec::new();

    for attacker in jobs {
        for defender in jobs {
            results.push(matchup(attacker, defender));
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ai_vs_ai_rules, skirmish};

    #[test]
    fn test_knight_matchups() {
        let matrix = generate_matchup_matrix();
        assert_eq!(matrix.len(), 16);

        // Slash: 12 + 8 * 1.1 = 20.8, rounds to 21; 40 hp takes 2 hits
        let knight_v_mage = matrix
            .iter()
            .find(|m| m.attacker == JobKind::Knight && m.defender == JobKind::Mage)
            .unwrap();
        assert_eq!(knight_v_mage.hits_to_defeat, 2);
        assert!((knight_v_mage.turn_interval - 125.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_knight_outpaces_mage_melee() {
        let knight = matchup(JobKind::Knight, JobKind::Mage);
        let mage = matchup(JobKind::Mage, JobKind::Knight);
        assert!(knight.time_to_defeat < mage.time_to_defeat);
    }

    #[test]
    fn test_battle_stats_win_rate() {
        let stats = BattleStats {
            total_battles: 100,
            wins_blue: 55,
            wins_red: 40,
            draws: 5,
            avg_ticks: 1000.0,
            avg_remaining_ratio: 0.3,
        };

        assert!((stats.win_rate_blue() - 0.55).abs() < 0.001);
        assert!((stats.win_rate_red() - 0.40).abs() < 0.001);
        assert!(stats.is_balanced(0.45, 0.55));
    }

    #[test]
    fn test_empty_stats_are_even() {
        let stats = BattleStats::from_results(&[]);
        assert_eq!(stats.total_battles, 0);
        assert!((stats.win_rate_blue() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mirror_skirmishes_resolve() {
        let stats = run_seeds(
            |seed| Ok::<_, ()>(skirmish(seed, ai_vs_ai_rules())),
            0..4,
            20_000,
        );
        assert_eq!(stats.total_battles, 4);
        assert_eq!(stats.wins_blue + stats.wins_red + stats.draws, 4);
        assert!(stats.avg_ticks > 0.0);
        assert!(stats.avg_remaining_ratio >= 0.0 && stats.avg_remaining_ratio <= 1.0);
    }
}
