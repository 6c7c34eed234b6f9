//! Encounter setup.
//!
//! Spawn rolls (speed variance, starting charge) come from a ChaCha stream
//! seeded with the encounter seed; the battle's own hit-roll stream is
//! seeded from the next draw of that stream.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::battle::BattleState;
use crate::data::{JobKind, JobTable, Rules};
use crate::error::{Result, TacticsError};
use crate::grid::BattleMap;
use crate::math::{Facing, Fixed, GridPos};
use crate::unit::{Roster, Stats, Team, UnitSpawnParams};

/// Identifier of the default encounter, used in replays.
pub const TOWN_FORT_ID: &str = "town_fort";

/// Highest starting charge a unit can roll.
pub const MAX_INITIAL_CT: i32 = 80;

/// Where and as what a unit enters the battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPoint {
    /// Display name.
    pub name: String,
    /// Job.
    pub job: JobKind,
    /// Side.
    pub team: Team,
    /// Starting tile.
    pub position: GridPos,
    /// Starting facing.
    pub facing: Facing,
}

impl SpawnPoint {
    /// Spawn point facing the usual way for its side.
    #[must_use]
    pub fn new(name: &str, job: JobKind, team: Team, x: i32, y: i32) -> Self {
        Self {
            name: name.to_string(),
            job,
            team,
            position: GridPos::new(x, y),
            facing: match team {
                Team::Blue => Facing::North,
                Team::Red => Facing::South,
            },
        }
    }
}

/// The 4v4 line-up of the town-and-fort encounter.
#[must_use]
pub fn town_fort_spawns() -> Vec<SpawnPoint> {
    vec![
        SpawnPoint::new("Garnet", JobKind::Knight, Team::Blue, 7, 11),
        SpawnPoint::new("Balfon", JobKind::Archer, Team::Blue, 8, 11),
        SpawnPoint::new("Eiko", JobKind::Mage, Team::Blue, 5, 10),
        SpawnPoint::new("Rosa", JobKind::Priest, Team::Blue, 9, 11),
        SpawnPoint::new("Dyne", JobKind::Knight, Team::Red, 10, 4),
        SpawnPoint::new("Lia", JobKind::Archer, Team::Red, 11, 5),
        SpawnPoint::new("Vivi", JobKind::Mage, Team::Red, 9, 4),
        SpawnPoint::new("Lenna", JobKind::Priest, Team::Red, 12, 5),
    ]
}

/// Build a roster from spawn points, rolling speed and starting charge.
pub fn spawn_roster<R: Rng + ?Sized>(jobs: &JobTable, spawns: &[SpawnPoint], rng: &mut R) -> Result<Roster> {
    let mut roster = Roster::new();
    for spawn in spawns {
        let base = jobs
            .get(spawn.job)
            .ok_or_else(|| {
                TacticsError::InvalidState(format!("no job data for {}", spawn.job.display_name()))
            })?
            .base;
        let speed = base.speed + rng.gen_range(0..=base.speed_variance);
        let ct = rng.gen_range(0..=MAX_INITIAL_CT);

        roster.insert(UnitSpawnParams {
            name: spawn.name.clone(),
            team: spawn.team,
            job: spawn.job,
            position: spawn.position,
            facing: spawn.facing,
            stats: Stats {
                level: 1,
                exp: 0,
                jp: 0,
                hp: base.hp,
                max_hp: base.hp,
                speed,
                move_range: base.move_range,
                jump_height: base.jump_height,
                attack_power: base.attack_power,
                magic_power: base.magic_power,
            },
            ct: Fixed::from_num(ct),
        });
    }
    Ok(roster)
}

/// Build an encounter from explicit parts.
pub fn encounter(map: BattleMap, jobs: JobTable, rules: Rules, spawns: &[SpawnPoint], seed: u64) -> Result<BattleState> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let roster = spawn_roster(&jobs, spawns, &mut rng)?;
    let battle_seed = rng.gen();
    info!(seed, units = roster.len(), "encounter spawned");
    BattleState::new(map, roster, jobs, rules, battle_seed)
}

/// The default encounter: 16x16 town and fort, Blue against an AI-driven Red.
pub fn town_fort_encounter(seed: u64) -> Result<BattleState> {
    encounter(
        BattleMap::default(),
        JobTable::default(),
        Rules::default(),
        &town_fort_spawns(),
        seed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_town_fort_roster() {
        let state = town_fort_encounter(42).unwrap();
        let roster = state.roster();
        assert_eq!(roster.len(), 8);
        assert_eq!(roster.iter().filter(|u| u.team == Team::Blue).count(), 4);

        for unit in roster.iter() {
            assert!(state.map().is_passable(unit.position), "{} blocked", unit.name);
            assert!((8..=10).contains(&unit.stats.speed));
            assert!(unit.ct >= Fixed::ZERO && unit.ct <= Fixed::from_num(MAX_INITIAL_CT));
            assert_eq!(unit.stats.hp, 40);
        }

        let garnet = roster.iter().find(|u| u.name == "Garnet").unwrap();
        assert_eq!(garnet.facing, Facing::North);
        assert_eq!(garnet.stats.move_range, 4);
        let vivi = roster.iter().find(|u| u.name == "Vivi").unwrap();
        assert_eq!(vivi.facing, Facing::South);
        assert_eq!(vivi.stats.magic_power, 8);
    }

    #[test]
    fn test_same_seed_same_encounter() {
        let a = town_fort_encounter(7).unwrap();
        let b = town_fort_encounter(7).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
        assert_eq!(a.roster(), b.roster());
    }

    #[test]
    fn test_missing_job_is_rejected() {
        let jobs = JobTable::new(Vec::new());
        let spawns = [SpawnPoint::new("Solo", JobKind::Mage, Team::Blue, 1, 1)];
        let err = spawn_roster(&jobs, &spawns, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, TacticsError::InvalidState(_)));
    }
}
