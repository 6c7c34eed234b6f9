//! Determinism testing utilities.
//!
//! Provides a harness for verifying that an encounter produces identical
//! results given identical seeds and inputs.
//!
//! # Testing Strategy
//!
//! Replays and headless balance runs depend on a battle being 100%
//! reproducible. Sources of non-determinism include:
//!
//! - **Floating-point math**: Heights and charge time use fixed-point
//!   arithmetic via [`tactics_core::math::Fixed`]. Hit chances are floats,
//!   but every roll is compared against a seeded stream.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The roster iterates in unit ID order.
//!
//! - **System randomness**: Every roll comes from the battle's ChaCha stream.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual rules (pathfinding, resolution, timeline)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full AI-vs-AI encounters are reproducible
//! 4. **Parallel tests**: Running N encounters on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use tactics_core::battle::BattleState;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel battle runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each battle.
    pub hashes: Vec<u64>,
    /// Number of ticks each battle ran.
    pub ticks: u64,
    /// Number of battles run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all battles produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all battles matched.
    ///
    /// # Panics
    ///
    /// Panics if battles produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel battles diverged!\n\
                 Battles: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a battle multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the battle
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```ignore
/// use tactics_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     300, // 300 ticks each
///     || town_fort_encounter(7).unwrap(),
///     |state| state.step(),
///     |state| state.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism check for [`BattleState`].
///
/// Runs the battle twice from identical setups and compares final hashes.
pub fn verify_battle_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> BattleState,
{
    verify_determinism(2, num_ticks, &setup_fn, BattleState::step, BattleState::state_hash)
        .is_deterministic
}

/// Run N battles on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under different thread
/// scheduling or memory layout.
///
/// # Panics
///
/// Panics if a battle thread panics.
pub fn run_parallel_battles<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> BattleState + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut state = setup_fn();
                    for _ in 0..num_ticks {
                        state.step();
                    }
                    state.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two runs tick-by-tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs match, `Some(tick)` if they diverge at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> BattleState,
{
    let mut a = setup_fn();
    let mut b = setup_fn();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        a.step();
        b.step();

        if a.state_hash() != b.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot round-trip preserves the battle exactly, and that
/// the restored battle keeps evolving identically.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> BattleState,
{
    let mut state = setup_fn();

    for _ in 0..num_ticks {
        state.step();
    }

    let Ok(bytes) = state.serialize() else {
        return false;
    };
    let Ok(mut restored) = BattleState::deserialize(&bytes) else {
        return false;
    };

    if restored.state_hash() != state.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        state.step();
        restored.step();
    }
    restored.state_hash() == state.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for rules and determinism testing.
pub mod strategies {
    use proptest::prelude::*;
    use tactics_core::data::JobKind;
    use tactics_core::grid::{BattleMap, Tile};
    use tactics_core::math::{half_steps, Facing, GridPos};
    use tactics_core::unit::Team;

    /// Generate a tile position inside a `width` x `height` map.
    pub fn arb_grid_pos(width: i32, height: i32) -> impl Strategy<Value = GridPos> {
        (0..width, 0..height).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Generate a facing.
    pub fn arb_facing() -> impl Strategy<Value = Facing> {
        prop_oneof![
            Just(Facing::North),
            Just(Facing::East),
            Just(Facing::South),
            Just(Facing::West),
        ]
    }

    /// Generate a job.
    pub fn arb_job() -> impl Strategy<Value = JobKind> {
        prop_oneof![
            Just(JobKind::Knight),
            Just(JobKind::Archer),
            Just(JobKind::Mage),
            Just(JobKind::Priest),
        ]
    }

    /// Generate a side.
    pub fn arb_team() -> impl Strategy<Value = Team> {
        prop_oneof![Just(Team::Blue), Just(Team::Red)]
    }

    /// Generate speed values (1-20).
    pub fn arb_speed() -> impl Strategy<Value = u32> {
        1u32..20u32
    }

    /// Generate starting charge values, negatives included.
    pub fn arb_ct() -> impl Strategy<Value = i32> {
        -60i32..120i32
    }

    /// Generate a rugged map: heights in half steps from 0 to 3, roughly one
    /// tile in six impassable.
    pub fn arb_map(width: i32, height: i32) -> impl Strategy<Value = BattleMap> {
        let cells = (width * height) as usize;
        proptest::collection::vec((0i32..=6, 0u8..6), cells).prop_map(move |cells| {
            let mut map = BattleMap::new(width, height);
            for (i, (steps, roll)) in cells.into_iter().enumerate() {
                let pos = GridPos::new(i as i32 % width, i as i32 / width);
                let tile = if roll == 0 {
                    Tile::blocked(half_steps(steps))
                } else {
                    Tile::open(half_steps(steps))
                };
                map.set_tile(pos, tile);
            }
            map
        })
    }

    /// Parameters for spawning a test unit.
    #[derive(Debug, Clone)]
    pub struct TestUnitParams {
        /// Side.
        pub team: Team,
        /// Job.
        pub job: JobKind,
        /// Starting tile.
        pub position: GridPos,
        /// Speed.
        pub speed: u32,
        /// Starting charge.
        pub ct: i32,
    }

    /// Generate parameters for a test unit.
    pub fn arb_unit_params(width: i32, height: i32) -> impl Strategy<Value = TestUnitParams> {
        (arb_team(), arb_job(), arb_grid_pos(width, height), arb_speed(), arb_ct()).prop_map(
            |(team, job, position, speed, ct)| TestUnitParams {
                team,
                job,
                position,
                speed,
                ct,
            },
        )
    }

    /// Generate a list of unit parameters on distinct tiles.
    pub fn arb_unit_list(
        width: i32,
        height: i32,
        max_units: usize,
    ) -> impl Strategy<Value = Vec<TestUnitParams>> {
        proptest::collection::vec(arb_unit_params(width, height), 1..max_units).prop_map(|mut units| {
            let mut seen = std::collections::BTreeSet::new();
            units.retain(|u| seen.insert(u.position));
            units
        })
    }
}
