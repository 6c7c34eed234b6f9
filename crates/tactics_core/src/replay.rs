//! In-memory replays.
//!
//! A replay stores the serialized starting state and every host input with
//! the tick it was applied on. Playback restores the state, re-applies each
//! input before stepping past its tick and checks the final state hash.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::battle::{BattleState, PlayerInput};
use crate::error::{Result, TacticsError};

/// Replay format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// One recorded host input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayInput {
    /// Tick the input was applied on, before that tick's step.
    pub tick: u64,
    /// The input.
    pub input: PlayerInput,
}

/// Complete replay data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier.
    pub scenario_id: String,
    /// Encounter seed.
    pub seed: u64,
    /// Serialized starting state.
    pub initial_state: Vec<u8>,
    /// Inputs in application order.
    pub inputs: Vec<ReplayInput>,
    /// Tick at which recording stopped.
    pub final_tick: u64,
    /// State hash at `final_tick`.
    pub final_hash: u64,
}

impl Replay {
    /// Start a replay from a battle's current state.
    pub fn new(scenario_id: impl Into<String>, seed: u64, initial_state: &BattleState) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed,
            initial_state: initial_state.serialize()?,
            inputs: Vec::new(),
            final_tick: initial_state.tick(),
            final_hash: initial_state.state_hash(),
        })
    }

    /// Record an input.
    pub fn record_input(&mut self, tick: u64, input: PlayerInput) {
        self.inputs.push(ReplayInput { tick, input });
    }

    /// Store the end state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Encode the replay for handing to another process.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| TacticsError::InvalidState(format!("Failed to serialize replay: {e}")))
    }

    /// Decode a replay, checking its version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| TacticsError::InvalidState(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(TacticsError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Starting state for playback.
    pub fn restore_initial_state(&self) -> Result<BattleState> {
        BattleState::deserialize(&self.initial_state)
    }

    /// Inputs applied on a tick.
    #[must_use]
    pub fn inputs_at_tick(&self, tick: u64) -> Vec<&ReplayInput> {
        self.inputs.iter().filter(|i| i.tick == tick).collect()
    }

    /// Number of recorded inputs.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

/// Runs a battle while recording every input into a [`Replay`].
#[derive(Debug)]
pub struct ReplayRecorder {
    state: BattleState,
    replay: Replay,
}

impl ReplayRecorder {
    /// Start recording from `state`.
    pub fn new(scenario_id: impl Into<String>, seed: u64, state: BattleState) -> Result<Self> {
        let replay = Replay::new(scenario_id, seed, &state)?;
        Ok(Self { state, replay })
    }

    /// Apply and record an input. Rejected inputs are recorded too.
    pub fn apply_input(&mut self, input: PlayerInput) -> Result<()> {
        self.replay.record_input(self.state.tick(), input);
        self.state.apply_input(input)
    }

    /// Step the battle.
    pub fn step(&mut self) {
        self.state.step();
    }

    /// The battle being recorded.
    #[must_use]
    pub const fn state(&self) -> &BattleState {
        &self.state
    }

    /// Mutable access for draining events.
    pub fn state_mut(&mut self) -> &mut BattleState {
        &mut self.state
    }

    /// Stop recording and return the finished replay.
    #[must_use]
    pub fn finish(mut self) -> Replay {
        self.replay.finalize(self.state.tick(), self.state.state_hash());
        self.replay
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    state: BattleState,
    input_index: usize,
}

impl ReplayPlayer {
    /// Load a replay for playback.
    pub fn new(replay: Replay) -> Result<Self> {
        let state = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            state,
            input_index: 0,
        })
    }

    fn apply_due_inputs(&mut self) {
        while let Some(recorded) = self.replay.inputs.get(self.input_index) {
            if recorded.tick > self.state.tick() {
                break;
            }
            if let Err(err) = self.state.apply_input(recorded.input) {
                debug!(tick = recorded.tick, %err, "replayed input rejected");
            }
            self.input_index += 1;
        }
    }

    /// Apply the current tick's inputs and step once.
    ///
    /// Returns true while there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        self.apply_due_inputs();
        if self.state.tick() < self.replay.final_tick {
            self.state.step();
        }
        self.state.tick() < self.replay.final_tick
    }

    /// Restart and play up to `target_tick`, applying that tick's inputs.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.state = self.replay.restore_initial_state()?;
        self.input_index = 0;
        let target = target_tick.min(self.replay.final_tick);
        loop {
            self.apply_due_inputs();
            if self.state.tick() >= target {
                break;
            }
            self.state.step();
        }
        Ok(())
    }

    /// Current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.state.tick()
    }

    /// Battle being played back.
    #[must_use]
    pub const fn state(&self) -> &BattleState {
        &self.state
    }

    /// Whether playback reached the end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.tick() >= self.replay.final_tick
    }

    /// Play the whole replay and compare the final hash.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.final_tick)?;
        Ok(self.state.state_hash() == self.replay.final_hash)
    }
}
