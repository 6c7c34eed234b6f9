//! Data structures for encounter configuration.
//!
//! Jobs, abilities and rule tunables are plain data designed to be
//! deserialized from RON. Defaults reproduce the standard four-job
//! encounter.
//!
//! **Note:** This module contains no IO - callers pass RON text in.

mod job_data;
mod rules;

pub use job_data::{Ability, AbilityKind, BaseStats, JobData, JobKind, JobTable, RangeFalloff};
pub use rules::{LevelUpGains, Rules, CT_THRESHOLD, MAX_CT_COST, MAX_HIT_CHANCE, MIN_HIT_CHANCE};
