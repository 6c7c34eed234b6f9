//! Charge-time turn scheduler.
//!
//! Every living unit accumulates charge at its speed. Time jumps straight to
//! the moment the soonest unit reaches [`CT_THRESHOLD`]; that unit takes the
//! turn. Acting resets charge to the negated cost of the action, so costly
//! actions delay the next turn by more than one cycle. A unit with zero
//! speed never gains charge and only acts if it already holds enough.
//!
//! All arithmetic is fixed-point so turn order is identical everywhere.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{CT_THRESHOLD, MAX_CT_COST};
use crate::error::{Result, TacticsError};
use crate::math::{fixed_serde, Fixed};
use crate::unit::{Roster, UnitId};

/// Scheduler view of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Charge {
    id: UnitId,
    ct: Fixed,
    speed: u32,
}

fn threshold() -> Fixed {
    Fixed::from_num(CT_THRESHOLD)
}

impl Charge {
    /// `None` when the charge can never reach the threshold.
    fn time_to_threshold(&self) -> Option<Fixed> {
        if self.ct >= threshold() {
            Some(Fixed::ZERO)
        } else if self.speed == 0 {
            None
        } else {
            Some((threshold() - self.ct) / Fixed::from_num(self.speed))
        }
    }
}

/// Advance every charge by the time the soonest one needs to reach the
/// threshold, then return the index of the first charge at or above it.
fn step(charges: &mut [Charge]) -> Option<usize> {
    let dt = charges.iter().filter_map(Charge::time_to_threshold).min()?;
    for charge in charges.iter_mut() {
        let arriving = charge.time_to_threshold().is_some_and(|t| t <= dt);
        charge.ct += Fixed::from_num(charge.speed) * dt;
        // Truncating division may leave an arriving unit a hair short.
        if arriving && charge.ct < threshold() {
            charge.ct = threshold();
        }
    }
    charges.iter().position(|c| c.ct >= threshold())
}

fn living_charges(roster: &Roster) -> Vec<Charge> {
    roster
        .living()
        .map(|u| Charge {
            id: u.id,
            ct: u.ct,
            speed: u.stats.speed,
        })
        .collect()
}

/// Advance all living units to the next activation and return the actor.
///
/// Charge only ever increases. When several units reach the threshold at
/// once, the first in roster order wins; the rest keep their charge and act
/// on the following polls without further advancement.
pub fn advance(roster: &mut Roster) -> Option<UnitId> {
    let mut charges = living_charges(roster);
    let next = step(&mut charges);
    for charge in &charges {
        if let Some(unit) = roster.get_mut(charge.id) {
            unit.ct = charge.ct;
        }
    }
    let id = next.map(|i| charges[i].id);
    if let Some(id) = id {
        debug!(unit = id, "scheduler granted turn");
    }
    id
}

/// Charge a unit holds right after paying `cost`.
///
/// # Errors
///
/// Returns [`TacticsError::InvalidCommand`] when `cost` exceeds
/// [`MAX_CT_COST`].
pub fn charge_after_cost(cost: u32) -> Result<Fixed> {
    if cost > MAX_CT_COST {
        return Err(TacticsError::InvalidCommand(format!(
            "CT cost {cost} exceeds the limit of {MAX_CT_COST}"
        )));
    }
    Ok(-Fixed::from_num(cost))
}

/// Reset a unit's charge to `-cost` after it acts.
///
/// The roster is untouched on error.
pub fn apply_cost(roster: &mut Roster, id: UnitId, cost: u32) -> Result<()> {
    let charge = charge_after_cost(cost)?;
    let unit = roster.get_mut(id).ok_or(TacticsError::UnknownUnit(id))?;
    unit.ct = charge;
    Ok(())
}

/// A not-yet-committed action whose cost the forecast should assume.
///
/// Costs above [`MAX_CT_COST`] are forecast as [`MAX_CT_COST`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypotheticalCost {
    /// Unit expected to pay the cost.
    pub unit_id: UnitId,
    /// Charge cost of the selected action.
    pub cost: u32,
    /// Label shown next to the unit's forecast entries.
    pub note: String,
}

/// One forecast activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Unit that would act.
    pub unit_id: UnitId,
    /// Charge the unit would hold when granted the turn.
    #[serde(with = "fixed_serde")]
    pub projected_ct: Fixed,
    /// Name of the selected action for the active unit, otherwise empty.
    pub note: String,
}

/// Lazy forecast of future activations over a private copy of the charges.
#[derive(Debug, Clone)]
pub struct Forecast {
    charges: Vec<Charge>,
    hypothetical: Option<HypotheticalCost>,
}

impl Forecast {
    /// Start a forecast from the current roster.
    #[must_use]
    pub fn new(roster: &Roster, hypothetical: Option<HypotheticalCost>) -> Self {
        Self {
            charges: living_charges(roster),
            hypothetical,
        }
    }
}

impl Iterator for Forecast {
    type Item = TimelineEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let index = step(&mut self.charges)?;
        let charge = &mut self.charges[index];
        let (cost, note) = match &self.hypothetical {
            Some(h) if h.unit_id == charge.id => (h.cost, h.note.clone()),
            _ => (0, String::new()),
        };
        let entry = TimelineEntry {
            unit_id: charge.id,
            projected_ct: charge.ct,
            note,
        };
        charge.ct = -Fixed::from_num(cost.min(MAX_CT_COST));
        Some(entry)
    }
}

/// Forecast the next `count` activations without touching the roster.
#[must_use]
pub fn predict(roster: &Roster, count: usize, hypothetical: Option<HypotheticalCost>) -> Vec<TimelineEntry> {
    Forecast::new(roster, hypothetical).take(count).collect()
}
