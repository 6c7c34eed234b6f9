//! Effect resolution: hit rolls, hit point changes, experience and levels.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{AbilityKind, Rules};
use crate::targeting::EffectPreview;
use crate::unit::{Roster, Unit, UnitId};

/// What happened to one target when an effect resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectOutcome {
    /// Affected unit.
    pub target_id: UnitId,
    /// Heal or damage.
    pub kind: AbilityKind,
    /// Whether the roll succeeded.
    pub hit: bool,
    /// Hit points actually restored or removed.
    pub applied: u32,
    /// Whether this effect brought the target to zero hit points.
    pub defeated: bool,
}

/// Result of resolving one action against all its targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Per-target outcomes in preview order.
    pub outcomes: Vec<EffectOutcome>,
    /// Experience earned by the caster, before the per-action minimum.
    pub exp: u32,
}

/// Whether a roll in `[0, 1)` lands an effect with the given hit chance.
///
/// Entries with zero hit chance (blocked line of sight) never land.
#[must_use]
pub fn roll_hits(hit_chance: f64, roll: f64) -> bool {
    hit_chance > 0.0 && roll <= hit_chance
}

/// Roll every preview and apply the hit point changes to the roster.
///
/// Draws exactly one value from `rng` per preview, in order.
pub fn resolve_effects<R: Rng + ?Sized>(
    roster: &mut Roster,
    rules: &Rules,
    previews: &[EffectPreview],
    rng: &mut R,
) -> Resolution {
    let mut resolution = Resolution::default();

    for preview in previews {
        let roll: f64 = rng.gen();
        let hit = roll_hits(preview.hit_chance, roll);
        let mut outcome = EffectOutcome {
            target_id: preview.target_id,
            kind: preview.kind,
            hit,
            applied: 0,
            defeated: false,
        };

        if let Some(target) = roster.get_mut(preview.target_id).filter(|_| hit) {
            match preview.kind {
                AbilityKind::Heal => {
                    let before = target.stats.hp;
                    target.stats.hp = before.saturating_add(preview.amount).min(target.stats.max_hp);
                    outcome.applied = target.stats.hp - before;
                    resolution.exp += rules.heal_exp_cap.min(half_rounded(outcome.applied));
                }
                AbilityKind::Damage => {
                    let before = target.stats.hp;
                    target.stats.hp = before.saturating_sub(preview.amount);
                    outcome.applied = before - target.stats.hp;
                    resolution.exp += rules.damage_exp_cap.min(half_rounded(preview.amount));
                    if target.stats.hp == 0 && target.alive {
                        target.alive = false;
                        outcome.defeated = true;
                        resolution.exp += rules.kill_bonus;
                        info!(unit = target.id, name = %target.name, "unit defeated");
                    }
                }
                AbilityKind::Move => {}
            }
        }

        resolution.outcomes.push(outcome);
    }

    resolution
}

fn half_rounded(value: u32) -> u32 {
    (f64::from(value) * 0.5).round() as u32
}

/// Add experience and apply every level-up it unlocks.
///
/// Returns the number of levels gained.
pub fn award_exp(unit: &mut Unit, rules: &Rules, amount: u32) -> u32 {
    unit.stats.exp += amount;
    if rules.level_threshold == 0 {
        return 0;
    }

    let mut levels = 0;
    while unit.stats.exp >= rules.level_threshold {
        unit.stats.exp -= rules.level_threshold;
        unit.stats.level += 1;
        let gains = rules.level_up;
        unit.stats.max_hp += gains.max_hp;
        unit.stats.hp = unit.stats.max_hp;
        unit.stats.attack_power += gains.attack_power;
        unit.stats.magic_power += gains.magic_power;
        if unit.stats.level % 2 == 0 {
            unit.stats.speed += gains.speed_on_even_level;
        }
        levels += 1;
        info!(unit = unit.id, level = unit.stats.level, "level up");
    }
    levels
}

/// Add job points.
pub fn award_jp(unit: &mut Unit, amount: u32) {
    unit.stats.jp += amount;
}
