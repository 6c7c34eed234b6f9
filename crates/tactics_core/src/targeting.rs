//! Ability targeting: range tiles, affected units and effect previews.
//!
//! Everything here is a pure function of the map, the roster and an
//! ability. Nothing mutates state, so previews are safe to compute every
//! frame.

use serde::{Deserialize, Serialize};

use crate::data::{Ability, AbilityKind, MAX_HIT_CHANCE, MIN_HIT_CHANCE};
use crate::grid::BattleMap;
use crate::math::{clamp_f64, half_steps, Facing, GridPos};
use crate::unit::{Roster, Unit, UnitId};

/// Largest accuracy change from height difference.
const HEIGHT_HIT_CAP: f64 = 0.2;
/// Accuracy change per unit of height difference.
const HEIGHT_HIT_PER_LEVEL: f64 = 0.05;
/// Penalty when terrain in front of the target provides cover.
const TERRAIN_COVER: f64 = 0.2;
/// Additional penalty when a unit stands in front of the target.
const UNIT_COVER: f64 = 0.1;

/// Predicted outcome of an ability on one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectPreview {
    /// Affected unit.
    pub target_id: UnitId,
    /// Hit points healed or dealt on a hit.
    pub amount: u32,
    /// Probability of the effect landing, `0.0` when line of sight is blocked.
    pub hit_chance: f64,
    /// Heal or damage.
    pub kind: AbilityKind,
}

impl EffectPreview {
    /// Whether line of sight was blocked. Such entries always miss.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.hit_chance <= 0.0
    }
}

/// Relative direction of an attack against the target's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackAngle {
    /// Into the target's face, or diagonal.
    Front,
    /// From directly left or right.
    Side,
    /// From directly behind.
    Back,
}

impl AttackAngle {
    /// Classify an attack from `attacker` on a target at `target` facing `facing`.
    #[must_use]
    pub fn classify(attacker: GridPos, target: GridPos, facing: Facing) -> Self {
        let (sx, sy) = target.signum_towards(attacker);
        let (fx, fy) = facing.delta();
        let (bx, by) = facing.opposite().delta();
        if (sx, sy) == (bx, by) {
            return Self::Back;
        }
        // Pure perpendicular: exactly one axis set, orthogonal to facing.
        let cardinal = (sx == 0) != (sy == 0);
        if cardinal && sx * fx + sy * fy == 0 {
            return Self::Side;
        }
        Self::Front
    }

    /// Additive hit bonus.
    #[must_use]
    pub const fn hit_bonus(self) -> f64 {
        match self {
            Self::Front => 0.0,
            Self::Side => 0.10,
            Self::Back => 0.25,
        }
    }

    /// Fractional damage bonus.
    #[must_use]
    pub const fn damage_bonus(self) -> f64 {
        match self {
            Self::Front => 0.0,
            Self::Side => 0.10,
            Self::Back => 0.25,
        }
    }
}

/// All in-bounds tiles within `ability.range` of `origin`, in row-major order.
#[must_use]
pub fn tiles_in_range(map: &BattleMap, origin: GridPos, ability: &Ability) -> Vec<GridPos> {
    tiles_within(map, origin, ability.range)
}

/// All in-bounds tiles within `radius` of `center`, in row-major order.
#[must_use]
pub fn tiles_within(map: &BattleMap, center: GridPos, radius: u32) -> Vec<GridPos> {
    map.positions()
        .filter(|&p| center.manhattan(p) <= radius)
        .collect()
}

/// Points on the discrete line from `a` to `b`, both endpoints included.
#[must_use]
pub fn bresenham_line(a: GridPos, b: GridPos) -> Vec<GridPos> {
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (a.x, a.y);

    let mut points = Vec::with_capacity((dx - dy + 1) as usize);
    loop {
        points.push(GridPos::new(x, y));
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// Whether terrain lets `a` see `b`.
///
/// Adjacent tiles always see each other. Otherwise every intermediate tile
/// on the line must be passable and no higher than the lower endpoint plus
/// half a level.
#[must_use]
pub fn has_line_of_sight(map: &BattleMap, a: GridPos, b: GridPos) -> bool {
    if a.manhattan(b) <= 1 {
        return true;
    }
    let limit = map.height_at(a).min(map.height_at(b)) + half_steps(1);
    let line = bresenham_line(a, b);
    line[1..line.len() - 1].iter().all(|&p| {
        map.tile(p)
            .is_some_and(|t| t.passable && t.height <= limit)
    })
}

/// Cover penalty for a shot from `from` on the unit standing at `target`.
///
/// The cover tile is the one directly in front of the target along the
/// sign vector of the shot. The shooter never covers its own target, and
/// the tile it stands on gives no cover either.
#[must_use]
pub fn cover_penalty(map: &BattleMap, roster: &Roster, caster: UnitId, from: GridPos, target: GridPos) -> f64 {
    let (dx, dy) = from.signum_towards(target);
    let front = target.offset(-dx, -dy);
    if front == from {
        return 0.0;
    }
    let mut penalty = 0.0;
    if let Some(tile) = map.tile(front) {
        if !tile.passable || tile.height >= map.height_at(target) {
            penalty += TERRAIN_COVER;
        }
    }
    if roster.living_at(front).is_some_and(|u| u.id != caster) {
        penalty += UNIT_COVER;
    }
    penalty
}

/// Base amount before facing and falloff.
#[must_use]
pub fn base_amount(ability: &Ability, caster: &Unit) -> u32 {
    let amount = match ability.kind {
        AbilityKind::Heal => f64::from(ability.power) + f64::from(caster.stats.magic_power) * 1.2,
        _ => f64::from(ability.power) + f64::from(caster.stats.attack_power) * 1.1,
    };
    amount.round() as u32
}

/// Outcome of `ability` cast by `caster` from `origin` on one `target`.
///
/// Returns `None` when the target is not a legal recipient (heals only
/// affect allies, everything else only affects enemies).
#[must_use]
pub fn preview_effect(
    map: &BattleMap,
    roster: &Roster,
    caster: &Unit,
    ability: &Ability,
    origin: GridPos,
    target: &Unit,
) -> Option<EffectPreview> {
    let kind = match ability.kind {
        AbilityKind::Move => return None,
        kind => kind,
    };
    let allied = caster.team == target.team;
    if (kind == AbilityKind::Heal) != allied {
        return None;
    }

    let height_diff = (map.height_at(origin) - map.height_at(target.position)).to_num::<f64>();
    let mut hit = ability.base_hit_chance
        + clamp_f64(height_diff * HEIGHT_HIT_PER_LEVEL, -HEIGHT_HIT_CAP, HEIGHT_HIT_CAP);
    let mut amount = base_amount(ability, caster);

    if kind != AbilityKind::Heal && ability.range > 1 && ability.requires_line_of_sight {
        if !has_line_of_sight(map, origin, target.position) {
            return Some(EffectPreview {
                target_id: target.id,
                amount,
                hit_chance: 0.0,
                kind,
            });
        }
        hit -= cover_penalty(map, roster, caster.id, origin, target.position);
    }

    let angle = AttackAngle::classify(origin, target.position, target.facing);
    hit += angle.hit_bonus();
    amount = (f64::from(amount) * (1.0 + angle.damage_bonus())).round() as u32;
    let hit = clamp_f64(hit, MIN_HIT_CHANCE, MAX_HIT_CHANCE);

    if let Some(falloff) = ability.falloff {
        let distance = origin.manhattan(target.position);
        let excess = f64::from(distance.saturating_sub(falloff.free_range));
        let scaled = (f64::from(amount) * (1.0 - excess * falloff.per_tile)).round();
        amount = scaled.max(1.0) as u32;
    }

    Some(EffectPreview {
        target_id: target.id,
        amount,
        hit_chance: hit,
        kind,
    })
}

/// Units affected by `ability` aimed at `cursor` from `origin`, in roster order.
///
/// Empty when the cursor lies beyond the ability's range. Units inside the
/// area that the ability cannot legally affect are skipped.
#[must_use]
pub fn affected_units(
    map: &BattleMap,
    roster: &Roster,
    caster: &Unit,
    ability: &Ability,
    origin: GridPos,
    cursor: GridPos,
) -> Vec<EffectPreview> {
    if origin.manhattan(cursor) > ability.range || !map.in_bounds(cursor) {
        return Vec::new();
    }
    roster
        .living()
        .filter(|u| u.position.manhattan(cursor) <= ability.aoe_radius)
        .filter_map(|target| preview_effect(map, roster, caster, ability, origin, target))
        .collect()
}
