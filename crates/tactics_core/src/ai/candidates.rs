//! Candidate tiles and action scoring shared by every archetype.
//!
//! All helpers are pure: hypothetical positions are evaluated on a copy of
//! the roster, never on the live battle.

use std::borrow::Cow;

use crate::battle::{BattleState, Command};
use crate::data::Ability;
use crate::math::GridPos;
use crate::pathfinding::{reachable_tiles, MoveProfile};
use crate::targeting::{affected_units, base_amount, tiles_in_range, EffectPreview};
use crate::unit::{Roster, Unit};

/// Share of an ally's would-be damage charged against an area attack.
const FRIENDLY_FIRE_WEIGHT: f64 = 0.5;
/// Score per unit of tile height when repositioning.
const HIGH_GROUND_WEIGHT: f64 = 0.2;

/// How an archetype values the previews of one aimed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    /// Hit points actually restorable on allies, times hit chance.
    AllyBenefit,
    /// Damage on enemies, times hit chance.
    EnemyDamage,
    /// Damage on enemies minus a penalty for allies caught in the area.
    AvoidFriendlyFire,
}

impl Weighting {
    /// Score `previews` of `ability` aimed at `cursor`.
    #[must_use]
    pub fn score(
        self,
        roster: &Roster,
        caster: &Unit,
        ability: &Ability,
        cursor: GridPos,
        previews: &[EffectPreview],
    ) -> f64 {
        match self {
            Self::AllyBenefit => previews
                .iter()
                .filter_map(|p| {
                    let target = roster.get(p.target_id)?;
                    let useful = p.amount.min(target.stats.missing_hp());
                    Some(f64::from(useful) * p.hit_chance)
                })
                .sum(),
            Self::EnemyDamage => enemy_damage(previews),
            Self::AvoidFriendlyFire => {
                let allies_in_area = roster
                    .living()
                    .filter(|u| u.team == caster.team && u.id != caster.id)
                    .filter(|u| u.position.manhattan(cursor) <= ability.aoe_radius)
                    .count();
                let penalty = allies_in_area as f64
                    * f64::from(base_amount(ability, caster))
                    * FRIENDLY_FIRE_WEIGHT;
                enemy_damage(previews) - penalty
            }
        }
    }
}

fn enemy_damage(previews: &[EffectPreview]) -> f64 {
    previews
        .iter()
        .map(|p| f64::from(p.amount) * p.hit_chance)
        .sum()
}

/// A scored action and the tile it would be taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Tile the unit acts from.
    pub from: GridPos,
    /// Command to issue.
    pub command: Command,
    /// Tile to aim at.
    pub cursor: GridPos,
    /// Weighted value.
    pub score: f64,
}

/// Tiles the unit could act from: its own tile first, then every reachable
/// tile in row-major order. Only its own tile once it has moved.
#[must_use]
pub fn candidate_tiles(state: &BattleState, unit: &Unit) -> Vec<GridPos> {
    if unit.has_moved {
        return vec![unit.position];
    }
    let mut reachable = reachable_tiles(
        state.map(),
        state.roster(),
        MoveProfile::of(unit),
        unit.position,
    );
    reachable.retain(|&p| p != unit.position);
    reachable.sort_by_key(|p| (p.y, p.x));

    let mut tiles = Vec::with_capacity(reachable.len() + 1);
    tiles.push(unit.position);
    tiles.extend(reachable);
    tiles
}

/// Roster as it would look with `unit` standing on `from`.
fn roster_at<'a>(state: &'a BattleState, unit: &Unit, from: GridPos) -> Cow<'a, Roster> {
    if from == unit.position {
        return Cow::Borrowed(state.roster());
    }
    let mut roster = state.roster().clone();
    if let Some(moved) = roster.get_mut(unit.id) {
        moved.position = from;
    }
    Cow::Owned(roster)
}

/// Best action over every tile, command and cursor, in that order.
///
/// Only scores strictly above `threshold` qualify, and a later candidate
/// replaces the current best only with a strictly greater score.
#[must_use]
pub fn best_candidate(
    state: &BattleState,
    unit: &Unit,
    from_tiles: &[GridPos],
    commands: &[Command],
    weighting: Weighting,
    threshold: f64,
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;

    for &from in from_tiles {
        let roster = roster_at(state, unit, from);
        let Some(caster) = roster.get(unit.id) else {
            continue;
        };
        for &command in commands {
            let Ok(ability) = state.ability_for(unit.id, command) else {
                continue;
            };
            for cursor in tiles_in_range(state.map(), from, &ability) {
                let previews = affected_units(state.map(), &roster, caster, &ability, from, cursor);
                if previews.is_empty() {
                    continue;
                }
                let score = weighting.score(&roster, caster, &ability, cursor, &previews);
                if score > threshold && best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(Candidate {
                        from,
                        command,
                        cursor,
                        score,
                    });
                }
            }
        }
    }
    best
}

/// Where a unit wants to stand relative to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    /// As close as possible.
    Approach,
    /// At a fixed distance.
    HoldDistance(u32),
}

/// Best tile among `tiles` for the preference, favouring high ground.
///
/// Ties keep the earliest tile, so with the unit's own tile first it only
/// moves for a strict improvement.
#[must_use]
pub fn reposition(state: &BattleState, tiles: &[GridPos], target: GridPos, preference: Preference) -> Option<GridPos> {
    let mut best: Option<(GridPos, f64)> = None;
    for &tile in tiles {
        let distance = f64::from(tile.manhattan(target));
        let mut score = match preference {
            Preference::Approach => -distance,
            Preference::HoldDistance(band) => -(f64::from(band) - distance).abs(),
        };
        score += state.map().height_at(tile).to_num::<f64>() * HIGH_GROUND_WEIGHT;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((tile, score));
        }
    }
    best.map(|(tile, _)| tile)
}

/// Closest living enemy, first in roster order on ties.
#[must_use]
pub fn nearest_enemy<'a>(roster: &'a Roster, unit: &Unit) -> Option<&'a Unit> {
    roster
        .living()
        .filter(|u| u.team != unit.team)
        .fold(None, |best: Option<&Unit>, u| match best {
            Some(b) if b.position.manhattan(unit.position) <= u.position.manhattan(unit.position) => Some(b),
            _ => Some(u),
        })
}

/// Living ally (the unit included) with the lowest hit point ratio among
/// those below maximum, first in roster order on ties.
#[must_use]
pub fn most_injured_ally<'a>(roster: &'a Roster, unit: &Unit) -> Option<&'a Unit> {
    roster
        .living()
        .filter(|u| u.team == unit.team && u.stats.hp < u.stats.max_hp)
        .fold(None, |best: Option<&Unit>, u| match best {
            Some(b) if b.stats.hp_ratio() <= u.stats.hp_ratio() => Some(b),
            _ => Some(u),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AbilityKind, JobKind, JobTable, Rules};
    use crate::grid::{BattleMap, Tile};
    use crate::math::{half_steps, Facing, Fixed};
    use crate::unit::{Stats, Team, UnitId, UnitSpawnParams};

    fn spawn(roster: &mut Roster, team: Team, job: JobKind, pos: (i32, i32), hp: u32) -> UnitId {
        roster.insert(UnitSpawnParams {
            name: format!("{team:?} {job:?}"),
            team,
            job,
            position: GridPos::new(pos.0, pos.1),
            facing: Facing::North,
            stats: Stats {
                level: 1,
                exp: 0,
                jp: 0,
                hp,
                max_hp: 40,
                speed: 8,
                move_range: 2,
                jump_height: Fixed::ONE,
                attack_power: 8,
                magic_power: 7,
            },
            ct: Fixed::ZERO,
        })
    }

    fn battle(map: BattleMap, roster: Roster) -> BattleState {
        BattleState::new(map, roster, JobTable::default(), Rules::instant(), 1).unwrap()
    }

    #[test]
    fn test_candidate_tiles_start_with_own_tile() {
        let mut roster = Roster::new();
        let id = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 3), 40);
        let state = battle(BattleMap::new(7, 7), roster);
        let unit = state.roster().get(id).unwrap();

        let tiles = candidate_tiles(&state, unit);
        assert_eq!(tiles[0], GridPos::new(3, 3));
        assert_eq!(tiles.len(), 13);
        assert!(tiles[1..].windows(2).all(|w| (w[0].y, w[0].x) < (w[1].y, w[1].x)));
    }

    #[test]
    fn test_moved_unit_only_considers_own_tile() {
        let mut roster = Roster::new();
        let id = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 3), 40);
        roster.get_mut(id).unwrap().has_moved = true;
        let state = battle(BattleMap::new(7, 7), roster);
        assert_eq!(
            candidate_tiles(&state, state.roster().get(id).unwrap()),
            vec![GridPos::new(3, 3)]
        );
    }

    #[test]
    fn test_heal_scoring_ignores_overheal() {
        let mut roster = Roster::new();
        let priest = spawn(&mut roster, Team::Blue, JobKind::Priest, (0, 0), 40);
        let scratched = spawn(&mut roster, Team::Blue, JobKind::Knight, (1, 0), 35);
        let hurt = spawn(&mut roster, Team::Blue, JobKind::Archer, (0, 2), 10);
        let state = battle(BattleMap::new(5, 5), roster);
        let unit = state.roster().get(priest).unwrap();

        let best = best_candidate(
            &state,
            unit,
            &[unit.position],
            &[Command::Ability(0)],
            Weighting::AllyBenefit,
            0.0,
        )
        .unwrap();
        assert_eq!(best.cursor, state.roster().get(hurt).unwrap().position);
        assert!(best.cursor != state.roster().get(scratched).unwrap().position);
    }

    #[test]
    fn test_full_health_allies_are_not_worth_healing() {
        let mut roster = Roster::new();
        let priest = spawn(&mut roster, Team::Blue, JobKind::Priest, (0, 0), 40);
        spawn(&mut roster, Team::Blue, JobKind::Knight, (1, 0), 40);
        let state = battle(BattleMap::new(5, 5), roster);
        let unit = state.roster().get(priest).unwrap();
        assert!(best_candidate(
            &state,
            unit,
            &[unit.position],
            &[Command::Ability(0)],
            Weighting::AllyBenefit,
            0.0
        )
        .is_none());
    }

    #[test]
    fn test_friendly_fire_penalty() {
        let mut roster = Roster::new();
        let mage = spawn(&mut roster, Team::Blue, JobKind::Mage, (0, 0), 40);
        let ally = spawn(&mut roster, Team::Blue, JobKind::Knight, (2, 1), 40);
        spawn(&mut roster, Team::Red, JobKind::Knight, (2, 0), 40);
        let state = battle(BattleMap::new(5, 5), roster);
        let caster = state.roster().get(mage).unwrap();
        let fire = state.jobs().abilities(JobKind::Mage)[0].clone();
        assert_eq!(fire.kind, AbilityKind::Damage);

        let cursor = GridPos::new(2, 0);
        let previews = affected_units(state.map(), state.roster(), caster, &fire, caster.position, cursor);
        // Fire never damages the ally, but the ally still counts against the cast
        assert_eq!(previews.len(), 1);
        assert!(previews.iter().all(|p| p.target_id != ally));

        let plain = Weighting::EnemyDamage.score(state.roster(), caster, &fire, cursor, &previews);
        let careful = Weighting::AvoidFriendlyFire.score(state.roster(), caster, &fire, cursor, &previews);
        let base = f64::from(base_amount(&fire, caster));
        assert!((plain - careful - base * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_reposition_prefers_high_ground_and_band() {
        let mut map = BattleMap::new(9, 1);
        map.set_tile(GridPos::new(2, 0), Tile::open(half_steps(2)));
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, JobKind::Archer, (0, 0), 40);
        let state = battle(map, roster);
        let tiles: Vec<_> = (0..5).map(|x| GridPos::new(x, 0)).collect();
        let target = GridPos::new(8, 0);

        assert_eq!(
            reposition(&state, &tiles, target, Preference::Approach),
            Some(GridPos::new(4, 0))
        );
        assert_eq!(
            reposition(&state, &tiles, target, Preference::HoldDistance(4)),
            Some(GridPos::new(4, 0))
        );
        // Tile 2 sits in the band and on high ground
        let near = GridPos::new(6, 0);
        assert_eq!(
            reposition(&state, &tiles[..4], near, Preference::HoldDistance(4)),
            Some(GridPos::new(2, 0))
        );
    }

    #[test]
    fn test_nearest_and_most_injured() {
        let mut roster = Roster::new();
        let me = spawn(&mut roster, Team::Blue, JobKind::Priest, (0, 0), 40);
        let far = spawn(&mut roster, Team::Red, JobKind::Knight, (5, 5), 40);
        let near = spawn(&mut roster, Team::Red, JobKind::Knight, (1, 1), 40);
        let a = spawn(&mut roster, Team::Blue, JobKind::Knight, (3, 0), 20);
        let b = spawn(&mut roster, Team::Blue, JobKind::Archer, (4, 0), 20);
        let me_unit = roster.get(me).unwrap();

        assert_eq!(nearest_enemy(&roster, me_unit).map(|u| u.id), Some(near));
        assert_ne!(nearest_enemy(&roster, me_unit).map(|u| u.id), Some(far));
        // Equal ratios resolve in roster order
        assert_eq!(most_injured_ally(&roster, me_unit).map(|u| u.id), Some(a));
        assert_ne!(most_injured_ally(&roster, me_unit).map(|u| u.id), Some(b));
    }
}
