//! Grid pathfinding using breadth-first search.
//!
//! Movement is 4-directional with unit step cost, so BFS yields shortest
//! paths directly. Neighbours are always expanded in
//! [`CARDINAL_OFFSETS`] order, which makes the chosen path among equal
//! length alternatives reproducible.

use std::collections::VecDeque;

use crate::grid::BattleMap;
use crate::math::{Fixed, GridPos, CARDINAL_OFFSETS};
use crate::unit::{Roster, Team, Unit};

/// Movement budget of a mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveProfile {
    /// Maximum number of steps.
    pub move_range: u32,
    /// Maximum height change of a single step.
    pub jump_height: Fixed,
    /// Side of the mover. Living units of other teams block traversal.
    pub team: Team,
}

impl MoveProfile {
    /// Movement budget of a unit from its live stats.
    #[must_use]
    pub const fn of(unit: &Unit) -> Self {
        Self {
            move_range: unit.stats.move_range,
            jump_height: unit.stats.jump_height,
            team: unit.team,
        }
    }
}

/// Occupancy of a tile as seen by a particular mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    Ally,
    Enemy,
}

/// Breadth-first search tree rooted at the mover's tile.
struct SearchTree {
    /// Predecessor index per tile, `None` for unvisited.
    prev: Vec<Option<usize>>,
    /// Visitation order, starting with the root.
    order: Vec<GridPos>,
    /// Occupancy per tile, excluding the root.
    occupancy: Vec<Option<Occupant>>,
}

impl SearchTree {
    fn build(map: &BattleMap, roster: &Roster, profile: MoveProfile, from: GridPos) -> Option<Self> {
        let start = map.index(from)?;
        let tile_count = (map.width() * map.height()) as usize;

        let mut occupancy = vec![None; tile_count];
        for unit in roster.living() {
            if unit.position == from {
                continue;
            }
            if let Some(i) = map.index(unit.position) {
                occupancy[i] = Some(if unit.team == profile.team {
                    Occupant::Ally
                } else {
                    Occupant::Enemy
                });
            }
        }

        let mut prev = vec![None; tile_count];
        let mut dist = vec![u32::MAX; tile_count];
        let mut order = vec![from];
        let mut queue = VecDeque::from([from]);
        dist[start] = 0;
        prev[start] = Some(start);

        while let Some(current) = queue.pop_front() {
            let Some(ci) = map.index(current) else {
                continue;
            };
            let next_dist = dist[ci] + 1;
            if next_dist > profile.move_range {
                continue;
            }
            let current_height = map.height_at(current);

            for &(dx, dy) in &CARDINAL_OFFSETS {
                let next = current.offset(dx, dy);
                let Some(ni) = map.index(next) else {
                    continue;
                };
                if dist[ni] != u32::MAX || !map.is_passable(next) {
                    continue;
                }
                if occupancy[ni] == Some(Occupant::Enemy) {
                    continue;
                }
                if (map.height_at(next) - current_height).abs() > profile.jump_height {
                    continue;
                }

                dist[ni] = next_dist;
                prev[ni] = Some(ci);
                order.push(next);
                queue.push_back(next);
            }
        }

        Some(Self {
            prev,
            order,
            occupancy,
        })
    }

    fn can_land(&self, map: &BattleMap, pos: GridPos) -> bool {
        map.index(pos)
            .is_some_and(|i| self.prev[i].is_some() && self.occupancy[i].is_none())
    }

    fn path_to(&self, map: &BattleMap, from: GridPos, to: GridPos) -> Option<Vec<GridPos>> {
        let mut index = map.index(to)?;
        let mut path = vec![to];
        let start = map.index(from)?;
        while index != start {
            index = self.prev[index]?;
            let width = map.width() as usize;
            path.push(GridPos::new((index % width) as i32, (index / width) as i32));
        }
        path.reverse();
        Some(path)
    }
}

/// Find the shortest legal path from `from` to `to`.
///
/// The returned sequence includes both endpoints; a path to the start tile
/// is just `[from]`. Returns `None` if the goal is out of bounds, outside the
/// move budget, unreachable, or occupied by a living unit other than the
/// mover.
#[must_use]
pub fn find_path(
    map: &BattleMap,
    roster: &Roster,
    profile: MoveProfile,
    from: GridPos,
    to: GridPos,
) -> Option<Vec<GridPos>> {
    if !map.in_bounds(to) {
        return None;
    }
    if from == to {
        return map.in_bounds(from).then(|| vec![from]);
    }

    let tree = SearchTree::build(map, roster, profile, from)?;
    if !tree.can_land(map, to) {
        return None;
    }
    tree.path_to(map, from, to)
}

/// All tiles the mover could legally end on, in BFS visitation order.
///
/// The start tile is always first.
#[must_use]
pub fn reachable_tiles(
    map: &BattleMap,
    roster: &Roster,
    profile: MoveProfile,
    from: GridPos,
) -> Vec<GridPos> {
    let Some(tree) = SearchTree::build(map, roster, profile, from) else {
        return Vec::new();
    };
    tree.order
        .iter()
        .copied()
        .filter(|&pos| pos == from || tree.can_land(map, pos))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::JobKind;
    use crate::grid::Tile;
    use crate::math::{half_steps, Facing};
    use crate::unit::{Stats, UnitSpawnParams};

    fn stats() -> Stats {
        Stats {
            level: 1,
            exp: 0,
            jp: 0,
            hp: 40,
            max_hp: 40,
            speed: 8,
            move_range: 4,
            jump_height: Fixed::ONE,
            attack_power: 8,
            magic_power: 3,
        }
    }

    fn spawn(roster: &mut Roster, team: Team, x: i32, y: i32) {
        roster.insert(UnitSpawnParams {
            name: format!("{team:?}{x}{y}"),
            team,
            job: JobKind::Knight,
            position: GridPos::new(x, y),
            facing: Facing::North,
            stats: stats(),
            ct: Fixed::ZERO,
        });
    }

    fn profile(move_range: u32) -> MoveProfile {
        MoveProfile {
            move_range,
            jump_height: Fixed::ONE,
            team: Team::Blue,
        }
    }

    #[test]
    fn test_straight_path() {
        let map = BattleMap::new(10, 10);
        let roster = Roster::new();
        let path = find_path(&map, &roster, profile(5), GridPos::new(1, 1), GridPos::new(4, 1)).unwrap();
        assert_eq!(
            path,
            vec![
                GridPos::new(1, 1),
                GridPos::new(2, 1),
                GridPos::new(3, 1),
                GridPos::new(4, 1)
            ]
        );
    }

    #[test]
    fn test_same_start_and_goal() {
        let map = BattleMap::new(5, 5);
        let path = find_path(&map, &Roster::new(), profile(3), GridPos::new(2, 2), GridPos::new(2, 2));
        assert_eq!(path, Some(vec![GridPos::new(2, 2)]));
    }

    #[test]
    fn test_move_range_bounds_search() {
        let map = BattleMap::new(10, 10);
        let roster = Roster::new();
        assert!(find_path(&map, &roster, profile(2), GridPos::new(0, 0), GridPos::new(3, 0)).is_none());
        assert!(find_path(&map, &roster, profile(3), GridPos::new(0, 0), GridPos::new(3, 0)).is_some());
    }

    #[test]
    fn test_enemy_blocks_and_cannot_be_landed_on() {
        let map = BattleMap::new(10, 1);
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, 5, 0);
        spawn(&mut roster, Team::Red, 6, 0);

        let from = GridPos::new(5, 0);
        assert!(find_path(&map, &roster, profile(4), from, GridPos::new(6, 0)).is_none());
        assert!(find_path(&map, &roster, profile(4), from, GridPos::new(7, 0)).is_none());
    }

    #[test]
    fn test_allies_can_be_passed_but_not_landed_on() {
        let map = BattleMap::new(10, 1);
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, 0, 0);
        spawn(&mut roster, Team::Blue, 1, 0);

        let from = GridPos::new(0, 0);
        assert!(find_path(&map, &roster, profile(4), from, GridPos::new(1, 0)).is_none());
        let path = find_path(&map, &roster, profile(4), from, GridPos::new(2, 0)).unwrap();
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_defeated_units_do_not_occupy() {
        let map = BattleMap::new(10, 1);
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Red, 1, 0);
        roster.get_mut(1).unwrap().alive = false;
        assert!(find_path(&map, &roster, profile(4), GridPos::new(0, 0), GridPos::new(1, 0)).is_some());
    }

    #[test]
    fn test_jump_height_limits_steps() {
        let mut map = BattleMap::new(3, 1);
        map.set_tile(GridPos::new(1, 0), Tile::open(half_steps(3)));
        let roster = Roster::new();
        let from = GridPos::new(0, 0);
        let to = GridPos::new(2, 0);

        assert!(find_path(&map, &roster, profile(4), from, to).is_none());

        let climber = MoveProfile {
            jump_height: Fixed::from_num(2),
            ..profile(4)
        };
        assert!(find_path(&map, &roster, climber, from, to).is_some());
    }

    #[test]
    fn test_blocked_tiles_are_avoided() {
        let mut map = BattleMap::new(3, 3);
        map.set_tile(GridPos::new(1, 0), Tile::blocked(Fixed::ZERO));
        map.set_tile(GridPos::new(1, 1), Tile::blocked(Fixed::ZERO));
        let roster = Roster::new();
        let path = find_path(&map, &roster, profile(6), GridPos::new(0, 0), GridPos::new(2, 0)).unwrap();
        assert_eq!(path.len(), 7);
        assert!(path.iter().all(|&p| map.is_passable(p)));
    }

    #[test]
    fn test_out_of_bounds_goal() {
        let map = BattleMap::new(3, 3);
        assert!(find_path(&map, &Roster::new(), profile(6), GridPos::new(0, 0), GridPos::new(3, 0)).is_none());
    }

    #[test]
    fn test_path_is_reproducible() {
        let map = BattleMap::town_fort(16, 16);
        let roster = Roster::new();
        let from = GridPos::new(7, 11);
        let to = GridPos::new(9, 13);
        let first = find_path(&map, &roster, profile(6), from, to);
        let second = find_path(&map, &roster, profile(6), from, to);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reachable_tiles_start_first_and_exclude_occupied() {
        let map = BattleMap::new(5, 5);
        let mut roster = Roster::new();
        spawn(&mut roster, Team::Blue, 2, 2);
        spawn(&mut roster, Team::Blue, 3, 2);

        let tiles = reachable_tiles(&map, &roster, profile(1), GridPos::new(2, 2));
        assert_eq!(tiles[0], GridPos::new(2, 2));
        assert_eq!(tiles.len(), 4);
        assert!(!tiles.contains(&GridPos::new(3, 2)));
    }
}
