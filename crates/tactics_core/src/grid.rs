//! Battle map: static height and passability per tile.
//!
//! The map never changes during an encounter. Occupancy is not stored here;
//! it is derived from the [`Roster`](crate::unit::Roster) on demand.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TacticsError};
use crate::math::{half_steps, height_serde, Fixed, GridPos};

/// A single map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Elevation in multiples of 0.5.
    #[serde(with = "height_serde")]
    pub height: Fixed,
    /// Whether units may stand on (and sight through) this tile.
    pub passable: bool,
}

impl Tile {
    /// Passable tile at the given height.
    #[must_use]
    pub const fn open(height: Fixed) -> Self {
        Self {
            height,
            passable: true,
        }
    }

    /// Impassable tile at the given height.
    #[must_use]
    pub const fn blocked(height: Fixed) -> Self {
        Self {
            height,
            passable: false,
        }
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::open(Fixed::ZERO)
    }
}

/// Rectangular grid of tiles stored in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl BattleMap {
    /// Create a flat, fully passable map.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is not positive.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0, "BattleMap width must be positive");
        assert!(height > 0, "BattleMap height must be positive");

        Self {
            width,
            height,
            tiles: vec![Tile::default(); (width * height) as usize],
        }
    }

    /// Map width in tiles.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Map height in tiles (rows, not elevation).
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Check if a position is inside the map.
    #[must_use]
    pub const fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    /// Row-major index of an in-bounds position.
    #[inline]
    #[must_use]
    pub fn index(&self, pos: GridPos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    /// Tile at a position, or `None` outside the map.
    #[must_use]
    pub fn tile(&self, pos: GridPos) -> Option<Tile> {
        self.index(pos).map(|i| self.tiles[i])
    }

    /// Tile at a position, or [`TacticsError::OutOfBounds`].
    pub fn try_tile(&self, pos: GridPos) -> Result<Tile> {
        self.tile(pos)
            .ok_or(TacticsError::OutOfBounds { x: pos.x, y: pos.y })
    }

    /// Elevation of an in-bounds tile; out-of-bounds reads as ground level.
    #[must_use]
    pub fn height_at(&self, pos: GridPos) -> Fixed {
        self.tile(pos).map_or(Fixed::ZERO, |t| t.height)
    }

    /// Whether a tile exists and can be stood on.
    #[must_use]
    pub fn is_passable(&self, pos: GridPos) -> bool {
        self.tile(pos).is_some_and(|t| t.passable)
    }

    /// Replace a tile. Returns `false` if out of bounds.
    pub fn set_tile(&mut self, pos: GridPos, tile: Tile) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    /// All positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| GridPos::new(x, y)))
    }

    /// Town-and-fort battlefield used by the default encounter.
    ///
    /// Alternating 0/0.5 ground, a walled fort with a raised gate, an inner
    /// keep, impassable houses, two ramps and a tower corner.
    ///
    /// # Panics
    ///
    /// Panics if the map is smaller than 14x14, which cannot hold the layout.
    #[must_use]
    pub fn town_fort(width: i32, height: i32) -> Self {
        assert!(
            width >= 14 && height >= 14,
            "town_fort needs at least 14x14 tiles"
        );

        let mut map = Self::new(width, height);
        for pos in map.positions().collect::<Vec<_>>() {
            let ground = if pos.x % 2 == 0 { 1 } else { 0 };
            map.set_tile(pos, Tile::open(half_steps(ground)));
        }

        let wall = Tile::blocked(half_steps(5));
        for x in 2..width - 2 {
            map.set_tile(GridPos::new(x, 3), wall);
            map.set_tile(GridPos::new(x, height - 4), wall);
        }
        for y in 4..height - 4 {
            map.set_tile(GridPos::new(2, y), wall);
            map.set_tile(GridPos::new(width - 3, y), wall);
        }

        // Gate
        map.set_tile(GridPos::new(width / 2, 3), Tile::open(half_steps(3)));

        // Inner keep
        for y in 6..=9 {
            for x in 6..=9 {
                map.set_tile(GridPos::new(x, y), Tile::open(half_steps(3)));
            }
        }

        let houses = [(4, 6, 2, 2), (11, 8, 2, 2), (4, 11, 3, 2)];
        for (hx, hy, hw, hh) in houses {
            for y in hy..hy + hh {
                for x in hx..hx + hw {
                    map.set_tile(GridPos::new(x, y), Tile::blocked(half_steps(2)));
                }
            }
        }

        // Ramps and stairs
        map.set_tile(GridPos::new(5, 10), Tile::open(half_steps(2)));
        map.set_tile(GridPos::new(6, 10), Tile::open(half_steps(2)));
        map.set_tile(GridPos::new(5, 9), Tile::open(half_steps(3)));
        map.set_tile(GridPos::new(6, 9), Tile::open(half_steps(3)));
        map.set_tile(GridPos::new(10, 7), Tile::open(half_steps(2)));
        map.set_tile(GridPos::new(10, 8), Tile::open(half_steps(3)));
        map.set_tile(GridPos::new(10, 9), Tile::open(half_steps(4)));
        map.set_tile(GridPos::new(10, 10), Tile::blocked(half_steps(5)));

        map
    }
}

impl Default for BattleMap {
    /// The 16x16 town-and-fort battlefield.
    fn default() -> Self {
        Self::town_fort(16, 16)
    }
}
