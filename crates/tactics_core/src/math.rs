//! Fixed-point and grid math utilities for deterministic simulation.
//!
//! Charge time and tile heights use fixed-point arithmetic so the turn
//! order is bit-exact on every platform. Grid coordinates are plain
//! integers.

use std::fmt;

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for charge time and heights.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for heights written as plain decimals in data files.
///
/// Heights are always multiples of 0.5, so the `f64` form is exact.
pub mod height_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a height as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a height, snapping it to the nearest half step.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        Ok(super::half_steps((raw * 2.0).round() as i32))
    }
}

/// Height expressed as a count of half steps (`half_steps(3)` is 1.5).
#[must_use]
pub fn half_steps(steps: i32) -> Fixed {
    Fixed::from_num(steps) / Fixed::from_num(2)
}

/// Clamp an `f64` into `[min, max]`.
#[inline]
#[must_use]
pub fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance, the grid metric used throughout.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Offset by a delta.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Per-axis sign of `other - self`.
    #[must_use]
    pub const fn signum_towards(self, other: Self) -> (i32, i32) {
        ((other.x - self.x).signum(), (other.y - self.y).signum())
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// 4-directional neighbour offsets in expansion order.
pub const CARDINAL_OFFSETS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Cardinal facing of a unit. North is towards lower `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    /// Towards -y.
    #[default]
    North,
    /// Towards +x.
    East,
    /// Towards +y.
    South,
    /// Towards -x.
    West,
}

impl Facing {
    /// Unit step in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::East => (1, 0),
            Self::South => (0, 1),
            Self::West => (-1, 0),
        }
    }

    /// The direction directly behind.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    /// Facing that points from `from` towards `to` along the dominant axis.
    ///
    /// Returns `None` when both positions are the same tile. Exact diagonals
    /// resolve to the vertical axis.
    #[must_use]
    pub fn towards(from: GridPos, to: GridPos) -> Option<Self> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx.abs() > dy.abs() {
            Some(if dx > 0 { Self::East } else { Self::West })
        } else if dy != 0 {
            Some(if dy > 0 { Self::South } else { Self::North })
        } else {
            None
        }
    }

    /// Facing for a single cardinal step, if the delta is one.
    #[must_use]
    pub const fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::North),
            (1, 0) => Some(Self::East),
            (0, 1) => Some(Self::South),
            (-1, 0) => Some(Self::West),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manhattan_distance() {
        let a = GridPos::new(1, 2);
        let b = GridPos::new(4, -2);
        assert_eq!(a.manhattan(b), 7);
        assert_eq!(b.manhattan(a), 7);
        assert_eq!(a.manhattan(a), 0);
    }

    #[test]
    fn test_half_steps_are_exact() {
        assert_eq!(half_steps(3), Fixed::from_num(1.5));
        assert_eq!(half_steps(5) - half_steps(4), Fixed::from_num(0.5));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(100) / Fixed::from_num(7);
        let b = Fixed::from_num(100) / Fixed::from_num(7);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_facing_towards_dominant_axis() {
        let origin = GridPos::new(5, 5);
        assert_eq!(Facing::towards(origin, GridPos::new(8, 6)), Some(Facing::East));
        assert_eq!(Facing::towards(origin, GridPos::new(2, 5)), Some(Facing::West));
        assert_eq!(Facing::towards(origin, GridPos::new(6, 9)), Some(Facing::South));
        assert_eq!(Facing::towards(origin, GridPos::new(4, 4)), Some(Facing::North));
        assert_eq!(Facing::towards(origin, origin), None);
    }

    #[test]
    fn test_facing_opposite_round_trip() {
        for facing in [Facing::North, Facing::East, Facing::South, Facing::West] {
            assert_eq!(facing.opposite().opposite(), facing);
            let (dx, dy) = facing.delta();
            assert_eq!(Facing::from_delta(dx, dy), Some(facing));
        }
    }
}
