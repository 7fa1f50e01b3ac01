use serde::{Deserialize, Serialize};

/// Continuous world position (feet of an entity).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn horizontal_distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The block cell containing this position.
    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn center(&self) -> Position {
        Position::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }

    pub fn below(&self) -> Self {
        Self::new(self.x, self.y - 1, self.z)
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_of_negative_position_rounds_down() {
        let p = Position::new(-0.5, 64.2, 3.9);
        assert_eq!(p.block(), BlockPos::new(-1, 64, 3));
    }

    #[test]
    fn horizontal_distance_ignores_height() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 100.0, 4.0);
        assert_eq!(a.horizontal_distance(&b), 5.0);
    }
}
