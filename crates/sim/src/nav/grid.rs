use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WALKABLE: u8 = 0;
pub const BLOCKED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, orientation: Orientation) -> Self {
        let (dx, dy) = orientation.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn chebyshev_distance(self, other: GridPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn manhattan_distance(self, other: GridPos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Pixel axis driven by a tween.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::Up,
        Orientation::Down,
        Orientation::Left,
        Orientation::Right,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Self::Up | Self::Down => Axis::Vertical,
            Self::Left | Self::Right => Axis::Horizontal,
        }
    }

    /// +1 for right/down, -1 for left/up.
    pub fn sign(self) -> i32 {
        match self {
            Self::Up | Self::Left => -1,
            Self::Down | Self::Right => 1,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    /// Facing from `from` toward `to`. The dominant axis wins and exact
    /// diagonals resolve horizontally; the same cell has no facing.
    pub fn between(from: GridPos, to: GridPos) -> Option<Orientation> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx == 0 && dy == 0 {
            return None;
        }
        if dx.abs() >= dy.abs() {
            Some(if dx > 0 { Self::Right } else { Self::Left })
        } else {
            Some(if dy > 0 { Self::Down } else { Self::Up })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell count mismatch: expected {expected}, got {actual}")]
    CellCountMismatch { expected: usize, actual: usize },
    #[error("invalid cell value {value} at index {index}; allowed values: 0, 1")]
    InvalidCellValue { index: usize, value: u8 },
    #[error("row {row} has width {actual}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("invalid cell character '{character}' at row {row}, column {column}")]
    InvalidCellChar {
        row: usize,
        column: usize,
        character: char,
    },
}

/// Row-major walkable(0)/blocked(1) matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyGrid {
    width: i32,
    height: i32,
    cells: Vec<u8>,
}

impl OccupancyGrid {
    pub fn new(width: u32, height: u32, cells: Vec<u8>) -> Result<Self, GridError> {
        let expected = width as usize * height as usize;
        let actual = cells.len();
        if expected != actual {
            return Err(GridError::CellCountMismatch { expected, actual });
        }
        if let Some((index, value)) = cells
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| *value > BLOCKED)
        {
            return Err(GridError::InvalidCellValue { index, value });
        }
        Ok(Self {
            width: width as i32,
            height: height as i32,
            cells,
        })
    }

    pub fn open(width: u32, height: u32) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            cells: vec![WALKABLE; width as usize * height as usize],
        }
    }

    /// Parses rows of `.` (walkable) and `#` (blocked).
    pub fn from_rows(rows: &[&str]) -> Result<Self, GridError> {
        let width = rows.first().map(|row| row.chars().count()).unwrap_or(0);
        let mut cells = Vec::with_capacity(width * rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let actual = row.chars().count();
            if actual != width {
                return Err(GridError::RaggedRow {
                    row: row_index,
                    expected: width,
                    actual,
                });
            }
            for (column, character) in row.chars().enumerate() {
                let value = match character {
                    '.' => WALKABLE,
                    '#' => BLOCKED,
                    _ => {
                        return Err(GridError::InvalidCellChar {
                            row: row_index,
                            column,
                            character,
                        })
                    }
                };
                cells.push(value);
            }
        }
        Self::new(width as u32, rows.len() as u32, cells)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn index_of(&self, pos: GridPos) -> Option<usize> {
        if !self.contains(pos) {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    pub fn position_of(&self, index: usize) -> GridPos {
        let width = self.width.max(1) as usize;
        GridPos::new((index % width) as i32, (index / width) as i32)
    }

    pub fn cell(&self, pos: GridPos) -> Option<u8> {
        self.index_of(pos)
            .and_then(|index| self.cells.get(index).copied())
    }

    pub fn set_cell(&mut self, pos: GridPos, value: u8) -> bool {
        match self.index_of(pos) {
            Some(index) => {
                self.cells[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn is_walkable(&self, pos: GridPos) -> bool {
        self.cell(pos) == Some(WALKABLE)
    }

    /// Out-of-bounds cells count as colliding.
    pub fn is_colliding(&self, pos: GridPos) -> bool {
        !self.is_walkable(pos)
    }

    pub(crate) fn neighbors(&self, pos: GridPos) -> impl Iterator<Item = GridPos> + '_ {
        Orientation::ALL
            .into_iter()
            .map(move |orientation| pos.offset(orientation))
            .filter(move |neighbor| self.contains(*neighbor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_cell_count() {
        let err = OccupancyGrid::new(3, 2, vec![0; 5]).expect_err("mismatch");
        assert_eq!(
            err,
            GridError::CellCountMismatch {
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn rejects_values_outside_walkable_and_blocked() {
        let err = OccupancyGrid::new(2, 1, vec![0, 2]).expect_err("invalid");
        assert_eq!(err, GridError::InvalidCellValue { index: 1, value: 2 });
    }

    #[test]
    fn from_rows_parses_and_bounds_checks() {
        let grid = OccupancyGrid::from_rows(&["..#", "#.."]).expect("grid");

        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
        assert!(grid.is_walkable(GridPos::new(1, 0)));
        assert!(grid.is_colliding(GridPos::new(2, 0)));
        assert!(grid.is_colliding(GridPos::new(-1, 0)));
        assert_eq!(grid.cell(GridPos::new(3, 0)), None);
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = OccupancyGrid::from_rows(&["...", ".."]).expect_err("ragged");
        assert!(matches!(err, GridError::RaggedRow { row: 1, .. }));
    }

    #[test]
    fn orientation_between_prefers_dominant_axis() {
        let origin = GridPos::new(5, 5);
        assert_eq!(Orientation::between(origin, GridPos::new(6, 5)), Some(Orientation::Right));
        assert_eq!(Orientation::between(origin, GridPos::new(5, 4)), Some(Orientation::Up));
        assert_eq!(Orientation::between(origin, GridPos::new(6, 8)), Some(Orientation::Down));
        assert_eq!(Orientation::between(origin, GridPos::new(4, 4)), Some(Orientation::Left));
        assert_eq!(Orientation::between(origin, origin), None);
    }
}
