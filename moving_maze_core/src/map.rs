use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{Direction, Position};

/// Smallest width or height a maze may have: one interior cell plus a border.
pub const MIN_SIDE: usize = 3;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("Cell ({x}, {y}) lies on the border and must stay a wall")]
    BorderCell { x: usize, y: usize },
    #[error("Grid size ({width}, {height}) is below the minimum of 3x3")]
    InvalidDimensions { width: usize, height: usize },
    #[error("Maze text is empty")]
    EmptyMaze,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown maze symbol '{symbol}' at ({x}, {y})")]
    UnknownSymbol { symbol: char, x: usize, y: usize },
    #[error("Border cell ({x}, {y}) is open; the outer ring must be walls")]
    OpenBorder { x: usize, y: usize },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![T::default(); size],
        }
    }

    /// Creates a new grid whose cells are produced by `f(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Grid {
            width,
            height,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Converts a position to a flat vector index, or `None` when out of bounds.
    #[inline]
    fn index_of(&self, pos: Position) -> Option<usize> {
        self.contains(pos).then(|| pos.y * self.width + pos.x)
    }

    #[inline]
    fn out_of_bounds(&self, pos: Position) -> GridError {
        GridError::OutOfBounds {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Checks if the position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Gets a reference to the cell at `pos`, or `None` when out of bounds.
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.index_of(pos).map(|index| &self.cells[index])
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }

    /// Iterates over the in-bounds 4-neighbours of `pos`, in `Direction::ALL` order.
    pub fn neighbors(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |direction| pos.step(direction))
            .filter(move |next| self.contains(*next))
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.index_of(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.x, pos.y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        match self.index_of(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.x, pos.y, self.width, self.height
            ),
        }
    }
}

/// Occupancy of a single maze cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    Open,
    Wall,
}

/// Mazes are carved out of solid rock.
impl Default for CellState {
    fn default() -> Self {
        CellState::Wall
    }
}

impl CellState {
    fn symbol(self) -> char {
        match self {
            CellState::Open => '.',
            CellState::Wall => '#',
        }
    }
}

/// The occupancy grid the whole engine works on.
pub type MazeGrid = Grid<CellState>;

impl Grid<CellState> {
    /// Creates an all-wall grid, rejecting sizes below [`MIN_SIDE`].
    pub fn walled(width: usize, height: usize) -> Result<Self, GridError> {
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(GridError::InvalidDimensions { width, height });
        }
        Ok(Grid::new(width, height))
    }

    /// True for in-bounds open cells. Out-of-bounds counts as blocked.
    #[inline]
    pub fn is_open(&self, pos: Position) -> bool {
        matches!(self.get(pos), Some(CellState::Open))
    }

    #[inline]
    pub fn is_wall(&self, pos: Position) -> bool {
        matches!(self.get(pos), Some(CellState::Wall))
    }

    /// True for in-bounds cells on the outer ring.
    pub fn is_border(&self, pos: Position) -> bool {
        self.contains(pos)
            && (pos.x == 0 || pos.y == 0 || pos.x == self.width - 1 || pos.y == self.height - 1)
    }

    /// True for in-bounds cells that are not on the outer ring.
    pub fn is_interior(&self, pos: Position) -> bool {
        self.contains(pos) && !self.is_border(pos)
    }

    fn check_interior(&self, pos: Position) -> Result<usize, GridError> {
        let index = self.index_of(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        if self.is_border(pos) {
            return Err(GridError::BorderCell { x: pos.x, y: pos.y });
        }
        Ok(index)
    }

    /// Sets an interior cell. Border cells are refused so the maze stays closed.
    pub fn set_state(&mut self, pos: Position, state: CellState) -> Result<(), GridError> {
        let index = self.check_interior(pos)?;
        self.cells[index] = state;
        Ok(())
    }

    /// Exchanges the states of two interior cells, keeping the wall count.
    pub fn swap(&mut self, a: Position, b: Position) -> Result<(), GridError> {
        let ia = self.check_interior(a)?;
        let ib = self.check_interior(b)?;
        self.cells.swap(ia, ib);
        Ok(())
    }

    pub fn wall_count(&self) -> usize {
        self.iter().filter(|cell| **cell == CellState::Wall).count()
    }

    pub fn open_count(&self) -> usize {
        self.len() - self.wall_count()
    }

    /// In-bounds open 4-neighbours of `pos`.
    pub fn open_neighbors(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        self.neighbors(pos).filter(move |next| self.is_open(*next))
    }

    /// First open cell on the outer ring, in row-major order.
    pub fn open_border_cell(&self) -> Option<Position> {
        self.enumerate()
            .find(|(pos, cell)| self.is_border(*pos) && **cell == CellState::Open)
            .map(|(pos, _)| pos)
    }

    /// Checks that every border cell is a wall.
    pub fn border_intact(&self) -> bool {
        self.open_border_cell().is_none()
    }

    /// Fails with [`GridError::OpenBorder`] unless the outer ring is all walls.
    pub fn check_border(&self) -> Result<(), GridError> {
        match self.open_border_cell() {
            Some(pos) => Err(GridError::OpenBorder { x: pos.x, y: pos.y }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Grid<CellState> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, line) in self.cells.chunks(self.width.max(1)).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for cell in line {
                write!(f, "{}", cell.symbol())?;
            }
        }
        Ok(())
    }
}

/// Parses a maze drawn with `#` for walls and `.` for open cells.
///
/// Surrounding whitespace on each row is ignored. An open cell on the border
/// is rejected with [`GridError::OpenBorder`].
pub fn parse_maze(text: &str) -> Result<MazeGrid, GridError> {
    let rows: Vec<&str> = text
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let width = rows.first().ok_or(GridError::EmptyMaze)?.chars().count();

    let mut states = Vec::with_capacity(width * rows.len());
    for (y, row) in rows.iter().enumerate() {
        let found = row.chars().count();
        if found != width {
            return Err(GridError::RaggedRow {
                row: y,
                expected: width,
                found,
            });
        }
        for (x, symbol) in row.chars().enumerate() {
            let state = match symbol {
                '#' => CellState::Wall,
                '.' => CellState::Open,
                symbol => return Err(GridError::UnknownSymbol { symbol, x, y }),
            };
            states.push(state);
        }
    }

    let height = rows.len();
    if width < MIN_SIDE || height < MIN_SIDE {
        return Err(GridError::InvalidDimensions { width, height });
    }
    let grid = Grid {
        width,
        height,
        cells: states,
    };
    grid.check_border()?;
    Ok(grid)
}
