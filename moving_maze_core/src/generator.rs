//! Randomized depth-first maze carving.
//!
//! Rooms sit on odd coordinates and corridors are carved through the wall
//! cell between two rooms, so the room lattice becomes a spanning tree: every
//! pair of rooms is joined by exactly one simple path. The carving keeps an
//! explicit work stack, so large grids cannot exhaust the call stack.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::debug;

use crate::{
    Direction, Position,
    map::{CellState, GridError, MazeGrid},
    pathfinding,
};

/// Where every maze is carved from and where the agent starts.
pub const START: Position = Position::new(1, 1);

/// The goal cell of a maze with the given dimensions.
pub fn goal_for(width: usize, height: usize) -> Position {
    Position::new(width.saturating_sub(2), height.saturating_sub(2))
}

/// One room on the work stack together with the order its exits are tried in.
struct Frame {
    room: Position,
    exits: [Direction; 4],
    next: usize,
}

impl Frame {
    fn new<R: Rng + ?Sized>(room: Position, rng: &mut R) -> Self {
        let mut exits = Direction::ALL;
        exits.shuffle(rng);
        Frame {
            room,
            exits,
            next: 0,
        }
    }
}

/// Generates a `rows` x `cols` maze from a seed.
///
/// The same seed always yields the same maze.
pub fn generate(rows: usize, cols: usize, seed: u64) -> Result<MazeGrid, GridError> {
    generate_with_rng(rows, cols, &mut StdRng::seed_from_u64(seed))
}

/// Generates a `rows` x `cols` maze drawing randomness from `rng`.
///
/// A path from [`START`] to [`goal_for`]`(cols, rows)` always exists in the
/// result.
pub fn generate_with_rng<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    rng: &mut R,
) -> Result<MazeGrid, GridError> {
    let mut grid = MazeGrid::walled(cols, rows)?;

    grid.set_state(START, CellState::Open)?;
    let mut stack = vec![Frame::new(START, rng)];

    while let Some(frame) = stack.last_mut() {
        let Some(&direction) = frame.exits.get(frame.next) else {
            stack.pop();
            continue;
        };
        frame.next += 1;
        let room = frame.room;

        let Some(between) = room.step(direction) else {
            continue;
        };
        let Some(target) = between.step(direction) else {
            continue;
        };
        if grid.is_interior(target) && grid.is_wall(target) {
            grid.set_state(between, CellState::Open)?;
            grid.set_state(target, CellState::Open)?;
            stack.push(Frame::new(target, rng));
        }
    }

    connect_goal(&mut grid)?;

    debug_assert!(
        pathfinding::is_reachable(&grid, START, goal_for(cols, rows)),
        "generated maze has no route to the goal"
    );
    debug!(
        rows,
        cols,
        walls = grid.wall_count(),
        "generated maze"
    );
    Ok(grid)
}

/// With an even width or height the goal is off the room lattice; open a
/// spur from it to the nearest room up and to the left.
fn connect_goal(grid: &mut MazeGrid) -> Result<(), GridError> {
    let goal = goal_for(grid.width(), grid.height());
    if grid.is_open(goal) {
        return Ok(());
    }
    let room_x = goal.x - (1 - goal.x % 2);
    let room_y = goal.y - (1 - goal.y % 2);

    grid.set_state(goal, CellState::Open)?;
    grid.set_state(Position::new(room_x, goal.y), CellState::Open)?;
    grid.set_state(Position::new(room_x, room_y), CellState::Open)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::find_path;

    #[test]
    fn every_size_has_a_route_to_the_goal() {
        for rows in 3..=15 {
            for cols in 3..=15 {
                for seed in 0..4 {
                    let grid = generate(rows, cols, seed).unwrap();
                    let goal = goal_for(cols, rows);
                    assert!(
                        !find_path(&grid, START, goal).is_empty(),
                        "{}x{} seed {}:\n{}",
                        rows,
                        cols,
                        seed,
                        grid
                    );
                    assert!(grid.border_intact());
                }
            }
        }
    }

    #[test]
    fn display_sized_maze_is_solvable() {
        // 1500x700 px at 40 px per cell
        let grid = generate(17, 37, 2024).unwrap();
        assert_eq!((grid.width(), grid.height()), (37, 17));
        assert!(!find_path(&grid, START, goal_for(37, 17)).is_empty());
    }

    #[test]
    fn same_seed_same_maze() {
        assert_eq!(generate(21, 31, 7).unwrap(), generate(21, 31, 7).unwrap());
        assert_ne!(generate(21, 31, 7).unwrap(), generate(21, 31, 8).unwrap());
    }

    #[test]
    fn odd_mazes_are_perfect() {
        // A spanning tree over the rooms: open cells = 2 * rooms - 1.
        let (rows, cols) = (15, 21);
        let grid = generate(rows, cols, 99).unwrap();
        let rooms = (rows / 2) * (cols / 2);
        assert_eq!(grid.open_count(), 2 * rooms - 1);
    }

    #[test]
    fn corridors_never_open_even_even_cells() {
        let grid = generate(13, 13, 3).unwrap();
        for (pos, cell) in grid.enumerate() {
            if pos.x % 2 == 0 && pos.y % 2 == 0 {
                assert_eq!(*cell, CellState::Wall, "{:?}", pos);
            }
        }
    }

    #[test]
    fn rejects_undersized_dimensions() {
        assert_eq!(
            generate(2, 10, 0),
            Err(GridError::InvalidDimensions {
                width: 10,
                height: 2
            })
        );
    }

    #[test]
    fn large_grid_does_not_overflow_the_stack() {
        let grid = generate(401, 401, 1).unwrap();
        assert!(!find_path(&grid, START, goal_for(401, 401)).is_empty());
    }
}
