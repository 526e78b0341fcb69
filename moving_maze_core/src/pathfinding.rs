use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use serde::{Deserialize, Serialize};

use crate::{Position, map::MazeGrid};

/// A route between two cells, endpoints included.
///
/// Consecutive cells are 4-adjacent. An empty path means no route exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    cells: Vec<Position>,
}

impl Path {
    pub fn empty() -> Self {
        Path { cells: Vec::new() }
    }

    pub fn cells(&self) -> &[Position] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<Position> {
        self.cells.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of moves needed to walk the path.
    pub fn steps(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    pub fn start(&self) -> Option<Position> {
        self.cells.first().copied()
    }

    pub fn goal(&self) -> Option<Position> {
        self.cells.last().copied()
    }
}

impl From<Vec<Position>> for Path {
    fn from(cells: Vec<Position>) -> Self {
        Path { cells }
    }
}

impl IntoIterator for Path {
    type Item = Position;
    type IntoIter = std::vec::IntoIter<Position>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

// Frontier entry. Lower `priority` pops first; equal priorities pop in
// insertion order.
#[derive(Clone, Eq, PartialEq)]
struct PrioritizedItem {
    priority: usize,
    sequence: usize,
    cost: usize,
    position: Position,
}

impl Ord for PrioritizedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PrioritizedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* search with a Manhattan heuristic over open, 4-adjacent cells.
///
/// Returns the shortest path from `start` to `goal` including both ends, or
/// an empty path when either end is blocked or no route exists. Holds no
/// state between calls, so it is safe to run against a freshly mutated grid.
pub fn find_path(grid: &MazeGrid, start: Position, goal: Position) -> Path {
    if !grid.is_open(start) || !grid.is_open(goal) {
        return Path::empty();
    }

    let mut frontier = BinaryHeap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut cost_so_far: HashMap<Position, usize> = HashMap::new();
    let mut sequence = 0;

    frontier.push(PrioritizedItem {
        priority: start.manhattan(goal),
        sequence,
        cost: 0,
        position: start,
    });
    cost_so_far.insert(start, 0);

    let mut goal_reached = false;

    while let Some(PrioritizedItem {
        cost,
        position: current,
        ..
    }) = frontier.pop()
    {
        if current == goal {
            goal_reached = true;
            break;
        }
        // Stale entry superseded by a cheaper push
        if cost_so_far.get(&current).is_some_and(|best| cost > *best) {
            continue;
        }

        for neighbor in grid.open_neighbors(current) {
            let new_cost = cost + 1;
            if cost_so_far
                .get(&neighbor)
                .is_none_or(|known| new_cost < *known)
            {
                cost_so_far.insert(neighbor, new_cost);
                came_from.insert(neighbor, current);
                sequence += 1;
                frontier.push(PrioritizedItem {
                    priority: new_cost + neighbor.manhattan(goal),
                    sequence,
                    cost: new_cost,
                    position: neighbor,
                });
            }
        }
    }

    if !goal_reached {
        return Path::empty();
    }

    let mut cells = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(previous) => {
                current = *previous;
                cells.push(current);
            }
            None => return Path::empty(),
        }
    }
    cells.reverse();
    Path::from(cells)
}

/// Breadth-first flood fill: is `goal` reachable from `start` over open cells?
pub fn is_reachable(grid: &MazeGrid, start: Position, goal: Position) -> bool {
    shortest_distance(grid, start, goal).is_some()
}

/// Number of moves on a shortest route, found by plain breadth-first search.
pub fn shortest_distance(grid: &MazeGrid, start: Position, goal: Position) -> Option<usize> {
    if !grid.is_open(start) || !grid.is_open(goal) {
        return None;
    }
    let mut distance: HashMap<Position, usize> = HashMap::from([(start, 0)]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        let here = distance[&current];
        if current == goal {
            return Some(here);
        }
        for neighbor in grid.open_neighbors(current) {
            if !distance.contains_key(&neighbor) {
                distance.insert(neighbor, here + 1);
                queue.push_back(neighbor);
            }
        }
    }
    None
}
