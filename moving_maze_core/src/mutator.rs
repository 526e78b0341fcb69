use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    Direction, Position,
    map::{CellState, MazeGrid},
    pathfinding,
};

/// Relocation trials per tick unless configured otherwise.
pub const DEFAULT_MUTATIONS_PER_TICK: usize = 20;

/// What a single [`WallMutator::mutate`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReport {
    pub attempted: usize,
    pub committed: usize,
    pub reverted: usize,
}

/// Relocates walls one cell at a time.
///
/// Every committed move swaps a wall with an adjacent open cell, so the wall
/// count never changes and the border is never touched. Walls are never moved
/// onto the agent or the goal.
///
/// Without `reachability_check` the mutator may cut the agent off from the
/// goal; the maze only becomes solvable again when later mutations reopen a
/// route. With the check enabled, any swap that disconnects a connected agent
/// and goal is undone immediately; a disconnected maze keeps mutating until a
/// route reappears, and from then on it stays connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallMutator {
    pub mutations_per_tick: usize,
    pub reachability_check: bool,
}

impl Default for WallMutator {
    fn default() -> Self {
        WallMutator {
            mutations_per_tick: DEFAULT_MUTATIONS_PER_TICK,
            reachability_check: false,
        }
    }
}

impl WallMutator {
    pub fn new(mutations_per_tick: usize, reachability_check: bool) -> Self {
        WallMutator {
            mutations_per_tick,
            reachability_check,
        }
    }

    /// Runs `mutations_per_tick` relocation trials against `grid`.
    ///
    /// Trials that pick an open cell or an illegal target are skipped, not
    /// retried.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        grid: &mut MazeGrid,
        agent: Position,
        goal: Position,
        rng: &mut R,
    ) -> MutationReport {
        let mut report = MutationReport::default();
        // Nothing to pick from without interior cells.
        if grid.width() < 3 || grid.height() < 3 {
            return report;
        }

        // Only a move that breaks an existing route is undone. A maze that is
        // already cut off keeps moving so later trials can reopen it.
        let mut connected =
            self.reachability_check && pathfinding::is_reachable(grid, agent, goal);

        for _ in 0..self.mutations_per_tick {
            report.attempted += 1;

            let source = Position::new(
                rng.random_range(1..grid.width() - 1),
                rng.random_range(1..grid.height() - 1),
            );
            if grid.get(source) != Some(&CellState::Wall) {
                continue;
            }
            let direction = Direction::ALL[rng.random_range(0..Direction::ALL.len())];
            let Some(target) = source.step(direction) else {
                continue;
            };
            if !grid.is_interior(target)
                || !grid.is_open(target)
                || target == agent
                || target == goal
            {
                continue;
            }
            if grid.swap(source, target).is_err() {
                continue;
            }

            if !self.reachability_check {
                report.committed += 1;
                continue;
            }
            let reachable = pathfinding::is_reachable(grid, agent, goal);
            if connected && !reachable {
                if grid.swap(target, source).is_err() {
                    continue;
                }
                report.reverted += 1;
            } else {
                connected = reachable;
                report.committed += 1;
            }
        }

        trace!(
            attempted = report.attempted,
            committed = report.committed,
            reverted = report.reverted,
            "mutated walls"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        generator::{self, START, goal_for},
        map::parse_maze,
    };

    #[test]
    fn wall_count_and_border_are_preserved() {
        let mut grid = generator::generate(17, 37, 11).unwrap();
        let walls = grid.wall_count();
        let mut rng = StdRng::seed_from_u64(5);
        let mutator = WallMutator::default();
        let goal = goal_for(37, 17);

        let mut committed = 0;
        for _ in 0..200 {
            committed += mutator.mutate(&mut grid, START, goal, &mut rng).committed;
            assert_eq!(grid.wall_count(), walls);
            assert!(grid.border_intact());
            assert!(grid.is_open(START));
            assert!(grid.is_open(goal));
        }
        assert!(committed > 0);
    }

    #[test]
    fn zero_mutations_leave_the_grid_alone() {
        let mut grid = generator::generate(11, 11, 4).unwrap();
        let before = grid.clone();
        let report = WallMutator::new(0, false).mutate(
            &mut grid,
            START,
            goal_for(11, 11),
            &mut StdRng::seed_from_u64(0),
        );
        assert_eq!(report, MutationReport::default());
        assert_eq!(grid, before);
    }

    #[test]
    fn walls_never_land_on_agent_or_goal() {
        // A wall next to both protected cells; every other neighbour is a wall.
        let mut grid = parse_maze(
            "
            #####
            #.#.#
            #####
            ",
        )
        .unwrap();
        let before = grid.clone();
        let mut rng = StdRng::seed_from_u64(1);
        let report = WallMutator::new(500, false).mutate(
            &mut grid,
            Position::new(1, 1),
            Position::new(3, 1),
            &mut rng,
        );
        assert_eq!(report.committed, 0);
        assert_eq!(grid, before);
    }

    #[test]
    fn reachability_check_keeps_a_route() {
        let mut grid = generator::generate(15, 15, 21).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let mutator = WallMutator::new(40, true);
        let goal = goal_for(15, 15);
        for _ in 0..100 {
            mutator.mutate(&mut grid, START, goal, &mut rng);
            assert!(pathfinding::is_reachable(&grid, START, goal));
        }
    }

    #[test]
    fn reachability_check_lets_a_cut_off_maze_reconnect() {
        let mut grid = parse_maze(
            "
            #######
            #.....#
            #.....#
            #..####
            #..#..#
            #..#..#
            #######
            ",
        )
        .unwrap();
        let (agent, goal) = (Position::new(1, 1), Position::new(5, 5));
        assert!(!pathfinding::is_reachable(&grid, agent, goal));

        let mutator = WallMutator::new(40, true);
        let mut rng = StdRng::seed_from_u64(3);
        let mut committed = 0;
        let mut reconnected = false;
        for _ in 0..500 {
            committed += mutator.mutate(&mut grid, agent, goal, &mut rng).committed;
            let reachable = pathfinding::is_reachable(&grid, agent, goal);
            assert!(!reconnected || reachable, "route lost after reconnecting");
            reconnected |= reachable;
        }
        assert!(committed > 0);
        assert!(reconnected);
    }

    #[test]
    fn report_accounts_for_every_trial() {
        let mut grid = generator::generate(9, 9, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let report = WallMutator::new(64, true).mutate(&mut grid, START, goal_for(9, 9), &mut rng);
        assert_eq!(report.attempted, 64);
        assert!(report.committed + report.reverted <= report.attempted);
    }
}
