use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Direction, Mode, Position,
    map::MazeGrid,
    pathfinding::{self, Path},
};

/// Lifecycle of the agent within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Created but not yet started.
    Idle,
    /// Autonomous: walking a planned route.
    Following,
    /// Driven by directional input.
    Manual,
    /// Reached the goal. Terminal.
    Won,
}

/// Result of a tick or an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The agent stepped onto this cell.
    Moved(Position),
    /// No movement this time.
    Waiting,
    /// This step reached the goal.
    Won,
    /// The goal was already reached earlier; nothing happens any more.
    Finished,
}

/// Holds the state of the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub position: Position,
    pub plan: Path,
    /// Index of the agent's own cell within `plan`.
    pub cursor: usize,
    pub mode: Mode,
    pub status: AgentStatus,
}

/// Moves the agent, either along routes from the path finder or from
/// directional input, and decides when a route must be recomputed.
#[derive(Debug, Clone)]
pub struct AgentController {
    state: AgentState,
    goal: Position,
    steps_taken: usize,
    replans: usize,
}

impl AgentController {
    pub fn new(start: Position, goal: Position, mode: Mode) -> Self {
        AgentController {
            state: AgentState {
                position: start,
                plan: Path::empty(),
                cursor: 0,
                mode,
                status: AgentStatus::Idle,
            },
            goal,
            steps_taken: 0,
            replans: 0,
        }
    }

    /// Leaves `Idle`: plans the first route in autonomous mode, or waits for
    /// input in manual mode. Calling it again has no effect.
    pub fn begin(&mut self, grid: &MazeGrid) {
        if self.state.status != AgentStatus::Idle {
            return;
        }
        if self.state.position == self.goal {
            self.state.status = AgentStatus::Won;
            return;
        }
        match self.state.mode {
            Mode::Autonomous => {
                self.state.status = AgentStatus::Following;
                self.replan(grid);
            }
            Mode::Manual => self.state.status = AgentStatus::Manual,
        }
    }

    /// Advances an autonomous agent by at most one cell.
    ///
    /// The next planned cell is taken if it is still open. Otherwise the
    /// route is recomputed from the current cell and its first step is tried
    /// straight away. An empty route leaves the agent in place until a later
    /// tick.
    pub fn tick(&mut self, grid: &MazeGrid) -> TickOutcome {
        match self.state.status {
            AgentStatus::Won => return TickOutcome::Finished,
            AgentStatus::Idle | AgentStatus::Manual => return TickOutcome::Waiting,
            AgentStatus::Following => {}
        }

        if let Some(next) = self.next_step() {
            if grid.is_open(next) {
                return self.advance(next);
            }
        }

        self.replan(grid);
        match self.next_step() {
            Some(next) if grid.is_open(next) => self.advance(next),
            _ => TickOutcome::Waiting,
        }
    }

    /// Applies one directional input in manual mode.
    ///
    /// Moves into walls or off the grid are ignored.
    pub fn apply_input(&mut self, direction: Direction, grid: &MazeGrid) -> TickOutcome {
        match self.state.status {
            AgentStatus::Won => return TickOutcome::Finished,
            AgentStatus::Manual => {}
            _ => return TickOutcome::Waiting,
        }
        match self.state.position.step(direction) {
            Some(candidate) if grid.is_open(candidate) => self.advance(candidate),
            _ => TickOutcome::Waiting,
        }
    }

    fn next_step(&self) -> Option<Position> {
        self.state.plan.get(self.state.cursor + 1)
    }

    fn replan(&mut self, grid: &MazeGrid) {
        self.state.plan = pathfinding::find_path(grid, self.state.position, self.goal);
        self.state.cursor = 0;
        self.replans += 1;
        debug!(
            from = ?self.state.position,
            steps = self.state.plan.steps(),
            "replanned route"
        );
    }

    fn advance(&mut self, next: Position) -> TickOutcome {
        self.state.position = next;
        self.steps_taken += 1;
        if self.state.status == AgentStatus::Following {
            self.state.cursor += 1;
        }
        if next == self.goal {
            self.state.status = AgentStatus::Won;
            info!(steps = self.steps_taken, "goal reached");
            TickOutcome::Won
        } else {
            TickOutcome::Moved(next)
        }
    }

    pub fn position(&self) -> Position {
        self.state.position
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn status(&self) -> AgentStatus {
        self.state.status
    }

    pub fn is_won(&self) -> bool {
        self.state.status == AgentStatus::Won
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Cells still ahead on the current route, excluding the agent's own.
    pub fn remaining_plan(&self) -> &[Position] {
        self.state
            .plan
            .cells()
            .get(self.state.cursor + 1..)
            .unwrap_or(&[])
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// How many times a route has been computed.
    pub fn replans(&self) -> usize {
        self.replans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        generator::{self, START, goal_for},
        map::{CellState, parse_maze},
    };

    #[test]
    fn static_maze_takes_exactly_the_planned_steps() {
        let grid = generator::generate(15, 21, 17).unwrap();
        let goal = goal_for(21, 15);
        let expected = pathfinding::find_path(&grid, START, goal).steps();

        let mut agent = AgentController::new(START, goal, Mode::Autonomous);
        agent.begin(&grid);
        assert_eq!(agent.status(), AgentStatus::Following);

        let mut ticks = 0;
        while !agent.is_won() {
            agent.tick(&grid);
            ticks += 1;
            assert!(ticks <= expected, "overshot the planned route");
        }
        assert_eq!(ticks, expected);
        assert_eq!(agent.steps_taken(), expected);
        assert_eq!(agent.replans(), 1);
        assert_eq!(agent.position(), goal);
    }

    #[test]
    fn blocked_step_triggers_a_replan() {
        let mut grid = parse_maze(
            "
            #######
            #.....#
            #.....#
            #.....#
            #######
            ",
        )
        .unwrap();
        let goal = Position::new(5, 1);
        let mut agent = AgentController::new(Position::new(1, 1), goal, Mode::Autonomous);
        agent.begin(&grid);
        let next = agent.remaining_plan()[0];

        grid.set_state(next, CellState::Wall).unwrap();
        let outcome = agent.tick(&grid);

        assert!(matches!(outcome, TickOutcome::Moved(_)));
        assert_ne!(agent.position(), next);
        assert_eq!(agent.replans(), 2);
    }

    #[test]
    fn enclosed_goal_never_moves_the_agent() {
        let grid = parse_maze(
            "
            #######
            #.....#
            #.###.#
            #.#.#.#
            #.###.#
            #.....#
            #######
            ",
        )
        .unwrap();
        let mut agent = AgentController::new(Position::new(1, 1), Position::new(3, 3), Mode::Autonomous);
        agent.begin(&grid);
        for _ in 0..100 {
            assert_eq!(agent.tick(&grid), TickOutcome::Waiting);
        }
        assert_eq!(agent.position(), Position::new(1, 1));
        assert_eq!(agent.steps_taken(), 0);
        assert_eq!(agent.status(), AgentStatus::Following);
    }

    #[test]
    fn manual_moves_respect_walls_and_bounds() {
        let grid = parse_maze(
            "
            ####
            #..#
            ####
            ",
        )
        .unwrap();
        let mut agent = AgentController::new(Position::new(1, 1), Position::new(2, 1), Mode::Manual);
        agent.begin(&grid);
        assert_eq!(agent.status(), AgentStatus::Manual);

        assert_eq!(agent.apply_input(Direction::Up, &grid), TickOutcome::Waiting);
        assert_eq!(agent.apply_input(Direction::Left, &grid), TickOutcome::Waiting);
        assert_eq!(agent.position(), Position::new(1, 1));

        assert_eq!(agent.apply_input(Direction::Right, &grid), TickOutcome::Won);
        assert_eq!(agent.apply_input(Direction::Left, &grid), TickOutcome::Finished);
        assert_eq!(agent.position(), Position::new(2, 1));
    }

    #[test]
    fn manual_move_off_the_grid_is_ignored() {
        // Open edge cell, as a hand-built grid might have.
        let grid = crate::map::Grid::from_generator(3, 1, |_, _| CellState::Open);
        let mut agent = AgentController::new(Position::new(0, 0), Position::new(2, 0), Mode::Manual);
        agent.begin(&grid);
        assert_eq!(agent.apply_input(Direction::Left, &grid), TickOutcome::Waiting);
        assert_eq!(agent.apply_input(Direction::Up, &grid), TickOutcome::Waiting);
        assert_eq!(agent.position(), Position::new(0, 0));
    }

    #[test]
    fn ticks_do_not_drive_a_manual_agent() {
        let grid = generator::generate(7, 7, 0).unwrap();
        let mut agent = AgentController::new(START, goal_for(7, 7), Mode::Manual);
        agent.begin(&grid);
        assert_eq!(agent.tick(&grid), TickOutcome::Waiting);
        assert_eq!(agent.position(), START);
    }

    #[test]
    fn input_is_ignored_before_begin_and_in_autonomous_mode() {
        let grid = generator::generate(7, 7, 0).unwrap();
        let mut agent = AgentController::new(START, goal_for(7, 7), Mode::Autonomous);
        assert_eq!(agent.tick(&grid), TickOutcome::Waiting);
        agent.begin(&grid);
        for direction in Direction::ALL {
            assert_eq!(agent.apply_input(direction, &grid), TickOutcome::Waiting);
        }
        assert_eq!(agent.position(), START);
    }

    #[test]
    fn starting_on_the_goal_wins_immediately() {
        let grid = generator::generate(3, 3, 0).unwrap();
        let mut agent = AgentController::new(START, START, Mode::Autonomous);
        agent.begin(&grid);
        assert!(agent.is_won());
        assert_eq!(agent.tick(&grid), TickOutcome::Finished);
    }
}
