use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    Direction, Mode, Position,
    agent::{AgentController, AgentStatus, TickOutcome},
    generator::{self, START, goal_for},
    map::{GridError, MIN_SIDE, MazeGrid},
    mutator::{DEFAULT_MUTATIONS_PER_TICK, MutationReport, WallMutator},
};

/// Default display area and cell size, in pixels.
pub const DEFAULT_DISPLAY_WIDTH: usize = 1500;
pub const DEFAULT_DISPLAY_HEIGHT: usize = 700;
pub const DEFAULT_CELL_SIZE: usize = 40;
/// Roughly 30 frames per second.
pub const DEFAULT_TICK_RATE_MS: u64 = 33;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid of {rows} rows by {cols} columns is below the minimum of 3x3")]
    InvalidGridDimensions { rows: usize, cols: usize },
    #[error("Cell size must be at least one pixel")]
    ZeroCellSize,
    #[error("Tick rate must be at least one millisecond")]
    ZeroTickRate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Session parameters, read once before the first tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub rows: usize,
    pub cols: usize,
    /// Fixed seed for a reproducible run; drawn from entropy when absent.
    pub seed: Option<u64>,
    pub mutations_per_tick: usize,
    pub tick_rate_ms: u64,
    /// Undo any wall move that cuts the agent off from the goal.
    pub reachability_check: bool,
    /// Skips the mode menu when set.
    pub mode: Option<Mode>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            rows: DEFAULT_DISPLAY_HEIGHT / DEFAULT_CELL_SIZE,
            cols: DEFAULT_DISPLAY_WIDTH / DEFAULT_CELL_SIZE,
            seed: None,
            mutations_per_tick: DEFAULT_MUTATIONS_PER_TICK,
            tick_rate_ms: DEFAULT_TICK_RATE_MS,
            reachability_check: false,
            mode: None,
        }
    }
}

impl SessionConfig {
    /// Derives the grid size from a display area split into square cells.
    pub fn from_display(
        width_px: usize,
        height_px: usize,
        cell_size: usize,
    ) -> Result<Self, ConfigError> {
        if cell_size == 0 {
            return Err(ConfigError::ZeroCellSize);
        }
        Ok(SessionConfig {
            rows: height_px / cell_size,
            cols: width_px / cell_size,
            ..SessionConfig::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows < MIN_SIDE || self.cols < MIN_SIDE {
            return Err(ConfigError::InvalidGridDimensions {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.tick_rate_ms == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        Ok(())
    }

    pub fn mutator(&self) -> WallMutator {
        WallMutator::new(self.mutations_per_tick, self.reachability_check)
    }
}

/// Read-only view of the engine handed to a renderer between ticks.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub grid: &'a MazeGrid,
    pub agent: Position,
    pub goal: Position,
    pub won: bool,
    pub plan: &'a [Position],
}

/// Owned copy of the engine state, for renderers that outlive a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub grid: MazeGrid,
    pub agent: Position,
    pub goal: Position,
    pub won: bool,
    pub plan: Vec<Position>,
}

/// One play-through: a maze, its mutator, the agent and the random source.
///
/// Each [`tick`](Session::tick) moves walls, then lets the agent act. Once
/// the goal is reached the session freezes.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    seed: u64,
    grid: MazeGrid,
    mutator: WallMutator,
    agent: AgentController,
    rng: StdRng,
    tick: u64,
    last_mutation: MutationReport,
}

impl Session {
    /// Validates `config`, generates the maze and starts the agent in `mode`.
    pub fn new(config: SessionConfig, mode: Mode) -> Result<Self, SessionError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);

        let grid = generator::generate_with_rng(config.rows, config.cols, &mut rng)?;
        Ok(Self::with_grid(config, mode, grid, rng, seed))
    }

    /// Starts a session on a prepared grid, e.g. one parsed from text.
    ///
    /// The agent starts at (1, 1) and the goal is the bottom-right interior
    /// cell; the config's size fields are ignored. The grid must be at least
    /// 3x3 with a closed border, and the tick rate must be valid.
    pub fn from_grid(
        config: SessionConfig,
        mode: Mode,
        grid: MazeGrid,
    ) -> Result<Self, SessionError> {
        if config.tick_rate_ms == 0 {
            return Err(ConfigError::ZeroTickRate.into());
        }
        if grid.width() < MIN_SIDE || grid.height() < MIN_SIDE {
            return Err(GridError::InvalidDimensions {
                width: grid.width(),
                height: grid.height(),
            }
            .into());
        }
        grid.check_border()?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let rng = StdRng::seed_from_u64(seed);
        Ok(Self::with_grid(config, mode, grid, rng, seed))
    }

    fn with_grid(config: SessionConfig, mode: Mode, grid: MazeGrid, rng: StdRng, seed: u64) -> Self {
        let goal = goal_for(grid.width(), grid.height());
        let mut agent = AgentController::new(START, goal, mode);
        agent.begin(&grid);
        info!(
            seed,
            rows = grid.height(),
            cols = grid.width(),
            ?mode,
            "session started"
        );
        Session {
            mutator: config.mutator(),
            config,
            seed,
            grid,
            agent,
            rng,
            tick: 0,
            last_mutation: MutationReport::default(),
        }
    }

    /// Runs one mutate, plan, move cycle. A won session is left untouched.
    pub fn tick(&mut self) -> TickOutcome {
        if self.agent.is_won() {
            return TickOutcome::Finished;
        }
        self.tick += 1;
        self.last_mutation = self.mutator.mutate(
            &mut self.grid,
            self.agent.position(),
            self.agent.goal(),
            &mut self.rng,
        );
        self.agent.tick(&self.grid)
    }

    /// Forwards a directional input to a manual agent.
    pub fn handle_input(&mut self, direction: Direction) -> TickOutcome {
        self.agent.apply_input(direction, &self.grid)
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            grid: &self.grid,
            agent: self.agent.position(),
            goal: self.agent.goal(),
            won: self.agent.is_won(),
            plan: self.agent.remaining_plan(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            grid: self.grid.clone(),
            agent: self.agent.position(),
            goal: self.agent.goal(),
            won: self.agent.is_won(),
            plan: self.agent.remaining_plan().to_vec(),
        }
    }

    pub fn grid(&self) -> &MazeGrid {
        &self.grid
    }

    pub fn agent(&self) -> &AgentController {
        &self.agent
    }

    pub fn status(&self) -> AgentStatus {
        self.agent.status()
    }

    pub fn is_won(&self) -> bool {
        self.agent.is_won()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Seed actually used, including one drawn from entropy.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn last_mutation(&self) -> MutationReport {
        self.last_mutation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SessionConfig {
        SessionConfig {
            rows: 11,
            cols: 15,
            seed: Some(seed),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn default_config_is_a_1500_by_700_window() {
        let config = SessionConfig::default();
        assert_eq!((config.rows, config.cols), (17, 37));
        assert_eq!(
            SessionConfig::from_display(1500, 700, 40).unwrap(),
            config
        );
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn invalid_configs_are_rejected_before_the_session_starts() {
        assert_eq!(
            SessionConfig::from_display(100, 100, 0),
            Err(ConfigError::ZeroCellSize)
        );
        let tiny = SessionConfig::from_display(80, 80, 40).unwrap();
        assert_eq!(
            Session::new(tiny, Mode::Autonomous).err(),
            Some(SessionError::Config(ConfigError::InvalidGridDimensions {
                rows: 2,
                cols: 2
            }))
        );
        let frozen = SessionConfig {
            tick_rate_ms: 0,
            ..config(1)
        };
        assert_eq!(frozen.validate(), Err(ConfigError::ZeroTickRate));
    }

    #[test]
    fn seeded_sessions_replay_identically() {
        let mut a = Session::new(config(42), Mode::Autonomous).unwrap();
        let mut b = Session::new(config(42), Mode::Autonomous).unwrap();
        for _ in 0..50 {
            assert_eq!(a.tick(), b.tick());
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn static_session_wins_in_planned_steps_then_freezes() {
        let static_config = SessionConfig {
            mutations_per_tick: 0,
            ..config(3)
        };
        let mut session = Session::new(static_config, Mode::Autonomous).unwrap();
        let planned = session.view().plan.len() as u64;

        let mut outcome = TickOutcome::Waiting;
        while outcome != TickOutcome::Won {
            outcome = session.tick();
        }
        assert_eq!(session.ticks(), planned);

        let frozen = session.snapshot();
        for _ in 0..10 {
            assert_eq!(session.tick(), TickOutcome::Finished);
        }
        assert_eq!(session.snapshot(), frozen);
    }

    #[test]
    fn from_grid_refuses_broken_grids() {
        use crate::map::{CellState, Grid};

        let leaky = Grid::from_generator(4, 4, |x, _| {
            if x == 0 { CellState::Open } else { CellState::Wall }
        });
        assert_eq!(
            Session::from_grid(config(1), Mode::Autonomous, leaky).err(),
            Some(SessionError::Grid(GridError::OpenBorder { x: 0, y: 0 }))
        );

        let sliver = Grid::from_generator(2, 5, |_, _| CellState::Wall);
        assert_eq!(
            Session::from_grid(config(1), Mode::Autonomous, sliver).err(),
            Some(SessionError::Grid(GridError::InvalidDimensions {
                width: 2,
                height: 5
            }))
        );

        let stalled = SessionConfig {
            tick_rate_ms: 0,
            ..config(1)
        };
        let grid = generator::generate(5, 5, 1).unwrap();
        assert_eq!(
            Session::from_grid(stalled, Mode::Autonomous, grid).err(),
            Some(SessionError::Config(ConfigError::ZeroTickRate))
        );
    }

    #[test]
    fn session_keeps_its_config() {
        let session = Session::new(config(5), Mode::Manual).unwrap();
        assert_eq!(session.config(), &config(5));
        assert_eq!(session.seed(), 5);
        assert_eq!(session.agent().state().mode, Mode::Manual);
    }

    #[test]
    fn manual_session_only_moves_on_input() {
        let mut session = Session::new(config(9), Mode::Manual).unwrap();
        assert_eq!(session.status(), AgentStatus::Manual);
        session.tick();
        assert_eq!(session.view().agent, START);

        // (1, 0) is border wall.
        assert_eq!(session.handle_input(Direction::Up), TickOutcome::Waiting);
        assert_eq!(session.view().agent, START);
    }

    #[test]
    fn mutation_never_buries_the_agent() {
        let mut session = Session::new(config(77), Mode::Autonomous).unwrap();
        let walls = session.grid().wall_count();
        for _ in 0..300 {
            session.tick();
            let view = session.view();
            assert!(view.grid.is_open(view.agent));
            assert!(view.grid.is_open(view.goal));
            assert_eq!(view.grid.wall_count(), walls);
        }
    }
}
