use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use moving_maze_core::{
    Direction, Mode, Position,
    agent::TickOutcome,
    map::CellState,
    session::{Session, SessionConfig, SessionView},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    layout,
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Auto,
    Manual,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Auto => Mode::Autonomous,
            ModeArg::Manual => Mode::Manual,
        }
    }
}

/// A maze whose walls keep moving while you, or the solver, look for the exit.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML file with session settings; flags below override it
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Grid rows (overrides the display-derived size)
    #[arg(long)]
    rows: Option<usize>,

    /// Grid columns (overrides the display-derived size)
    #[arg(long)]
    cols: Option<usize>,

    /// Display width in pixels, divided by the cell size to get columns
    #[arg(long)]
    display_width: Option<usize>,

    /// Display height in pixels, divided by the cell size to get rows
    #[arg(long)]
    display_height: Option<usize>,

    /// Cell size in pixels
    #[arg(long)]
    cell_size: Option<usize>,

    /// Random seed for a reproducible maze
    #[arg(short, long)]
    seed: Option<u64>,

    /// Wall relocation trials per tick
    #[arg(long)]
    mutations: Option<usize>,

    /// Milliseconds between ticks
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Undo wall moves that cut the agent off from the goal
    #[arg(long)]
    reachability_check: bool,

    /// Skip the menu and start in this mode
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Write logs to this file (filter with RUST_LOG)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

/// Reads a session config from a TOML file.
fn load_config(path: &Path) -> Result<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Merges the config file (if any) with command-line overrides.
fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };

    if args.display_width.is_some() || args.display_height.is_some() || args.cell_size.is_some() {
        let derived = SessionConfig::from_display(
            args.display_width
                .unwrap_or(moving_maze_core::session::DEFAULT_DISPLAY_WIDTH),
            args.display_height
                .unwrap_or(moving_maze_core::session::DEFAULT_DISPLAY_HEIGHT),
            args.cell_size
                .unwrap_or(moving_maze_core::session::DEFAULT_CELL_SIZE),
        )?;
        config.rows = derived.rows;
        config.cols = derived.cols;
    }
    if let Some(rows) = args.rows {
        config.rows = rows;
    }
    if let Some(cols) = args.cols {
        config.cols = cols;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(mutations) = args.mutations {
        config.mutations_per_tick = mutations;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick_rate_ms = tick_ms;
    }
    if args.reachability_check {
        config.reachability_check = true;
    }
    if let Some(mode) = args.mode {
        config.mode = Some(mode.into());
    }

    config.validate()?;
    Ok(config)
}

/// Installs a file-backed subscriber. Without a log file nothing is
/// recorded, since the terminal belongs to the UI.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

enum Screen {
    /// Waiting for the player to pick a mode.
    Menu,
    Playing(Session),
}

struct App {
    config: SessionConfig,
    screen: Screen,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(config: SessionConfig) -> Result<Self> {
        let mut app = App {
            config,
            screen: Screen::Menu,
            should_quit: false,
        };
        if let Some(mode) = app.config.mode {
            app.start(mode)?;
        }
        Ok(app)
    }

    fn start(&mut self, mode: Mode) -> Result<()> {
        let session = Session::new(self.config.clone(), mode).context("Failed to start session")?;
        info!(seed = session.seed(), "replay with --seed {}", session.seed());
        self.screen = Screen::Playing(session);
        Ok(())
    }

    /// A fresh maze in the same mode, with a new seed.
    fn restart(&mut self) -> Result<()> {
        let Screen::Playing(session) = &self.screen else {
            return Ok(());
        };
        let mode = session.agent().mode();
        self.config.seed = None;
        self.start(mode)
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if let Screen::Playing(session) = &mut self.screen {
            if session.tick() == TickOutcome::Won {
                info!(ticks = session.ticks(), "maze solved");
            }
        }
    }

    fn on_key(&mut self, code: KeyCode) -> Result<()> {
        if matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
            self.should_quit = true;
            return Ok(());
        }
        match &mut self.screen {
            Screen::Menu => match code {
                KeyCode::Char('a') | KeyCode::Char('A') => self.start(Mode::Autonomous)?,
                KeyCode::Char('m') | KeyCode::Char('M') => self.start(Mode::Manual)?,
                _ => {}
            },
            Screen::Playing(session) => {
                let direction = match code {
                    KeyCode::Up => Some(Direction::Up),
                    KeyCode::Down => Some(Direction::Down),
                    KeyCode::Left => Some(Direction::Left),
                    KeyCode::Right => Some(Direction::Right),
                    _ => None,
                };
                if let Some(direction) = direction {
                    session.handle_input(direction);
                } else if code == KeyCode::Char('r') && session.is_won() {
                    self.restart()?;
                }
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;
    let config = build_config(&args)?;

    let mut app = App::new(config)?;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app);
    // Restore the terminal even if the loop failed
    restore_terminal(&mut terminal)?;
    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(app.config.tick_rate_ms);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key.code)?;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    match &app.screen {
        Screen::Menu => render_menu(frame, frame.area()),
        Screen::Playing(session) => render_game(frame, session),
    }
}

fn render_menu(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            "Moving Maze",
            Style::default().fg(Color::LightRed).bold(),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Press A for AI Mode",
            Style::default().fg(Color::Yellow),
        )),
        Line::from(Span::styled(
            "Press M for Manual Mode",
            Style::default().fg(Color::LightYellow),
        )),
        Line::from(""),
        Line::from("Press 'q' or 'Esc' to quit."),
    ];
    let menu = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(menu, centered(area, 40, 10));
}

fn render_game(frame: &mut Frame, session: &Session) {
    let main_layout = Layout::default()
        .direction(layout::Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Area for the map
            Constraint::Length(3), // Area for status/help
        ])
        .split(frame.area());

    let view = session.view();
    render_map(frame, main_layout[0], &view);
    render_status(frame, main_layout[1], session);

    if view.won {
        let banner = Paragraph::new(vec![
            Line::from(Span::styled(
                "You Won!",
                Style::default().fg(Color::White).bold(),
            )),
            Line::from("'r' for a new maze, 'q' to quit"),
        ])
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        let area = centered(main_layout[0], 34, 4);
        frame.render_widget(Clear, area);
        frame.render_widget(banner, area);
    }
}

fn render_status(frame: &mut Frame, area: Rect, session: &Session) {
    let agent = session.agent();
    let mutation = session.last_mutation();
    let help = match agent.mode() {
        Mode::Autonomous => "AI mode",
        Mode::Manual => "Manual mode: arrow keys move",
    };
    let text = format!(
        "{} | tick {} | seed {} | pos ({}, {}) | steps {} | replans {} | walls moved {} | 'q' quits",
        help,
        session.ticks(),
        session.seed(),
        agent.position().x,
        agent.position().y,
        agent.steps_taken(),
        agent.replans(),
        mutation.committed,
    );
    let status = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, area);
}

/// Renders the maze, the agent, the goal and the remaining route.
fn render_map(frame: &mut Frame, area: Rect, view: &SessionView) {
    let grid = view.grid;
    let trail: HashSet<Position> = view.plan.iter().copied().collect();

    let mut lines: Vec<Line> = Vec::with_capacity(grid.height());
    for y in 0..grid.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(grid.width());
        for x in 0..grid.width() {
            let pos = Position::new(x, y);
            let span = if pos == view.agent {
                Span::styled("@", Style::default().fg(Color::White).bold())
            } else if pos == view.goal {
                Span::styled("G", Style::default().fg(Color::LightYellow).bold())
            } else {
                match grid.get(pos) {
                    Some(CellState::Wall) => {
                        Span::styled("#", Style::default().fg(Color::LightRed))
                    }
                    _ if trail.contains(&pos) => {
                        Span::styled(".", Style::default().fg(Color::Yellow))
                    }
                    _ => Span::raw(" "),
                }
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Moving Maze").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// A `width` x `height` rectangle centred in `area`, clipped to fit.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
