mod app;
mod config;
mod control;
mod coordinator;
mod event;
mod sampler;
mod selection;
mod ui;
mod view;

use std::fs::File;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::mpsc::channel;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use app::App;
use config::{Config, SortMode, Theme};
use control::{ProcessController, SudoEscalation};
use coordinator::RefreshCoordinator;
use event::Event;
use sampler::SystemSampler;

#[derive(Debug, Parser)]
#[command(name = "procwatch", about = "Interactive TUI process dashboard", version)]
pub struct Cli {
    /// optional process name filter applied on startup.
    #[arg(value_name = "FILTER")]
    pub filter: Option<String>,

    /// default metric used to sort the process table.
    #[arg(long = "sort-by", value_enum, default_value_t = SortMode::Cpu)]
    pub sort_by: SortMode,

    /// theme selection for the tui.
    #[arg(long = "theme", value_enum, default_value_t = Theme::Slate)]
    pub theme: Theme,

    /// refresh interval in milliseconds.
    #[arg(long = "refresh-rate", value_name = "ms", default_value_t = 2000)]
    pub refresh_rate: u64,

    /// start with the periodic refresh paused.
    #[arg(long = "no-auto-refresh")]
    pub no_auto_refresh: bool,

    /// write debug logs to this file (the terminal itself is unusable for
    /// logging while the dashboard is drawn on it).
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = Config {
        theme: args.theme,
        refresh_rate_ms: args.refresh_rate,
        initial_filter: args.filter,
        initial_sort: args.sort_by,
        auto_refresh: !args.no_auto_refresh,
        log_file: args.log_file,
    };

    init_logging(&config)?;

    let (tx, rx) = channel();

    let coordinator = RefreshCoordinator::start(SystemSampler::new(), tx.clone(), &config);
    let controller = ProcessController::new(Box::new(SudoEscalation));

    event::spawn_input_thread(tx.clone());
    let quit_tx = tx;
    ctrlc::set_handler(move || {
        let _ = quit_tx.send(Event::Quit);
    })
    .context("installing signal handler")?;

    let mut terminal = setup_terminal()?;
    let result = App::new(&config, coordinator, controller).run(&mut terminal, rx);
    restore_terminal(&mut terminal)?;
    result
}

fn init_logging(config: &Config) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    WriteLogger::init(LevelFilter::Debug, log_config, file)
        .context("initializing logger")?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("creating terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leaving alternate screen")?;
    terminal.show_cursor().context("restoring cursor")?;
    Ok(())
}
