//! Pricehouse dashboard binary.
//!
//! Opens the store named in the config, then runs the render / input loop
//! until `q`. Logs go to `dashboard.log` beside the database.

use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use pricehouse_core::config::DEFAULT_CONFIG_FILE;
use pricehouse_core::logging::{init_logging, LogConfig};
use pricehouse_core::{PricehouseConfig, Warehouse};
use pricehouse_tui::{input, ui, AppState};

#[derive(Parser)]
#[command(
    name = "pricehouse-dashboard",
    about = "Terminal dashboard over the pricehouse analytics view"
)]
struct Cli {
    /// Path to the TOML config file. Defaults apply when it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PricehouseConfig::load_or_default(&cli.config)?;
    init_logging(LogConfig::from_env().to_file(log_path(&config.store.path)))?;

    let store = Warehouse::from_config(&config.store)?;
    tracing::info!(store = %store.location(), "dashboard starting");
    let mut app = AppState::new(store, config.dashboard.histogram_bins);
    app.reload();

    // Install a panic hook that restores the terminal before printing the panic.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stderr(), LeaveAlternateScreen);
        default_hook(info);
    }));

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.into_store().close()?;
    tracing::info!("dashboard stopped");
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        // 50ms poll timeout for a ~20 FPS tick.
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                input::handle_key(app, key);
            }
        }

        if !app.running {
            break;
        }
    }
    Ok(())
}

fn log_path(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("dashboard.log"), |dir| dir.join("dashboard.log"))
}
