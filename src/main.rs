mod app;
mod config;
mod constants;
mod dispatcher;
mod display;
mod enrich;
mod error;
mod graphics;
mod history;
mod input;
mod player;
mod query;
mod registry;
mod session;
mod theme;
mod thumbnail;
mod ui;
mod viewport;
mod youtube;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event as TermEvent, KeyEventKind},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::{Config, Paths};
use display::CliDisplayMode;
use query::{Picker, QueryOptions, Source};
use registry::ProcessRegistry;
use session::Event;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(name = "ytui", author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Browse search results, subscriptions and watch history
  Browse {
    /// Thumbnail drawing: 'auto', 'direct' (half-block) or 'ascii'
    #[arg(short, long, default_value = "auto")]
    display_mode: CliDisplayMode,
  },
  /// Pick a video from a numbered list instead of the full-screen browser
  Query {
    #[command(subcommand)]
    source: QuerySource,
    /// Download the selected video instead of watching it
    #[arg(short, long, global = true)]
    download: bool,
    /// Download directory, overriding the configured one
    #[arg(short = 'o', long, global = true)]
    download_dir: Option<PathBuf>,
    /// List the results again after each selection
    #[arg(long, global = true)]
    keep_open: bool,
  },
  /// Print configured items
  Show {
    #[command(subcommand)]
    target: ShowTarget,
  },
  /// Print shell completions to stdout
  Completions { shell: Shell },
}

#[derive(Subcommand, Debug)]
enum QuerySource {
  /// Search videos by keywords
  Search { text: String },
  /// Latest uploads of the subscribed channels
  Subscribed,
  /// Videos from the watch history
  History,
}

#[derive(Subcommand, Debug)]
enum ShowTarget {
  /// Names and links of the subscribed channels
  Subscribed,
}

impl From<QuerySource> for Source {
  fn from(source: QuerySource) -> Self {
    match source {
      QuerySource::Search { text } => Source::Search(text),
      QuerySource::Subscribed => Source::Subscribed,
      QuerySource::History => Source::History,
    }
  }
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  match args.command {
    Some(Commands::Browse { display_mode }) => browse(display_mode).await,
    Some(Commands::Query { source, download, download_dir, keep_open }) => {
      run_query(source.into(), QueryOptions { download, download_dir, keep_open }).await
    }
    Some(Commands::Show { target: ShowTarget::Subscribed }) => {
      let (_paths, config, _guard) = startup()?;
      query::show_subscribed(&config, &mut std::io::stdout()).await
    }
    Some(Commands::Completions { shell }) => {
      clap_complete::generate(shell, &mut Args::command(), "ytui", &mut std::io::stdout());
      Ok(())
    }
    None => {
      Args::command().print_help()?;
      Ok(())
    }
  }
}

fn init_logging(log_dir: &Path, level: &str) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
  let appender = tracing_appender::rolling::daily(log_dir, "ytui.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .with_context(|| format!("Invalid log_level '{}'", level))?;
  tracing_subscriber::fmt()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .with_env_filter(filter)
    .try_init()
    .map_err(|e| anyhow!("Failed to install logger: {}", e))?;
  Ok(guard)
}

/// Resolve paths, load the config and install the logger.
fn startup() -> Result<(Paths, Config, WorkerGuard)> {
  let paths = Paths::resolve()?;
  let (config, created) = Config::load_or_create(&paths.config_file)?;
  let guard = init_logging(&paths.log_dir, &config.log_level)?;
  info!(version = env!("CARGO_PKG_VERSION"), config = %paths.config_file.display(), "main: starting");
  if created {
    info!(path = %paths.config_file.display(), "config: wrote default configuration");
  }
  Ok((paths, config, guard))
}

async fn run_query(source: Source, options: QueryOptions) -> Result<()> {
  let (paths, config, _guard) = startup()?;
  let registry = ProcessRegistry::new();
  spawn_signal_handler(registry.clone(), false);
  let picker = Picker::from_config(&config, &paths, registry.clone(), &options)?;
  let result = picker.run(&source, &options, &mut std::io::stdin().lock(), &mut std::io::stdout()).await;
  registry.terminate_all();
  result
}

async fn browse(display_mode: CliDisplayMode) -> Result<()> {
  let (paths, config, _guard) = startup()?;

  let display_mode = display::resolve_display_mode(display_mode);
  let registry = ProcessRegistry::new();
  let size = ratatui::crossterm::terminal::size().context("Failed to read the terminal size")?;
  let mut app = App::new(&config, &paths, display_mode, size, registry.clone())?;

  let default_hook = std::panic::take_hook();
  let hook_registry = registry.clone();
  std::panic::set_hook(Box::new(move |info| {
    hook_registry.terminate_all();
    ratatui::restore();
    default_hook(info);
  }));
  spawn_signal_handler(registry, true);

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, &mut app);
  ratatui::restore();
  app.shutdown();
  info!("main: session ended");
  result
}

fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        TermEvent::Key(key) if key.kind == KeyEventKind::Press => app.on_key(key),
        TermEvent::Resize(width, height) => app.handle_event(Event::Resize(width, height)),
        _ => {}
      }
    }

    if app.session.should_quit {
      break;
    }
  }
  Ok(())
}

// --- Signals ---

fn spawn_signal_handler(registry: ProcessRegistry, restore_terminal: bool) {
  tokio::spawn(async move {
    wait_for_signal().await;
    info!("main: signal received, shutting down");
    registry.terminate_all();
    if restore_terminal {
      ratatui::restore();
    }
    std::process::exit(130);
  });
}

#[cfg(unix)]
async fn wait_for_signal() {
  use tokio::signal::unix::{SignalKind, signal};

  let (Ok(mut term), Ok(mut hup)) = (signal(SignalKind::terminate()), signal(SignalKind::hangup())) else {
    let _ = tokio::signal::ctrl_c().await;
    return;
  };
  tokio::select! {
    _ = tokio::signal::ctrl_c() => {}
    _ = term.recv() => {}
    _ = hup.recv() => {}
  }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
  let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_definition_is_valid() {
    Args::command().debug_assert();
  }

  #[test]
  fn browse_takes_a_display_mode() {
    let args = Args::try_parse_from(["ytui", "browse", "--display-mode", "ascii"]).unwrap();
    assert!(matches!(args.command, Some(Commands::Browse { display_mode: CliDisplayMode::Ascii })));
    let args = Args::try_parse_from(["ytui"]).unwrap();
    assert!(args.command.is_none());
    assert!(Args::try_parse_from(["ytui", "browse", "--display-mode", "kitty"]).is_err());
  }

  #[test]
  fn query_flags_apply_to_every_source() {
    let args = Args::try_parse_from(["ytui", "query", "search", "rust lang", "-d", "-o", "/tmp/v"]).unwrap();
    match args.command {
      Some(Commands::Query { source: QuerySource::Search { text }, download, download_dir, keep_open }) => {
        assert_eq!(text, "rust lang");
        assert!(download);
        assert_eq!(download_dir, Some(PathBuf::from("/tmp/v")));
        assert!(!keep_open);
      }
      other => panic!("unexpected {other:?}"),
    }

    let args = Args::try_parse_from(["ytui", "query", "--keep-open", "history"]).unwrap();
    assert!(matches!(args.command, Some(Commands::Query { source: QuerySource::History, keep_open: true, .. })));
    assert!(Args::try_parse_from(["ytui", "query", "search"]).is_err());
  }

  #[test]
  fn show_lists_subscriptions() {
    let args = Args::try_parse_from(["ytui", "show", "subscribed"]).unwrap();
    assert!(matches!(args.command, Some(Commands::Show { target: ShowTarget::Subscribed })));
    let source: Source = QuerySource::Subscribed.into();
    assert_eq!(source, Source::Subscribed);
  }
}
