use anyhow::{Context, Result};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{Config, Paths};
use crate::dispatcher::{Dispatcher, Services};
use crate::display::DisplayMode;
use crate::history::HistoryStore;
use crate::player::Launcher;
use crate::registry::ProcessRegistry;
use crate::session::{Event, Message, Session};
use crate::theme::{THEMES, Theme, theme_index};
use crate::thumbnail::ThumbnailCache;
use crate::youtube::InvidiousClient;

// --- App State ---

/// Terminal shell around the session: owns the dispatcher and the receiving
/// end of its message channel, plus presentation-only state.
pub struct App {
  pub session: Session,
  pub dispatcher: Dispatcher<InvidiousClient>,
  rx: mpsc::UnboundedReceiver<Message>,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  pub input_scroll: usize,
}

impl App {
  pub fn new(
    config: &Config,
    paths: &Paths,
    display_mode: DisplayMode,
    (width, height): (u16, u16),
    registry: ProcessRegistry,
  ) -> Result<Self> {
    let index = InvidiousClient::new(&config.invidious.instance, config.invidious.proxy.as_deref())
      .context("Failed to set up the Invidious client")?;
    let services = Services {
      thumbnails: ThumbnailCache::new(paths.thumbnail_dir.clone(), std::env::temp_dir()),
      launcher: Launcher::new(registry, config.download_dir.clone(), config.image_viewer.clone())
        .with_programs(config.player.clone(), config.downloader.clone()),
      history: HistoryStore::new(paths.history_file.clone()),
      history_enabled: config.history.enable,
      channels: config.channels.subscribed.clone(),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    info!(
      instance = %config.invidious.instance,
      channels = services.channels.len(),
      history = %services.history.path().display(),
      "app: session ready"
    );

    Ok(Self {
      session: Session::new(width, height, config.sort_by_date),
      dispatcher: Dispatcher::new(Arc::new(index), services, tx),
      rx,
      theme_index: theme_index(config.theme.as_deref()),
      display_mode,
      input_scroll: 0,
    })
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    debug!(theme = self.theme().name, "app: theme changed");
  }

  /// Feed an event to the session and start whatever it asks for.
  pub fn handle_event(&mut self, event: Event) {
    if let Some(command) = self.session.handle(event) {
      self.dispatcher.dispatch(command);
    }
  }

  pub fn on_key(&mut self, key: KeyEvent) {
    if key.kind == KeyEventKind::Press
      && key.modifiers.contains(KeyModifiers::CONTROL)
      && key.code == KeyCode::Char('t')
    {
      self.next_theme();
      return;
    }
    self.handle_event(Event::Key(key));
  }

  /// Drain every message the background units have reported since the last tick.
  pub fn check_pending(&mut self) {
    while let Ok(message) = self.rx.try_recv() {
      self.handle_event(Event::Message(message));
    }
  }

  pub fn shutdown(&self) {
    self.dispatcher.shutdown();
  }
}
