//! Navigation state machine for the browse session.
//!
//! [`Session::handle`] is the single message-processing point: it takes a key,
//! a resize or a dispatcher [`Message`], updates the view state in place and
//! returns at most one [`Command`] for the dispatcher to run. Nothing here
//! performs I/O.
//!
//! Every load command carries a [`RequestId`] from a monotonic counter. The
//! session remembers the id of the one load it is waiting for and drops any
//! result carrying a different id, so a slow response from an abandoned view
//! can never overwrite the current one.

use ratatui::crossterm::event::KeyEvent;
use std::sync::Arc;
use tracing::debug;

use crate::error::Error;
use crate::input;
use crate::thumbnail::{ThumbKey, Thumbnail};
use crate::viewport::Viewport;
use crate::youtube::MediaItem;

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
  MainMenu,
  SearchResults,
  Subscriptions,
  History,
  SearchInput,
}

impl ViewState {
  pub fn is_collection(self) -> bool {
    matches!(self, ViewState::SearchResults | ViewState::Subscriptions | ViewState::History)
  }

  /// Views whose list may be reordered by publish date.
  pub fn is_sortable(self) -> bool {
    matches!(self, ViewState::Subscriptions | ViewState::History)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuId {
  Search,
  Subscriptions,
  History,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuEntry {
  pub id: MenuId,
  pub label: &'static str,
  pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
  Menu(MenuEntry),
  Media(MediaItem),
}

impl Entry {
  pub fn as_media(&self) -> Option<&MediaItem> {
    match self {
      Entry::Media(m) => Some(m),
      Entry::Menu(_) => None,
    }
  }
}

pub fn main_menu() -> Vec<Entry> {
  vec![
    Entry::Menu(MenuEntry {
      id: MenuId::Search,
      label: "Search Videos",
      description: "Search for videos on YouTube/Invidious",
    }),
    Entry::Menu(MenuEntry {
      id: MenuId::Subscriptions,
      label: "Subscribed Channels",
      description: "Browse videos from your subscribed channels",
    }),
    Entry::Menu(MenuEntry { id: MenuId::History, label: "Watch History", description: "View your watch history" }),
  ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Background work requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Search { request: RequestId, query: String },
  LoadSubscriptions { request: RequestId },
  LoadHistory { request: RequestId },
  RenderThumbnail { key: ThumbKey },
  Play { item: MediaItem, add_to_history: bool },
  Download { item: MediaItem },
  OpenThumbnail { item: MediaItem },
}

/// Outcome of a background unit, delivered back to the session loop.
#[derive(Debug, Clone)]
pub enum Message {
  ItemsLoaded { request: RequestId, items: Vec<MediaItem> },
  SearchCompleted { request: RequestId, items: Vec<MediaItem> },
  ThumbnailReady { key: ThumbKey, thumbnail: Arc<Thumbnail> },
  ThumbnailFailed { key: ThumbKey, error: Error },
  /// `request` is `None` for play, download and viewer failures.
  Failed { request: Option<RequestId>, error: Error },
  Notice(String),
  Fatal(String),
}

#[derive(Debug, Clone)]
pub enum Event {
  Key(KeyEvent),
  Resize(u16, u16),
  Message(Message),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  Info(String),
  Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
  request: RequestId,
  target: ViewState,
}

/// Preferred thumbnail cell size for the detail pane at a terminal size, or
/// `None` when the pane is too short to show one. The detail pane takes the
/// right half of the screen, inside a border and one column of padding.
pub fn thumbnail_size(width: u16, height: u16) -> Option<(u16, u16)> {
  let detail_width = width.saturating_sub(width / 2).saturating_sub(4);
  let max_lines = height.saturating_sub(4);
  if max_lines <= 12 {
    return None;
  }
  Some((detail_width.clamp(30, 50), (max_lines * 9 / 20).clamp(10, 18)))
}

// --- Session ---

pub struct Session {
  pub view: ViewState,
  pub items: Vec<Entry>,
  /// Media items of the current collection in the order they arrived.
  arrival: Vec<MediaItem>,
  pub cursor: usize,
  pub viewport: Viewport,
  pub width: u16,
  pub height: u16,
  pub sort_by_date: bool,
  pub query: String,
  /// Char index of the edit cursor inside `query`.
  pub query_cursor: usize,
  pending: Option<Pending>,
  next_request: u64,
  pub load_error: Option<String>,
  pub status: Option<Status>,
  pub fatal: Option<String>,
  pub should_quit: bool,
  thumbnail_request: Option<ThumbKey>,
  pub thumbnail: Option<Arc<Thumbnail>>,
}

impl Session {
  pub fn new(width: u16, height: u16, sort_by_date: bool) -> Self {
    Self {
      view: ViewState::MainMenu,
      items: main_menu(),
      arrival: Vec::new(),
      cursor: 0,
      viewport: Viewport::new(height),
      width,
      height,
      sort_by_date,
      query: String::new(),
      query_cursor: 0,
      pending: None,
      next_request: 0,
      load_error: None,
      status: None,
      fatal: None,
      should_quit: false,
      thumbnail_request: None,
      thumbnail: None,
    }
  }

  pub fn handle(&mut self, event: Event) -> Option<Command> {
    match event {
      Event::Key(key) => input::handle_key_event(self, key),
      Event::Resize(width, height) => self.resize(width, height),
      Event::Message(message) => self.apply(message),
    }
  }

  pub fn is_loading(&self) -> bool {
    self.pending.is_some()
  }

  pub fn pending_request(&self) -> Option<RequestId> {
    self.pending.map(|p| p.request)
  }

  /// The media item under the cursor, if any.
  pub fn current_item(&self) -> Option<&MediaItem> {
    if !self.view.is_collection() {
      return None;
    }
    self.items.get(self.cursor).and_then(Entry::as_media)
  }

  // --- Navigation ---

  fn after_move(&mut self) -> Option<Command> {
    self.viewport.recompute(self.cursor, self.height);
    self.thumbnail_command()
  }

  pub(crate) fn move_up(&mut self) -> Option<Command> {
    if self.cursor == 0 {
      return None;
    }
    self.cursor -= 1;
    self.after_move()
  }

  pub(crate) fn move_down(&mut self) -> Option<Command> {
    if self.cursor + 1 >= self.items.len() {
      return None;
    }
    self.cursor += 1;
    self.after_move()
  }

  pub(crate) fn page_up(&mut self) -> Option<Command> {
    if self.items.is_empty() {
      return None;
    }
    self.viewport.recompute(self.cursor, self.height);
    self.cursor = self.viewport.page_up(self.cursor);
    self.after_move()
  }

  pub(crate) fn page_down(&mut self) -> Option<Command> {
    if self.items.is_empty() {
      return None;
    }
    self.viewport.recompute(self.cursor, self.height);
    self.cursor = self.viewport.page_down(self.cursor, self.items.len());
    self.after_move()
  }

  pub(crate) fn jump_to_top(&mut self) -> Option<Command> {
    if self.items.is_empty() {
      return None;
    }
    self.cursor = self.viewport.jump_to_top();
    self.after_move()
  }

  pub(crate) fn jump_to_bottom(&mut self) -> Option<Command> {
    if self.items.is_empty() {
      return None;
    }
    self.viewport.recompute(self.cursor, self.height);
    self.cursor = self.viewport.jump_to_bottom(self.items.len());
    self.after_move()
  }

  fn resize(&mut self, width: u16, height: u16) -> Option<Command> {
    self.width = width;
    self.height = height;
    self.after_move()
  }

  // --- Transitions ---

  fn next_request(&mut self, target: ViewState) -> RequestId {
    self.next_request += 1;
    let request = RequestId(self.next_request);
    self.pending = Some(Pending { request, target });
    request
  }

  fn replace_items(&mut self, items: Vec<Entry>) {
    self.items = items;
    self.cursor = 0;
    self.viewport.reset();
    self.viewport.recompute(0, self.height);
  }

  fn enter_loading(&mut self, view: ViewState) -> RequestId {
    self.view = view;
    self.arrival.clear();
    self.replace_items(Vec::new());
    self.load_error = None;
    self.clear_thumbnail();
    self.next_request(view)
  }

  /// Activate the entry under the cursor.
  pub(crate) fn select(&mut self) -> Option<Command> {
    match self.items.get(self.cursor)?.clone() {
      Entry::Menu(entry) => match entry.id {
        MenuId::Search => self.open_search(),
        MenuId::Subscriptions => {
          let request = self.enter_loading(ViewState::Subscriptions);
          Some(Command::LoadSubscriptions { request })
        }
        MenuId::History => {
          let request = self.enter_loading(ViewState::History);
          Some(Command::LoadHistory { request })
        }
      },
      Entry::Media(_) => self.play_current(true),
    }
  }

  pub(crate) fn open_search(&mut self) -> Option<Command> {
    self.view = ViewState::SearchInput;
    self.query.clear();
    self.query_cursor = 0;
    self.pending = None;
    None
  }

  pub(crate) fn submit_search(&mut self) -> Option<Command> {
    let query = self.query.trim().to_string();
    if query.is_empty() {
      return None;
    }
    let request = self.enter_loading(ViewState::SearchResults);
    debug!(query = %query, request = request.0, "session: search submitted");
    Some(Command::Search { request, query })
  }

  /// Leave the current view for the main menu. Quits from the main menu
  /// itself when `quit_on_menu` is set.
  pub(crate) fn back(&mut self, quit_on_menu: bool) -> Option<Command> {
    if self.view == ViewState::MainMenu {
      if quit_on_menu {
        self.should_quit = true;
      }
      return None;
    }
    self.view = ViewState::MainMenu;
    self.pending = None;
    self.load_error = None;
    self.arrival.clear();
    self.query.clear();
    self.query_cursor = 0;
    self.clear_thumbnail();
    self.replace_items(main_menu());
    None
  }

  pub(crate) fn toggle_sort(&mut self) -> Option<Command> {
    if !self.view.is_sortable() {
      return None;
    }
    self.sort_by_date = !self.sort_by_date;
    let ordered = self.ordered(self.arrival.clone());
    self.replace_items(ordered);
    self.thumbnail_command()
  }

  pub(crate) fn quit(&mut self) -> Option<Command> {
    self.should_quit = true;
    None
  }

  // --- Actions on the selected item ---

  pub(crate) fn play_current(&mut self, add_to_history: bool) -> Option<Command> {
    let item = self.current_item()?.clone();
    self.status = Some(Status::Info(format!("Playing: {}", item.title)));
    Some(Command::Play { item, add_to_history })
  }

  pub(crate) fn download_current(&mut self) -> Option<Command> {
    let item = self.current_item()?.clone();
    self.status = Some(Status::Info(format!("Downloading: {}", item.title)));
    Some(Command::Download { item })
  }

  pub(crate) fn open_thumbnail(&mut self) -> Option<Command> {
    let item = self.current_item()?.clone();
    Some(Command::OpenThumbnail { item })
  }

  // --- Results ---

  /// Apply the session's sort mode to a freshly loaded or re-sorted list.
  fn ordered(&self, mut items: Vec<MediaItem>) -> Vec<Entry> {
    if self.sort_by_date && self.view.is_sortable() {
      items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    }
    items.into_iter().map(Entry::Media).collect()
  }

  /// Whether a result tagged `request` is the one the session waits for.
  fn take_pending(&mut self, request: RequestId) -> Option<ViewState> {
    match self.pending {
      Some(p) if p.request == request => {
        self.pending = None;
        Some(p.target)
      }
      _ => {
        debug!(request = request.0, pending = ?self.pending_request(), "session: discarding stale result");
        None
      }
    }
  }

  fn apply(&mut self, message: Message) -> Option<Command> {
    if self.fatal.is_some() {
      return None;
    }
    match message {
      Message::ItemsLoaded { request, items } | Message::SearchCompleted { request, items } => {
        let target = self.take_pending(request)?;
        self.view = target;
        self.load_error = None;
        self.arrival = items.clone();
        let ordered = self.ordered(items);
        self.replace_items(ordered);
        self.thumbnail_command()
      }
      Message::ThumbnailReady { key, thumbnail } => {
        if self.thumbnail_request.as_ref() == Some(&key) {
          self.thumbnail = Some(thumbnail);
        }
        None
      }
      Message::ThumbnailFailed { key, error } => {
        if self.thumbnail_request.as_ref() == Some(&key) {
          debug!(id = %key.id, err = %error, "session: rendering without thumbnail");
          self.thumbnail = None;
        }
        None
      }
      Message::Failed { request: Some(request), error } => {
        self.take_pending(request)?;
        self.load_error = Some(format!("Failed to load: {}", error));
        None
      }
      Message::Failed { request: None, error } => {
        self.status = Some(Status::Error(error.to_string()));
        None
      }
      Message::Notice(text) => {
        self.status = Some(Status::Info(text));
        None
      }
      Message::Fatal(reason) => {
        self.pending = None;
        self.fatal = Some(reason);
        None
      }
    }
  }

  // --- Thumbnails ---

  fn clear_thumbnail(&mut self) {
    self.thumbnail_request = None;
    self.thumbnail = None;
  }

  /// Request a thumbnail for the item under the cursor unless the same one is
  /// already requested.
  fn thumbnail_command(&mut self) -> Option<Command> {
    let wanted = match (self.current_item(), thumbnail_size(self.width, self.height)) {
      (Some(item), Some((w, h))) => ThumbKey::clamped(&item.id, w, h),
      _ => {
        self.clear_thumbnail();
        return None;
      }
    };
    if self.thumbnail_request.as_ref() == Some(&wanted) {
      return None;
    }
    if self.thumbnail_request.as_ref().is_none_or(|k| k.id != wanted.id) {
      self.thumbnail = None;
    }
    self.thumbnail_request = Some(wanted.clone());
    Some(Command::RenderThumbnail { key: wanted })
  }
}
