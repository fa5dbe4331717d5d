//! Runs session commands off the event loop.
//!
//! Each [`Command`] becomes its own tokio task and reports back with exactly
//! one [`Message`] on the session channel (play commands report only on
//! failure). A supervisor task watches every unit and turns a panic into
//! [`Message::Fatal`] instead of losing the result silently.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::enrich::{DescriptionCache, RetryPolicy};
use crate::error::Error;
use crate::history::HistoryStore;
use crate::player::Launcher;
use crate::registry::ProcessRegistry;
use crate::session::{Command, Message, RequestId};
use crate::thumbnail::ThumbnailCache;
use crate::youtube::{MediaItem, VideoIndex};

/// Collaborators the dispatcher drives besides the remote index.
pub struct Services {
  pub thumbnails: ThumbnailCache,
  pub launcher: Launcher,
  pub history: HistoryStore,
  pub history_enabled: bool,
  pub channels: Vec<String>,
}

struct Shared<I> {
  index: Arc<I>,
  tx: mpsc::UnboundedSender<Message>,
  descriptions: DescriptionCache,
  services: Services,
  retry: RetryPolicy,
  /// Id of the most recently dispatched load.
  latest_load: AtomicU64,
  prefetch: Mutex<Option<JoinHandle<()>>>,
}

pub struct Dispatcher<I> {
  shared: Arc<Shared<I>>,
}

impl<I: VideoIndex> Dispatcher<I> {
  pub fn new(index: Arc<I>, services: Services, tx: mpsc::UnboundedSender<Message>) -> Self {
    Self::with_retry(index, services, tx, RetryPolicy::default())
  }

  pub fn with_retry(
    index: Arc<I>,
    services: Services,
    tx: mpsc::UnboundedSender<Message>,
    retry: RetryPolicy,
  ) -> Self {
    Self {
      shared: Arc::new(Shared {
        index,
        tx,
        descriptions: DescriptionCache::new(),
        services,
        retry,
        latest_load: AtomicU64::new(0),
        prefetch: Mutex::new(None),
      }),
    }
  }

  pub fn descriptions(&self) -> &DescriptionCache {
    &self.shared.descriptions
  }

  pub fn registry(&self) -> &ProcessRegistry {
    self.shared.services.launcher.registry()
  }

  /// Start `command` in the background. Never blocks.
  pub fn dispatch(&self, command: Command) {
    if let Command::Search { request, .. } | Command::LoadSubscriptions { request } | Command::LoadHistory { request } =
      &command
    {
      self.shared.latest_load.store(request.0, Ordering::SeqCst);
    }
    debug!(command = ?command, "dispatcher: starting unit");

    let shared = Arc::clone(&self.shared);
    let unit = tokio::spawn(async move { shared.run(command).await });

    let tx = self.shared.tx.clone();
    tokio::spawn(async move {
      if let Err(e) = unit.await
        && e.is_panic()
      {
        error!(err = %e, "dispatcher: background unit panicked");
        let _ = tx.send(Message::Fatal(format!("A background task crashed: {}", e)));
      }
    });
  }

  /// Stop the description prefetch and kill every external process.
  pub fn shutdown(&self) {
    if let Some(prefetch) = self.shared.prefetch.lock().take() {
      prefetch.abort();
    }
    self.registry().terminate_all();
  }
}

impl<I: VideoIndex> Shared<I> {
  fn send(&self, message: Message) {
    if self.tx.send(message).is_err() {
      debug!("dispatcher: session loop gone, dropping message");
    }
  }

  async fn run(&self, command: Command) {
    match command {
      Command::Search { request, query } => {
        let result = self.index.search(&query).await;
        self.finish_load(request, result, |items| Message::SearchCompleted { request, items });
      }
      Command::LoadSubscriptions { request } => {
        let channels = &self.services.channels;
        let result = if channels.is_empty() { Ok(Vec::new()) } else { self.index.collection_videos(channels).await };
        self.finish_load(request, result, |items| Message::ItemsLoaded { request, items });
      }
      Command::LoadHistory { request } => {
        let result = self.services.history.load().await;
        self.finish_load(request, result, |items| Message::ItemsLoaded { request, items });
      }
      Command::RenderThumbnail { key } => {
        match self.services.thumbnails.get(self.index.as_ref(), &key.id, key.width, key.height).await {
          Ok(thumbnail) => self.send(Message::ThumbnailReady { key, thumbnail }),
          Err(error) => {
            debug!(id = %key.id, err = %error, "dispatcher: thumbnail unavailable");
            self.send(Message::ThumbnailFailed { key, error });
          }
        }
      }
      Command::Play { item, add_to_history } => self.play(item, add_to_history).await,
      Command::Download { item } => self.download(item).await,
      Command::OpenThumbnail { item } => self.open_thumbnail(item).await,
    }
  }

  fn finish_load(
    &self,
    request: RequestId,
    result: crate::error::Result<Vec<MediaItem>>,
    loaded: impl FnOnce(Vec<MediaItem>) -> Message,
  ) {
    match result {
      Ok(items) => {
        info!(request = request.0, count = items.len(), "dispatcher: load finished");
        self.start_prefetch(request, &items);
        self.send(loaded(items));
      }
      Err(error) => {
        warn!(request = request.0, kind = error.kind(), err = %error, "dispatcher: load failed");
        self.send(Message::Failed { request: Some(request), error });
      }
    }
  }

  /// Replace the running description prefetch with one for `items`, unless a
  /// newer load has been dispatched since `request`.
  fn start_prefetch(&self, request: RequestId, items: &[MediaItem]) {
    if self.latest_load.load(Ordering::SeqCst) != request.0 || self.descriptions.covers(items) {
      return;
    }
    let descriptions = self.descriptions.clone();
    let index = Arc::clone(&self.index);
    let items = items.to_vec();
    let retry = self.retry;
    let handle = tokio::spawn(async move { descriptions.fill(items, index, retry).await });
    if let Some(previous) = self.prefetch.lock().replace(handle) {
      previous.abort();
    }
  }

  async fn play(&self, item: MediaItem, add_to_history: bool) {
    let handle = match self.services.launcher.play(&item) {
      Ok(handle) => handle,
      Err(error) => {
        warn!(id = %item.id, err = %error, "dispatcher: play failed");
        self.send(Message::Failed { request: None, error });
        return;
      }
    };

    // History is written once the player is running, before it is reaped.
    if add_to_history
      && self.services.history_enabled
      && let Err(error) = self.services.history.append(&item).await
    {
      warn!(id = %item.id, err = %error, "dispatcher: failed to record history");
      self.send(Message::Failed { request: None, error });
    }

    match handle.wait().await {
      Ok(status) => info!(id = %item.id, status = %status, "dispatcher: player exited"),
      Err(e) => warn!(id = %item.id, err = %e, "dispatcher: failed to reap player"),
    }
  }

  async fn download(&self, item: MediaItem) {
    let outcome = match self.services.launcher.download(&item).await {
      Ok(handle) => handle.wait().await,
      Err(error) => Err(error),
    };
    match outcome {
      Ok(status) if status.success() => {
        info!(id = %item.id, "dispatcher: download finished");
        self.send(Message::Notice(format!("Downloaded: {}", item.title)));
      }
      Ok(status) => {
        let error = Error::Process(format!("download exited with {}", status));
        warn!(id = %item.id, err = %error, "dispatcher: download failed");
        self.send(Message::Failed { request: None, error });
      }
      Err(error) => {
        warn!(id = %item.id, err = %error, "dispatcher: download failed");
        self.send(Message::Failed { request: None, error });
      }
    }
  }

  async fn open_thumbnail(&self, item: MediaItem) {
    let opened = match self.services.thumbnails.ensure_source(self.index.as_ref(), &item.id).await {
      Ok(path) => self.services.launcher.open_image(&path),
      Err(error) => Err(error),
    };
    match opened {
      Ok(handle) => {
        if let Err(e) = handle.wait().await {
          warn!(id = %item.id, err = %e, "dispatcher: failed to reap image viewer");
        }
      }
      Err(error) => {
        warn!(id = %item.id, err = %error, "dispatcher: cannot open thumbnail");
        self.send(Message::Failed { request: None, error });
      }
    }
  }
}
