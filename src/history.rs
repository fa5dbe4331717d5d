//! Watch history persisted as a JSON array, oldest entry first.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::youtube::MediaItem;

pub struct HistoryStore {
  path: PathBuf,
  // Serializes read-modify-write appends.
  write_lock: Mutex<()>,
}

impl HistoryStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path, write_lock: Mutex::new(()) }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// History entries, most recent first. A missing file is created empty.
  pub async fn load(&self) -> Result<Vec<MediaItem>> {
    let mut items = self.read_raw().await?;
    items.reverse();
    Ok(items)
  }

  /// Record `item` as viewed now.
  pub async fn append(&self, item: &MediaItem) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let mut items = self.read_raw().await?;
    let mut entry = item.clone();
    entry.viewed_at = Some(chrono::Utc::now().timestamp());
    items.push(entry);

    let body = serde_json::to_vec_pretty(&items)?;
    let partial = self.path.with_extension("json.part");
    tokio::fs::write(&partial, body).await?;
    tokio::fs::rename(&partial, &self.path).await?;
    info!(id = %item.id, title = %item.title, entries = items.len(), "history: recorded view");
    Ok(())
  }

  async fn read_raw(&self) -> Result<Vec<MediaItem>> {
    match tokio::fs::read(&self.path).await {
      Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
      Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        if let Some(dir) = self.path.parent() {
          tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.path, b"[]").await?;
        debug!(path = %self.path.display(), "history: created empty history file");
        Ok(Vec::new())
      }
      Err(e) => Err(e.into()),
    }
  }
}
