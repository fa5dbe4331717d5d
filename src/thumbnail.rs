//! Rendered thumbnail cache.
//!
//! Artifacts are keyed by `(item id, width, height)` in terminal cells and
//! stored as an RGB bitmap two pixel rows per cell, ready for the half-block
//! widget. A bounded memory map sits in front of an unbounded PNG directory.
//! When the memory map reaches its ceiling it is cleared wholesale; the disk
//! cache still answers later lookups.

use image::{DynamicImage, ImageFormat, RgbImage, imageops::FilterType};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::error::{Error, Result};
use crate::youtube::{VideoIndex, thumbnail_urls};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbKey {
  pub id: String,
  pub width: u16,
  pub height: u16,
}

impl ThumbKey {
  /// Key with dimensions clamped into the supported bounds.
  pub fn clamped(id: &str, width: u16, height: u16) -> Self {
    let c = constants();
    Self {
      id: id.to_string(),
      width: width.clamp(c.thumbnail_min_width, c.thumbnail_max_width),
      height: height.clamp(c.thumbnail_min_height, c.thumbnail_max_height),
    }
  }

  fn file_name(&self) -> String {
    format!("{}_{}x{}.png", sanitize(&self.id), self.width, self.height)
  }
}

/// Video IDs are URL-safe base64, but history files are user-editable.
fn sanitize(id: &str) -> String {
  id.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

/// A thumbnail scaled for a `width x height` cell area.
#[derive(Debug, Clone)]
pub struct Thumbnail {
  pub width: u16,
  pub height: u16,
  /// `width` x `2 * height` pixels.
  pub image: RgbImage,
}

pub struct ThumbnailCache {
  memory: RwLock<HashMap<ThumbKey, Arc<Thumbnail>>>,
  /// Source downloads in progress, one per item id.
  inflight: Mutex<HashMap<String, Arc<OnceCell<PathBuf>>>>,
  disk_dir: PathBuf,
  source_dir: PathBuf,
}

impl ThumbnailCache {
  pub fn new(disk_dir: PathBuf, source_dir: PathBuf) -> Self {
    Self { memory: RwLock::new(HashMap::new()), inflight: Mutex::new(HashMap::new()), disk_dir, source_dir }
  }

  /// Memory-only lookup for the render path.
  pub fn peek(&self, key: &ThumbKey) -> Option<Arc<Thumbnail>> {
    self.memory.read().get(key).cloned()
  }

  #[cfg(test)]
  pub fn memory_len(&self) -> usize {
    self.memory.read().len()
  }

  fn remember(&self, key: ThumbKey, thumb: Arc<Thumbnail>) {
    let mut memory = self.memory.write();
    if memory.len() >= constants().thumbnail_memory_ceiling {
      debug!(entries = memory.len(), "thumbnail: memory cache full, clearing");
      memory.clear();
    }
    memory.insert(key, thumb);
  }

  fn disk_path(&self, key: &ThumbKey) -> PathBuf {
    self.disk_dir.join(key.file_name())
  }

  /// Downloaded source image for an item, shared by every size of it.
  pub fn source_path(&self, id: &str) -> PathBuf {
    self.source_dir.join(format!("ytui_img_{}.jpg", sanitize(id)))
  }

  /// Rendered thumbnail for an item, fetching and converting on a miss.
  pub async fn get<I: VideoIndex>(&self, index: &I, id: &str, width: u16, height: u16) -> Result<Arc<Thumbnail>> {
    let key = ThumbKey::clamped(id, width, height);
    if let Some(hit) = self.peek(&key) {
      return Ok(hit);
    }

    let disk_path = self.disk_path(&key);
    if let Ok(bytes) = tokio::fs::read(&disk_path).await {
      match decode_cached(bytes, key.width, key.height).await {
        Ok(thumb) => {
          debug!(id, path = %disk_path.display(), "thumbnail: disk hit");
          let thumb = Arc::new(thumb);
          self.remember(key, Arc::clone(&thumb));
          return Ok(thumb);
        }
        Err(e) => warn!(path = %disk_path.display(), err = %e, "thumbnail: discarding unreadable disk entry"),
      }
    }

    let source = self.ensure_source(index, id).await?;
    let bytes = tokio::fs::read(&source).await?;
    let (thumb, png) = match render(bytes, key.width, key.height).await {
      Ok(rendered) => rendered,
      Err(e) => {
        let _ = tokio::fs::remove_file(&source).await;
        return Err(e);
      }
    };

    if let Err(e) = write_atomic(&disk_path, &png).await {
      warn!(path = %disk_path.display(), err = %e, "thumbnail: failed to write disk cache");
    }
    let thumb = Arc::new(thumb);
    self.remember(key, Arc::clone(&thumb));
    Ok(thumb)
  }

  /// Make sure the source image for `id` is on disk, downloading it once.
  /// Callers that overlap an in-progress download wait for it instead of
  /// fetching again; a failed download leaves the next caller free to retry.
  pub async fn ensure_source<I: VideoIndex>(&self, index: &I, id: &str) -> Result<PathBuf> {
    let path = self.source_path(id);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
      return Ok(path);
    }

    let cell = Arc::clone(self.inflight.lock().entry(id.to_string()).or_default());
    let result = cell.get_or_try_init(|| self.download_source(index, id, path)).await.cloned();

    let mut inflight = self.inflight.lock();
    if inflight.get(id).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
      inflight.remove(id);
    }
    result
  }

  async fn download_source<I: VideoIndex>(&self, index: &I, id: &str, path: PathBuf) -> Result<PathBuf> {
    let mut last_err = Error::Network(format!("no thumbnail available for {}", id));
    for url in thumbnail_urls(id) {
      match index.fetch_image(&url).await {
        Ok(bytes) => {
          write_atomic(&path, &bytes).await?;
          debug!(id, url = %url, "thumbnail: source downloaded");
          return Ok(path);
        }
        Err(e) => {
          debug!(id, url = %url, err = %e, "thumbnail: variant unavailable");
          last_err = e;
        }
      }
    }
    Err(last_err)
  }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
  if let Some(dir) = path.parent() {
    tokio::fs::create_dir_all(dir).await?;
  }
  static WRITES: AtomicU64 = AtomicU64::new(0);
  let partial = path.with_extension(format!("{}.part", WRITES.fetch_add(1, Ordering::Relaxed)));
  tokio::fs::write(&partial, bytes).await?;
  tokio::fs::rename(&partial, path).await?;
  Ok(())
}

fn join_error(e: tokio::task::JoinError) -> Error {
  Error::Image(format!("image worker failed: {}", e))
}

async fn decode_cached(bytes: Vec<u8>, width: u16, height: u16) -> Result<Thumbnail> {
  tokio::task::spawn_blocking(move || {
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgb8();
    Ok(Thumbnail { width, height, image })
  })
  .await
  .map_err(join_error)?
}

/// Decode a source image, scale it to fill the cell area, and encode the
/// result as PNG for the disk cache.
async fn render(bytes: Vec<u8>, width: u16, height: u16) -> Result<(Thumbnail, Vec<u8>)> {
  tokio::task::spawn_blocking(move || {
    let source = image::load_from_memory(&bytes)?;
    let scaled = source.resize_to_fill(width as u32, height as u32 * 2, FilterType::Triangle).to_rgb8();
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(scaled.clone()).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok((Thumbnail { width, height, image: scaled }, png))
  })
  .await
  .map_err(join_error)?
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::youtube::{MediaItem, VideoDetail};
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
  }

  /// Serves one image for the `hqdefault` variant only.
  struct ImageIndex {
    fetches: AtomicUsize,
    body: Option<Vec<u8>>,
    latency: Duration,
  }

  impl ImageIndex {
    fn new(body: Option<Vec<u8>>) -> Self {
      Self { fetches: AtomicUsize::new(0), body, latency: Duration::ZERO }
    }
  }

  impl VideoIndex for ImageIndex {
    async fn search(&self, _query: &str) -> Result<Vec<MediaItem>> {
      Ok(Vec::new())
    }

    async fn collection_videos(&self, _channel_ids: &[String]) -> Result<Vec<MediaItem>> {
      Ok(Vec::new())
    }

    async fn video_detail(&self, _video_id: &str) -> Result<VideoDetail> {
      Ok(VideoDetail::default())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
      self.fetches.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(self.latency).await;
      match &self.body {
        Some(body) if url.ends_with("hqdefault.jpg") => Ok(body.clone()),
        _ => Err(Error::Upstream { status: 404, message: url.to_string() }),
      }
    }
  }

  fn cache(dir: &Path) -> ThumbnailCache {
    ThumbnailCache::new(dir.join("thumbs"), dir.join("src"))
  }

  #[test]
  fn dimensions_are_clamped() {
    let c = constants();
    let key = ThumbKey::clamped("x", 1, 500);
    assert_eq!(key.width, c.thumbnail_min_width);
    assert_eq!(key.height, c.thumbnail_max_height);
    let key = ThumbKey::clamped("x", 40, 12);
    assert_eq!((key.width, key.height), (40, 12));
  }

  #[test]
  fn file_names_are_sanitized() {
    let key = ThumbKey::clamped("../evil", 40, 12);
    assert_eq!(key.file_name(), "___evil_40x12.png");
  }

  #[test]
  fn memory_is_cleared_wholesale_at_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let ceiling = constants().thumbnail_memory_ceiling;
    let thumb = Arc::new(Thumbnail { width: 1, height: 1, image: RgbImage::new(1, 2) });
    for i in 0..ceiling {
      cache.remember(ThumbKey::clamped(&i.to_string(), 30, 10), Arc::clone(&thumb));
    }
    assert_eq!(cache.memory_len(), ceiling);
    cache.remember(ThumbKey::clamped("overflow", 30, 10), thumb);
    assert_eq!(cache.memory_len(), 1);
    assert!(cache.peek(&ThumbKey::clamped("overflow", 30, 10)).is_some());
  }

  #[tokio::test]
  async fn miss_fetches_once_then_serves_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let index = ImageIndex::new(Some(png_bytes(64, 36)));

    let thumb = cache.get(&index, "vid", 30, 10).await.unwrap();
    assert_eq!((thumb.width, thumb.height), (30, 10));
    assert_eq!(thumb.image.dimensions(), (30, 20));
    // maxres and sd variants 404 before hq succeeds.
    assert_eq!(index.fetches.load(Ordering::SeqCst), 3);
    assert!(cache.disk_path(&ThumbKey::clamped("vid", 30, 10)).exists());

    cache.get(&index, "vid", 30, 10).await.unwrap();
    assert_eq!(index.fetches.load(Ordering::SeqCst), 3);

    cache.memory.write().clear();
    let from_disk = cache.get(&index, "vid", 30, 10).await.unwrap();
    assert_eq!(from_disk.image.dimensions(), (30, 20));
    assert_eq!(index.fetches.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn other_sizes_reuse_the_downloaded_source() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let index = ImageIndex::new(Some(png_bytes(64, 36)));

    cache.get(&index, "vid", 30, 10).await.unwrap();
    let before = index.fetches.load(Ordering::SeqCst);
    let bigger = cache.get(&index, "vid", 50, 18).await.unwrap();
    assert_eq!(bigger.image.dimensions(), (50, 36));
    assert_eq!(index.fetches.load(Ordering::SeqCst), before);
  }

  #[tokio::test]
  async fn fetch_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let index = ImageIndex::new(None);
    let err = cache.get(&index, "gone", 30, 10).await.unwrap_err();
    assert_eq!(err.kind(), "upstream");
    assert_eq!(cache.memory_len(), 0);
  }

  #[tokio::test]
  async fn undecodable_source_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let index = ImageIndex::new(Some(b"not an image".to_vec()));
    let err = cache.get(&index, "bad", 30, 10).await.unwrap_err();
    assert_eq!(err.kind(), "image");
    assert!(!cache.source_path("bad").exists());
  }

  #[tokio::test]
  async fn overlapping_requests_share_one_download() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let index = ImageIndex { latency: Duration::from_millis(50), ..ImageIndex::new(Some(png_bytes(64, 36))) };

    let sizes = [(30, 10), (50, 18), (30, 10), (40, 12)];
    let results = futures::future::join_all(sizes.iter().map(|&(w, h)| cache.get(&index, "vid", w, h))).await;
    for (result, (w, h)) in results.into_iter().zip(sizes) {
      let thumb = result.unwrap();
      assert_eq!(thumb.image.dimensions(), (w as u32, h as u32 * 2));
    }
    // One pass over the variants: maxres and sd miss, hq hits.
    assert_eq!(index.fetches.load(Ordering::SeqCst), 3);
    assert!(cache.inflight.lock().is_empty());
  }

  #[tokio::test]
  async fn failed_download_is_retried_by_the_next_request() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(dir.path());
    let mut index = ImageIndex::new(None);
    assert!(cache.get(&index, "vid", 30, 10).await.is_err());
    assert!(cache.inflight.lock().is_empty());

    index.body = Some(png_bytes(64, 36));
    cache.get(&index, "vid", 30, 10).await.unwrap();
    // Every variant missed the first time; the retry stops at hq.
    assert_eq!(index.fetches.load(Ordering::SeqCst), 4 + 3);
  }
}
