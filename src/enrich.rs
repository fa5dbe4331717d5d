//! Background description enrichment.
//!
//! Each browse session hands its item list to [`DescriptionCache::fill`],
//! which runs a small pool of workers over a deduplicated work queue (one
//! unit per item). A worker copies an already-known description, or fetches
//! the detail and retries with capped exponential backoff until the index
//! answers. The renderer only ever takes the read lock; a miss means
//! "still loading".

use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::youtube::{MediaItem, VideoIndex};

/// Backoff schedule for a single item's detail fetch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub initial: Duration,
  pub max: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    let c = constants();
    Self { initial: Duration::from_millis(c.retry_initial_ms), max: Duration::from_millis(c.retry_max_ms) }
  }
}

/// Strip blank lines, trim, and cap to `budget` characters with an ellipsis.
pub fn clean_description(raw: &str, budget: usize) -> String {
  let joined = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n");
  if joined.chars().count() > budget {
    let truncated: String = joined.chars().take(budget).collect();
    format!("{}...", truncated.trim_end())
  } else {
    joined.trim().to_string()
  }
}

/// Thread-safe `item id -> cleaned description` map.
#[derive(Clone, Default)]
pub struct DescriptionCache {
  entries: Arc<RwLock<HashMap<String, String>>>,
}

impl DescriptionCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &str) -> Option<String> {
    self.entries.read().get(id).cloned()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.entries.read().contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  /// Store the cleaned form of `raw` under `id`.
  pub fn insert(&self, id: &str, raw: &str) {
    let cleaned = clean_description(raw, constants().description_budget);
    self.entries.write().insert(id.to_string(), cleaned);
  }

  /// Whether every item in `items` has an entry.
  pub fn covers(&self, items: &[MediaItem]) -> bool {
    let entries = self.entries.read();
    items.iter().all(|i| entries.contains_key(&i.id))
  }

  /// Fill the cache for every item in `items`. Resolves once each item has
  /// an entry (possibly empty).
  pub async fn fill<I: VideoIndex>(&self, items: Vec<MediaItem>, index: Arc<I>, policy: RetryPolicy) {
    let mut seen = HashSet::new();
    let queue: Vec<MediaItem> = items.into_iter().filter(|i| !self.contains(&i.id) && seen.insert(i.id.clone())).collect();
    if queue.is_empty() {
      return;
    }
    let total = queue.len();
    debug!(total, "enrich: starting description prefetch");

    futures::stream::iter(queue)
      .for_each_concurrent(constants().enrich_workers.max(1), |item| {
        let index = Arc::clone(&index);
        async move { self.fill_one(item, index.as_ref(), policy).await }
      })
      .await;

    info!(total, cached = self.len(), "enrich: finished fetching all descriptions");
  }

  async fn fill_one<I: VideoIndex>(&self, item: MediaItem, index: &I, policy: RetryPolicy) {
    if self.contains(&item.id) {
      return;
    }
    if let Some(known) = item.description.as_deref() {
      debug!(title = %item.title, "enrich: description already present, using it");
      self.insert(&item.id, known);
      return;
    }

    let mut delay = policy.initial;
    let mut attempt = 1u32;
    loop {
      match index.video_detail(&item.id).await {
        Ok(detail) => {
          self.insert(&item.id, &detail.description);
          debug!(title = %item.title, attempt, "enrich: fetched description");
          return;
        }
        Err(e) => {
          warn!(title = %item.title, attempt, err = %e, "enrich: fetching description failed, retrying");
          tokio::time::sleep(delay).await;
          delay = (delay * 2).min(policy.max);
          attempt += 1;
        }
      }
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::error::{Error, Result};
  use crate::youtube::VideoDetail;
  use parking_lot::Mutex;

  pub(crate) fn item(id: &str, published_at: i64) -> MediaItem {
    MediaItem {
      id: id.to_string(),
      title: format!("title {id}"),
      author: "author".to_string(),
      published_at,
      published_text: String::new(),
      duration_seconds: 60,
      views_text: String::new(),
      description: None,
      viewed_at: None,
    }
  }

  /// Index whose detail endpoint fails a configured number of times per id.
  #[derive(Default)]
  struct FlakyIndex {
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
  }

  impl FlakyIndex {
    fn failing(id: &str, times: u32) -> Self {
      let index = Self::default();
      index.failures.lock().insert(id.to_string(), times);
      index
    }

    fn calls(&self, id: &str) -> u32 {
      self.calls.lock().get(id).copied().unwrap_or(0)
    }
  }

  impl VideoIndex for FlakyIndex {
    async fn search(&self, _query: &str) -> Result<Vec<MediaItem>> {
      Ok(Vec::new())
    }

    async fn collection_videos(&self, _channel_ids: &[String]) -> Result<Vec<MediaItem>> {
      Ok(Vec::new())
    }

    async fn video_detail(&self, video_id: &str) -> Result<VideoDetail> {
      *self.calls.lock().entry(video_id.to_string()).or_default() += 1;
      let mut failures = self.failures.lock();
      if let Some(left) = failures.get_mut(video_id)
        && *left > 0
      {
        *left -= 1;
        return Err(Error::Network("connection reset".into()));
      }
      let description = if video_id == "silent" { String::new() } else { format!("\n  about {video_id}  \n\n") };
      Ok(VideoDetail { description, ..Default::default() })
    }

    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>> {
      Err(Error::Network("no images".into()))
    }
  }

  fn fast() -> RetryPolicy {
    RetryPolicy { initial: Duration::from_millis(1), max: Duration::from_millis(4) }
  }

  #[test]
  fn clean_strips_blank_lines_and_trims() {
    assert_eq!(clean_description("  first \n\n\n second\n   \n", 100), "first\nsecond");
    assert_eq!(clean_description("", 100), "");
  }

  #[test]
  fn clean_truncates_on_char_boundary() {
    let long = "é".repeat(20);
    let cleaned = clean_description(&long, 10);
    assert_eq!(cleaned, format!("{}...", "é".repeat(10)));
  }

  #[tokio::test]
  async fn every_item_has_an_entry_after_fill() {
    let index = Arc::new(FlakyIndex::failing("b", 3));
    let cache = DescriptionCache::new();
    let items = vec![item("a", 1), item("b", 2), item("silent", 3), item("a", 1)];

    cache.fill(items.clone(), Arc::clone(&index), fast()).await;

    assert!(cache.covers(&items));
    assert_eq!(cache.get("a").as_deref(), Some("about a"));
    assert_eq!(cache.get("b").as_deref(), Some("about b"));
    assert_eq!(cache.get("silent").as_deref(), Some(""));
    assert_eq!(index.calls("b"), 4);
    assert_eq!(index.calls("a"), 1, "duplicate ids are fetched once");
  }

  #[tokio::test]
  async fn known_descriptions_are_copied_without_fetching() {
    let index = Arc::new(FlakyIndex::default());
    let cache = DescriptionCache::new();
    let mut known = item("k", 1);
    known.description = Some("already\n\nhere".into());

    cache.fill(vec![known], Arc::clone(&index), fast()).await;

    assert_eq!(cache.get("k").as_deref(), Some("already\nhere"));
    assert_eq!(index.calls("k"), 0);
  }

  #[tokio::test]
  async fn cached_items_are_skipped() {
    let index = Arc::new(FlakyIndex::default());
    let cache = DescriptionCache::new();
    cache.insert("c", "cached");

    cache.fill(vec![item("c", 1)], Arc::clone(&index), fast()).await;

    assert_eq!(index.calls("c"), 0);
    assert_eq!(cache.len(), 1);
  }
}
