//! Engine constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` and parsed once on first
//! access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable engine constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Viewport
  pub minimum_visible_rows: usize,
  pub chrome_rows: usize,

  // Remote index
  pub search_pages: u32,
  pub http_timeout_secs: u64,

  // Enrichment cache
  pub description_budget: usize,
  pub enrich_workers: usize,
  pub retry_initial_ms: u64,
  pub retry_max_ms: u64,

  // Thumbnail cache
  pub thumbnail_memory_ceiling: usize,
  pub thumbnail_min_width: u16,
  pub thumbnail_max_width: u16,
  pub thumbnail_min_height: u16,
  pub thumbnail_max_height: u16,
  pub thumbnail_fetch_timeout_secs: u64,
  pub thumbnail_max_bytes: u64,

  // External processes
  pub player_format: String,
  pub player_raw_options: String,
  pub watch_url_prefix: String,
}

impl Constants {
  pub fn http_timeout(&self) -> Duration {
    Duration::from_secs(self.http_timeout_secs)
  }

  pub fn thumbnail_fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.thumbnail_fetch_timeout_secs)
  }

  /// Watch URL for a video ID.
  pub fn watch_url(&self, video_id: &str) -> String {
    format!("{}{}", self.watch_url_prefix, video_id)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed every test fails immediately.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed engine constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
