use anyhow::{Context, Result, anyhow};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
  pub log_level: String,
  pub download_dir: PathBuf,
  pub image_viewer: String,
  /// Video player; receives mpv arguments.
  pub player: String,
  /// Downloader; receives yt-dlp arguments.
  pub downloader: String,
  /// Initial sort mode for Subscriptions and History.
  pub sort_by_date: bool,
  pub theme: Option<String>,
  pub invidious: InvidiousConfig,
  pub history: HistoryConfig,
  pub channels: ChannelsConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InvidiousConfig {
  pub instance: String,
  pub proxy: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
  pub enable: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ChannelsConfig {
  pub subscribed: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      download_dir: default_download_dir(),
      image_viewer: "xdg-open".to_string(),
      player: "mpv".to_string(),
      downloader: "yt-dlp".to_string(),
      sort_by_date: true,
      theme: None,
      invidious: InvidiousConfig::default(),
      history: HistoryConfig::default(),
      channels: ChannelsConfig {
        subscribed: vec!["UCTt2AnK--mnRmICnf-CCcrw".to_string(), "UCutXfzLC5wrV3SInT_tdY0w".to_string()],
      },
    }
  }
}

impl Default for InvidiousConfig {
  fn default() -> Self {
    Self { instance: "invidious.jing.rocks".to_string(), proxy: None }
  }
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self { enable: true }
  }
}

fn default_download_dir() -> PathBuf {
  if let Some(dirs) = UserDirs::new() {
    if let Some(videos) = dirs.video_dir() {
      return videos.join("YouTube");
    }
    return dirs.home_dir().join("Videos").join("YouTube");
  }
  PathBuf::from("YouTube")
}

/// Filesystem locations used by the session.
#[derive(Debug, Clone)]
pub struct Paths {
  pub config_file: PathBuf,
  pub history_file: PathBuf,
  pub thumbnail_dir: PathBuf,
  pub log_dir: PathBuf,
}

impl Paths {
  pub fn resolve() -> Result<Self> {
    let dirs = ProjectDirs::from("", "", "ytui").ok_or_else(|| anyhow!("Could not determine a home directory"))?;
    let config_dir = dirs.config_dir();
    Ok(Self {
      config_file: config_dir.join("config.toml"),
      history_file: config_dir.join("watched_history.json"),
      thumbnail_dir: dirs.cache_dir().join("thumbs"),
      log_dir: dirs.data_local_dir().join("logs"),
    })
  }
}

impl Config {
  /// Read the config file, writing the defaults first if it doesn't exist
  /// yet. The flag tells whether the file was just created; this runs before
  /// logging is set up, so the caller reports it.
  pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
    if !path.exists() {
      let config = Self::default();
      config.save(path)?;
      return Ok((config, true));
    }
    let content =
      std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok((config, false))
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create config dir {}", dir.display()))?;
    }
    let content = toml::to_string(self).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write config file {}", path.display()))
  }
}
