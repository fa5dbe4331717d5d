use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

use crate::constants::constants;
use crate::error::Result;
use crate::registry::{ProcessHandle, ProcessRegistry};
use crate::youtube::MediaItem;

/// Launches the player, the downloader and the image viewer through the
/// process registry. The programs default to mpv and yt-dlp.
#[derive(Clone)]
pub struct Launcher {
  registry: ProcessRegistry,
  download_dir: PathBuf,
  image_viewer: String,
  player: String,
  downloader: String,
}

pub fn mpv_command(program: &str, url: &str) -> Command {
  let c = constants();
  let mut cmd = Command::new(program);
  cmd.args([
    format!("--ytdl-format={}", c.player_format),
    format!("--ytdl-raw-options={}", c.player_raw_options),
    url.to_string(),
  ]);
  cmd
}

pub fn ytdlp_command(program: &str, url: &str, download_dir: &Path) -> Command {
  let mut cmd = Command::new(program);
  cmd
    .arg(format!("--format={}", constants().player_format))
    .args(["--mark-watched", "--cookies-from-browser=firefox", "-o"])
    .arg(download_dir.join("%(title)s.%(ext)s"))
    .arg(url);
  cmd
}

impl Launcher {
  pub fn new(registry: ProcessRegistry, download_dir: PathBuf, image_viewer: String) -> Self {
    Self { registry, download_dir, image_viewer, player: "mpv".to_string(), downloader: "yt-dlp".to_string() }
  }

  /// Replace the player and downloader programs. Both receive the mpv and
  /// yt-dlp arguments respectively.
  pub fn with_programs(mut self, player: String, downloader: String) -> Self {
    self.player = player;
    self.downloader = downloader;
    self
  }

  pub fn registry(&self) -> &ProcessRegistry {
    &self.registry
  }

  pub fn play(&self, item: &MediaItem) -> Result<ProcessHandle> {
    let handle = self.registry.spawn(&self.player, mpv_command(&self.player, &item.watch_url()))?;
    info!(id = %item.id, title = %item.title, program = %self.player, pid = ?handle.pid(), "player: started");
    Ok(handle)
  }

  pub async fn download(&self, item: &MediaItem) -> Result<ProcessHandle> {
    tokio::fs::create_dir_all(&self.download_dir).await?;
    let command = ytdlp_command(&self.downloader, &item.watch_url(), &self.download_dir);
    let handle = self.registry.spawn(&self.downloader, command)?;
    info!(id = %item.id, program = %self.downloader, dir = %self.download_dir.display(), "player: download started");
    Ok(handle)
  }

  pub fn open_image(&self, path: &Path) -> Result<ProcessHandle> {
    let mut cmd = Command::new(&self.image_viewer);
    cmd.arg(path);
    let handle = self.registry.spawn(&self.image_viewer, cmd)?;
    info!(viewer = %self.image_viewer, path = %path.display(), "player: image viewer started");
    Ok(handle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(cmd: &Command) -> Vec<String> {
    cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect()
  }

  #[test]
  fn mpv_uses_format_and_raw_options() {
    let cmd = mpv_command("mpv", "https://www.youtube.com/watch?v=abc");
    assert_eq!(cmd.as_std().get_program(), "mpv");
    assert_eq!(
      args(&cmd),
      [
        "--ytdl-format=bestvideo[ext=mp4][height<=?2160]+bestaudio[ext=m4a]",
        "--ytdl-raw-options=mark-watched=,cookies-from-browser=firefox",
        "https://www.youtube.com/watch?v=abc",
      ]
    );
  }

  #[test]
  fn ytdlp_writes_into_download_dir() {
    let cmd = ytdlp_command("yt-dlp", "https://www.youtube.com/watch?v=abc", Path::new("/videos"));
    let args = args(&cmd);
    assert_eq!(cmd.as_std().get_program(), "yt-dlp");
    assert!(args.contains(&"--mark-watched".to_string()));
    let out = args.iter().position(|a| a == "-o").unwrap();
    assert_eq!(args[out + 1], "/videos/%(title)s.%(ext)s");
    assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
  }

  #[tokio::test]
  async fn missing_viewer_reports_process_error() {
    let launcher = Launcher::new(ProcessRegistry::new(), PathBuf::from("/tmp"), "ytui-no-such-viewer".into());
    let err = launcher.open_image(Path::new("/tmp/x.jpg")).err().unwrap();
    assert_eq!(err.kind(), "process");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn configured_programs_are_spawned() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProcessRegistry::new();
    let launcher = Launcher::new(registry.clone(), dir.path().join("videos"), "true".into())
      .with_programs("ytui-no-such-player".into(), "true".into());
    let item = crate::enrich::tests::item("abc", 0);

    let err = launcher.play(&item).err().unwrap();
    assert!(err.to_string().contains("ytui-no-such-player"));

    let status = launcher.download(&item).await.unwrap().wait().await.unwrap();
    assert!(status.success());
    assert!(dir.path().join("videos").is_dir());
    assert_eq!(registry.live_count(), 0);
  }
}
