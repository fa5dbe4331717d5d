//! Line-oriented pickers behind the `query` and `show` subcommands.
//!
//! Results are listed on stdout with a number per row and the choice is read
//! from stdin. The chosen video is played or downloaded through the same
//! launcher and history store as the full-screen session.

use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{Config, Paths};
use crate::history::HistoryStore;
use crate::player::Launcher;
use crate::registry::ProcessRegistry;
use crate::youtube::{ChannelInfo, InvidiousClient, MediaItem, VideoIndex};

/// Where a `query` takes its list from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
  Search(String),
  Subscribed,
  History,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
  pub download: bool,
  pub download_dir: Option<PathBuf>,
  pub keep_open: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Choice {
  Pick(usize),
  Quit,
  Invalid,
}

fn parse_choice(input: &str, count: usize) -> Choice {
  let input = input.trim();
  if input.eq_ignore_ascii_case("q") {
    return Choice::Quit;
  }
  match input.parse::<usize>() {
    Ok(n) if (1..=count).contains(&n) => Choice::Pick(n - 1),
    _ => Choice::Invalid,
  }
}

fn format_row(n: usize, item: &MediaItem) -> String {
  format!("{:>3}. {}  [{}, {}, {}]", n, item.title, item.author, item.duration_label(), item.published_label())
}

/// List `items` numbered from 1 and read lines until one names an item.
/// `None` when the user quits or input ends.
fn pick<R: BufRead, W: Write>(items: &[MediaItem], input: &mut R, out: &mut W) -> std::io::Result<Option<usize>> {
  for (i, item) in items.iter().enumerate() {
    writeln!(out, "{}", format_row(i + 1, item))?;
  }
  loop {
    write!(out, "Select 1-{} (q to quit): ", items.len())?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    match parse_choice(&line, items.len()) {
      Choice::Pick(i) => return Ok(Some(i)),
      Choice::Quit => return Ok(None),
      Choice::Invalid => writeln!(out, "Not a choice: {}", line.trim())?,
    }
  }
}

pub struct Picker<I> {
  index: I,
  launcher: Launcher,
  history: HistoryStore,
  history_enabled: bool,
  channels: Vec<String>,
  sort_by_date: bool,
}

impl Picker<InvidiousClient> {
  pub fn from_config(config: &Config, paths: &Paths, registry: ProcessRegistry, options: &QueryOptions) -> Result<Self> {
    let index = InvidiousClient::new(&config.invidious.instance, config.invidious.proxy.as_deref())
      .context("Failed to set up the Invidious client")?;
    let download_dir = options.download_dir.clone().unwrap_or_else(|| config.download_dir.clone());
    let launcher = Launcher::new(registry, download_dir, config.image_viewer.clone())
      .with_programs(config.player.clone(), config.downloader.clone());
    Ok(Self {
      index,
      launcher,
      history: HistoryStore::new(paths.history_file.clone()),
      history_enabled: config.history.enable,
      channels: config.channels.subscribed.clone(),
      sort_by_date: config.sort_by_date,
    })
  }
}

impl<I: VideoIndex> Picker<I> {
  async fn items(&self, source: &Source) -> Result<Vec<MediaItem>> {
    match source {
      Source::Search(text) => Ok(self.index.search(text).await?),
      Source::Subscribed => {
        let mut items = self.index.collection_videos(&self.channels).await?;
        if self.sort_by_date {
          items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        }
        Ok(items)
      }
      Source::History => Ok(self.history.load().await?),
    }
  }

  /// Play or download `item` and wait for the program to finish.
  async fn act(&self, item: &MediaItem, download: bool) -> Result<String> {
    if download {
      let status = self.launcher.download(item).await?.wait().await?;
      if !status.success() {
        return Err(anyhow!("download of '{}' exited with {}", item.title, status));
      }
      info!(id = %item.id, "query: download finished");
      return Ok(format!("Downloaded: {}", item.title));
    }

    let handle = self.launcher.play(item)?;
    if self.history_enabled
      && let Err(e) = self.history.append(item).await
    {
      warn!(id = %item.id, err = %e, "query: failed to record history");
    }
    let status = handle.wait().await?;
    info!(id = %item.id, status = %status, "query: player exited");
    Ok(format!("Played: {}", item.title))
  }

  /// List `source`, act on the chosen item, and with `keep_open` list again
  /// until the user quits.
  pub async fn run<R: BufRead, W: Write>(
    &self,
    source: &Source,
    options: &QueryOptions,
    input: &mut R,
    out: &mut W,
  ) -> Result<()> {
    let mut items = self.items(source).await?;
    loop {
      if items.is_empty() {
        writeln!(out, "No videos found.")?;
        return Ok(());
      }
      let Some(choice) = pick(&items, input, out)? else {
        return Ok(());
      };
      let item = &items[choice];
      info!(id = %item.id, download = options.download, "query: selected");
      match self.act(item, options.download).await {
        Ok(done) => writeln!(out, "{}", done)?,
        Err(e) if options.keep_open => writeln!(out, "Error: {:#}", e)?,
        Err(e) => return Err(e),
      }
      if !options.keep_open {
        return Ok(());
      }
      if *source == Source::History {
        items = self.items(source).await?;
      }
    }
  }
}

// --- Show ---

fn write_channel<W: Write>(out: &mut W, channel: &ChannelInfo) -> std::io::Result<()> {
  writeln!(out)?;
  writeln!(out, "Author: {}", channel.author)?;
  writeln!(out, "Author URL: {}", channel.author_url)?;
  writeln!(out, "{}", "-".repeat(30))
}

/// Print the name and link of every subscribed channel.
pub async fn show_subscribed<W: Write>(config: &Config, out: &mut W) -> Result<()> {
  let client = InvidiousClient::new(&config.invidious.instance, config.invidious.proxy.as_deref())
    .context("Failed to set up the Invidious client")?;
  for id in &config.channels.subscribed {
    let channel = client.channel_info(id).await.with_context(|| format!("Failed to fetch channel {}", id))?;
    info!(id = %id, author = %channel.author, "query: channel info");
    write_channel(out, &channel)?;
  }
  Ok(())
}
