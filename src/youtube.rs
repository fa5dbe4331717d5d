use futures::StreamExt;
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use std::future::Future;
use tracing::{debug, info};

use crate::constants::constants;
use crate::error::{Error, Result};

/// A single video from a search, a channel listing or the watch history.
///
/// Field names follow the Invidious JSON schema so the same type reads API
/// responses and the on-disk history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
  #[serde(rename = "videoId", default)]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub author: String,
  /// Unix seconds.
  #[serde(rename = "published", default)]
  pub published_at: i64,
  #[serde(default)]
  pub published_text: String,
  #[serde(rename = "lengthSeconds", default)]
  pub duration_seconds: i64,
  #[serde(rename = "viewCountText", default)]
  pub views_text: String,
  #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Set when the item is recorded in the watch history.
  #[serde(rename = "vieweddate", default, skip_serializing_if = "Option::is_none")]
  pub viewed_at: Option<i64>,
}

impl MediaItem {
  pub fn watch_url(&self) -> String {
    constants().watch_url(&self.id)
  }

  /// Human-readable duration in the `1h2m3s` style.
  pub fn duration_label(&self) -> String {
    let total = self.duration_seconds.max(0);
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
      format!("{h}h{m}m{s}s")
    } else if m > 0 {
      format!("{m}m{s}s")
    } else {
      format!("{s}s")
    }
  }

  /// Relative text from the API when present, otherwise the calendar date.
  pub fn published_label(&self) -> String {
    if !self.published_text.is_empty() {
      return self.published_text.clone();
    }
    if self.published_at <= 0 {
      return String::new();
    }
    chrono::DateTime::from_timestamp(self.published_at, 0).map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
  }
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
  let value = Option::<String>::deserialize(deserializer)?;
  Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Descriptive detail for one video, used by the enrichment cache. The
/// listing already carries everything else the session shows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoDetail {
  #[serde(default)]
  pub description: String,
}

/// Channel name and link, listed by `show subscribed`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
  #[serde(default)]
  pub author: String,
  #[serde(default)]
  pub author_url: String,
}

#[derive(Debug, Deserialize)]
struct ChannelVideos {
  #[serde(default)]
  videos: Vec<MediaItem>,
}

/// Candidate thumbnail URLs for a video, best quality first.
pub fn thumbnail_urls(video_id: &str) -> [String; 4] {
  [
    format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", video_id),
    format!("https://img.youtube.com/vi/{}/sddefault.jpg", video_id),
    format!("https://img.youtube.com/vi/{}/hqdefault.jpg", video_id),
    format!("https://img.youtube.com/vi/{}/0.jpg", video_id),
  ]
}

/// The remote video index the session browses.
///
/// Implemented by [`InvidiousClient`]; tests drive the dispatcher and caches
/// through in-memory fakes.
pub trait VideoIndex: Send + Sync + 'static {
  /// Relevance-ordered search results.
  fn search(&self, query: &str) -> impl Future<Output = Result<Vec<MediaItem>>> + Send;

  /// Latest uploads of every channel, concatenated in channel order.
  fn collection_videos(&self, channel_ids: &[String]) -> impl Future<Output = Result<Vec<MediaItem>>> + Send;

  fn video_detail(&self, video_id: &str) -> impl Future<Output = Result<VideoDetail>> + Send;

  /// Raw bytes of an image, bounded in time and size.
  fn fetch_image(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

pub struct InvidiousClient {
  http: Client,
  image_http: Client,
  base: String,
  search_pages: u32,
}

/// Normalise a configured instance (`host` or `https://host/`) into a base URL.
pub fn instance_base_url(instance: &str) -> String {
  let trimmed = instance.trim().trim_end_matches('/');
  if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
    trimmed.to_string()
  } else {
    format!("https://{}", trimmed)
  }
}

impl InvidiousClient {
  pub fn new(instance: &str, proxy: Option<&str>) -> Result<Self> {
    let c = constants();
    let user_agent = concat!("ytui/", env!("CARGO_PKG_VERSION"));
    let mut http = Client::builder().timeout(c.http_timeout()).user_agent(user_agent);
    let mut image_http = Client::builder().timeout(c.thumbnail_fetch_timeout()).user_agent(user_agent);
    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
      let proxy = reqwest::Proxy::all(proxy).map_err(|e| Error::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
      http = http.proxy(proxy.clone());
      image_http = image_http.proxy(proxy);
    }
    Ok(Self {
      http: http.build().map_err(|e| Error::Config(e.to_string()))?,
      image_http: image_http.build().map_err(|e| Error::Config(e.to_string()))?,
      base: instance_base_url(instance),
      search_pages: c.search_pages,
    })
  }

  fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
    let raw = format!("{}{}", self.base, path);
    let parsed = if params.is_empty() { Url::parse(&raw) } else { Url::parse_with_params(&raw, params) };
    parsed.map_err(|e| Error::Config(format!("invalid instance URL '{}': {}", raw, e)))
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    debug!(url = %url, "invidious: GET");
    let response = self.http.get(url.clone()).send().await?;
    let status = response.status();
    info!(url = %url, status = status.as_u16(), "invidious: response");
    if !status.is_success() {
      return Err(Error::Upstream {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("request failed").to_string(),
      });
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
  }

  pub async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo> {
    let url = self.endpoint(&format!("/api/v1/channels/{}", channel_id), &[])?;
    self.get_json(url).await
  }

  async fn channel_videos(&self, channel_id: &str) -> Result<Vec<MediaItem>> {
    let url = self.endpoint(&format!("/api/v1/channels/{}/videos", channel_id), &[])?;
    let listing: ChannelVideos = self.get_json(url).await?;
    Ok(listing.videos)
  }
}

impl VideoIndex for InvidiousClient {
  async fn search(&self, query: &str) -> Result<Vec<MediaItem>> {
    let mut results = Vec::new();
    for page in 1..=self.search_pages {
      let page_str = page.to_string();
      let url = self
        .endpoint("/api/v1/search", &[("q", query), ("type", "video"), ("region", "US"), ("page", &page_str)])?;
      let items: Vec<MediaItem> = self.get_json(url).await?;
      debug!(page, count = items.len(), "invidious: search page");
      if items.is_empty() {
        break;
      }
      results.extend(items.into_iter().filter(|i| !i.id.is_empty()));
    }
    info!(query = %query, count = results.len(), "invidious: search complete");
    Ok(results)
  }

  async fn collection_videos(&self, channel_ids: &[String]) -> Result<Vec<MediaItem>> {
    let requests: Vec<_> = channel_ids.iter().map(|id| self.channel_videos(id)).collect();
    let pages: Vec<Result<Vec<MediaItem>>> =
      futures::stream::iter(requests).buffered(constants().enrich_workers.max(1)).collect().await;

    let mut results = Vec::new();
    for page in pages {
      results.extend(page?.into_iter().filter(|i| !i.id.is_empty()));
    }
    info!(channels = channel_ids.len(), count = results.len(), "invidious: subscriptions loaded");
    Ok(results)
  }

  async fn video_detail(&self, video_id: &str) -> Result<VideoDetail> {
    let url = self.endpoint(&format!("/api/v1/videos/{}", video_id), &[])?;
    self.get_json(url).await
  }

  async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
    let limit = constants().thumbnail_max_bytes;
    let response = self.image_http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(Error::Upstream { status: status.as_u16(), message: format!("image fetch failed: {}", url) });
    }
    if response.content_length().is_some_and(|len| len > limit) {
      return Err(Error::Network(format!("image larger than {} bytes: {}", limit, url)));
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
      let chunk = chunk?;
      if bytes.len() as u64 + chunk.len() as u64 > limit {
        return Err(Error::Network(format!("image larger than {} bytes: {}", limit, url)));
      }
      bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SEARCH_PAGE: &str = r#"[
    {"type":"video","title":"Rust in 100 Seconds","videoId":"5C_HPTJg5ek","author":"Fireship",
     "description":"","viewCountText":"2.1M views","published":1631750400,"publishedText":"3 years ago",
     "lengthSeconds":149},
    {"type":"video","title":"No id here","author":"Nobody"}
  ]"#;

  #[test]
  fn parses_search_page() {
    let items: Vec<MediaItem> = serde_json::from_str(SEARCH_PAGE).unwrap();
    assert_eq!(items.len(), 2);
    let first = &items[0];
    assert_eq!(first.id, "5C_HPTJg5ek");
    assert_eq!(first.author, "Fireship");
    assert_eq!(first.published_at, 1631750400);
    assert_eq!(first.duration_seconds, 149);
    assert_eq!(first.views_text, "2.1M views");
    assert_eq!(first.description, None);
    assert!(items[1].id.is_empty());
  }

  #[test]
  fn parses_channel_listing() {
    let body = r#"{"videos":[{"videoId":"a","title":"A","published":10},{"videoId":"b","title":"B"}]}"#;
    let listing: ChannelVideos = serde_json::from_str(body).unwrap();
    assert_eq!(listing.videos.len(), 2);
    assert_eq!(listing.videos[1].published_at, 0);
  }

  #[test]
  fn parses_video_detail() {
    let body = r#"{"title":"T","description":"line one\n\nline two","author":"Chan","publishedText":"1 day ago"}"#;
    let VideoDetail { description } = serde_json::from_str(body).unwrap();
    assert_eq!(description, "line one\n\nline two");

    let VideoDetail { description } = serde_json::from_str(r#"{"title":"T"}"#).unwrap();
    assert!(description.is_empty());
  }

  #[test]
  fn parses_channel_info() {
    let body = r#"{"author":"Fireship","authorId":"UCsBjURrPoezykLs9EqgamOA","authorUrl":"/channel/UCsBjURrPoezykLs9EqgamOA"}"#;
    let info: ChannelInfo = serde_json::from_str(body).unwrap();
    assert_eq!(info.author, "Fireship");
    assert_eq!(info.author_url, "/channel/UCsBjURrPoezykLs9EqgamOA");
  }

  #[test]
  fn history_fields_round_trip_names() {
    let item = MediaItem {
      id: "x".into(),
      title: "T".into(),
      author: "A".into(),
      published_at: 5,
      published_text: String::new(),
      duration_seconds: 61,
      views_text: String::new(),
      description: Some("d".into()),
      viewed_at: Some(99),
    };
    let json = serde_json::to_value(&item).unwrap();
    assert_eq!(json["videoId"], "x");
    assert_eq!(json["vieweddate"], 99);
    assert_eq!(json["lengthSeconds"], 61);
  }

  #[test]
  fn duration_label_formats() {
    let mut item: MediaItem = serde_json::from_str(r#"{"videoId":"x"}"#).unwrap();
    assert_eq!(item.duration_label(), "0s");
    item.duration_seconds = 253;
    assert_eq!(item.duration_label(), "4m13s");
    item.duration_seconds = 3723;
    assert_eq!(item.duration_label(), "1h2m3s");
    item.duration_seconds = -4;
    assert_eq!(item.duration_label(), "0s");
  }

  #[test]
  fn published_label_prefers_text() {
    let mut item: MediaItem = serde_json::from_str(r#"{"videoId":"x","published":86400}"#).unwrap();
    assert_eq!(item.published_label(), "1970-01-02");
    item.published_text = "2 days ago".into();
    assert_eq!(item.published_label(), "2 days ago");
  }

  #[test]
  fn base_url_normalisation() {
    assert_eq!(instance_base_url("invidious.jing.rocks"), "https://invidious.jing.rocks");
    assert_eq!(instance_base_url("http://localhost:3000/"), "http://localhost:3000");
  }

  #[test]
  fn thumbnail_urls_best_first() {
    let urls = thumbnail_urls("abc");
    assert!(urls[0].ends_with("/abc/maxresdefault.jpg"));
    assert!(urls[3].ends_with("/abc/0.jpg"));
  }

  #[test]
  fn search_endpoint_encodes_query() {
    let client = InvidiousClient::new("example.org", None).unwrap();
    let url = client.endpoint("/api/v1/search", &[("q", "rust & tokio"), ("page", "1")]).unwrap();
    assert_eq!(url.as_str(), "https://example.org/api/v1/search?q=rust+%26+tokio&page=1");
  }
}
