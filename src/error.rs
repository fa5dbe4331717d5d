use thiserror::Error as ThisError;

/// Classified failure of a background unit of work.
///
/// Every dispatcher command that fails is reported to the session as one of
/// these, so the session can decide whether the failure ends a load or is only
/// surfaced in the status line.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
  /// Remote unreachable or timed out.
  #[error("network error: {0}")]
  Network(String),
  /// Remote answered with a non-success status.
  #[error("upstream returned {status}: {message}")]
  Upstream { status: u16, message: String },
  /// Response body could not be decoded.
  #[error("malformed response: {0}")]
  Parse(String),
  /// External process could not be launched.
  #[error("{0}")]
  Process(String),
  #[error("i/o error: {0}")]
  Io(String),
  #[error("configuration error: {0}")]
  Config(String),
  #[error("image error: {0}")]
  Image(String),
}

impl Error {
  /// Short category label used in status messages and logs.
  pub fn kind(&self) -> &'static str {
    match self {
      Error::Network(_) => "network",
      Error::Upstream { .. } => "upstream",
      Error::Parse(_) => "parse",
      Error::Process(_) => "process",
      Error::Io(_) => "io",
      Error::Config(_) => "config",
      Error::Image(_) => "image",
    }
  }

  /// Build a `Process` error for a binary that failed to spawn, with an
  /// install hint when the binary is missing.
  pub fn spawn(program: &str, err: &std::io::Error) -> Self {
    if err.kind() == std::io::ErrorKind::NotFound {
      Error::Process(format!("{program} not found. Install it with your package manager (e.g. apt install {program})"))
    } else {
      Error::Process(format!("failed to launch {program}: {err}"))
    }
  }
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    if let Some(status) = err.status() {
      Error::Upstream { status: status.as_u16(), message: err.to_string() }
    } else if err.is_decode() {
      Error::Parse(err.to_string())
    } else {
      Error::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Error::Parse(err.to_string())
  }
}

impl From<std::io::Error> for Error {
  fn from(err: std::io::Error) -> Self {
    Error::Io(err.to_string())
  }
}

impl From<image::ImageError> for Error {
  fn from(err: image::ImageError) -> Self {
    Error::Image(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn spawn_not_found_has_install_hint() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
    let err = Error::spawn("mpv", &io);
    assert_eq!(err.kind(), "process");
    assert!(err.to_string().contains("mpv not found"));
  }

  #[test]
  fn spawn_other_failure_keeps_cause() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err = Error::spawn("yt-dlp", &io);
    assert!(err.to_string().contains("failed to launch yt-dlp"));
  }

  #[test]
  fn json_errors_classify_as_parse() {
    let err: Error = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
    assert_eq!(err.kind(), "parse");
  }
}
