use thiserror::Error;

/// Longest slice of an offending entry quoted back in an error message.
const SNIPPET_CHARS: usize = 80;

/// Failures of the parse / compile / decode stages.
#[derive(Debug, Error)]
pub enum ConvertError {
  /// Entry is not a `hysteria2://` or `hy2://` URI.
  #[error("invalid Hysteria2/Hy2 URI: {0}")]
  InvalidScheme(String),

  /// Hostname or port could not be extracted.
  #[error("invalid server/port: {0}")]
  InvalidHostPort(String),

  /// Neither a `password` parameter nor user-info was present.
  #[error("missing password: {0}")]
  MissingPassword(String),

  #[error("subscription contains no valid endpoints")]
  NoValidEndpoints,

  #[error("no endpoints to generate a configuration from")]
  NoEndpoints,

  #[error("invalid base64 document: {0}")]
  DecodeError(#[from] base64::DecodeError),

  #[error("malformed JSON document: {0}")]
  MalformedDocument(#[from] serde_json::Error),
}

/// Bounded quote of `raw` for error messages, cut on a char boundary.
pub(crate) fn snippet(raw: &str) -> String {
  let mut out: String = raw.chars().take(SNIPPET_CHARS).collect();
  out.push_str("...");
  out
}
