use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

pub(crate) const SCHEME_SEPARATOR: &str = "://";

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
  .with_decode_allow_trailing_bits(true)
  .with_decode_padding_mode(DecodePaddingMode::Indifferent);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Outcome of [`best_effort_decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeDecoded<'a> {
  Decoded(String),
  Original(&'a str),
}

impl MaybeDecoded<'_> {
  pub fn into_string(self) -> String {
    match self {
      MaybeDecoded::Decoded(s) => s,
      MaybeDecoded::Original(s) => s.to_string(),
    }
  }
}

/// Pads `s` with `=` up to a multiple of four.
pub(crate) fn pad_base64(s: &str) -> String {
  let rem = s.len() % 4;
  if rem == 0 {
    s.to_string()
  } else {
    format!("{s}{}", "=".repeat(4 - rem))
  }
}

/// Decodes `text` as base64 of UTF-8 text, or hands it back untouched.
///
/// Whitespace inside the blob is ignored (line-wrapped exports are common), and
/// both the standard and the URL-safe alphabets are accepted. Never fails.
pub fn best_effort_decode(text: &str) -> MaybeDecoded<'_> {
  let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
  if cleaned.is_empty() {
    return MaybeDecoded::Original(text);
  }
  let padded = pad_base64(&cleaned);
  for engine in [&STANDARD_LENIENT, &URL_SAFE_LENIENT] {
    if let Ok(bytes) = engine.decode(&padded) {
      if let Ok(txt) = String::from_utf8(bytes) {
        return MaybeDecoded::Decoded(txt);
      }
    }
  }
  MaybeDecoded::Original(text)
}

fn looks_like_uri(s: &str) -> bool {
  match s.trim().split_once(SCHEME_SEPARATOR) {
    Some((scheme, _)) => {
      !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    }
    None => false,
  }
}

/// Two or more entries, each of which is base64 of a URI on its own.
fn is_per_line_base64(content: &str) -> bool {
  let entries: Vec<&str> = content
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty() && !l.starts_with('#'))
    .collect();
  entries.len() >= 2 && entries.iter().all(|l| looks_like_uri(&best_effort_decode(l).into_string()))
}

/// Splits a subscription payload into trimmed entry lines.
///
/// Blank lines and `#` comments are dropped. A payload without any `://` is
/// first tried as a whole-blob base64 encoding, kept only if it yields URIs.
/// Lines that are each base64 of a URI are left for per-entry decoding.
pub fn normalize_lines(payload: &str) -> Vec<String> {
  let content = payload.trim();
  let body = if content.contains(SCHEME_SEPARATOR) || is_per_line_base64(content) {
    content.to_string()
  } else {
    match best_effort_decode(content) {
      MaybeDecoded::Decoded(text) if text.contains(SCHEME_SEPARATOR) => text,
      _ => content.to_string(),
    }
  };

  body
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty() && !l.starts_with('#'))
    .map(str::to_string)
    .collect()
}
