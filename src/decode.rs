use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, ValueEnum};
use std::path::PathBuf;

use crate::canonical::{self, Document};
use crate::store::{DocumentStore, FileStore};

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
  /// The encoded document as-is.
  #[default]
  B64,
  /// The decoded JSON document (opaque text if it is not JSON).
  Json,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  /// Encoded document (unpadded URL-safe base64).
  pub encoded: Option<String>,

  /// Look the document up by short id instead (requires --store).
  #[arg(long)]
  pub id: Option<String>,

  /// JSON file used as short-id store.
  #[arg(long)]
  pub store: Option<PathBuf>,

  #[arg(long, value_enum, default_value_t = Format::B64)]
  pub format: Format,
}

fn resolve_encoded(args: &Args) -> Result<String> {
  if let Some(id) = &args.id {
    let path = args.store.as_ref().ok_or_else(|| anyhow!("--id requires --store"))?;
    let store = FileStore::open(path)?;
    return store
      .get(id)?
      .ok_or_else(|| anyhow!("subscription not found: {id}"));
  }
  args
    .encoded
    .clone()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .ok_or_else(|| anyhow!("missing encoded document (or --id with --store)"))
}

/// Renders an encoded document in the requested format.
pub fn render(encoded: &str, format: Format) -> Result<String> {
  // Validate even when echoing the encoded text back.
  canonical::decode_bytes(encoded).context("invalid configuration")?;
  match format {
    Format::B64 => Ok(encoded.to_string()),
    Format::Json => match canonical::decode_document(encoded)? {
      Document::Json(v) => Ok(serde_json::to_string_pretty(&v)?),
      Document::Text(t) => Ok(t),
    },
  }
}

pub async fn run(args: Args) -> Result<()> {
  let encoded = resolve_encoded(&args)?;
  println!("{}", render(&encoded, args.format)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use base64::engine::general_purpose;
  use base64::Engine;

  #[test]
  fn b64_is_echoed_after_validation() {
    let enc = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"a":1}"#);
    assert_eq!(render(&enc, Format::B64).unwrap(), enc);
    assert!(render("***", Format::B64).is_err());
  }

  #[test]
  fn json_format_pretty_prints_or_falls_back() {
    let enc = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"a":1}"#);
    assert_eq!(render(&enc, Format::Json).unwrap(), "{\n  \"a\": 1\n}");
    let enc = general_purpose::URL_SAFE_NO_PAD.encode("opaque");
    assert_eq!(render(&enc, Format::Json).unwrap(), "opaque");
  }

  #[test]
  fn id_requires_store() {
    let args = Args {
      encoded: None,
      id: Some("abc".to_string()),
      store: None,
      format: Format::B64,
    };
    assert!(resolve_encoded(&args).is_err());
  }
}
