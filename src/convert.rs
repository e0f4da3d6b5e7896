use anyhow::{anyhow, Result};
use clap::Args as ClapArgs;
use serde::Serialize;
use std::path::PathBuf;

use crate::canonical;
use crate::error::ConvertError;
use crate::options::{EnvDefaults, Options, ResolvedOptions};
use crate::singbox;
use crate::store::{DocumentStore, FileStore};
use crate::sub_parse::{self, InputArgs};

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  #[command(flatten)]
  pub input: InputArgs,

  #[command(flatten)]
  pub options: Options,

  /// Ignore environment defaults (RULES_PRESET, ENABLE_ADBLOCK, ...).
  #[arg(long, default_value_t = false)]
  pub ignore_env: bool,

  /// Public base URL used to build subscription links, e.g. https://sub.example.com
  #[arg(long)]
  pub base_url: Option<String>,

  /// JSON file used as short-id store. When set, the result also carries a short id.
  #[arg(long)]
  pub store: Option<PathBuf>,
}

/// Result of one subscription conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
  pub nodes_count: usize,
  pub encoded: String,
}

/// Parse, compile and encode in one go.
pub fn convert_text(payload: &str, opts: &ResolvedOptions) -> Result<Converted, ConvertError> {
  let endpoints = sub_parse::parse_subscription(payload)?;
  let config = singbox::compile(&endpoints, opts)?;
  Ok(Converted {
    nodes_count: endpoints.len(),
    encoded: canonical::encode(&config)?,
  })
}

#[derive(Serialize)]
struct ConvertOut {
  singbox_config: String,
  nodes_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  subscription_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  subscription_url_short: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  subscription_url_short_json: Option<String>,
}

fn subscription_links(base_url: Option<&str>, encoded: &str, id: Option<&str>) -> (Option<String>, Option<String>) {
  let Some(base) = base_url.map(|b| b.trim().trim_end_matches('/')).filter(|b| !b.is_empty()) else {
    return (None, None);
  };
  let full = format!("{base}/subscription/{encoded}");
  let short = id.map(|id| format!("{base}/subscription/id/{id}"));
  (Some(full), short)
}

pub async fn run(args: Args) -> Result<()> {
  let text = sub_parse::load_input(&args.input).await?;
  if text.trim().is_empty() {
    return Err(anyhow!("subscription must not be empty"));
  }

  let env = if args.ignore_env {
    EnvDefaults::default()
  } else {
    EnvDefaults::from_env()
  };
  let opts = args.options.resolve(&env);
  tracing::debug!(?opts, "resolved routing options");

  let converted = convert_text(&text, &opts).map_err(|e| {
    tracing::warn!(error = %e, "conversion failed");
    e
  })?;
  tracing::info!(nodes = converted.nodes_count, "converted subscription");

  let id = match &args.store {
    Some(path) => {
      let id = FileStore::open(path)?.put(&converted.encoded)?;
      tracing::info!(%id, store = %path.display(), "stored document");
      Some(id)
    }
    None => None,
  };

  let (subscription_url, subscription_url_short) =
    subscription_links(args.base_url.as_deref(), &converted.encoded, id.as_deref());
  let out = ConvertOut {
    singbox_config: converted.encoded,
    nodes_count: converted.nodes_count,
    id,
    subscription_url,
    subscription_url_short_json: subscription_url_short.as_ref().map(|s| format!("{s}?format=json")),
    subscription_url_short,
  };
  println!("{}", serde_json::to_string(&out)?);
  Ok(())
}
