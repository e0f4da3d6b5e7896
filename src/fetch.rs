use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::time::Duration;

fn default_user_agent() -> &'static str {
  concat!("hy2sub-rs/", env!("CARGO_PKG_VERSION"))
}

fn build_client(timeout_ms: u64, ua: &str) -> Result<Client> {
  let builder = Client::builder()
    .user_agent(ua)
    .redirect(reqwest::redirect::Policy::limited(10))
    .timeout(Duration::from_millis(timeout_ms.max(1)));
  Ok(builder.build()?)
}

/// GETs a remote subscription and returns its body as text.
pub async fn fetch_subscription(url: &str, timeout_ms: u64, user_agent: Option<&str>) -> Result<String> {
  let ua = user_agent.unwrap_or(default_user_agent());
  let client = build_client(timeout_ms, ua).context("build http client")?;

  let resp = client.get(url).send().await?;
  let status = resp.status();
  if !status.is_success() {
    return Err(anyhow!("subscription fetch returned HTTP {}", status.as_u16()));
  }
  let body = resp.text().await.context("read subscription body")?;
  tracing::debug!(bytes = body.len(), "fetched subscription");
  Ok(body)
}
