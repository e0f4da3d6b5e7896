use clap::Args as ClapArgs;
use serde::Deserialize;

use crate::sub_parse::{is_truthy, split_csv};

pub const DEFAULT_RULE_SET_BASE: &str =
  "https://raw.githubusercontent.com/Loyalsoldier/sing-box-rules/release/rule-set";
pub const DEFAULT_ALPN: &str = "h3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RulesPreset {
  /// Mainland prefixes go direct, everything else through the proxy.
  CnDirect,
  GlobalDirect,
  GlobalProxy,
  /// Only `proxy_domains` use the proxy.
  ProxyDomainsOnly,
  /// Only `bypass_domains` go direct.
  DirectDomainsOnly,
  /// No preset (or an unknown one): proxy by default.
  #[default]
  Unset,
}

impl RulesPreset {
  pub fn parse(raw: &str) -> Self {
    match raw.trim().to_lowercase().as_str() {
      "cn_direct" | "cn-direct" | "cn" => Self::CnDirect,
      "global_direct" | "direct_all" | "direct" => Self::GlobalDirect,
      "global_proxy" | "proxy_all" | "proxy" => Self::GlobalProxy,
      "proxy_domains_only" | "proxy_only" => Self::ProxyDomainsOnly,
      "direct_domains_only" | "bypass_only" => Self::DirectDomainsOnly,
      _ => Self::Unset,
    }
  }
}

/// Per-call routing options; every field is optional.
#[derive(ClapArgs, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Options {
  /// Rules preset: cn_direct, global_direct, global_proxy, proxy_domains_only, direct_domains_only.
  #[arg(long)]
  pub rules_preset: Option<String>,

  /// Send ad domains to a block outbound.
  #[arg(long, action = clap::ArgAction::Set)]
  pub enable_adblock: Option<bool>,

  /// Route well-known DNS-over-HTTPS hosts direct.
  #[arg(long, action = clap::ArgAction::Set)]
  pub enable_doh_direct: Option<bool>,

  /// Explicitly send all non-CN domains through the proxy.
  #[arg(long, action = clap::ArgAction::Set)]
  pub strict_global_proxy: Option<bool>,

  /// Reference remote rule-set assets instead of inline geoip/geosite tags.
  #[arg(long, action = clap::ArgAction::Set)]
  pub use_rule_set: Option<bool>,

  /// Domains routed direct (comma separated).
  #[arg(long)]
  pub bypass_domains: Option<String>,

  /// Domains routed through the proxy (comma separated).
  #[arg(long)]
  pub proxy_domains: Option<String>,

  /// URL prefix for remote rule-set assets.
  #[arg(long)]
  pub rule_set_base: Option<String>,

  /// ALPN used when an endpoint carries none, e.g. "h3" or "h2,h3".
  #[arg(long)]
  pub default_alpn: Option<String>,
}

/// Environment-sourced defaults, read once per call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
  pub rules_preset: Option<String>,
  pub enable_cn_rules: bool,
  pub enable_adblock: Option<bool>,
  pub enable_doh_direct: Option<bool>,
  pub strict_global_proxy: Option<bool>,
  pub use_rule_set: Option<bool>,
  pub bypass_domains: Option<String>,
  pub proxy_domains: Option<String>,
  pub rule_set_base: Option<String>,
  pub default_alpn: Option<String>,
}

impl EnvDefaults {
  pub fn from_env() -> Self {
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  pub fn from_lookup<F>(lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    let flag = |k: &str| lookup(k).map(|v| is_truthy(&v));
    Self {
      rules_preset: lookup("RULES_PRESET"),
      enable_cn_rules: flag("ENABLE_CN_RULES").unwrap_or(false),
      enable_adblock: flag("ENABLE_ADBLOCK"),
      enable_doh_direct: flag("ENABLE_DOH_DIRECT"),
      strict_global_proxy: flag("STRICT_GLOBAL_PROXY"),
      use_rule_set: flag("USE_RULE_SET"),
      bypass_domains: lookup("BYPASS_DOMAINS"),
      proxy_domains: lookup("PROXY_DOMAINS"),
      rule_set_base: lookup("RULE_SET_BASE"),
      default_alpn: lookup("DEFAULT_ALPN"),
    }
  }
}

/// Concrete options handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
  pub preset: RulesPreset,
  pub enable_adblock: bool,
  pub enable_doh_direct: bool,
  pub strict_global_proxy: bool,
  pub use_rule_set: bool,
  pub bypass_domains: Vec<String>,
  pub proxy_domains: Vec<String>,
  pub rule_set_base: String,
  pub default_alpn: Vec<String>,
}

impl Default for ResolvedOptions {
  fn default() -> Self {
    Options::default().resolve(&EnvDefaults::default())
  }
}

fn non_blank(v: &Option<String>) -> Option<&str> {
  v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Options {
  pub fn resolve(&self, env: &EnvDefaults) -> ResolvedOptions {
    let preset = match non_blank(&self.rules_preset).or(non_blank(&env.rules_preset)) {
      Some(p) => RulesPreset::parse(p),
      None if env.enable_cn_rules => RulesPreset::CnDirect,
      None => RulesPreset::Unset,
    };

    let domains = |opt: &Option<String>, env: &Option<String>| {
      opt.as_deref().or(env.as_deref()).map(split_csv).unwrap_or_default()
    };

    let rule_set_base = non_blank(&self.rule_set_base)
      .or(non_blank(&env.rule_set_base))
      .unwrap_or(DEFAULT_RULE_SET_BASE)
      .trim_end_matches('/')
      .to_string();

    // A set-but-empty DEFAULT_ALPN disables the built-in default.
    let default_alpn = match non_blank(&self.default_alpn) {
      Some(v) => split_csv(v),
      None => split_csv(env.default_alpn.as_deref().unwrap_or(DEFAULT_ALPN)),
    };

    ResolvedOptions {
      preset,
      enable_adblock: self.enable_adblock.or(env.enable_adblock).unwrap_or(false),
      enable_doh_direct: self.enable_doh_direct.or(env.enable_doh_direct).unwrap_or(false),
      strict_global_proxy: self.strict_global_proxy.or(env.strict_global_proxy).unwrap_or(false),
      use_rule_set: self.use_rule_set.or(env.use_rule_set).unwrap_or(true),
      bypass_domains: domains(&self.bypass_domains, &env.bypass_domains),
      proxy_domains: domains(&self.proxy_domains, &env.proxy_domains),
      rule_set_base,
      default_alpn,
    }
  }
}
