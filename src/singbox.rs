use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::normalize::best_effort_decode;
use crate::options::{ResolvedOptions, RulesPreset};
use crate::sub_parse::Endpoint;

pub const PROXY_TAG: &str = "proxy";
pub const DIRECT_TAG: &str = "direct";
pub const BLOCK_TAG: &str = "block";
pub const OBFS_SALAMANDER: &str = "salamander";

const PEM_MARKER: &str = "-----BEGIN";
const RULE_SET_UPDATE_INTERVAL: &str = "168h";

pub const PRIVATE_CIDRS: [&str; 7] = [
  "127.0.0.0/8",
  "10.0.0.0/8",
  "172.16.0.0/12",
  "192.168.0.0/16",
  "::1/128",
  "fc00::/7",
  "fe80::/10",
];

pub const DOH_HOSTS: [&str; 5] = [
  "dns.google",
  "cloudflare-dns.com",
  "one.one.one.one",
  "doh.pub",
  "dns.alidns.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
  pub outbounds: Vec<Outbound>,
  pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
  Hysteria2(Hysteria2Outbound),
  Selector(SelectorOutbound),
  Block { tag: String },
}

impl Outbound {
  pub fn tag(&self) -> &str {
    match self {
      Outbound::Hysteria2(o) => &o.tag,
      Outbound::Selector(o) => &o.tag,
      Outbound::Block { tag } => tag,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hysteria2Outbound {
  pub tag: String,
  pub server: String,
  pub server_port: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub server_ports: Option<Vec<String>>,
  pub password: String,
  pub tls: Tls,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub obfs: Option<Obfs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tls {
  pub enabled: bool,
  pub insecure: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub server_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub alpn: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub certificate: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obfs {
  #[serde(rename = "type")]
  pub kind: String,
  pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorOutbound {
  pub tag: String,
  pub outbounds: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
  pub rules: Vec<RouteRule>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rule_set: Option<Vec<RuleSet>>,
  #[serde(rename = "final")]
  pub final_tag: String,
}

/// One routing rule. Exactly one matcher field is set per rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
  pub outbound: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ip_cidr: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub domain: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rule_set: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub geoip: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub geosite: Option<Vec<String>>,
}

impl RouteRule {
  fn domains(outbound: &str, domains: &[String]) -> Self {
    Self {
      outbound: outbound.to_string(),
      domain: Some(domains.to_vec()),
      ..Default::default()
    }
  }
}

/// Remote binary rule-set descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
  #[serde(rename = "type")]
  pub kind: String,
  pub format: String,
  pub url: String,
  pub tag: String,
  pub download_detour: String,
  pub update_interval: String,
}

/// Geo data usable either as a rule-set asset or as inline geoip/geosite tags.
struct GeoAsset {
  tag: &'static str,
  file: &'static str,
  geoip: &'static [&'static str],
  geosite: &'static [&'static str],
}

const GEOIP_CN: GeoAsset = GeoAsset {
  tag: "geoip-cn",
  file: "geoip-cn.srs",
  geoip: &["cn"],
  geosite: &[],
};

const GEOSITE_CN: GeoAsset = GeoAsset {
  tag: "geosite-geolocation-cn",
  file: "geosite-geolocation-cn.srs",
  geoip: &[],
  geosite: &["geolocation-cn", "cn"],
};

const ADS_ALL: GeoAsset = GeoAsset {
  tag: "ads-all",
  file: "geosite-category-ads-all.srs",
  geoip: &[],
  geosite: &["category-ads-all"],
};

const NOT_CN: GeoAsset = GeoAsset {
  tag: "geolocation-not-cn",
  file: "geosite-geolocation-!cn.srs",
  geoip: &[],
  geosite: &["geolocation-!cn"],
};

fn to_strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

fn non_empty(items: &[&str]) -> Option<Vec<String>> {
  if items.is_empty() {
    None
  } else {
    Some(to_strings(items))
  }
}

struct RouteBuilder<'a> {
  opts: &'a ResolvedOptions,
  rules: Vec<RouteRule>,
  rule_sets: Vec<RuleSet>,
}

impl<'a> RouteBuilder<'a> {
  fn new(opts: &'a ResolvedOptions) -> Self {
    Self {
      opts,
      rules: Vec::new(),
      rule_sets: Vec::new(),
    }
  }

  fn push(&mut self, rule: RouteRule) {
    self.rules.push(rule);
  }

  /// Geo rule in whichever mode `use_rule_set` selects; never both.
  fn geo(&mut self, outbound: &str, asset: &GeoAsset) {
    let rule = if self.opts.use_rule_set {
      self.rule_sets.push(RuleSet {
        kind: "remote".to_string(),
        format: "binary".to_string(),
        url: format!("{}/{}", self.opts.rule_set_base, asset.file),
        tag: asset.tag.to_string(),
        download_detour: PROXY_TAG.to_string(),
        update_interval: RULE_SET_UPDATE_INTERVAL.to_string(),
      });
      RouteRule {
        outbound: outbound.to_string(),
        rule_set: Some(vec![asset.tag.to_string()]),
        ..Default::default()
      }
    } else {
      RouteRule {
        outbound: outbound.to_string(),
        geoip: non_empty(asset.geoip),
        geosite: non_empty(asset.geosite),
        ..Default::default()
      }
    };
    self.push(rule);
  }

  fn finish(self, final_tag: &str) -> Route {
    let rule_set = if self.opts.use_rule_set && !self.rule_sets.is_empty() {
      Some(self.rule_sets)
    } else {
      None
    };
    Route {
      rules: self.rules,
      rule_set,
      final_tag: final_tag.to_string(),
    }
  }
}

/// PEM text, or base64 of PEM, split into lines. Anything else yields `None`.
fn certificate_lines(ca: &str) -> Option<Vec<String>> {
  let pem = if ca.contains(PEM_MARKER) {
    ca.to_string()
  } else {
    // Form decoding of the query turned '+' into ' '.
    best_effort_decode(&ca.replace(' ', "+")).into_string()
  };
  if !pem.contains(PEM_MARKER) {
    return None;
  }
  Some(pem.lines().map(str::to_string).collect())
}

fn endpoint_outbound(index: usize, ep: &Endpoint, opts: &ResolvedOptions) -> Hysteria2Outbound {
  let tag = ep.name.clone().unwrap_or_else(|| format!("hysteria-{index}"));

  let alpn = match &ep.alpn {
    Some(list) if !list.is_empty() => list.clone(),
    _ => opts.default_alpn.clone(),
  };

  let obfs = match (&ep.obfs_type, &ep.obfs_password) {
    (Some(kind), Some(pw)) if kind.trim().eq_ignore_ascii_case(OBFS_SALAMANDER) && !pw.is_empty() => Some(Obfs {
      kind: OBFS_SALAMANDER.to_string(),
      password: pw.clone(),
    }),
    _ => None,
  };

  Hysteria2Outbound {
    tag,
    server: ep.server.clone(),
    server_port: ep.port,
    server_ports: ep.port_ranges.clone().filter(|r| !r.is_empty()),
    password: ep.password.clone(),
    tls: Tls {
      enabled: true,
      insecure: ep.insecure,
      server_name: ep.sni.clone().filter(|s| !s.is_empty()),
      alpn: if alpn.is_empty() { None } else { Some(alpn) },
      certificate: ep.ca.as_deref().and_then(certificate_lines),
    },
    obfs,
  }
}

/// Compiles endpoints and routing options into a sing-box configuration.
///
/// Rules are emitted in a fixed order, since the router takes the first match:
/// private ranges, preset, adblock, DoH, strict global proxy, then the custom
/// bypass and proxy domain lists.
pub fn compile(endpoints: &[Endpoint], opts: &ResolvedOptions) -> Result<Configuration, ConvertError> {
  if endpoints.is_empty() {
    return Err(ConvertError::NoEndpoints);
  }

  let mut outbounds: Vec<Outbound> = endpoints
    .iter()
    .enumerate()
    .map(|(i, ep)| Outbound::Hysteria2(endpoint_outbound(i, ep, opts)))
    .collect();
  let tags: Vec<String> = outbounds.iter().map(|o| o.tag().to_string()).collect();

  let mut route = RouteBuilder::new(opts);
  route.push(RouteRule {
    outbound: DIRECT_TAG.to_string(),
    ip_cidr: Some(to_strings(&PRIVATE_CIDRS)),
    ..Default::default()
  });

  let final_tag = match opts.preset {
    RulesPreset::CnDirect => {
      route.geo(DIRECT_TAG, &GEOIP_CN);
      route.geo(DIRECT_TAG, &GEOSITE_CN);
      PROXY_TAG
    }
    RulesPreset::GlobalDirect => DIRECT_TAG,
    RulesPreset::GlobalProxy | RulesPreset::Unset => PROXY_TAG,
    RulesPreset::ProxyDomainsOnly => {
      if !opts.proxy_domains.is_empty() {
        route.push(RouteRule::domains(PROXY_TAG, &opts.proxy_domains));
      }
      DIRECT_TAG
    }
    RulesPreset::DirectDomainsOnly => {
      if !opts.bypass_domains.is_empty() {
        route.push(RouteRule::domains(DIRECT_TAG, &opts.bypass_domains));
      }
      PROXY_TAG
    }
  };

  if opts.enable_adblock {
    route.geo(BLOCK_TAG, &ADS_ALL);
    outbounds.push(Outbound::Block {
      tag: BLOCK_TAG.to_string(),
    });
  }
  if opts.enable_doh_direct {
    route.push(RouteRule::domains(DIRECT_TAG, &to_strings(&DOH_HOSTS)));
  }
  if opts.strict_global_proxy {
    route.geo(PROXY_TAG, &NOT_CN);
  }

  if !opts.bypass_domains.is_empty() && opts.preset != RulesPreset::DirectDomainsOnly {
    route.push(RouteRule::domains(DIRECT_TAG, &opts.bypass_domains));
  }
  if !opts.proxy_domains.is_empty() && opts.preset != RulesPreset::ProxyDomainsOnly {
    route.push(RouteRule::domains(PROXY_TAG, &opts.proxy_domains));
  }

  outbounds.push(Outbound::Selector(SelectorOutbound {
    tag: PROXY_TAG.to_string(),
    default: tags.first().cloned(),
    outbounds: tags,
  }));

  Ok(Configuration {
    outbounds,
    route: route.finish(final_tag),
  })
}
