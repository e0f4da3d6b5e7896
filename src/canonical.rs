use base64::engine::general_purpose;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::ConvertError;
use crate::normalize::pad_base64;
use crate::singbox::Configuration;

/// Compact JSON with sorted object keys.
pub fn to_canonical_json<T: Serialize>(doc: &T) -> Result<String, ConvertError> {
  let value = serde_json::to_value(doc)?;
  Ok(serde_json::to_string(&value)?)
}

pub fn encode<T: Serialize>(doc: &T) -> Result<String, ConvertError> {
  let json = to_canonical_json(doc)?;
  Ok(general_purpose::URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Raw bytes of an encoded document; missing padding is restored first.
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, ConvertError> {
  let padded = pad_base64(encoded.trim());
  Ok(general_purpose::URL_SAFE.decode(padded)?)
}

pub fn decode_as<T: DeserializeOwned>(encoded: &str) -> Result<T, ConvertError> {
  let bytes = decode_bytes(encoded)?;
  Ok(serde_json::from_slice(&bytes)?)
}

pub fn decode(encoded: &str) -> Result<Configuration, ConvertError> {
  decode_as(encoded)
}

/// A stored or linked document, as it should be shown to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
  Json(JsonValue),
  /// Valid base64 whose payload is not JSON.
  Text(String),
}

/// Decodes for display, tolerating non-JSON payloads as opaque text.
pub fn decode_document(encoded: &str) -> Result<Document, ConvertError> {
  let bytes = decode_bytes(encoded)?;
  match serde_json::from_slice::<JsonValue>(&bytes) {
    Ok(v) => Ok(Document::Json(v)),
    Err(_) => Ok(Document::Text(String::from_utf8_lossy(&bytes).into_owned())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::options::{ResolvedOptions, RulesPreset};
  use crate::singbox::{compile, Outbound, Route, SelectorOutbound};
  use crate::sub_parse::Endpoint;

  fn minimal() -> Configuration {
    Configuration {
      outbounds: vec![Outbound::Selector(SelectorOutbound {
        tag: "proxy".to_string(),
        outbounds: vec![],
        default: None,
      })],
      route: Route {
        rules: vec![],
        rule_set: None,
        final_tag: "proxy".to_string(),
      },
    }
  }

  fn full() -> Configuration {
    let mut e = Endpoint::new("example.com", 443, "pw");
    e.sni = Some("example.com".to_string());
    e.insecure = true;
    e.obfs_type = Some("salamander".to_string());
    e.obfs_password = Some("cry".to_string());
    e.alpn = Some(vec!["h3".to_string()]);
    e.ca = Some("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----".to_string());
    e.name = Some("node".to_string());
    e.port_ranges = Some(vec!["1000:2000".to_string()]);
    let opts = ResolvedOptions {
      preset: RulesPreset::CnDirect,
      enable_adblock: true,
      enable_doh_direct: true,
      strict_global_proxy: true,
      bypass_domains: vec!["a.cn".to_string()],
      proxy_domains: vec!["b.com".to_string()],
      ..Default::default()
    };
    compile(&[e], &opts).unwrap()
  }

  #[test]
  fn round_trip_minimal_and_full() {
    for cfg in [minimal(), full()] {
      let enc = encode(&cfg).unwrap();
      assert_eq!(decode(&enc).unwrap(), cfg);
    }
  }

  #[test]
  fn output_is_unpadded_url_safe() {
    let enc = encode(&full()).unwrap();
    assert!(!enc.contains('='));
    assert!(!enc.contains('+'));
    assert!(!enc.contains('/'));
  }

  #[test]
  fn keys_are_sorted_and_compact() {
    let json = to_canonical_json(&minimal()).unwrap();
    assert_eq!(
      json,
      r#"{"outbounds":[{"outbounds":[],"tag":"proxy","type":"selector"}],"route":{"final":"proxy","rules":[]}}"#
    );
  }

  #[test]
  fn encoding_is_deterministic() {
    assert_eq!(encode(&full()).unwrap(), encode(&full()).unwrap());
  }

  #[test]
  fn bad_base64_is_decode_error() {
    assert!(matches!(decode("***"), Err(ConvertError::DecodeError(_))));
  }

  #[test]
  fn non_json_payload() {
    let enc = general_purpose::URL_SAFE_NO_PAD.encode("plain words");
    assert!(matches!(decode(&enc), Err(ConvertError::MalformedDocument(_))));
    assert_eq!(decode_document(&enc).unwrap(), Document::Text("plain words".to_string()));
  }

  #[test]
  fn decode_document_json() {
    let enc = encode(&minimal()).unwrap();
    match decode_document(&enc).unwrap() {
      Document::Json(v) => assert_eq!(v["route"]["final"], "proxy"),
      other => panic!("unexpected {other:?}"),
    }
  }
}
