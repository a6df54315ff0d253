use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ForgeFrameError;

/// Literal prefix a target window's `name` attribute carries, per spec.md §6.
pub const HANDSHAKE_SENTINEL: &str = "__forgeframe__";

/// Hard cap on the encoded handshake string, spec.md §3/§4.4.
pub const HANDSHAKE_SIZE_LIMIT: usize = 32 * 1024;

/// Only non-ASCII bytes get percent-escaped; every ASCII byte (including
/// JSON structural characters) passes through untouched, per spec.md §4.4
/// ("JSON then percent-escaped for non-ASCII then base64").
const ONLY_NON_ASCII: &AsciiSet = &AsciiSet::EMPTY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingMode {
    Iframe,
    Popup,
}

/// The bytes placed in the target window's name so the host can read them
/// before any script runs, spec.md §3/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    pub uid: String,
    pub tag: String,
    pub version: String,
    pub context: RenderingMode,
    pub consumer_domain: String,
    pub props: Value,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub children: Option<HashMap<String, Value>>,
}

/// Encode a payload into the window-name string, failing if it would exceed
/// [`HANDSHAKE_SIZE_LIMIT`].
pub fn build(payload: &HandshakePayload) -> Result<String, ForgeFrameError> {
    let json = serde_json::to_string(payload).expect("HandshakePayload always serializes");
    let escaped = utf8_percent_encode(&json, ONLY_NON_ASCII).to_string();
    let encoded = format!("{HANDSHAKE_SENTINEL}{}", BASE64.encode(escaped.as_bytes()));

    if encoded.len() > HANDSHAKE_SIZE_LIMIT {
        return Err(ForgeFrameError::PayloadTooLarge {
            limit: HANDSHAKE_SIZE_LIMIT,
            actual: encoded.len(),
        });
    }

    Ok(encoded)
}

/// Decode a window-name string back into a payload. Returns `None` unless
/// `name` starts with [`HANDSHAKE_SENTINEL`] and decodes cleanly — this is
/// how the factory decides whether to stay dormant.
pub fn parse(name: &str) -> Option<HandshakePayload> {
    let body = name.strip_prefix(HANDSHAKE_SENTINEL)?;
    let decoded_bytes = BASE64.decode(body).ok()?;
    let escaped = String::from_utf8(decoded_bytes).ok()?;
    let json = percent_decode_str(&escaped).decode_utf8().ok()?;
    serde_json::from_str(&json).ok()
}

/// Whether `name` carries a handshake payload at all, regardless of content.
pub fn is_handshake_name(name: &str) -> bool {
    name.starts_with(HANDSHAKE_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tag: &str) -> HandshakePayload {
        HandshakePayload {
            uid: "abc123_xyz789000".into(),
            tag: tag.into(),
            version: "0.1.0".into(),
            context: RenderingMode::Iframe,
            consumer_domain: "https://consumer.example".into(),
            props: serde_json::json!({"greeting": "héllo wörld 😀"}),
            exports: vec!["onClick".into()],
            children: None,
        }
    }

    #[test]
    fn round_trips_under_the_cap() {
        let payload = sample("p");
        let encoded = build(&payload).expect("fits under the cap");
        let decoded = parse(&encoded).expect("well-formed payload decodes");
        assert_eq!(decoded.tag, "p");
        assert_eq!(decoded.props, payload.props);
    }

    #[test]
    fn rejects_oversized_payloads() {
        let mut payload = sample("p");
        payload.props = serde_json::json!({"blob": "x".repeat(HANDSHAKE_SIZE_LIMIT)});
        let err = build(&payload).expect_err("oversized payload must fail");
        assert!(matches!(err, ForgeFrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn parse_rejects_non_sentinel_names() {
        assert!(parse("some-other-window-name").is_none());
        assert!(!is_handshake_name("some-other-window-name"));
    }

    #[test]
    fn parse_rejects_garbage_after_sentinel() {
        assert!(parse(&format!("{HANDSHAKE_SENTINEL}not-valid-base64!!!")).is_none());
    }

    #[test]
    fn scenario_tag_round_trip() {
        let payload = sample("p");
        let encoded = build(&payload).unwrap();
        let decoded = parse(&encoded).unwrap();
        assert_eq!(decoded.tag, "p");
        assert_eq!(decoded.context, RenderingMode::Iframe);
    }
}
