use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::short_uid;

/// Literal prefix every wire message is tagged with, per spec.md §6.
pub const WIRE_SENTINEL: &str = "forgeframe:";

/// Reserved message names, spec.md §6.
pub mod names {
    pub const INIT: &str = "forgeframe_init";
    pub const PROPS: &str = "forgeframe_props";
    pub const CLOSE: &str = "forgeframe_close";
    pub const RESIZE: &str = "forgeframe_resize";
    pub const FOCUS: &str = "forgeframe_focus";
    pub const SHOW: &str = "forgeframe_show";
    pub const HIDE: &str = "forgeframe_hide";
    pub const ERROR: &str = "forgeframe_error";
    pub const EXPORT: &str = "forgeframe_export";
    pub const CALL: &str = "forgeframe_call";
    pub const CONSUMER_EXPORT: &str = "forgeframe_consumer_export";
    pub const GET_SIBLINGS: &str = "forgeframe_get_siblings";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Ack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSource {
    pub uid: String,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }
}

/// The wire record spec.md §3/§6 calls `Message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub name: String,
    #[serde(default)]
    pub data: Value,
    pub source: MessageSource,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RemoteError>,
}

impl Message {
    pub fn request(name: impl Into<String>, data: Value, source: MessageSource) -> Self {
        Self {
            id: short_uid(),
            kind: MessageKind::Request,
            name: name.into(),
            data,
            source,
            error: None,
        }
    }

    pub fn response_ok(id: impl Into<String>, name: impl Into<String>, data: Value, source: MessageSource) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Response,
            name: name.into(),
            data,
            source,
            error: None,
        }
    }

    pub fn response_err(
        id: impl Into<String>,
        name: impl Into<String>,
        error: RemoteError,
        source: MessageSource,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Response,
            name: name.into(),
            data: Value::Null,
            source,
            error: Some(error),
        }
    }

    pub fn ack(id: impl Into<String>, name: impl Into<String>, source: MessageSource) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Ack,
            name: name.into(),
            data: Value::Null,
            source,
            error: None,
        }
    }

    pub fn is_wellformed(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty() && !self.source.uid.is_empty()
    }

    /// `forgeframe:` + JSON(record).
    pub fn serialize(&self) -> String {
        format!(
            "{WIRE_SENTINEL}{}",
            serde_json::to_string(self).expect("Message always serializes")
        )
    }

    /// Returns `None` for anything not sentinel-prefixed or not well-formed JSON.
    pub fn deserialize(wire: &str) -> Option<Self> {
        let body = wire.strip_prefix(WIRE_SENTINEL)?;
        let message: Self = serde_json::from_str(body).ok()?;
        if message.is_wellformed() {
            Some(message)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MessageSource {
        MessageSource {
            uid: "abc123_xyz789".into(),
            domain: "https://consumer.example".into(),
        }
    }

    #[test]
    fn round_trips_through_wire_encoding() {
        let msg = Message::request("greet", serde_json::json!({"name": "world"}), source());
        let wire = msg.serialize();
        assert!(wire.starts_with(WIRE_SENTINEL));
        let decoded = Message::deserialize(&wire).expect("well-formed message decodes");
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.name, "greet");
        assert_eq!(decoded.data, serde_json::json!({"name": "world"}));
    }

    #[test]
    fn rejects_non_sentinel_strings() {
        assert!(Message::deserialize("not-a-forgeframe-message").is_none());
        assert!(Message::deserialize("forgeframe:not json").is_none());
    }

    #[test]
    fn rejects_malformed_records() {
        let bad = format!("{WIRE_SENTINEL}{{\"id\":\"\",\"type\":\"request\",\"name\":\"x\",\"data\":null,\"source\":{{\"uid\":\"u\",\"domain\":\"d\"}}}}");
        assert!(Message::deserialize(&bad).is_none(), "empty id must be rejected");
    }
}
