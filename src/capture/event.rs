//! Lifecycle events sent from the interception context to the consumer.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::classify::Kind;

/// Opaque request identifier, unique for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Browser tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tab identifier the browser assigns to requests that belong to no tab.
pub const SENTINEL_TAB: TabId = TabId(-1);

/// One HTTP header. Header lists keep order and allow duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Request metadata shared by every non-body lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub id: RequestId,
    pub tab_id: TabId,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub request_headers: Vec<Header>,
    #[serde(default)]
    pub response_headers: Vec<Header>,
    /// Normalized content type; empty when the response carried none.
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "default_kind")]
    pub kind: Kind,
}

fn default_kind() -> Kind {
    Kind::Etc
}

impl RequestInfo {
    /// Creates a bare record for `id` with no headers and kind `etc`.
    pub fn new(
        id: impl Into<String>,
        tab_id: TabId,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: RequestId::new(id),
            tab_id,
            url: url.into(),
            method: method.into(),
            status: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            content_type: String::new(),
            kind: Kind::Etc,
        }
    }
}

/// Final state of one response body tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyCapture {
    pub id: RequestId,
    pub tab_id: TabId,
    /// Total bytes observed, including bytes past the capture ceiling.
    pub length: u64,
    /// Buffered chunks, or `None` once the ceiling was exceeded.
    #[serde(default, with = "chunk_list")]
    pub chunks: Option<Vec<Bytes>>,
    pub success: bool,
}

/// Event stream from the interception context, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "info", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    RequestStarted(RequestInfo),
    RequestHeadersSent(RequestInfo),
    RequestCompleted(RequestInfo),
    RequestErrored(RequestInfo),
    BodyCaptured(BodyCapture),
}

impl LifecycleEvent {
    /// Identifier of the request this event belongs to.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::RequestStarted(info)
            | Self::RequestHeadersSent(info)
            | Self::RequestCompleted(info)
            | Self::RequestErrored(info) => &info.id,
            Self::BodyCaptured(body) => &body.id,
        }
    }

    /// Wire discriminant of the event.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestStarted(_) => "request-started",
            Self::RequestHeadersSent(_) => "request-headers-sent",
            Self::RequestCompleted(_) => "request-completed",
            Self::RequestErrored(_) => "request-errored",
            Self::BodyCaptured(_) => "body-captured",
        }
    }
}

/// Serializes captured chunks as a list of base64 strings.
mod chunk_list {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S>(chunks: &Option<Vec<Bytes>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match chunks {
            Some(chunks) => serializer.collect_seq(chunks.iter().map(|c| STANDARD.encode(c))),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<Bytes>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<Vec<String>> = Option::deserialize(deserializer)?;
        encoded
            .map(|list| {
                list.iter()
                    .map(|item| {
                        STANDARD
                            .decode(item)
                            .map(Bytes::from)
                            .map_err(serde::de::Error::custom)
                    })
                    .collect()
            })
            .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape_uses_kebab_case_discriminant() {
        let event = LifecycleEvent::RequestStarted(RequestInfo::new(
            "7",
            TabId(3),
            "GET",
            "https://host/a",
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "request-started");
        assert_eq!(json["info"]["id"], "7");
        assert_eq!(json["info"]["kind"], "etc");
    }

    #[test]
    fn test_body_capture_chunks_travel_as_base64() {
        let event = LifecycleEvent::BodyCaptured(BodyCapture {
            id: RequestId::new("9"),
            tab_id: TabId(1),
            length: 5,
            chunks: Some(vec![Bytes::from_static(b"hello")]),
            success: true,
        });
        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("aGVsbG8="), "{text}");

        let parsed: LifecycleEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_body_capture_overflow_sentinel_is_null() {
        let json = r#"{"type":"body-captured","info":{"id":"1","tab_id":2,"length":900,"chunks":null,"success":true}}"#;
        let parsed: LifecycleEvent = serde_json::from_str(json).unwrap();
        let LifecycleEvent::BodyCaptured(body) = parsed else {
            panic!("expected body-captured");
        };
        assert!(body.chunks.is_none());
        assert_eq!(body.length, 900);
    }

    #[test]
    fn test_request_info_defaults_when_fields_missing() {
        let json = r#"{"type":"request-headers-sent","info":{"id":"4","tab_id":1,"url":"https://h/","method":"GET"}}"#;
        let parsed: LifecycleEvent = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.request_id().as_str(), "4");
        assert_eq!(parsed.label(), "request-headers-sent");
    }
}
