// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Item` tagged union (a Folder or a Request), and the types it wraps.
//!
//! The on-disk representation uses two optional sibling keys (`folder`,
//! `request`) to encode an either-or. We model this as a proper tagged union
//! internally and validate "exactly one present" at the serde boundary,
//! rather than carrying the ambient "two optionals" shape on the struct
//! itself (see `SPEC_FULL.md`'s Open Question dispositions).

use crate::auth::Auth;
use crate::body::Body;
use crate::kv::KeyValue;
use crate::protocol_blocks::{GraphQlBlock, GrpcBlock, Protocol, WebSocketBlock};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The unit of execution: a single configured API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Request {
    /// Stable identity, assigned on creation and preserved across save/load.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Wire protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// HTTP-style method name (also used to label GraphQL/gRPC calls, e.g.
    /// `POST`/`CALL`).
    pub method: String,
    /// Request URL (may contain `{{variable}}` references).
    pub url: String,
    /// Query parameters, in source order.
    #[serde(default)]
    pub params: Vec<KeyValue>,
    /// Headers, in source order.
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    /// Per-request auth override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
    /// GraphQL sub-block (present when `protocol == graphql`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<GraphQlBlock>,
    /// WebSocket sub-block (present when `protocol == websocket`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebSocketBlock>,
    /// gRPC sub-block (present when `protocol == grpc`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<GrpcBlock>,
    /// Pre-request script source. Stored and passed through only — no
    /// scripting VM is specified or executed by this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_script: Option<String>,
    /// Post-response script source. Stored and passed through only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_script: Option<String>,
}

impl Request {
    /// Construct a minimal HTTP GET request with a freshly assigned id.
    pub fn new(name: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            protocol: Protocol::Http,
            method: method.into(),
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            auth: None,
            body: None,
            graphql: None,
            websocket: None,
            grpc: None,
            pre_script: None,
            post_script: None,
        }
    }
}

/// A named, ordered sequence of [`Item`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Folder {
    /// Display name.
    pub name: String,
    /// Children, in source order.
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Folder {
    /// Construct an empty named folder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }
}

/// Either a [`Folder`] or a [`Request`].
///
/// On disk this is encoded as `{folder: {...}}` or `{request: {...}}`;
/// exactly one of the two keys must be present (enforced below, not left
/// ambient).
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A folder containing nested items.
    Folder(Folder),
    /// A single request.
    Request(Request),
}

impl Item {
    /// Display name, regardless of variant.
    pub fn name(&self) -> &str {
        match self {
            Item::Folder(f) => &f.name,
            Item::Request(r) => &r.name,
        }
    }

    /// `true` if this item is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self, Item::Folder(_))
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Item", 1)?;
        match self {
            Item::Folder(f) => s.serialize_field("folder", f)?,
            Item::Request(r) => s.serialize_field("request", r)?,
        }
        s.end()
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ItemVisitor;

        impl<'de> Visitor<'de> for ItemVisitor {
            type Value = Item;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with exactly one of `folder` or `request`")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Item, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut folder: Option<Folder> = None;
                let mut request: Option<Request> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "folder" => {
                            if folder.is_some() {
                                return Err(de::Error::duplicate_field("folder"));
                            }
                            folder = Some(map.next_value()?);
                        }
                        "request" => {
                            if request.is_some() {
                                return Err(de::Error::duplicate_field("request"));
                            }
                            request = Some(map.next_value()?);
                        }
                        other => {
                            return Err(de::Error::unknown_field(other, &["folder", "request"]));
                        }
                    }
                }

                match (folder, request) {
                    (Some(f), None) => Ok(Item::Folder(f)),
                    (None, Some(r)) => Ok(Item::Request(r)),
                    (Some(_), Some(_)) => Err(de::Error::custom(
                        "item has both `folder` and `request` — exactly one is required",
                    )),
                    (None, None) => Err(de::Error::custom(
                        "item has neither `folder` nor `request` — exactly one is required",
                    )),
                }
            }
        }

        deserializer.deserialize_map(ItemVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_new_assigns_nonempty_id() {
        let r = Request::new("Login", "POST", "https://example.com/login");
        assert!(!r.id.is_empty());
    }

    #[test]
    fn item_serialize_folder() {
        let item = Item::Folder(Folder::new("Auth"));
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"folder\""));
        assert!(!json.contains("\"request\""));
    }

    #[test]
    fn item_roundtrip_request() {
        let item = Item::Request(Request::new("Get user", "GET", "https://example.com/u"));
        let json = serde_json::to_string(&item).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }

    #[test]
    fn item_deserialize_rejects_both_present() {
        let raw = serde_json::json!({
            "folder": {"name": "A", "items": []},
            "request": {"name": "B", "method": "GET", "url": "http://x"}
        });
        let err = serde_json::from_value::<Item>(raw).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn item_deserialize_rejects_neither_present() {
        let raw = serde_json::json!({});
        let err = serde_json::from_value::<Item>(raw).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn item_deserialize_rejects_unknown_key() {
        let raw = serde_json::json!({"bogus": {}});
        assert!(serde_json::from_value::<Item>(raw).is_err());
    }

    #[test]
    fn item_name_delegates() {
        let folder = Item::Folder(Folder::new("Things"));
        let request = Item::Request(Request::new("Thing 1", "GET", "http://x"));
        assert_eq!(folder.name(), "Things");
        assert_eq!(request.name(), "Thing 1");
        assert!(folder.is_folder());
        assert!(!request.is_folder());
    }
}
