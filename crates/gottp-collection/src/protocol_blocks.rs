// SPDX-License-Identifier: MIT OR Apache-2.0
//! Protocol tag and protocol-specific sub-blocks carried on a [`crate::Request`].

use crate::kv::KeyValue;
use serde::{Deserialize, Serialize};

/// Wire protocol a request is dispatched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Plain HTTP/1.1 or HTTP/2.
    Http,
    /// GraphQL over HTTP POST.
    GraphQl,
    /// WebSocket.
    WebSocket,
    /// gRPC.
    Grpc,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Http
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Protocol::Http => "http",
            Protocol::GraphQl => "graphql",
            Protocol::WebSocket => "websocket",
            Protocol::Grpc => "grpc",
        };
        f.write_str(s)
    }
}

/// GraphQL-specific request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GraphQlBlock {
    /// GraphQL query or mutation document.
    #[serde(default)]
    pub query: String,
    /// JSON-encoded `variables` object, not yet variable-resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<String>,
    /// Optional `operationName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// A pre-defined outbound WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WebSocketMessage {
    /// Display name for this canned message.
    #[serde(default)]
    pub name: String,
    /// Message payload, not yet variable-resolved.
    pub content: String,
}

/// WebSocket-specific request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WebSocketBlock {
    /// Pre-defined outbound messages the user can fire after connecting.
    #[serde(default)]
    pub messages: Vec<WebSocketMessage>,
}

/// gRPC-specific request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GrpcBlock {
    /// Fully-qualified service name, e.g. `package.Service`.
    #[serde(default)]
    pub service: String,
    /// Method name within the service.
    #[serde(default)]
    pub method: String,
    /// Request metadata (gRPC's equivalent of headers).
    #[serde(default)]
    pub metadata: Vec<KeyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_display() {
        assert_eq!(Protocol::Http.to_string(), "http");
        assert_eq!(Protocol::GraphQl.to_string(), "graphql");
        assert_eq!(Protocol::WebSocket.to_string(), "websocket");
        assert_eq!(Protocol::Grpc.to_string(), "grpc");
    }

    #[test]
    fn protocol_default_is_http() {
        assert_eq!(Protocol::default(), Protocol::Http);
    }

    #[test]
    fn graphql_block_serde_roundtrip() {
        let block = GraphQlBlock {
            query: "query { me { id } }".into(),
            variables: Some("{}".into()),
            operation_name: None,
        };
        let json = serde_json::to_string(&block).unwrap();
        let back: GraphQlBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
    }
}
