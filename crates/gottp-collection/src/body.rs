// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request body representation.

use serde::{Deserialize, Serialize};

/// Body content-shape tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// No body.
    None,
    /// `application/json`.
    Json,
    /// `application/xml`.
    Xml,
    /// `text/plain`.
    Text,
    /// `application/x-www-form-urlencoded`.
    Form,
    /// `multipart/form-data`.
    Multipart,
}

impl BodyType {
    /// The MIME type this body type implies on the wire, if any.
    pub fn mime(&self) -> Option<&'static str> {
        match self {
            BodyType::None => None,
            BodyType::Json => Some("application/json"),
            BodyType::Xml => Some("application/xml"),
            BodyType::Text => Some("text/plain"),
            BodyType::Form => Some("application/x-www-form-urlencoded"),
            BodyType::Multipart => Some("multipart/form-data"),
        }
    }
}

/// A request body: `{type, content}`. Content is stored as a string; for
/// multipart bodies the serialization to a wire body happens at dispatch
/// time (the stored content is a newline-separated `name=value` outline).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Body {
    /// Body shape.
    #[serde(rename = "type", default)]
    pub body_type: BodyType,
    /// Raw, not-yet-resolved content.
    #[serde(default)]
    pub content: String,
}

impl Default for BodyType {
    fn default() -> Self {
        BodyType::None
    }
}

impl Body {
    /// Construct a `none` body.
    pub fn none() -> Self {
        Self::default()
    }

    /// Construct a JSON body from a literal string.
    pub fn json(content: impl Into<String>) -> Self {
        Self {
            body_type: BodyType::Json,
            content: content.into(),
        }
    }

    /// Construct a plain-text body.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            body_type: BodyType::Text,
            content: content.into(),
        }
    }

    /// `true` when this body carries no content.
    pub fn is_empty(&self) -> bool {
        self.body_type == BodyType::None || self.content.is_empty()
    }
}
