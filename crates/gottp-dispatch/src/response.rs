// SPDX-License-Identifier: MIT OR Apache-2.0
//! The uniform response envelope returned by every protocol driver.

use std::time::Duration;

/// Per-phase transmission timing, in order of occurrence. A phase that does
/// not apply to the transport in use (e.g. TLS handshake on a reused
/// connection) is reported as zero with `applicable = false` rather than
/// omitted, so renderers can distinguish "not measured" from "instant".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingPhase {
    /// Wall-clock duration of this phase.
    pub duration: Duration,
    /// `false` when this transport has no concept of this phase.
    pub applicable: bool,
}

impl TimingPhase {
    /// Construct a measured, applicable phase.
    pub fn measured(duration: Duration) -> Self {
        Self { duration, applicable: true }
    }

    /// Construct an inapplicable phase (zero duration, flagged as such).
    pub fn inapplicable() -> Self {
        Self { duration: Duration::ZERO, applicable: false }
    }
}

/// Full timing breakdown for one request attempt (§4.4 item 4).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingDetail {
    /// DNS resolution.
    pub dns_lookup: TimingPhase,
    /// TCP connection establishment.
    pub tcp_connect: TimingPhase,
    /// TLS handshake (inapplicable for plaintext transports).
    pub tls_handshake: TimingPhase,
    /// Time from request sent to first response byte.
    pub time_to_first_byte: TimingPhase,
    /// Time spent reading the full response body.
    pub transfer: TimingPhase,
    /// Total wall-clock duration of the attempt.
    pub total: Duration,
}

/// A single response header, possibly repeated (multi-valued) under the
/// same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// The uniform response envelope every protocol driver returns (§4.4 item 5).
#[derive(Debug, Clone)]
pub struct Response {
    /// Numeric status code (HTTP status, or a protocol-appropriate analog).
    pub status_code: u16,
    /// Status reason phrase.
    pub status_text: String,
    /// Response headers, in receipt order, multi-valued.
    pub headers: Vec<ResponseHeader>,
    /// Raw response body bytes, not content-decoded.
    pub body: Vec<u8>,
    /// Best-effort detected content type (from `Content-Type`, else sniffed).
    pub content_type: Option<String>,
    /// Total duration of the attempt.
    pub duration: Duration,
    /// Response body size in bytes.
    pub size: usize,
    /// Protocol string, e.g. `"http"`, `"graphql"`, `"websocket"`, `"grpc"`.
    pub protocol: String,
    /// Whether the transport used TLS.
    pub tls: bool,
    /// Timing breakdown for this attempt.
    pub timing: TimingDetail,
}

impl Response {
    /// Look up the first value for a header name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for a header name, case-insensitively, in receipt order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }
}
