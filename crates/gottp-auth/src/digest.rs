// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP Digest authentication (RFC 7616).
//!
//! Digest is a two-phase scheme: the first attempt carries no credentials,
//! the server challenges with `WWW-Authenticate: Digest ...`, and the caller
//! re-issues the request with a computed `Authorization` header. This module
//! owns challenge parsing and response computation; the retry loop itself
//! lives in the protocol dispatcher, which is the only component that can
//! observe the 401.

use gottp_error::Error;
use md5::{Digest as _, Md5};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;

/// Hash algorithm negotiated via the challenge's `algorithm` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// `MD5` (the default when the server omits `algorithm`).
    Md5,
    /// `MD5-sess`.
    Md5Sess,
    /// `SHA-256`.
    Sha256,
    /// `SHA-256-sess`.
    Sha256Sess,
}

impl Algorithm {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_uppercase()) {
            Some(ref s) if s == "MD5-SESS" => Algorithm::Md5Sess,
            Some(ref s) if s == "SHA-256" => Algorithm::Sha256,
            Some(ref s) if s == "SHA-256-SESS" => Algorithm::Sha256Sess,
            _ => Algorithm::Md5,
        }
    }

    fn is_sess(self) -> bool {
        matches!(self, Algorithm::Md5Sess | Algorithm::Sha256Sess)
    }

    fn hash_hex(self, data: &str) -> String {
        match self {
            Algorithm::Md5 | Algorithm::Md5Sess => {
                let mut hasher = Md5::new();
                hasher.update(data.as_bytes());
                hex_encode(&hasher.finalize())
            }
            Algorithm::Sha256 | Algorithm::Sha256Sess => {
                use sha2::Digest as _;
                let mut hasher = Sha256::new();
                hasher.update(data.as_bytes());
                hex_encode(&hasher.finalize())
            }
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Quality-of-protection mode negotiated from the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    /// No `qop` offered: legacy RFC 2069 response computation.
    Legacy,
    /// `auth`.
    Auth,
    /// `auth-int`.
    AuthInt,
}

/// A parsed `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// `realm` parameter.
    pub realm: String,
    /// `nonce` parameter.
    pub nonce: String,
    /// `opaque` parameter, echoed back verbatim if present.
    pub opaque: Option<String>,
    /// Raw `qop` values offered by the server, e.g. `["auth", "auth-int"]`.
    pub qop_options: Vec<String>,
    /// `algorithm` parameter (defaults to MD5 when absent).
    pub algorithm: Algorithm,
}

/// Tokenize a `WWW-Authenticate` header's parameter list, honoring commas
/// inside quoted values.
fn tokenize_params(params: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let bytes = params.as_bytes();
    let mut token_start = 0usize;
    let mut in_quotes = false;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                push_param(&mut out, params[token_start..i].trim());
                token_start = i + 1;
            }
            _ => {}
        }
    }
    push_param(&mut out, params[token_start..].trim());
    out
}

fn push_param(out: &mut HashMap<String, String>, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    if let Some((key, value)) = raw.split_once('=') {
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
        out.insert(key, value.to_string());
    }
}

impl Challenge {
    /// Parse the value of a `WWW-Authenticate` header, e.g.
    /// `Digest realm="testrealm@host.com", nonce="...", qop="auth,auth-int"`.
    pub fn parse(header_value: &str) -> Result<Self, Error> {
        let rest = header_value
            .trim()
            .strip_prefix("Digest")
            .ok_or_else(|| Error::auth("WWW-Authenticate header is not a Digest challenge"))?
            .trim_start();

        let params = tokenize_params(rest);

        let realm = params.get("realm").cloned().ok_or_else(|| Error::auth("Digest challenge missing realm"))?;
        let nonce = params.get("nonce").cloned().ok_or_else(|| Error::auth("Digest challenge missing nonce"))?;
        let opaque = params.get("opaque").cloned();
        let qop_options = params
            .get("qop")
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let algorithm = Algorithm::parse(params.get("algorithm").map(|s| s.as_str()));

        Ok(Self {
            realm,
            nonce,
            opaque,
            qop_options,
            algorithm,
        })
    }

    /// Select the negotiated QOP: prefer `auth` over `auth-int`, else legacy.
    pub fn select_qop(&self) -> Qop {
        if self.qop_options.iter().any(|q| q == "auth") {
            Qop::Auth
        } else if self.qop_options.iter().any(|q| q == "auth-int") {
            Qop::AuthInt
        } else {
            Qop::Legacy
        }
    }
}

/// An 8-random-byte, hex-encoded client nonce.
pub fn generate_cnonce() -> String {
    let bytes: [u8; 8] = rand::random();
    hex_encode(&bytes)
}

/// Compute `HA1` per RFC 7616 §3.4.2, accounting for `-sess` algorithm
/// variants.
pub fn compute_ha1(algorithm: Algorithm, username: &str, realm: &str, password: &str, nonce: &str, cnonce: &str) -> String {
    let base = algorithm.hash_hex(&format!("{username}:{realm}:{password}"));
    if algorithm.is_sess() {
        algorithm.hash_hex(&format!("{base}:{nonce}:{cnonce}"))
    } else {
        base
    }
}

/// Compute `HA2` for `qop=auth` / legacy mode (`H(method:uri)`).
pub fn compute_ha2(algorithm: Algorithm, method: &str, uri: &str) -> String {
    algorithm.hash_hex(&format!("{method}:{uri}"))
}

/// A fully computed Digest response, ready to render into an `Authorization`
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResponse {
    /// Resource owner username.
    pub username: String,
    /// Challenge realm, echoed back.
    pub realm: String,
    /// Challenge nonce, echoed back.
    pub nonce: String,
    /// Request URI, echoed back.
    pub uri: String,
    /// Computed `response` digest.
    pub response: String,
    /// Negotiated QOP, if any.
    pub qop: Qop,
    /// Nonce count, present only when `qop != Legacy`.
    pub nc: Option<u32>,
    /// Client nonce, present only when `qop != Legacy`.
    pub cnonce: Option<String>,
    /// Echoed `opaque`, if the challenge carried one.
    pub opaque: Option<String>,
}

/// Authorize a single request against a parsed [`Challenge`] (§4.3 step 2).
///
/// `nc` is the 1-based nonce count for this nonce; callers own incrementing
/// it across repeated requests against the same challenge.
pub fn authorize(username: &str, password: &str, method: &str, uri: &str, challenge: &Challenge, nc: u32) -> DigestResponse {
    let qop = challenge.select_qop();
    let cnonce = generate_cnonce();
    let ha1 = compute_ha1(challenge.algorithm, username, &challenge.realm, password, &challenge.nonce, &cnonce);
    let ha2 = compute_ha2(challenge.algorithm, method, uri);

    let (response, cnonce_opt) = match qop {
        Qop::Legacy => {
            let response = challenge.algorithm.hash_hex(&format!("{ha1}:{}:{ha2}", challenge.nonce));
            (response, None)
        }
        Qop::Auth | Qop::AuthInt => {
            let nc_str = format!("{nc:08x}");
            let qop_tag = if qop == Qop::Auth { "auth" } else { "auth-int" };
            let response = challenge
                .algorithm
                .hash_hex(&format!("{ha1}:{}:{nc_str}:{cnonce}:{qop_tag}:{ha2}", challenge.nonce));
            (response, Some(cnonce.clone()))
        }
    };

    DigestResponse {
        username: username.to_string(),
        realm: challenge.realm.clone(),
        nonce: challenge.nonce.clone(),
        uri: uri.to_string(),
        response,
        qop,
        nc: cnonce_opt.as_ref().map(|_| nc),
        cnonce: cnonce_opt,
        opaque: challenge.opaque.clone(),
    }
}

impl fmt::Display for DigestResponse {
    /// Render as an `Authorization: Digest ...` header value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.username, self.realm, self.nonce, self.uri, self.response
        )?;
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{opaque}\"")?;
        }
        if let (Some(nc), Some(cnonce)) = (self.nc, &self.cnonce) {
            let qop_tag = if self.qop == Qop::AuthInt { "auth-int" } else { "auth" };
            write!(f, ", qop={qop_tag}, nc={nc:08x}, cnonce=\"{cnonce}\"")?;
        }
        Ok(())
    }
}
