// SPDX-License-Identifier: MIT OR Apache-2.0
//! AWS Signature Version 4 request signing.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// The pieces needed to sign one outgoing request.
pub struct SigningInput<'a> {
    /// HTTP method, e.g. `GET`.
    pub method: &'a str,
    /// Absolute path portion of the URL, e.g. `/users`.
    pub canonical_uri: &'a str,
    /// Query parameters as `(name, value)` pairs, any order (sorted here).
    pub query: &'a [(String, String)],
    /// Headers as `(name, value)` pairs, any order (sorted here). Must
    /// include `host`.
    pub headers: &'a [(String, String)],
    /// Raw request body bytes (empty slice for bodiless requests).
    pub payload: &'a [u8],
    /// AWS access key id.
    pub access_key_id: &'a str,
    /// AWS secret access key.
    pub secret_access_key: &'a str,
    /// Optional temporary session token.
    pub session_token: Option<&'a str>,
    /// AWS region, e.g. `us-east-1`.
    pub region: &'a str,
    /// AWS service name, e.g. `execute-api`.
    pub service: &'a str,
    /// Signing timestamp, `YYYYMMDDTHHMMSSZ` (amz-date format).
    pub amz_date: &'a str,
}

/// The computed signature plus the headers the caller must attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// `Authorization` header value.
    pub authorization: String,
    /// `X-Amz-Date` header value (echoes [`SigningInput::amz_date`]).
    pub amz_date: String,
    /// `X-Amz-Security-Token`, present only when a session token was given.
    pub security_token: Option<String>,
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn uri_encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Sign a request per the AWS SigV4 algorithm (§4.3).
pub fn sign(input: &SigningInput<'_>) -> Signature {
    let date_stamp = &input.amz_date[..8];

    let mut sorted_headers: Vec<(String, String)> = input
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    sorted_headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = sorted_headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
    let signed_headers = sorted_headers.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(";");

    let mut sorted_query: Vec<(String, String)> = input.query.to_vec();
    sorted_query.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_query = sorted_query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode_component(k), uri_encode_component(v)))
        .collect::<Vec<_>>()
        .join("&");

    let payload_hash = sha256_hex(input.payload);

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method, input.canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{date_stamp}/{}/{}/aws4_request", input.region, input.service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        input.amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(format!("AWS4{}", input.secret_access_key).as_bytes(), date_stamp);
    let k_region = hmac_sha256(&k_date, input.region);
    let k_service = hmac_sha256(&k_region, input.service);
    let k_signing = hmac_sha256(&k_service, "aws4_request");
    let signature = hex_encode(&hmac_sha256(&k_signing, &string_to_sign));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        input.access_key_id
    );

    Signature {
        authorization,
        amz_date: input.amz_date.to_string(),
        security_token: input.session_token.map(|s| s.to_string()),
    }
}
