// SPDX-License-Identifier: MIT OR Apache-2.0
//! The HAR 1.2 codec: each `log.entries[]` element becomes one [`Request`]
//! on import; a single executed request/response pair becomes a one-entry
//! HAR document on export (§4.6).

use crate::{CodecWarning, ParseOutcome};
use gottp_collection::{Body, BodyType, Collection, Item, KeyValue, Request};
use gottp_dispatch::response::Response;
use gottp_error::Error;
use serde::Deserialize;

const MAX_NAME_LEN: usize = 60;

#[derive(Debug, Deserialize)]
struct Har {
    log: HarLog,
}

#[derive(Debug, Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
struct HarEntry {
    request: HarRequest,
}

#[derive(Debug, Deserialize)]
struct HarRequest {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<HarHeader>,
    #[serde(default, rename = "queryString")]
    query_string: Vec<HarHeader>,
    #[serde(default, rename = "postData")]
    post_data: Option<HarPostData>,
}

#[derive(Debug, Deserialize)]
struct HarHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct HarPostData {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    text: String,
}

/// Parse a HAR 1.2 log into a collection with one request per entry.
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome<Collection>, Error> {
    let har: Har = serde_json::from_slice(bytes).map_err(|e| Error::parse("invalid HAR document").with_source(Box::new(e)))?;
    let mut warnings = Vec::new();
    let mut collection = Collection::new("Imported from HAR");

    for entry in har.log.entries {
        let parsed_url = url::Url::parse(&entry.request.url).map_err(|e| Error::parse(format!("invalid HAR entry URL `{}`", entry.request.url)).with_source(Box::new(e)))?;
        let path = parsed_url.path().to_string();

        let mut name = format!("{} {path}", entry.request.method);
        if name.chars().count() > MAX_NAME_LEN {
            name = format!("{}...", name.chars().take(MAX_NAME_LEN.saturating_sub(3)).collect::<String>());
        }

        let mut url_without_query = parsed_url.clone();
        url_without_query.set_query(None);
        url_without_query.set_fragment(None);

        let headers: Vec<KeyValue> = entry
            .request
            .headers
            .iter()
            .filter_map(|h| {
                if h.name.starts_with(':') {
                    warnings.push(CodecWarning::new(format!("dropped HTTP/2 pseudo-header `{}`", h.name)));
                    None
                } else {
                    Some(KeyValue::new(h.name.clone(), h.value.clone()))
                }
            })
            .collect();

        let params: Vec<KeyValue> = entry.request.query_string.iter().map(|q| KeyValue::new(q.name.clone(), q.value.clone())).collect();

        let body = entry.request.post_data.as_ref().filter(|p| !p.text.is_empty()).map(|p| Body {
            body_type: body_type_from_mime(&p.mime_type),
            content: p.text.clone(),
        });

        let mut request = Request::new(name, entry.request.method.clone(), url_without_query.to_string());
        request.headers = headers;
        request.params = params;
        request.body = body;
        collection.items.push(Item::Request(request));
    }

    Ok(ParseOutcome { value: collection, warnings })
}

fn body_type_from_mime(mime: &str) -> BodyType {
    let mime = mime.to_ascii_lowercase();
    if mime.contains("json") {
        BodyType::Json
    } else if mime.contains("xml") {
        BodyType::Xml
    } else if mime.contains("multipart") {
        BodyType::Multipart
    } else if mime.contains("form-urlencoded") {
        BodyType::Form
    } else if mime.is_empty() {
        BodyType::None
    } else {
        BodyType::Text
    }
}

/// The outgoing side of one request, as needed to build a HAR entry. Kept
/// separate from [`gottp_auth::OutgoingRequest`] so this codec does not need
/// to depend on the auth crate for a four-field struct.
pub struct ExportRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Full request URL, query string included.
    pub url: &'a str,
    /// Headers actually sent on the wire.
    pub headers: &'a [(String, String)],
    /// Raw request body bytes sent on the wire, if any.
    pub body: &'a [u8],
}

fn phase_ms_or_unknown(phase: gottp_dispatch::response::TimingPhase) -> f64 {
    if phase.applicable {
        phase.duration.as_secs_f64() * 1000.0
    } else {
        -1.0
    }
}

/// Export one executed request/response pair as a single-entry HAR 1.2
/// document, with a `creator: gottp` stamp and timing fields populated from
/// `response`'s timing profile (`-1` for phases the transport didn't
/// measure, per §4.6).
pub fn export(request: &ExportRequest<'_>, response: &Response) -> Result<Vec<u8>, Error> {
    let content_type = request.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("content-type")).map(|(_, v)| v.clone());

    let post_data = if request.body.is_empty() {
        None
    } else {
        Some(serde_json::json!({
            "mimeType": content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string()),
            "text": String::from_utf8_lossy(request.body),
        }))
    };

    let headers_size: i64 = request
        .headers
        .iter()
        .map(|(k, v)| (k.len() + v.len() + 4) as i64)
        .sum::<i64>()
        + response.headers.iter().map(|h| (h.name.len() + h.value.len() + 4) as i64).sum::<i64>();

    let har = serde_json::json!({
        "log": {
            "version": "1.2",
            "creator": { "name": "gottp", "version": env!("CARGO_PKG_VERSION") },
            "entries": [{
                "startedDateTime": chrono::Utc::now().to_rfc3339(),
                "time": response.duration.as_secs_f64() * 1000.0,
                "request": {
                    "method": request.method,
                    "url": request.url,
                    "httpVersion": "HTTP/1.1",
                    "headers": request.headers.iter().map(|(name, value)| serde_json::json!({"name": name, "value": value})).collect::<Vec<_>>(),
                    "queryString": [],
                    "postData": post_data,
                    "headersSize": -1,
                    "bodySize": request.body.len(),
                },
                "response": {
                    "status": response.status_code,
                    "statusText": response.status_text,
                    "httpVersion": "HTTP/1.1",
                    "headers": response.headers.iter().map(|h| serde_json::json!({"name": h.name, "value": h.value})).collect::<Vec<_>>(),
                    "content": {
                        "size": response.body.len(),
                        "mimeType": response.content_type.clone().unwrap_or_default(),
                        "text": String::from_utf8_lossy(&response.body),
                    },
                    "redirectURL": "",
                    "headersSize": headers_size,
                    "bodySize": response.body.len(),
                },
                "cache": {},
                "timings": {
                    "blocked": -1.0,
                    "dns": phase_ms_or_unknown(response.timing.dns_lookup),
                    "connect": phase_ms_or_unknown(response.timing.tcp_connect),
                    "send": -1.0,
                    "wait": phase_ms_or_unknown(response.timing.time_to_first_byte),
                    "receive": phase_ms_or_unknown(response.timing.transfer),
                    "ssl": phase_ms_or_unknown(response.timing.tls_handshake),
                },
            }],
        },
    });

    serde_json::to_vec_pretty(&har).map_err(|e| Error::internal("failed to serialize HAR document").with_source(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gottp_dispatch::response::{TimingDetail, TimingPhase};
    use std::time::Duration;

    #[test]
    fn har_entry_becomes_request_with_query_extracted() {
        let har = serde_json::json!({
            "log": { "entries": [{
                "request": {
                    "method": "GET",
                    "url": "https://example.com/users?active=true",
                    "headers": [{"name": ":method", "value": "GET"}, {"name": "Accept", "value": "application/json"}],
                    "queryString": [{"name": "active", "value": "true"}],
                }
            }] }
        });
        let outcome = parse(&serde_json::to_vec(&har).unwrap()).unwrap();
        let Item::Request(request) = &outcome.value.items[0] else { panic!() };
        assert_eq!(request.url, "https://example.com/users");
        assert_eq!(request.params, vec![KeyValue::new("active", "true")]);
        assert_eq!(request.headers, vec![KeyValue::new("Accept", "application/json")]);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn name_truncated_at_60_chars_with_ellipsis() {
        let long_path = "a".repeat(80);
        let har = serde_json::json!({
            "log": { "entries": [{
                "request": { "method": "GET", "url": format!("https://example.com/{long_path}"), "headers": [], "queryString": [] }
            }] }
        });
        let outcome = parse(&serde_json::to_vec(&har).unwrap()).unwrap();
        let Item::Request(request) = &outcome.value.items[0] else { panic!() };
        assert_eq!(request.name.chars().count(), MAX_NAME_LEN);
        assert!(request.name.ends_with("..."));
    }

    #[test]
    fn post_data_mime_maps_to_body_type() {
        let har = serde_json::json!({
            "log": { "entries": [{
                "request": {
                    "method": "POST", "url": "https://example.com/u", "headers": [], "queryString": [],
                    "postData": {"mimeType": "application/json", "text": "{\"a\":1}"}
                }
            }] }
        });
        let outcome = parse(&serde_json::to_vec(&har).unwrap()).unwrap();
        let Item::Request(request) = &outcome.value.items[0] else { panic!() };
        assert_eq!(request.body.as_ref().unwrap().body_type, BodyType::Json);
    }

    #[test]
    fn s3_har_round_trip() {
        let response = Response {
            status_code: 201,
            status_text: "Created".into(),
            headers: Vec::new(),
            body: br#"{"id":1}"#.to_vec(),
            content_type: Some("application/json".into()),
            duration: Duration::from_millis(150),
            size: 8,
            protocol: "http".into(),
            tls: true,
            timing: TimingDetail {
                dns_lookup: TimingPhase::measured(Duration::from_millis(10)),
                tcp_connect: TimingPhase::measured(Duration::from_millis(15)),
                tls_handshake: TimingPhase::measured(Duration::from_millis(30)),
                time_to_first_byte: TimingPhase::measured(Duration::from_millis(80)),
                transfer: TimingPhase::measured(Duration::from_millis(5)),
                total: Duration::from_millis(150),
            },
        };
        let request = ExportRequest { method: "POST", url: "https://example.com/widgets", headers: &[], body: b"{}" };
        let exported = export(&request, &response).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&exported).unwrap();
        let entry = &value["log"]["entries"][0];
        assert_eq!(entry["request"]["method"], "POST");
        assert_eq!(entry["response"]["status"], 201);
        assert_eq!(entry["timings"]["dns"], 10.0);
        assert_eq!(entry["timings"]["wait"], 80.0);
    }

    #[test]
    fn inapplicable_phase_exports_as_minus_one() {
        let response = Response {
            status_code: 200,
            status_text: "OK".into(),
            headers: Vec::new(),
            body: Vec::new(),
            content_type: None,
            duration: Duration::from_millis(5),
            size: 0,
            protocol: "http".into(),
            tls: false,
            timing: TimingDetail::default(),
        };
        let request = ExportRequest { method: "GET", url: "https://example.com", headers: &[], body: b"" };
        let exported = export(&request, &response).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&exported).unwrap();
        assert_eq!(value["log"]["entries"][0]["timings"]["dns"], -1.0);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse(b"not json").unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Parse);
    }
}
