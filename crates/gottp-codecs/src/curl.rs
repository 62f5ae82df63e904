// SPDX-License-Identifier: MIT OR Apache-2.0
//! The cURL codec: a single command line in, a single [`Request`] in a
//! one-item [`Collection`] out, and back (§4.6).

use crate::util::{shell_quote, shell_split};
use crate::{CodecWarning, ParseOutcome};
use gottp_collection::{Auth, Body, BodyType, Collection, Item, KeyValue, Request};
use gottp_error::Error;

/// Parse a single `curl` command line (or a line-continued multi-line one)
/// into a one-request [`Collection`].
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome<Collection>, Error> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::parse("curl command is not valid UTF-8").with_source(Box::new(e)))?;
    let words = shell_split(text);
    let mut warnings = Vec::new();

    let mut iter = words.into_iter().peekable();
    match iter.next() {
        Some(w) if w == "curl" => {}
        Some(_) | None => return Err(Error::parse("input does not start with `curl`")),
    }

    let mut method: Option<String> = None;
    let mut url: Option<String> = None;
    let mut headers = Vec::new();
    let mut body_content: Option<String> = None;
    let mut explicit_content_type: Option<String> = None;
    let mut auth: Auth = Auth::None;
    let mut saw_data = false;
    let mut multipart_fields = Vec::new();

    while let Some(word) = iter.next() {
        match word.as_str() {
            "-X" | "--request" => method = iter.next(),
            "-H" | "--header" => {
                if let Some(header) = iter.next() {
                    if let Some((name, value)) = header.split_once(':') {
                        let name = name.trim().to_string();
                        let value = value.trim().to_string();
                        if name.eq_ignore_ascii_case("content-type") {
                            explicit_content_type = Some(value.clone());
                        }
                        headers.push(KeyValue::new(name, value));
                    } else {
                        warnings.push(CodecWarning::new(format!("ignoring malformed header `{header}`")));
                    }
                }
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-urlencode" | "--data-ascii" => {
                saw_data = true;
                body_content = iter.next();
            }
            "-u" | "--user" => {
                if let Some(cred) = iter.next() {
                    let (username, password) = cred.split_once(':').unwrap_or((cred.as_str(), ""));
                    auth = Auth::Basic { username: username.to_string(), password: password.to_string() };
                }
            }
            "-F" | "--form" => {
                if let Some(field) = iter.next() {
                    multipart_fields.push(field);
                }
                saw_data = true;
            }
            "--url" => url = iter.next(),
            "-k" | "--insecure" | "-s" | "--silent" | "-v" | "--verbose" | "-i" | "--include" | "-L" | "--location" => {
                // Transport/display flags with no collection-model equivalent; dropped.
            }
            w if w.starts_with('-') => {
                warnings.push(CodecWarning::new(format!("ignoring unsupported flag `{w}`")));
            }
            positional => {
                if url.is_none() {
                    url = Some(positional.to_string());
                }
            }
        }
    }

    let url = url.ok_or_else(|| Error::parse("curl command has no URL"))?;
    let method = method.unwrap_or_else(|| if saw_data { "POST".to_string() } else { "GET".to_string() });

    let body = if !multipart_fields.is_empty() {
        Some(Body { body_type: BodyType::Multipart, content: multipart_fields.join("\n") })
    } else if let Some(content) = body_content {
        let body_type = match explicit_content_type.as_deref() {
            Some(ct) if ct.contains("json") => BodyType::Json,
            Some(ct) if ct.contains("xml") => BodyType::Xml,
            Some(ct) if ct.contains("form-urlencoded") => BodyType::Form,
            Some(_) => BodyType::Text,
            None if content.trim_start().starts_with('{') || content.trim_start().starts_with('[') => BodyType::Json,
            None if content.contains('=') && !content.contains(' ') => BodyType::Form,
            None => BodyType::Text,
        };
        Some(Body { body_type, content })
    } else {
        None
    };

    let mut request = Request::new(format!("{method} {url}"), method, url);
    request.headers = headers;
    request.body = body;
    request.auth = Some(auth);

    let mut collection = Collection::new("Imported from curl");
    collection.items.push(Item::Request(request));
    Ok(ParseOutcome { value: collection, warnings })
}

/// Export `request` as a readable, multi-line `curl` command, one flag per
/// line. Auth schemes with no direct cURL equivalent (OAuth2, AWS SigV4,
/// Digest) are omitted, per §4.6's "missing fields are omitted" rule.
pub fn export(request: &Request) -> Result<String, Error> {
    let mut lines = vec!["curl".to_string()];
    lines.push(format!("  -X {}", request.method));
    lines.push(format!("  {}", shell_quote(&request.url)));

    for kv in gottp_collection::enabled_pairs(&request.headers) {
        lines.push(format!("  -H {}", shell_quote(&format!("{}: {}", kv.key, kv.value))));
    }

    match &request.auth {
        Some(Auth::Basic { username, password }) => {
            lines.push(format!("  -u {}", shell_quote(&format!("{username}:{password}"))));
        }
        Some(Auth::Bearer { token }) => {
            lines.push(format!("  -H {}", shell_quote(&format!("Authorization: Bearer {token}"))));
        }
        Some(Auth::ApiKey { key, value, placement: gottp_collection::ApiKeyPlacement::Header }) => {
            lines.push(format!("  -H {}", shell_quote(&format!("{key}: {value}"))));
        }
        // Query-placed API keys are appended to the URL only once variables
        // are resolved; cURL has no flag for "add a query parameter" short
        // of rewriting the URL, so it is omitted here rather than invented.
        Some(Auth::ApiKey { placement: gottp_collection::ApiKeyPlacement::Query, .. }) => {}
        _ => {}
    }

    if let Some(body) = &request.body {
        if !body.is_empty() {
            lines.push(format!("  -d {}", shell_quote(&body.content)));
        }
    }

    Ok(lines.join(" \\\n"))
}
