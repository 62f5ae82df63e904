// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Postman v2.1 codec (§4.6). Parses both URL shapes (string or
//! `{raw, query[]}` object) and nested folders (`item[]` entries that
//! themselves carry `item[]`); export produces a schema-compliant document
//! stamped with a fresh `_postman_id`.

use crate::util::{array_field, str_field};
use crate::{CodecWarning, ParseOutcome};
use gottp_collection::{ApiKeyPlacement, Auth, Body, BodyType, Collection, Folder, Item, KeyValue, OAuth2Grant, Request};
use gottp_error::Error;
use serde_json::Value;

const SCHEMA_URL: &str = "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// Parse a Postman v2.1 collection document.
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome<Collection>, Error> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| Error::parse("invalid Postman collection JSON").with_source(Box::new(e)))?;
    let info = root.get("info").ok_or_else(|| Error::parse("postman collection missing `info`"))?;
    let name = str_field(info, "name").unwrap_or("Imported from Postman").to_string();

    let mut collection = Collection::new(name);
    let mut warnings = Vec::new();

    if let Some(vars) = array_field(&root, "variable") {
        for v in vars {
            if let (Some(key), Some(value)) = (str_field(v, "key"), str_field(v, "value")) {
                collection.variables.insert(key.to_string(), value.to_string());
            }
        }
    }

    if let Some(auth) = root.get("auth") {
        collection.auth = parse_auth(auth, &mut warnings);
    }

    let items = array_field(&root, "item").cloned().unwrap_or_default();
    collection.items = parse_items(&items, &mut warnings)?;

    Ok(ParseOutcome { value: collection, warnings })
}

fn parse_items(items: &[Value], warnings: &mut Vec<CodecWarning>) -> Result<Vec<Item>, Error> {
    items.iter().map(|item| parse_item(item, warnings)).collect()
}

fn parse_item(item: &Value, warnings: &mut Vec<CodecWarning>) -> Result<Item, Error> {
    let name = str_field(item, "name").unwrap_or("Untitled").to_string();
    if let Some(children) = array_field(item, "item") {
        let mut folder = Folder::new(name);
        folder.items = parse_items(children, warnings)?;
        Ok(Item::Folder(folder))
    } else if let Some(request) = item.get("request") {
        Ok(Item::Request(parse_request(&name, request, warnings)?))
    } else {
        Err(Error::parse(format!("postman item `{name}` has neither `item` nor `request`")))
    }
}

fn parse_request(name: &str, request: &Value, warnings: &mut Vec<CodecWarning>) -> Result<Request, Error> {
    let method = str_field(request, "method").unwrap_or("GET").to_string();
    let (url, params) = parse_url(request.get("url"))?;

    let mut out = Request::new(name, method, url);
    out.params = params;

    if let Some(headers) = array_field(request, "header") {
        for h in headers {
            if let (Some(key), Some(value)) = (str_field(h, "key"), str_field(h, "value")) {
                let disabled = h.get("disabled").and_then(Value::as_bool).unwrap_or(false);
                out.headers.push(if disabled { KeyValue::disabled(key, value) } else { KeyValue::new(key, value) });
            }
        }
    }

    if let Some(body) = request.get("body") {
        out.body = parse_body(body);
    }

    if let Some(auth) = request.get("auth") {
        out.auth = Some(parse_auth(auth, warnings));
    }

    Ok(out)
}

fn parse_url(url_value: Option<&Value>) -> Result<(String, Vec<KeyValue>), Error> {
    match url_value {
        None => Ok((String::new(), Vec::new())),
        Some(Value::String(raw)) => Ok((raw.clone(), Vec::new())),
        Some(obj @ Value::Object(_)) => {
            let raw = str_field(obj, "raw").unwrap_or("").to_string();
            let mut params = Vec::new();
            if let Some(query) = array_field(obj, "query") {
                for q in query {
                    if let (Some(key), Some(value)) = (str_field(q, "key"), str_field(q, "value")) {
                        let disabled = q.get("disabled").and_then(Value::as_bool).unwrap_or(false);
                        params.push(if disabled { KeyValue::disabled(key, value) } else { KeyValue::new(key, value) });
                    }
                }
            }
            // `raw` already embeds the query string; the base URL holds
            // everything before it, mirroring the HAR codec's convention of
            // carrying query params only in `params`.
            let base = raw.split_once('?').map(|(base, _)| base).unwrap_or(&raw).to_string();
            Ok((base, params))
        }
        Some(_) => Err(Error::parse("postman `url` is neither a string nor an object")),
    }
}

fn parse_body(body: &Value) -> Option<Body> {
    match str_field(body, "mode")? {
        "raw" => {
            let content = str_field(body, "raw").unwrap_or("").to_string();
            let language = body.get("options").and_then(|o| o.get("raw")).and_then(|r| r.get("language")).and_then(Value::as_str);
            let body_type = match language {
                Some("json") => BodyType::Json,
                Some("xml") => BodyType::Xml,
                _ if content.trim_start().starts_with('{') || content.trim_start().starts_with('[') => BodyType::Json,
                _ => BodyType::Text,
            };
            Some(Body { body_type, content })
        }
        "urlencoded" => Some(Body { body_type: BodyType::Form, content: join_kv_array(body, "urlencoded", '&') }),
        "formdata" => Some(Body { body_type: BodyType::Multipart, content: join_kv_array(body, "formdata", '\n') }),
        _ => None,
    }
}

fn join_kv_array(body: &Value, field: &str, sep: char) -> String {
    array_field(body, field)
        .map(|arr| {
            arr.iter()
                .filter_map(|kv| Some(format!("{}={}", str_field(kv, "key")?, str_field(kv, "value").unwrap_or(""))))
                .collect::<Vec<_>>()
                .join(&sep.to_string())
        })
        .unwrap_or_default()
}

fn auth_value<'a>(auth: &'a Value, scheme: &str, key: &str) -> Option<&'a str> {
    array_field(auth, scheme)?.iter().find(|kv| str_field(kv, "key") == Some(key)).and_then(|kv| str_field(kv, "value"))
}

fn parse_auth(auth: &Value, warnings: &mut Vec<CodecWarning>) -> Auth {
    match str_field(auth, "type") {
        Some("basic") => Auth::Basic {
            username: auth_value(auth, "basic", "username").unwrap_or_default().to_string(),
            password: auth_value(auth, "basic", "password").unwrap_or_default().to_string(),
        },
        Some("bearer") => Auth::Bearer { token: auth_value(auth, "bearer", "token").unwrap_or_default().to_string() },
        Some("apikey") => Auth::ApiKey {
            key: auth_value(auth, "apikey", "key").unwrap_or_default().to_string(),
            value: auth_value(auth, "apikey", "value").unwrap_or_default().to_string(),
            placement: if auth_value(auth, "apikey", "in") == Some("query") { ApiKeyPlacement::Query } else { ApiKeyPlacement::Header },
        },
        Some("digest") => Auth::Digest {
            username: auth_value(auth, "digest", "username").unwrap_or_default().to_string(),
            password: auth_value(auth, "digest", "password").unwrap_or_default().to_string(),
        },
        Some("awsv4") => Auth::AwsV4 {
            access_key_id: auth_value(auth, "awsv4", "accessKey").unwrap_or_default().to_string(),
            secret_access_key: auth_value(auth, "awsv4", "secretKey").unwrap_or_default().to_string(),
            session_token: auth_value(auth, "awsv4", "sessionToken").map(str::to_string),
            region: auth_value(auth, "awsv4", "region").unwrap_or_default().to_string(),
            service: auth_value(auth, "awsv4", "service").unwrap_or_default().to_string(),
        },
        Some("oauth2") => Auth::OAuth2 {
            grant: match auth_value(auth, "oauth2", "grantType") {
                Some("authorization_code") => OAuth2Grant::AuthorizationCode,
                Some("password_credentials") => OAuth2Grant::Password,
                _ => OAuth2Grant::ClientCredentials,
            },
            auth_url: auth_value(auth, "oauth2", "authUrl").map(str::to_string),
            token_url: auth_value(auth, "oauth2", "accessTokenUrl").unwrap_or_default().to_string(),
            client_id: auth_value(auth, "oauth2", "clientId").unwrap_or_default().to_string(),
            client_secret: auth_value(auth, "oauth2", "clientSecret").map(str::to_string),
            scope: auth_value(auth, "oauth2", "scope").map(str::to_string),
            username: auth_value(auth, "oauth2", "username").map(str::to_string),
            password: auth_value(auth, "oauth2", "password").map(str::to_string),
            pkce: auth_value(auth, "oauth2", "challengeAlgorithm").is_some(),
        },
        Some("noauth") | None => Auth::None,
        Some(other) => {
            warnings.push(CodecWarning::new(format!("unsupported postman auth type `{other}`, treating as none")));
            Auth::None
        }
    }
}

/// Export `collection` as a Postman v2.1 document with a freshly generated
/// `_postman_id`.
pub fn export(collection: &Collection) -> Result<Vec<u8>, Error> {
    let doc = serde_json::json!({
        "info": {
            "_postman_id": uuid::Uuid::new_v4().to_string(),
            "name": collection.name,
            "schema": SCHEMA_URL,
        },
        "item": export_items(&collection.items),
        "variable": collection.variables.iter().map(|(k, v)| serde_json::json!({"key": k, "value": v})).collect::<Vec<_>>(),
        "auth": export_auth(&collection.auth),
    });
    serde_json::to_vec_pretty(&doc).map_err(|e| Error::internal("failed to serialize Postman collection").with_source(Box::new(e)))
}

fn export_items(items: &[Item]) -> Vec<Value> {
    items.iter().map(export_item).collect()
}

fn export_item(item: &Item) -> Value {
    match item {
        Item::Folder(folder) => serde_json::json!({"name": folder.name, "item": export_items(&folder.items)}),
        Item::Request(request) => serde_json::json!({"name": request.name, "request": export_request(request)}),
    }
}

fn export_request(request: &Request) -> Value {
    let mut url_raw = request.url.clone();
    let enabled_query: Vec<_> = request.params.iter().filter(|p| p.enabled).map(|p| format!("{}={}", p.key, p.value)).collect();
    if !enabled_query.is_empty() {
        url_raw = format!("{}?{}", request.url, enabled_query.join("&"));
    }

    let mut value = serde_json::json!({
        "method": request.method,
        "header": request.headers.iter().map(|h| serde_json::json!({"key": h.key, "value": h.value, "disabled": !h.enabled})).collect::<Vec<_>>(),
        "url": {
            "raw": url_raw,
            "query": request.params.iter().map(|p| serde_json::json!({"key": p.key, "value": p.value, "disabled": !p.enabled})).collect::<Vec<_>>(),
        },
    });

    if let Some(body) = &request.body {
        if !body.is_empty() {
            value["body"] = export_body(body);
        }
    }
    if let Some(auth) = &request.auth {
        if !auth.is_none() {
            value["auth"] = export_auth(auth);
        }
    }

    value
}

fn export_body(body: &Body) -> Value {
    match body.body_type {
        BodyType::Form => serde_json::json!({
            "mode": "urlencoded",
            "urlencoded": body.content.split('&').filter(|s| !s.is_empty()).filter_map(|pair| pair.split_once('=')).map(|(k, v)| serde_json::json!({"key": k, "value": v})).collect::<Vec<_>>(),
        }),
        BodyType::Multipart => serde_json::json!({
            "mode": "formdata",
            "formdata": body.content.lines().filter_map(|l| l.split_once('=')).map(|(k, v)| serde_json::json!({"key": k, "value": v})).collect::<Vec<_>>(),
        }),
        BodyType::Json => serde_json::json!({"mode": "raw", "raw": body.content, "options": {"raw": {"language": "json"}}}),
        BodyType::Xml => serde_json::json!({"mode": "raw", "raw": body.content, "options": {"raw": {"language": "xml"}}}),
        _ => serde_json::json!({"mode": "raw", "raw": body.content}),
    }
}

fn export_auth(auth: &Auth) -> Value {
    match auth {
        Auth::None => serde_json::json!({"type": "noauth"}),
        Auth::Basic { username, password } => serde_json::json!({
            "type": "basic",
            "basic": [{"key": "username", "value": username}, {"key": "password", "value": password}],
        }),
        Auth::Bearer { token } => serde_json::json!({"type": "bearer", "bearer": [{"key": "token", "value": token}]}),
        Auth::ApiKey { key, value, placement } => serde_json::json!({
            "type": "apikey",
            "apikey": [
                {"key": "key", "value": key},
                {"key": "value", "value": value},
                {"key": "in", "value": match placement { ApiKeyPlacement::Header => "header", ApiKeyPlacement::Query => "query" }},
            ],
        }),
        Auth::Digest { username, password } => serde_json::json!({
            "type": "digest",
            "digest": [{"key": "username", "value": username}, {"key": "password", "value": password}],
        }),
        Auth::AwsV4 { access_key_id, secret_access_key, session_token, region, service } => {
            let mut arr = vec![
                serde_json::json!({"key": "accessKey", "value": access_key_id}),
                serde_json::json!({"key": "secretKey", "value": secret_access_key}),
                serde_json::json!({"key": "region", "value": region}),
                serde_json::json!({"key": "service", "value": service}),
            ];
            if let Some(token) = session_token {
                arr.push(serde_json::json!({"key": "sessionToken", "value": token}));
            }
            serde_json::json!({"type": "awsv4", "awsv4": arr})
        }
        Auth::OAuth2 { grant, auth_url, token_url, client_id, client_secret, scope, username, password, pkce } => {
            let grant_type = match grant {
                OAuth2Grant::AuthorizationCode => "authorization_code",
                OAuth2Grant::Password => "password_credentials",
                OAuth2Grant::ClientCredentials => "client_credentials",
            };
            let mut arr = vec![
                serde_json::json!({"key": "grantType", "value": grant_type}),
                serde_json::json!({"key": "accessTokenUrl", "value": token_url}),
                serde_json::json!({"key": "clientId", "value": client_id}),
            ];
            if let Some(u) = auth_url {
                arr.push(serde_json::json!({"key": "authUrl", "value": u}));
            }
            if let Some(s) = client_secret {
                arr.push(serde_json::json!({"key": "clientSecret", "value": s}));
            }
            if let Some(s) = scope {
                arr.push(serde_json::json!({"key": "scope", "value": s}));
            }
            if let Some(u) = username {
                arr.push(serde_json::json!({"key": "username", "value": u}));
            }
            if let Some(p) = password {
                arr.push(serde_json::json!({"key": "password", "value": p}));
            }
            if *pkce {
                arr.push(serde_json::json!({"key": "challengeAlgorithm", "value": "S256"}));
            }
            serde_json::json!({"type": "oauth2", "oauth2": arr})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_postman_round_trip() {
        let mut collection = Collection::new("Demo");
        let mut folder = Folder::new("Auth");
        folder.items.push(Item::Request(Request::new("Login", "POST", "https://example.com/login")));
        folder.items.push(Item::Request(Request::new("Logout", "POST", "https://example.com/logout")));
        collection.items.push(Item::Folder(folder));

        let exported = export(&collection).unwrap();
        let outcome = parse(&exported).unwrap();

        assert_eq!(outcome.value.items.len(), 1);
        let Item::Folder(auth_folder) = &outcome.value.items[0] else { panic!("expected a folder") };
        assert_eq!(auth_folder.name, "Auth");
        assert_eq!(auth_folder.items.len(), 2);
        let Item::Request(login) = &auth_folder.items[0] else { panic!("expected a request") };
        assert_eq!(login.name, "Login");
        assert_eq!(login.method, "POST");
    }

    #[test]
    fn parse_accepts_string_url_shape() {
        let doc = serde_json::json!({
            "info": {"name": "C"},
            "item": [{"name": "Ping", "request": {"method": "GET", "url": "https://example.com/ping"}}],
        });
        let outcome = parse(&serde_json::to_vec(&doc).unwrap()).unwrap();
        let Item::Request(request) = &outcome.value.items[0] else { panic!() };
        assert_eq!(request.url, "https://example.com/ping");
    }

    #[test]
    fn parse_accepts_object_url_shape_with_query() {
        let doc = serde_json::json!({
            "info": {"name": "C"},
            "item": [{"name": "Search", "request": {"method": "GET", "url": {"raw": "https://example.com/search?q=rust", "query": [{"key": "q", "value": "rust"}]}}}],
        });
        let outcome = parse(&serde_json::to_vec(&doc).unwrap()).unwrap();
        let Item::Request(request) = &outcome.value.items[0] else { panic!() };
        assert_eq!(request.url, "https://example.com/search");
        assert_eq!(request.params, vec![KeyValue::new("q", "rust")]);
    }

    #[test]
    fn basic_auth_round_trips() {
        let mut collection = Collection::new("Demo");
        collection.auth = Auth::Basic { username: "admin".into(), password: "secret".into() };
        let exported = export(&collection).unwrap();
        let outcome = parse(&exported).unwrap();
        assert_eq!(outcome.value.auth, Auth::Basic { username: "admin".into(), password: "secret".into() });
    }

    #[test]
    fn unsupported_auth_type_yields_warning_and_none() {
        let doc = serde_json::json!({"info": {"name": "C"}, "item": [], "auth": {"type": "hawk"}});
        let outcome = parse(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(outcome.value.auth, Auth::None);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn item_with_neither_item_nor_request_is_a_parse_error() {
        let doc = serde_json::json!({"info": {"name": "C"}, "item": [{"name": "Bogus"}]});
        let err = parse(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Parse);
    }

    #[test]
    fn disabled_headers_marked_via_disabled_field() {
        let mut request = Request::new("Get", "GET", "https://x/y");
        request.headers.push(KeyValue::disabled("X-Debug", "1"));
        let mut collection = Collection::new("Demo");
        collection.items.push(Item::Request(request));
        let exported: Value = serde_json::from_slice(&export(&collection).unwrap()).unwrap();
        let header = &exported["item"][0]["request"]["header"][0];
        assert_eq!(header["disabled"], true);
    }
}
