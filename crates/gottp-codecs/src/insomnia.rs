// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Insomnia v4 export codec: a flat `resources[]` array linked by
//! `parentId`, reassembled into (or flattened from) the folder tree (§4.6).
//!
//! Insomnia exports are a flat list rather than a nested document, so import
//! walks `parentId` edges breadth-first from the workspace root; a cycle in
//! that graph is reported as a [`CodecWarning`] and the offending branch is
//! dropped rather than looping forever or failing the whole import.

use crate::util::str_field;
use crate::{CodecWarning, ParseOutcome};
use gottp_collection::{ApiKeyPlacement, Auth, Body, BodyType, Collection, Folder, Item, KeyValue, OAuth2Grant, Request};
use gottp_error::Error;
use serde_json::Value;
use std::collections::HashMap;

/// Parse an Insomnia v4 export document.
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome<Collection>, Error> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| Error::parse("invalid Insomnia export JSON").with_source(Box::new(e)))?;
    let resources = root.get("resources").and_then(Value::as_array).ok_or_else(|| Error::parse("insomnia export missing `resources`"))?;

    let mut warnings = Vec::new();
    let mut children: HashMap<String, Vec<&Value>> = HashMap::new();
    let mut workspace_id: Option<String> = None;
    let mut workspace_name = "Imported from Insomnia".to_string();

    for res in resources {
        let resource_type = str_field(res, "_type").unwrap_or("");
        if resource_type == "workspace" {
            workspace_id = str_field(res, "_id").map(str::to_string);
            workspace_name = str_field(res, "name").unwrap_or(&workspace_name).to_string();
            continue;
        }
        if let Some(parent_id) = str_field(res, "parentId") {
            children.entry(parent_id.to_string()).or_default().push(res);
        }
    }

    let mut collection = Collection::new(workspace_name);
    if let Some(root_id) = workspace_id {
        let mut visited = std::collections::HashSet::new();
        visited.insert(root_id.clone());
        collection.items = build_items(&root_id, &children, &mut visited, &mut warnings)?;
    }

    Ok(ParseOutcome { value: collection, warnings })
}

fn build_items(
    parent_id: &str,
    children: &HashMap<String, Vec<&Value>>,
    visited: &mut std::collections::HashSet<String>,
    warnings: &mut Vec<CodecWarning>,
) -> Result<Vec<Item>, Error> {
    let Some(kids) = children.get(parent_id) else { return Ok(Vec::new()) };
    let mut items = Vec::new();

    for res in kids {
        let id = str_field(res, "_id").unwrap_or_default().to_string();
        if !visited.insert(id.clone()) {
            warnings.push(CodecWarning::new(format!("dropped `{id}`: cyclic parentId chain")));
            continue;
        }

        let resource_type = str_field(res, "_type").unwrap_or("");
        let name = str_field(res, "name").unwrap_or("Untitled").to_string();

        match resource_type {
            "request_group" => {
                let mut folder = Folder::new(name);
                folder.items = build_items(&id, children, visited, warnings)?;
                items.push(Item::Folder(folder));
            }
            "request" => {
                items.push(Item::Request(parse_request(&name, res, warnings)?));
            }
            other => {
                warnings.push(CodecWarning::new(format!("ignoring unsupported resource type `{other}`")));
            }
        }
    }

    Ok(items)
}

fn parse_request(name: &str, res: &Value, warnings: &mut Vec<CodecWarning>) -> Result<Request, Error> {
    let method = str_field(res, "method").unwrap_or("GET").to_string();
    let url = str_field(res, "url").unwrap_or_default().to_string();

    let mut request = Request::new(name, method, url);

    if let Some(params) = res.get("parameters").and_then(Value::as_array) {
        for p in params {
            if let (Some(key), Some(value)) = (str_field(p, "name"), str_field(p, "value")) {
                let disabled = p.get("disabled").and_then(Value::as_bool).unwrap_or(false);
                request.params.push(if disabled { KeyValue::disabled(key, value) } else { KeyValue::new(key, value) });
            }
        }
    }

    if let Some(headers) = res.get("headers").and_then(Value::as_array) {
        for h in headers {
            if let (Some(key), Some(value)) = (str_field(h, "name"), str_field(h, "value")) {
                let disabled = h.get("disabled").and_then(Value::as_bool).unwrap_or(false);
                request.headers.push(if disabled { KeyValue::disabled(key, value) } else { KeyValue::new(key, value) });
            }
        }
    }

    if let Some(body) = res.get("body") {
        request.body = parse_body(body);
    }

    if let Some(auth) = res.get("authentication") {
        if auth.get("type").is_some() {
            request.auth = Some(parse_auth(auth, warnings));
        }
    }

    Ok(request)
}

fn parse_body(body: &Value) -> Option<Body> {
    let mime_type = str_field(body, "mimeType")?;
    let body_type = body_type_from_mime(mime_type);
    if body_type == BodyType::Form || body_type == BodyType::Multipart {
        let sep = if body_type == BodyType::Form { '&' } else { '\n' };
        let content = body
            .get("params")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|kv| Some(format!("{}={}", str_field(kv, "name")?, str_field(kv, "value").unwrap_or(""))))
                    .collect::<Vec<_>>()
                    .join(&sep.to_string())
            })
            .unwrap_or_default();
        return Some(Body { body_type, content });
    }
    let content = str_field(body, "text").unwrap_or_default().to_string();
    if content.is_empty() {
        return None;
    }
    Some(Body { body_type, content })
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
    } else {
        BodyType::Text
    }
}

fn auth_str<'a>(auth: &'a Value, key: &str) -> Option<&'a str> {
    str_field(auth, key)
}

fn parse_auth(auth: &Value, warnings: &mut Vec<CodecWarning>) -> Auth {
    match str_field(auth, "type") {
        Some("basic") => Auth::Basic {
            username: auth_str(auth, "username").unwrap_or_default().to_string(),
            password: auth_str(auth, "password").unwrap_or_default().to_string(),
        },
        Some("bearer") => Auth::Bearer { token: auth_str(auth, "token").unwrap_or_default().to_string() },
        Some("apikey") => Auth::ApiKey {
            key: auth_str(auth, "key").unwrap_or_default().to_string(),
            value: auth_str(auth, "value").unwrap_or_default().to_string(),
            placement: if auth_str(auth, "addTo") == Some("query") { ApiKeyPlacement::Query } else { ApiKeyPlacement::Header },
        },
        Some("digest") => Auth::Digest {
            username: auth_str(auth, "username").unwrap_or_default().to_string(),
            password: auth_str(auth, "password").unwrap_or_default().to_string(),
        },
        Some("iam") => {
            warnings.push(CodecWarning::new("insomnia `iam` auth maps to awsv4 with no session token"));
            Auth::AwsV4 {
                access_key_id: auth_str(auth, "accessKeyId").unwrap_or_default().to_string(),
                secret_access_key: auth_str(auth, "secretAccessKey").unwrap_or_default().to_string(),
                session_token: auth_str(auth, "sessionToken").map(str::to_string),
                region: auth_str(auth, "region").unwrap_or_default().to_string(),
                service: auth_str(auth, "service").unwrap_or_default().to_string(),
            }
        }
        Some("oauth2") => Auth::OAuth2 {
            grant: match auth_str(auth, "grantType") {
                Some("authorization_code") => OAuth2Grant::AuthorizationCode,
                Some("password") => OAuth2Grant::Password,
                _ => OAuth2Grant::ClientCredentials,
            },
            auth_url: auth_str(auth, "authorizationUrl").map(str::to_string),
            token_url: auth_str(auth, "accessTokenUrl").unwrap_or_default().to_string(),
            client_id: auth_str(auth, "clientId").unwrap_or_default().to_string(),
            client_secret: auth_str(auth, "clientSecret").map(str::to_string),
            scope: auth_str(auth, "scope").map(str::to_string),
            username: auth_str(auth, "username").map(str::to_string),
            password: auth_str(auth, "password").map(str::to_string),
            pkce: auth.get("usePkce").and_then(Value::as_bool).unwrap_or(false),
        },
        Some("none") | None => Auth::None,
        Some(other) => {
            warnings.push(CodecWarning::new(format!("unsupported insomnia auth type `{other}`, treating as none")));
            Auth::None
        }
    }
}

/// Export `collection` as an Insomnia v4 export document. Every folder and
/// request is assigned a freshly generated id (`wrk_`/`fld_`/`req_` prefixed,
/// following Insomnia's own convention) since the collection model carries
/// no Insomnia-shaped identity to reuse.
pub fn export(collection: &Collection) -> Result<Vec<u8>, Error> {
    let workspace_id = format!("wrk_{}", uuid::Uuid::new_v4().simple());
    let mut resources = vec![serde_json::json!({
        "_id": workspace_id,
        "_type": "workspace",
        "name": collection.name,
    })];

    export_items(&collection.items, &workspace_id, &mut resources);

    let doc = serde_json::json!({
        "_type": "export",
        "__export_format": 4,
        "__export_source": "gottp",
        "resources": resources,
    });
    serde_json::to_vec_pretty(&doc).map_err(|e| Error::internal("failed to serialize Insomnia export").with_source(Box::new(e)))
}

fn export_items(items: &[Item], parent_id: &str, resources: &mut Vec<Value>) {
    for item in items {
        match item {
            Item::Folder(folder) => {
                let id = format!("fld_{}", uuid::Uuid::new_v4().simple());
                resources.push(serde_json::json!({
                    "_id": id,
                    "_type": "request_group",
                    "parentId": parent_id,
                    "name": folder.name,
                }));
                export_items(&folder.items, &id, resources);
            }
            Item::Request(request) => {
                let id = format!("req_{}", uuid::Uuid::new_v4().simple());
                let mut value = serde_json::json!({
                    "_id": id,
                    "_type": "request",
                    "parentId": parent_id,
                    "name": request.name,
                    "method": request.method,
                    "url": request.url,
                    "parameters": request.params.iter().map(|p| serde_json::json!({"name": p.key, "value": p.value, "disabled": !p.enabled})).collect::<Vec<_>>(),
                    "headers": request.headers.iter().map(|h| serde_json::json!({"name": h.key, "value": h.value, "disabled": !h.enabled})).collect::<Vec<_>>(),
                });
                if let Some(body) = &request.body {
                    if !body.is_empty() {
                        value["body"] = export_body(body);
                    }
                }
                if let Some(auth) = &request.auth {
                    if !auth.is_none() {
                        value["authentication"] = export_auth(auth);
                    }
                }
                resources.push(value);
            }
        }
    }
}

fn export_body(body: &Body) -> Value {
    let mime_type = body.body_type.mime().unwrap_or("text/plain");
    match body.body_type {
        BodyType::Form => serde_json::json!({
            "mimeType": mime_type,
            "params": body.content.split('&').filter(|s| !s.is_empty()).filter_map(|pair| pair.split_once('=')).map(|(k, v)| serde_json::json!({"name": k, "value": v})).collect::<Vec<_>>(),
        }),
        BodyType::Multipart => serde_json::json!({
            "mimeType": mime_type,
            "params": body.content.lines().filter_map(|l| l.split_once('=')).map(|(k, v)| serde_json::json!({"name": k, "value": v})).collect::<Vec<_>>(),
        }),
        _ => serde_json::json!({"mimeType": mime_type, "text": body.content}),
    }
}

fn export_auth(auth: &Auth) -> Value {
    match auth {
        Auth::None => serde_json::json!({"type": "none"}),
        Auth::Basic { username, password } => serde_json::json!({"type": "basic", "username": username, "password": password}),
        Auth::Bearer { token } => serde_json::json!({"type": "bearer", "token": token}),
        Auth::ApiKey { key, value, placement } => serde_json::json!({
            "type": "apikey",
            "key": key,
            "value": value,
            "addTo": match placement { ApiKeyPlacement::Header => "header", ApiKeyPlacement::Query => "query" },
        }),
        Auth::Digest { username, password } => serde_json::json!({"type": "digest", "username": username, "password": password}),
        Auth::AwsV4 { access_key_id, secret_access_key, session_token, region, service } => serde_json::json!({
            "type": "iam",
            "accessKeyId": access_key_id,
            "secretAccessKey": secret_access_key,
            "sessionToken": session_token,
            "region": region,
            "service": service,
        }),
        Auth::OAuth2 { grant, auth_url, token_url, client_id, client_secret, scope, username, password, pkce } => serde_json::json!({
            "type": "oauth2",
            "grantType": match grant {
                OAuth2Grant::AuthorizationCode => "authorization_code",
                OAuth2Grant::Password => "password",
                OAuth2Grant::ClientCredentials => "client_credentials",
            },
            "authorizationUrl": auth_url,
            "accessTokenUrl": token_url,
            "clientId": client_id,
            "clientSecret": client_secret,
            "scope": scope,
            "username": username,
            "password": password,
            "usePkce": pkce,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_doc(resources: Vec<Value>) -> Vec<u8> {
        let mut all = vec![serde_json::json!({"_id": "wrk_1", "_type": "workspace", "name": "Demo"})];
        all.extend(resources);
        serde_json::to_vec(&serde_json::json!({"_type": "export", "__export_format": 4, "resources": all})).unwrap()
    }

    #[test]
    fn flat_resources_reassemble_into_nested_folder() {
        let doc = workspace_doc(vec![
            serde_json::json!({"_id": "fld_1", "_type": "request_group", "parentId": "wrk_1", "name": "Auth"}),
            serde_json::json!({"_id": "req_1", "_type": "request", "parentId": "fld_1", "name": "Login", "method": "POST", "url": "https://x/login"}),
        ]);
        let outcome = parse(&doc).unwrap();
        assert_eq!(outcome.value.items.len(), 1);
        let Item::Folder(folder) = &outcome.value.items[0] else { panic!() };
        assert_eq!(folder.name, "Auth");
        let Item::Request(request) = &folder.items[0] else { panic!() };
        assert_eq!(request.name, "Login");
    }

    #[test]
    fn cyclic_parent_chain_reported_as_warning_not_error() {
        let doc = workspace_doc(vec![
            serde_json::json!({"_id": "fld_1", "_type": "request_group", "parentId": "fld_2", "name": "A"}),
            serde_json::json!({"_id": "fld_2", "_type": "request_group", "parentId": "fld_1", "name": "B"}),
        ]);
        let outcome = parse(&doc).unwrap();
        assert!(!outcome.warnings.is_empty());
        assert!(outcome.warnings.iter().any(|w| w.0.contains("cyclic")));
    }

    #[test]
    fn export_then_reparse_roundtrips_nested_folder() {
        let mut collection = Collection::new("Demo");
        let mut folder = Folder::new("Auth");
        folder.items.push(Item::Request(Request::new("Login", "POST", "https://x/login")));
        collection.items.push(Item::Folder(folder));

        let exported = export(&collection).unwrap();
        let outcome = parse(&exported).unwrap();

        let Item::Folder(got_folder) = &outcome.value.items[0] else { panic!() };
        assert_eq!(got_folder.name, "Auth");
        let Item::Request(got_request) = &got_folder.items[0] else { panic!() };
        assert_eq!(got_request.name, "Login");
        assert_eq!(got_request.method, "POST");
    }

    #[test]
    fn apikey_query_placement_roundtrips() {
        let auth = Auth::ApiKey { key: "X-Api-Key".into(), value: "secret".into(), placement: ApiKeyPlacement::Query };
        let mut warnings = Vec::new();
        let exported = export_auth(&auth);
        assert_eq!(parse_auth(&exported, &mut warnings), auth);
    }

    #[test]
    fn malformed_export_is_a_parse_error() {
        let err = parse(b"{}").unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Parse);
    }
}
