// SPDX-License-Identifier: MIT OR Apache-2.0
//! The OpenAPI 3.x codec: import only (§4.6, §6.3 lists no `export --to
//! openapi`, since a collection with resolved variables and run history has
//! no natural OpenAPI projection). Accepts either JSON or YAML input.
//!
//! Operations are grouped into one folder per first declared tag; untagged
//! operations land at the collection root. Path parameters are left as
//! `{name}` placeholders in the URL — only query and header parameters
//! become [`KeyValue`] pairs, since path parameters have no slot on a
//! [`Request`] outside the URL string itself.

use crate::util::str_field;
use crate::{CodecWarning, ParseOutcome};
use gottp_collection::{Body, BodyType, Collection, Folder, Item, KeyValue, Request};
use gottp_error::Error;
use serde_json::Value;
use std::collections::BTreeMap;

const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// Parse an OpenAPI 3.x document (JSON or YAML) into a collection, grouping
/// operations by first tag. Paths and methods are visited in sorted order so
/// the resulting item order is deterministic regardless of map iteration
/// order in the source document.
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome<Collection>, Error> {
    let root = parse_document(bytes)?;
    let title = root.get("info").and_then(|i| str_field(i, "title")).unwrap_or("Imported from OpenAPI").to_string();
    let base_url = root
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|s| str_field(s, "url"))
        .unwrap_or("")
        .to_string();

    let paths = root.get("paths").and_then(Value::as_object).ok_or_else(|| Error::parse("openapi document missing `paths`"))?;

    let mut warnings = Vec::new();
    let mut untagged = Vec::new();
    let mut tagged: BTreeMap<String, Vec<Item>> = BTreeMap::new();

    let mut path_names: Vec<&String> = paths.keys().collect();
    path_names.sort();

    for path in path_names {
        let Some(path_obj) = paths.get(path.as_str()).and_then(Value::as_object) else { continue };

        let mut operations: Vec<(&String, &Value)> = path_obj.iter().filter(|(k, _)| HTTP_METHODS.contains(&k.to_ascii_lowercase().as_str())).collect();
        operations.sort_by(|a, b| a.0.cmp(b.0));

        for (method, operation) in operations {
            let name = str_field(operation, "operationId").or_else(|| str_field(operation, "summary")).unwrap_or(path).to_string();
            let url = format!("{base_url}{path}");
            let mut request = Request::new(name, method.to_ascii_uppercase(), url);

            if let Some(params) = operation.get("parameters").and_then(Value::as_array) {
                for p in params {
                    let (Some(location), Some(param_name)) = (str_field(p, "in"), str_field(p, "name")) else { continue };
                    let value = p
                        .get("example")
                        .or_else(|| p.get("schema").and_then(|s| s.get("example")))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    match location {
                        "query" => request.params.push(KeyValue::new(param_name, value)),
                        "header" => request.headers.push(KeyValue::new(param_name, value)),
                        "path" => {}
                        other => warnings.push(CodecWarning::new(format!("ignoring `{param_name}`: unsupported parameter location `{other}`"))),
                    }
                }
            }

            request.body = parse_request_body(operation);

            let item = Item::Request(request);
            match operation.get("tags").and_then(Value::as_array).and_then(|t| t.first()).and_then(Value::as_str) {
                Some(tag) => tagged.entry(tag.to_string()).or_default().push(item),
                None => untagged.push(item),
            }
        }
    }

    let mut collection = Collection::new(title);
    collection.items = untagged;
    for (tag, items) in tagged {
        let mut folder = Folder::new(tag);
        folder.items = items;
        collection.items.push(Item::Folder(folder));
    }

    Ok(ParseOutcome { value: collection, warnings })
}

fn parse_document(bytes: &[u8]) -> Result<Value, Error> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(value);
    }
    serde_yaml::from_slice::<Value>(bytes).map_err(|e| Error::parse("input is neither valid JSON nor YAML OpenAPI").with_source(Box::new(e)))
}

fn parse_request_body(operation: &Value) -> Option<Body> {
    let content = operation.get("requestBody")?.get("content")?.as_object()?;
    let (mime, media) = content.iter().next()?;
    let body_type = if mime.contains("json") {
        BodyType::Json
    } else if mime.contains("xml") {
        BodyType::Xml
    } else {
        BodyType::Text
    };
    let example = media.get("example").or_else(|| media.get("schema").and_then(|s| s.get("example")))?;
    let content = serde_json::to_string_pretty(example).ok()?;
    Some(Body { body_type, content })
}
