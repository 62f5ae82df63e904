// SPDX-License-Identifier: MIT OR Apache-2.0
//! The GraphQL driver: an HTTP POST wrapper, plus introspection support.

use crate::http_driver;
use crate::response::Response;
use gottp_auth::{AuthContext, OutgoingRequest};
use gottp_collection::{Auth, GraphQlBlock};
use gottp_error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
struct GraphQlBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
}

/// Execute a GraphQL operation over HTTP POST (§4.4's GraphQL driver).
pub async fn send(
    client: &reqwest::Client,
    mut outgoing: OutgoingRequest,
    block: &GraphQlBlock,
    auth: &Auth,
    max_redirects: usize,
    auth_ctx: &mut AuthContext,
) -> Result<Response, Error> {
    let variables = match &block.variables {
        Some(raw) if !raw.trim().is_empty() => {
            Some(serde_json::from_str(raw).map_err(|e| Error::parse("invalid GraphQL `variables` JSON").with_source(Box::new(e)))?)
        }
        _ => None,
    };

    let body = GraphQlBody {
        query: &block.query,
        variables,
        operation_name: block.operation_name.as_deref(),
    };

    outgoing.method = "POST".to_string();
    outgoing.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
    outgoing.headers.push(("Content-Type".to_string(), "application/json".to_string()));
    outgoing.body = serde_json::to_vec(&body).map_err(|e| Error::internal("failed to encode GraphQL body").with_source(Box::new(e)))?;

    let mut response = http_driver::send(client, outgoing, auth, max_redirects, auth_ctx).await?;
    response.protocol = "graphql".to_string();
    Ok(response)
}

/// Standard introspection query used by [`introspect`].
pub const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery { __schema { types { name kind fields { name type { name kind ofType { name kind } } } } } }"#;

/// A simplified schema summary built from an introspection response, for UI
/// autocomplete (§4.4's GraphQL driver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaType {
    /// GraphQL type name.
    pub type_name: String,
    /// Fields declared on this type.
    pub fields: Vec<SchemaField>,
}

/// One field within a [`SchemaType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name.
    pub field_name: String,
    /// Rendered type expression, e.g. `"[String!]!"`.
    pub type_expr: String,
}

/// Run the introspection query and parse the result into [`SchemaType`]
/// summaries.
pub async fn introspect(
    client: &reqwest::Client,
    outgoing: OutgoingRequest,
    auth: &Auth,
    max_redirects: usize,
    auth_ctx: &mut AuthContext,
) -> Result<Vec<SchemaType>, Error> {
    let block = GraphQlBlock {
        query: INTROSPECTION_QUERY.to_string(),
        variables: None,
        operation_name: None,
    };
    let response = send(client, outgoing, &block, auth, max_redirects, auth_ctx).await?;
    let json: Value = serde_json::from_slice(&response.body).map_err(|e| Error::protocol("introspection response was not JSON").with_source(Box::new(e)))?;

    let types = json
        .pointer("/data/__schema/types")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::protocol("introspection response missing __schema.types"))?;

    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        let type_name = ty.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let fields = ty
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| SchemaField {
                        field_name: f.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        type_expr: render_type_expr(f.get("type")),
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.push(SchemaType { type_name, fields });
    }
    Ok(out)
}

fn render_type_expr(ty: Option<&Value>) -> String {
    let Some(ty) = ty else { return "Unknown".to_string() };
    let kind = ty.get("kind").and_then(Value::as_str).unwrap_or_default();
    let name = ty.get("name").and_then(Value::as_str);
    match kind {
        "NON_NULL" => format!("{}!", render_type_expr(ty.get("ofType"))),
        "LIST" => format!("[{}]", render_type_expr(ty.get("ofType"))),
        _ => name.unwrap_or("Unknown").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gottp_auth::AuthContext;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn req(url: &str) -> OutgoingRequest {
        OutgoingRequest { method: "POST".into(), url: url.into(), headers: Vec::new(), query: Vec::new(), body: Vec::new() }
    }

    #[tokio::test]
    async fn wraps_query_and_variables_in_post_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"ok": true}})))
            .mount(&server)
            .await;

        let block = GraphQlBlock {
            query: "query { me { id } }".to_string(),
            variables: Some(r#"{"id":1}"#.to_string()),
            operation_name: None,
        };
        let client = reqwest::Client::new();
        let mut ctx = AuthContext::default();
        let resp = send(&client, req(&format!("{}/graphql", server.uri())), &block, &Auth::None, 10, &mut ctx).await.unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.protocol, "graphql");
    }

    #[test]
    fn render_type_expr_handles_non_null_list() {
        let ty = serde_json::json!({
            "kind": "NON_NULL",
            "ofType": {"kind": "LIST", "ofType": {"kind": "SCALAR", "name": "String"}}
        });
        assert_eq!(render_type_expr(Some(&ty)), "[String]!");
    }

    #[tokio::test]
    async fn introspect_parses_types_and_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "__schema": {
                        "types": [
                            {"name": "Query", "kind": "OBJECT", "fields": [
                                {"name": "me", "type": {"kind": "OBJECT", "name": "User"}}
                            ]}
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let mut ctx = AuthContext::default();
        let schema = introspect(&client, req(&format!("{}/graphql", server.uri())), &Auth::None, 10, &mut ctx).await.unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].type_name, "Query");
        assert_eq!(schema[0].fields[0].field_name, "me");
    }
}
