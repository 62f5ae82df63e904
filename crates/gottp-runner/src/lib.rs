// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! The Runner (§4.9): dispatches a selected set of requests out of a
//! [`Collection`] and reports their outcomes.
//!
//! HTTP and GraphQL requests go through the unary Protocol Dispatcher
//! (`gottp-dispatch`); success is HTTP status `2xx`/`3xx`. WebSocket requests
//! succeed when a connection opens (there being no single "response" to
//! grade); gRPC requests succeed when the reflected unary call returns `OK`.

pub mod output;

use chrono::Utc;
use gottp_auth::AuthContext;
use gottp_collection::{Collection, Environment, FlatItemKind, Protocol, Request};
use gottp_dispatch::DispatchContext;
use gottp_error::{Error, ErrorKind};
use gottp_history::{HistoryEntry, Store};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

pub use output::OutputFormat;

/// Which requests a run selects out of a collection (§4.9).
#[derive(Debug, Clone)]
pub enum Selection {
    /// A single request, matched by name.
    Request(String),
    /// Every request under the named folder (recursively), in tree order.
    Folder(String),
    /// An explicit, ordered sequence of request names, each run once.
    Workflow(Vec<String>),
}

/// The outcome of dispatching one selected request.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// The request's display name.
    pub name: String,
    /// Slash-joined path from the collection root.
    pub path: String,
    /// Protocol string, e.g. `"http"`.
    pub protocol: String,
    /// Whether this request met its protocol's success criterion.
    pub success: bool,
    /// HTTP (or HTTP-shaped) status code, when applicable.
    pub status_code: Option<u16>,
    /// Wall-clock duration of the attempt, in milliseconds.
    pub duration_ms: u64,
    /// Failure description, when `success` is `false`.
    pub error: Option<String>,
}

/// The aggregate result of a run (§4.9).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One outcome per selected request, in selection order.
    pub outcomes: Vec<RunOutcome>,
}

impl RunReport {
    /// `true` when every outcome succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    /// The process exit code for this report: `0` if every request
    /// succeeded, `1` otherwise (§4.9).
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }
}

/// Resolve `selection` against `collection`'s flattened tree into the
/// concrete requests to run, in the order they should run, paired with their
/// slash-joined tree path.
pub fn select(collection: &Collection, selection: &Selection) -> Result<Vec<(String, Request)>, Error> {
    let flat = collection.flatten();
    match selection {
        Selection::Request(name) => flat
            .into_iter()
            .find_map(|f| match f.kind {
                FlatItemKind::Request(r) if &r.name == name => Some((f.path, r)),
                _ => None,
            })
            .map(|found| vec![found])
            .ok_or_else(|| Error::not_found(format!("no request named `{name}`"))),
        Selection::Folder(name) => {
            let prefix = format!("{name}/");
            let requests: Vec<(String, Request)> = flat
                .into_iter()
                .filter_map(|f| match f.kind {
                    FlatItemKind::Request(r) if f.path.starts_with(&prefix) => Some((f.path.clone(), r)),
                    _ => None,
                })
                .collect();
            if requests.is_empty() {
                Err(Error::not_found(format!("no folder named `{name}` (or it is empty)")))
            } else {
                Ok(requests)
            }
        }
        Selection::Workflow(names) => {
            let mut by_name: HashMap<String, (String, Request)> = HashMap::new();
            for f in flat {
                if let FlatItemKind::Request(r) = f.kind {
                    by_name.entry(r.name.clone()).or_insert((f.path, r));
                }
            }
            names
                .iter()
                .map(|name| by_name.get(name).cloned().ok_or_else(|| Error::not_found(format!("no request named `{name}` in workflow"))))
                .collect()
        }
    }
}

/// Run every request selected by `selection`, in selection order, recording
/// each outcome to `history` when the attempt produced wire traffic (§5's
/// "no history entry ... for a request that produced no wire traffic").
pub async fn run(
    collection: &Collection,
    environment: Option<&Environment>,
    selection: &Selection,
    http_client: &reqwest::Client,
    auth_ctx: &mut AuthContext,
    ctx: &DispatchContext,
    history: Option<&Store>,
) -> Result<RunReport, Error> {
    let requests = select(collection, selection)?;
    let mut outcomes = Vec::with_capacity(requests.len());
    for (path, request) in &requests {
        outcomes.push(run_one(collection, environment, path, request, http_client, auth_ctx, ctx, history).await);
    }
    Ok(RunReport { outcomes })
}

async fn run_one(
    collection: &Collection,
    environment: Option<&Environment>,
    path: &str,
    request: &Request,
    http_client: &reqwest::Client,
    auth_ctx: &mut AuthContext,
    ctx: &DispatchContext,
    history: Option<&Store>,
) -> RunOutcome {
    let started = Instant::now();

    let (success, status_code, error_kind, error, snapshot): (bool, Option<u16>, Option<ErrorKind>, Option<String>, serde_json::Value) = match request.protocol {
        Protocol::Http | Protocol::GraphQl => match gottp_dispatch::dispatch(request, environment, collection, http_client, auth_ctx, ctx).await {
            Ok(response) => {
                let ok = (200..400).contains(&response.status_code);
                (ok, Some(response.status_code), None, None, serde_json::json!({"status_code": response.status_code, "size": response.size}))
            }
            Err(e) => (false, None, Some(e.kind), Some(e.to_string()), serde_json::json!({"error": e.to_string()})),
        },
        Protocol::WebSocket => match run_websocket(request, environment, collection).await {
            Ok(()) => (true, None, None, None, serde_json::json!({"connected": true})),
            Err(e) => (false, None, Some(e.kind), Some(e.to_string()), serde_json::json!({"error": e.to_string()})),
        },
        Protocol::Grpc => match run_grpc(request, environment, collection).await {
            Ok(value) => (true, None, None, None, value),
            Err(e) => (false, None, Some(e.kind), Some(e.to_string()), serde_json::json!({"error": e.to_string()})),
        },
    };

    let duration = started.elapsed();

    if let Some(store) = history {
        if produced_wire_traffic(&error_kind) {
            let entry = HistoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                protocol: request.protocol.to_string(),
                method: request.method.clone(),
                url: request.url.clone(),
                status_code: status_code.unwrap_or(0),
                duration_ms: duration.as_millis() as u64,
                size: 0,
                request_snapshot: serde_json::json!({"name": request.name, "path": path}),
                response_snapshot: snapshot,
            };
            if let Err(e) = store.append(&entry) {
                tracing::warn!(error = %e, "failed to append run outcome to history");
            }
        }
    }

    RunOutcome {
        name: request.name.clone(),
        path: path.to_string(),
        protocol: request.protocol.to_string(),
        success,
        status_code,
        duration_ms: duration.as_millis() as u64,
        error,
    }
}

/// A request that never transmitted (validation failed before dispatch, or
/// credentials could not be acquired) leaves no wire traffic behind and so
/// gets no history entry, per §5's shared-resource policy. Every other
/// outcome — success or not — did put bytes on the wire and is recorded.
fn produced_wire_traffic(error_kind: &Option<ErrorKind>) -> bool {
    !matches!(error_kind, Some(ErrorKind::Validation) | Some(ErrorKind::Auth))
}

async fn run_websocket(request: &Request, environment: Option<&Environment>, collection: &Collection) -> Result<(), Error> {
    let url = gottp_vars::resolve(&request.url, gottp_vars::Scope::new(environment, collection));
    let handle = gottp_dispatch::websocket_driver::connect(&url).await?;
    handle.disconnect().await;
    Ok(())
}

async fn run_grpc(request: &Request, environment: Option<&Environment>, collection: &Collection) -> Result<serde_json::Value, Error> {
    let block = request.grpc.clone().ok_or_else(|| Error::validation("grpc request missing its grpc block"))?;
    let target = gottp_vars::resolve(&request.url, gottp_vars::Scope::new(environment, collection));

    let channel = gottp_dispatch::grpc_driver::dial(&target).await?;
    let (_services, pool) = gottp_dispatch::grpc_driver::reflect(channel.clone()).await?;
    let method = gottp_dispatch::grpc_driver::find_method(&pool, &block.service, &block.method)
        .ok_or_else(|| Error::not_found(format!("gRPC method `{}/{}` not found via reflection", block.service, block.method)))?;

    let request_json = match request.body.as_ref().filter(|b| !b.is_empty()) {
        Some(body) => {
            let resolved = gottp_vars::resolve(&body.content, gottp_vars::Scope::new(environment, collection));
            serde_json::from_str(&resolved).map_err(|e| Error::parse("gRPC request body is not valid JSON").with_source(e))?
        }
        None => serde_json::json!({}),
    };

    gottp_dispatch::grpc_driver::call_unary(channel, &method, &request_json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use gottp_collection::{Folder, Item};

    fn demo_collection() -> Collection {
        let mut collection = Collection::new("Demo");
        let mut auth_folder = Folder::new("Auth");
        auth_folder.items.push(Item::Request(Request::new("Login", "POST", "https://example.com/login")));
        auth_folder.items.push(Item::Request(Request::new("Logout", "POST", "https://example.com/logout")));
        collection.items.push(Item::Folder(auth_folder));
        collection.items.push(Item::Request(Request::new("Ping", "GET", "https://example.com/ping")));
        collection
    }

    #[test]
    fn select_request_finds_by_name() {
        let collection = demo_collection();
        let selected = select(&collection, &Selection::Request("Ping".into())).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "Ping");
        assert_eq!(selected[0].1.name, "Ping");
    }

    #[test]
    fn select_request_missing_is_not_found() {
        let collection = demo_collection();
        let err = select(&collection, &Selection::Request("Nope".into())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn select_folder_returns_all_nested_requests() {
        let collection = demo_collection();
        let selected = select(&collection, &Selection::Folder("Auth".into())).unwrap();
        let names: Vec<_> = selected.iter().map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, vec!["Login", "Logout"]);
        assert_eq!(selected[0].0, "Auth/Login");
    }

    #[test]
    fn select_folder_missing_is_not_found() {
        let collection = demo_collection();
        let err = select(&collection, &Selection::Folder("Nope".into())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn select_workflow_preserves_requested_order() {
        let collection = demo_collection();
        let selected = select(&collection, &Selection::Workflow(vec!["Ping".into(), "Login".into()])).unwrap();
        let names: Vec<_> = selected.iter().map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ping", "Login"]);
    }

    #[test]
    fn select_workflow_unknown_name_is_not_found() {
        let collection = demo_collection();
        let err = select(&collection, &Selection::Workflow(vec!["Ghost".into()])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn run_records_success_and_failure_per_request() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/ok"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/broken"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut collection = Collection::new("Demo");
        collection.items.push(Item::Request(Request::new("Ok", "GET", format!("{}/ok", server.uri()))));
        collection.items.push(Item::Request(Request::new("Broken", "GET", format!("{}/broken", server.uri()))));

        let client = reqwest::Client::new();
        let mut auth_ctx = AuthContext::default();
        let ctx = DispatchContext::default();

        let report = run(&collection, None, &Selection::Workflow(vec!["Ok".into(), "Broken".into()]), &client, &mut auth_ctx, &ctx, None)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].success);
        assert!(!report.outcomes[1].success);
        assert_eq!(report.outcomes[1].status_code, Some(500));
        assert!(!report.all_succeeded());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn run_appends_history_entries_for_transmitted_requests() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/ok"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut collection = Collection::new("Demo");
        collection.items.push(Item::Request(Request::new("Ok", "GET", format!("{}/ok", server.uri()))));

        let client = reqwest::Client::new();
        let mut auth_ctx = AuthContext::default();
        let ctx = DispatchContext::default();
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));

        run(&collection, None, &Selection::Request("Ok".into()), &client, &mut auth_ctx, &ctx, Some(&store)).await.unwrap();

        let entries = store.list(&gottp_history::ListFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status_code, 200);
    }

    #[test]
    fn wire_traffic_excludes_auth_and_validation_failures() {
        assert!(!produced_wire_traffic(&Some(ErrorKind::Auth)));
        assert!(!produced_wire_traffic(&Some(ErrorKind::Validation)));
        assert!(produced_wire_traffic(&Some(ErrorKind::Network)));
        assert!(produced_wire_traffic(&None));
    }
}
