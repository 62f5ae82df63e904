// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Protocol Dispatcher: resolves variables, runs the Auth Chain, and
//! hands the request to the driver for its wire protocol (§4.4).

pub mod graphql_driver;
pub mod grpc_driver;
pub mod http_driver;
pub mod response;
pub mod state;
pub mod websocket_driver;

use gottp_auth::{AuthContext, OutgoingRequest};
use gottp_collection::{Collection, Environment, Protocol, Request};
use gottp_error::Error;
use gottp_vars::Scope;
use response::Response;
use state::{DispatchState, StateCursor};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default request deadline when the caller does not override it (§4.4).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Per-dispatch context: deadline, cancellation signal, redirect cap.
pub struct DispatchContext {
    /// Wall-clock budget for the whole attempt, including redirects/retries.
    pub deadline: Duration,
    /// Cooperative cancellation signal.
    pub cancellation: CancellationToken,
    /// HTTP redirect cap (§4.4's HTTP driver).
    pub max_redirects: usize,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            cancellation: CancellationToken::new(),
            max_redirects: http_driver::DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// Resolve variables, apply auth, and dispatch `request` over its declared
/// protocol, honoring `ctx`'s deadline and cancellation (§4.4 items 1-5).
pub async fn dispatch(
    request: &Request,
    environment: Option<&Environment>,
    collection: &Collection,
    http_client: &reqwest::Client,
    auth_ctx: &mut AuthContext,
    ctx: &DispatchContext,
) -> Result<Response, Error> {
    let mut state = StateCursor::new();
    state.advance(DispatchState::Preparing)?;

    let resolved = resolve_request(request, environment, collection);
    let auth = request.auth.clone().unwrap_or_else(|| collection.auth.clone());

    let attempt = async {
        match request.protocol {
            Protocol::Http => http_driver::send(http_client, resolved, &auth, ctx.max_redirects, auth_ctx).await,
            Protocol::GraphQl => {
                let block = request.graphql.clone().ok_or_else(|| Error::validation("graphql request missing its graphql block"))?;
                graphql_driver::send(http_client, resolved, &block, &auth, ctx.max_redirects, auth_ctx).await
            }
            Protocol::WebSocket | Protocol::Grpc => Err(Error::protocol(format!(
                "{} dispatch is driven by its own connection handle, not the unary `dispatch` entry point",
                request.protocol
            ))),
        }
    };

    state.advance(DispatchState::InFlight)?;

    let outcome = tokio::select! {
        result = attempt => result,
        _ = ctx.cancellation.cancelled() => Err(Error::canceled("dispatch canceled")),
        _ = tokio::time::sleep(ctx.deadline) => Err(Error::canceled("dispatch deadline exceeded")),
    };

    match outcome {
        Ok(response) => {
            state.advance(DispatchState::Responding)?;
            state.advance(DispatchState::Completed)?;
            Ok(response)
        }
        Err(e) => {
            let _ = state.advance(DispatchState::Failed);
            Err(e)
        }
    }
}

/// Resolve every variable-bearing field of `request` into a protocol-agnostic
/// [`OutgoingRequest`] (§4.4 item 1). Auth is resolved separately by the Auth
/// Chain itself, never here, so credentials never appear in an intermediate
/// unresolved-template form.
pub fn resolve_request(request: &Request, environment: Option<&Environment>, collection: &Collection) -> OutgoingRequest {
    let url = gottp_vars::resolve(&request.url, Scope::new(environment, collection));

    let query = gottp_collection::enabled_pairs(&request.params)
        .map(|kv| {
            (
                gottp_vars::resolve(&kv.key, Scope::new(environment, collection)),
                gottp_vars::resolve(&kv.value, Scope::new(environment, collection)),
            )
        })
        .collect();

    let headers = gottp_collection::enabled_pairs(&request.headers)
        .map(|kv| {
            (
                gottp_vars::resolve(&kv.key, Scope::new(environment, collection)),
                gottp_vars::resolve(&kv.value, Scope::new(environment, collection)),
            )
        })
        .collect();

    let body = request
        .body
        .as_ref()
        .filter(|b| !b.is_empty())
        .map(|b| gottp_vars::resolve(&b.content, Scope::new(environment, collection)).into_bytes())
        .unwrap_or_default();

    OutgoingRequest {
        method: request.method.clone(),
        url,
        headers,
        query,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gottp_collection::{Body, Item};

    #[test]
    fn resolve_request_substitutes_url_and_header_variables() {
        let mut collection = Collection::new("Demo");
        collection.variables.insert("token".into(), "xyz".into());
        let mut request = Request::new("Get", "GET", "{{base}}/users");
        request.headers.push(gottp_collection::KeyValue::new("Authorization", "Bearer {{token}}"));
        collection.items.push(Item::Request(request.clone()));

        let mut env = Environment::new("dev");
        env.variables.insert("base".into(), gottp_collection::EnvironmentValue::new("https://api.example.com"));

        let resolved = resolve_request(&request, Some(&env), &collection);
        assert_eq!(resolved.url, "https://api.example.com/users");
        assert_eq!(resolved.headers[0], ("Authorization".to_string(), "Bearer xyz".to_string()));
    }

    #[test]
    fn resolve_request_skips_disabled_pairs() {
        let collection = Collection::new("Demo");
        let mut request = Request::new("Get", "GET", "https://x/y");
        request.params.push(gottp_collection::KeyValue::new("a", "1"));
        request.params.push(gottp_collection::KeyValue::disabled("b", "2"));

        let resolved = resolve_request(&request, None, &collection);
        assert_eq!(resolved.query, vec![("a".to_string(), "1".to_string())]);
    }

    #[test]
    fn resolve_request_empty_body_yields_no_bytes() {
        let collection = Collection::new("Demo");
        let mut request = Request::new("Get", "GET", "https://x/y");
        request.body = Some(Body::none());
        let resolved = resolve_request(&request, None, &collection);
        assert!(resolved.body.is_empty());
    }

    #[tokio::test]
    async fn websocket_and_grpc_are_rejected_from_unary_dispatch() {
        let collection = Collection::new("Demo");
        let mut request = Request::new("Connect", "CONNECT", "wss://x/y");
        request.protocol = Protocol::WebSocket;
        let client = reqwest::Client::new();
        let mut auth_ctx = gottp_auth::AuthContext::default();
        let ctx = DispatchContext::default();
        let err = dispatch(&request, None, &collection, &client, &mut auth_ctx, &ctx).await.unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn a_canceled_attempt_still_resolves_through_the_state_machine() {
        let collection = Collection::new("Demo");
        let request = Request::new("Get", "GET", "https://example.invalid/");
        let client = reqwest::Client::new();
        let mut auth_ctx = gottp_auth::AuthContext::default();
        let mut ctx = DispatchContext::default();
        ctx.cancellation.cancel();

        let err = dispatch(&request, None, &collection, &client, &mut auth_ctx, &ctx).await.unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Canceled);
    }
}
