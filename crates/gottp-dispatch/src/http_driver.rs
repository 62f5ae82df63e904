// SPDX-License-Identifier: MIT OR Apache-2.0
//! The HTTP driver: HTTP/1.1 and HTTP/2 (via ALPN) over `reqwest`.

use crate::response::{Response, ResponseHeader, TimingDetail, TimingPhase};
use futures_core_shim::BodyStream;
use gottp_auth::{AuthContext, OutgoingRequest};
use gottp_collection::Auth;
use gottp_error::Error;
use std::time::Instant;

/// Redirect cap applied when the caller does not override it (§4.4).
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Execute one HTTP request, including the Digest single-retry-on-401
/// exception to "the dispatcher itself does not retry" (§4.4's last
/// paragraph: this is part of the Digest protocol, not a retry policy).
///
/// Callers must build `client` with `client_builder()` (reqwest's own
/// redirect following disabled) so the 301/302/303/307/308 handling below,
/// not `reqwest`'s, decides what happens to the method and body.
pub async fn send(client: &reqwest::Client, mut outgoing: OutgoingRequest, auth: &Auth, max_redirects: usize, auth_ctx: &mut AuthContext) -> Result<Response, Error> {
    outgoing = gottp_auth::apply(outgoing, auth, auth_ctx).await?;

    let started = Instant::now();
    let mut response = execute_with_redirects(client, outgoing.clone(), max_redirects).await?;

    if response.status_code == 401 && matches!(auth, Auth::Digest { .. }) {
        if let Some(challenge_header) = response.header("WWW-Authenticate") {
            if let Ok(challenge) = gottp_auth::digest::Challenge::parse(challenge_header) {
                auth_ctx.digest_challenge = Some(challenge);
                let retried = gottp_auth::apply(outgoing, auth, auth_ctx).await?;
                let mut second = execute_with_redirects(client, retried, max_redirects).await?;
                second.timing.total = started.elapsed();
                return Ok(second);
            }
        }
    }

    response.timing.total = started.elapsed();
    Ok(response)
}

/// `true` for the five statuses §4.4 names as redirects.
fn is_redirect_status(code: u16) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}

/// Split a URL into its query-less form and its query pairs, matching the
/// rest of this codebase's convention of carrying the URL and its query
/// string as separate fields (see `gottp-codecs::har`'s HAR entries).
fn split_url_and_query(url: &url::Url) -> (String, Vec<(String, String)>) {
    let query = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    let mut without_query = url.clone();
    without_query.set_query(None);
    (without_query.to_string(), query)
}

/// Follow redirects per RFC 9110 §15.4: 303 downgrades to `GET` with no
/// body; 301, 302, 307, and 308 preserve the method and body unchanged. Caps
/// at `max_redirects` hops.
///
/// `reqwest::redirect::Policy::custom` cannot implement this — a `Policy`
/// closure may only choose to follow or stop, it has no hook to rewrite the
/// follow-up request's method or body. So this loop drives redirects itself,
/// one `execute_once` call per hop, and requires the caller's client to have
/// `reqwest`'s own redirect following turned off (`client_builder()`).
async fn execute_with_redirects(client: &reqwest::Client, mut outgoing: OutgoingRequest, max_redirects: usize) -> Result<Response, Error> {
    let mut hops = 0usize;
    loop {
        let response = execute_once(client, &outgoing).await?;
        if !is_redirect_status(response.status_code) {
            return Ok(response);
        }
        let Some(location) = response.header("Location").map(str::to_string) else {
            return Ok(response);
        };
        if hops >= max_redirects {
            return Err(Error::network(format!("exceeded redirect cap of {max_redirects} hops")));
        }
        hops += 1;

        let base = url::Url::parse(&outgoing.url).map_err(|e| Error::validation("invalid URL").with_source(Box::new(e)))?;
        let target = base.join(&location).map_err(|e| Error::protocol("invalid redirect Location header").with_source(Box::new(e)))?;
        let (clean_url, query) = split_url_and_query(&target);

        if response.status_code == 303 {
            outgoing.method = "GET".to_string();
            outgoing.body.clear();
        }
        outgoing.url = clean_url;
        outgoing.query = query;
    }
}

async fn execute_once(client: &reqwest::Client, outgoing: &OutgoingRequest) -> Result<Response, Error> {
    let method = reqwest::Method::from_bytes(outgoing.method.as_bytes())
        .map_err(|e| Error::validation(format!("invalid method `{}`", outgoing.method)).with_source(Box::new(e)))?;

    let mut url = url::Url::parse(&outgoing.url).map_err(|e| Error::validation("invalid URL").with_source(Box::new(e)))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
    }
    if !outgoing.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &outgoing.query {
            pairs.append_pair(k, v);
        }
    }

    let mut builder = client.request(method, url);
    for (name, value) in &outgoing.headers {
        builder = builder.header(name, value);
    }
    if !outgoing.body.is_empty() {
        builder = builder.body(outgoing.body.clone());
    }

    let ttfb_start = Instant::now();
    let response = builder.send().await.map_err(|e| {
        let mut err = Error::network("HTTP request failed").with_source(Box::new(e));
        err = err.with_phase("connect");
        err
    })?;
    let ttfb = ttfb_start.elapsed();

    let status = response.status();
    let tls = response.url().scheme() == "https";
    let headers: Vec<ResponseHeader> = response
        .headers()
        .iter()
        .map(|(name, value)| ResponseHeader {
            name: name.to_string(),
            value: value.to_str().unwrap_or_default().to_string(),
        })
        .collect();
    let content_type = headers.iter().find(|h| h.name.eq_ignore_ascii_case("content-type")).map(|h| h.value.clone());

    let transfer_start = Instant::now();
    let body = BodyStream::collect(response)
        .await
        .map_err(|e| Error::network("failed reading HTTP response body").with_source(Box::new(e)))?;
    let transfer = transfer_start.elapsed();

    Ok(Response {
        status_code: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        size: body.len(),
        headers,
        body,
        content_type,
        duration: ttfb + transfer,
        protocol: "http".to_string(),
        tls,
        timing: TimingDetail {
            dns_lookup: TimingPhase::inapplicable(),
            tcp_connect: TimingPhase::inapplicable(),
            tls_handshake: TimingPhase::inapplicable(),
            time_to_first_byte: TimingPhase::measured(ttfb),
            transfer: TimingPhase::measured(transfer),
            total: ttfb + transfer,
        },
    })
}

/// A `reqwest::ClientBuilder` with its own redirect following disabled, so
/// `send`'s `execute_with_redirects` loop is the only thing deciding what
/// happens to a 3xx response. Every client passed to `send` should be built
/// from this (directly, or with further configuration chained on top).
pub fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().redirect(reqwest::redirect::Policy::none())
}

/// A minimal, dependency-free async body collector, kept separate from the
/// dispatcher's public surface so the rest of this module reads as plain
/// `reqwest` usage.
mod futures_core_shim {
    use reqwest::Response as ReqwestResponse;

    pub struct BodyStream;

    impl BodyStream {
        pub async fn collect(response: ReqwestResponse) -> Result<Vec<u8>, reqwest::Error> {
            Ok(response.bytes().await?.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gottp_auth::AuthContext;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn req(url: &str) -> OutgoingRequest {
        OutgoingRequest {
            method: "GET".into(),
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Vec::new(),
        }
    }

    #[tokio::test]
    async fn basic_get_returns_200_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let client = client_builder().build().unwrap();
        let mut ctx = AuthContext::default();
        let resp = send(&client, req(&format!("{}/ping", server.uri())), &Auth::None, DEFAULT_MAX_REDIRECTS, &mut ctx)
            .await
            .unwrap();

        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, b"pong");
        assert_eq!(resp.protocol, "http");
    }

    #[tokio::test]
    async fn query_params_are_appended() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_builder().build().unwrap();
        let mut outgoing = req(&format!("{}/search", server.uri()));
        outgoing.query.push(("q".to_string(), "rust".to_string()));
        let mut ctx = AuthContext::default();
        let resp = send(&client, outgoing, &Auth::None, DEFAULT_MAX_REDIRECTS, &mut ctx).await.unwrap();
        assert_eq!(resp.status_code, 200);
    }

    #[tokio::test]
    async fn digest_challenge_triggers_single_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", r#"Digest realm="r", nonce="n""#),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = client_builder().build().unwrap();
        let mut ctx = AuthContext::default();
        let auth = Auth::Digest { username: "u".into(), password: "p".into() };
        let resp = send(&client, req(&format!("{}/secure", server.uri())), &auth, DEFAULT_MAX_REDIRECTS, &mut ctx)
            .await
            .unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, b"ok");
    }

    #[tokio::test]
    async fn redirect_307_preserves_method_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let client = client_builder().build().unwrap();
        let mut ctx = AuthContext::default();
        let mut outgoing = req(&format!("{}/old", server.uri()));
        outgoing.method = "POST".to_string();
        outgoing.body = b"payload".to_vec();
        let resp = send(&client, outgoing, &Auth::None, DEFAULT_MAX_REDIRECTS, &mut ctx).await.unwrap();

        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, b"moved");
    }

    #[tokio::test]
    async fn redirect_303_downgrades_to_get_with_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(303).insert_header("Location", "/result"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/result"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let client = client_builder().build().unwrap();
        let mut ctx = AuthContext::default();
        let mut outgoing = req(&format!("{}/create", server.uri()));
        outgoing.method = "POST".to_string();
        outgoing.body = b"payload".to_vec();
        let resp = send(&client, outgoing, &Auth::None, DEFAULT_MAX_REDIRECTS, &mut ctx).await.unwrap();

        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, b"done");
    }

    #[tokio::test]
    async fn redirect_cap_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let client = client_builder().build().unwrap();
        let mut ctx = AuthContext::default();
        let err = send(&client, req(&format!("{}/loop", server.uri())), &Auth::None, 2, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Network);
    }
}
