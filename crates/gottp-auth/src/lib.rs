// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! The Auth Chain: attaches credentials to an outgoing request (§4.3).
//!
//! `apply` is protocol-agnostic — it operates on an [`OutgoingRequest`]
//! envelope (method, url, headers, query, body) rather than any one wire
//! protocol's native request type, so the same chain serves HTTP, GraphQL,
//! WebSocket handshakes, and gRPC metadata alike.

pub mod digest;
pub mod oauth2;
pub mod sigv4;

use base64::Engine;
use gottp_collection::{ApiKeyPlacement, Auth, OAuth2Grant};
use gottp_error::Error;
use oauth2::{AuthorizationCodeProvider, GrantRequest, TokenCache};

/// A protocol-agnostic outgoing request, as seen by the Auth Chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingRequest {
    /// HTTP-style method (or its GraphQL/gRPC equivalent label).
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Headers, in attach order.
    pub headers: Vec<(String, String)>,
    /// Query parameters, in attach order.
    pub query: Vec<(String, String)>,
    /// Raw body bytes, used only for `auth-int` Digest payload hashing and
    /// AWS SigV4 payload hashing.
    pub body: Vec<u8>,
}

impl OutgoingRequest {
    fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| {
                let mut p = u.path().to_string();
                if let Some(q) = u.query() {
                    p.push('?');
                    p.push_str(q);
                }
                p
            })
            .unwrap_or_else(|_| self.url.clone())
    }
}

/// Shared, reusable state across repeated `apply` calls: an HTTP client for
/// side-channel calls (OAuth2 token endpoint) and the token cache.
#[derive(Clone, Default)]
pub struct AuthContext {
    /// Client used for OAuth2 token requests.
    pub http: reqwest::Client,
    /// Process-wide OAuth2 token cache.
    pub token_cache: TokenCache,
    /// A previously-parsed Digest challenge, supplied by the dispatcher
    /// after it observes a `401 WWW-Authenticate: Digest ...` response.
    /// `None` on the first attempt.
    pub digest_challenge: Option<digest::Challenge>,
    /// Nonce count for the current Digest nonce; the dispatcher increments
    /// this across repeated requests against the same challenge.
    pub digest_nc: u32,
    /// Optional UI-delegated provider for the `authorization_code` grant.
    pub authorization_code_provider: Option<std::sync::Arc<dyn AuthorizationCodeProvider>>,
}

/// Attach credentials to `request` per `auth` (§4.3's `Apply`).
///
/// For `Auth::Digest` on the first pass (no challenge yet observed), the
/// request is returned unmodified; the dispatcher must retry after parsing
/// a `401` challenge into `ctx.digest_challenge` and calling `apply` again.
pub async fn apply(mut request: OutgoingRequest, auth: &Auth, ctx: &mut AuthContext) -> Result<OutgoingRequest, Error> {
    match auth {
        Auth::None => Ok(request),
        Auth::Basic { username, password } => {
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            request.headers.push(("Authorization".to_string(), format!("Basic {token}")));
            Ok(request)
        }
        Auth::Bearer { token } => {
            request.headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            Ok(request)
        }
        Auth::ApiKey { key, value, placement } => {
            match placement {
                ApiKeyPlacement::Header => request.headers.push((key.clone(), value.clone())),
                ApiKeyPlacement::Query => request.query.push((key.clone(), value.clone())),
            }
            Ok(request)
        }
        Auth::Digest { username, password } => {
            let Some(challenge) = ctx.digest_challenge.clone() else {
                return Ok(request);
            };
            ctx.digest_nc += 1;
            let path = request.path();
            let resp = digest::authorize(username, password, &request.method, &path, &challenge, ctx.digest_nc);
            request.headers.push(("Authorization".to_string(), resp.to_string()));
            Ok(request)
        }
        Auth::OAuth2 {
            grant,
            auth_url,
            token_url,
            client_id,
            client_secret,
            scope,
            username,
            password,
            pkce,
        } => {
            if matches!(grant, OAuth2Grant::AuthorizationCode) && ctx.authorization_code_provider.is_none() {
                return Err(Error::auth("authorization_code grant configured but no AuthorizationCodeProvider is registered"));
            }
            let token = oauth2::acquire_token(
                &ctx.http,
                &ctx.token_cache,
                GrantRequest {
                    grant: *grant,
                    auth_url: auth_url.as_deref(),
                    token_url,
                    client_id,
                    client_secret: client_secret.as_deref(),
                    scope: scope.as_deref(),
                    username: username.as_deref(),
                    password: password.as_deref(),
                    pkce: *pkce,
                },
                ctx.authorization_code_provider.as_deref(),
            )
            .await?;
            request.headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            Ok(request)
        }
        Auth::AwsV4 {
            access_key_id,
            secret_access_key,
            session_token,
            region,
            service,
        } => {
            let url = url::Url::parse(&request.url).map_err(|e| Error::validation("invalid URL for AWS SigV4").with_source(Box::new(e)))?;
            let host = url.host_str().ok_or_else(|| Error::validation("URL has no host for AWS SigV4"))?.to_string();

            let mut headers = request.headers.clone();
            headers.push(("host".to_string(), host));
            let amz_date = sigv4_amz_date();
            headers.push(("x-amz-date".to_string(), amz_date.clone()));
            if let Some(token) = session_token {
                headers.push(("x-amz-security-token".to_string(), token.clone()));
            }

            let signature = sigv4::sign(&sigv4::SigningInput {
                method: &request.method,
                canonical_uri: url.path(),
                query: &request.query,
                headers: &headers,
                payload: &request.body,
                access_key_id,
                secret_access_key,
                session_token: session_token.as_deref(),
                region,
                service,
                amz_date: &amz_date,
            });

            request.headers.push(("X-Amz-Date".to_string(), signature.amz_date));
            if let Some(token) = &signature.security_token {
                request.headers.push(("X-Amz-Security-Token".to_string(), token.clone()));
            }
            request.headers.push(("Authorization".to_string(), signature.authorization));
            Ok(request)
        }
    }
}

fn sigv4_amz_date() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let datetime = chrono::DateTime::<chrono::Utc>::from_timestamp(now as i64, 0).unwrap_or_default();
    datetime.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

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
    async fn none_passes_through_unmodified() {
        let mut ctx = AuthContext::default();
        let out = apply(req("https://x/y"), &Auth::None, &mut ctx).await.unwrap();
        assert!(out.headers.is_empty());
    }

    #[tokio::test]
    async fn basic_adds_base64_header() {
        let mut ctx = AuthContext::default();
        let out = apply(
            req("https://x/y"),
            &Auth::Basic { username: "admin".into(), password: "secret".into() },
            &mut ctx,
        )
        .await
        .unwrap();
        let (_, value) = out.headers.iter().find(|(k, _)| k == "Authorization").unwrap();
        assert_eq!(value, "Basic YWRtaW46c2VjcmV0");
    }

    #[tokio::test]
    async fn bearer_adds_header() {
        let mut ctx = AuthContext::default();
        let out = apply(req("https://x/y"), &Auth::Bearer { token: "abc".into() }, &mut ctx).await.unwrap();
        assert!(out.headers.contains(&("Authorization".to_string(), "Bearer abc".to_string())));
    }

    #[tokio::test]
    async fn apikey_header_placement() {
        let mut ctx = AuthContext::default();
        let auth = Auth::ApiKey { key: "X-Api-Key".into(), value: "k1".into(), placement: ApiKeyPlacement::Header };
        let out = apply(req("https://x/y"), &auth, &mut ctx).await.unwrap();
        assert!(out.headers.contains(&("X-Api-Key".to_string(), "k1".to_string())));
        assert!(out.query.is_empty());
    }

    #[tokio::test]
    async fn apikey_query_placement() {
        let mut ctx = AuthContext::default();
        let auth = Auth::ApiKey { key: "api_key".into(), value: "k1".into(), placement: ApiKeyPlacement::Query };
        let out = apply(req("https://x/y"), &auth, &mut ctx).await.unwrap();
        assert!(out.query.contains(&("api_key".to_string(), "k1".to_string())));
    }

    #[tokio::test]
    async fn digest_first_pass_is_unmodified() {
        let mut ctx = AuthContext::default();
        let out = apply(req("https://x/y"), &Auth::Digest { username: "u".into(), password: "p".into() }, &mut ctx)
            .await
            .unwrap();
        assert!(out.headers.is_empty());
    }

    #[tokio::test]
    async fn digest_second_pass_uses_challenge() {
        let mut ctx = AuthContext::default();
        ctx.digest_challenge = Some(digest::Challenge::parse(r#"Digest realm="r", nonce="n""#).unwrap());
        let out = apply(req("https://x/y"), &Auth::Digest { username: "u".into(), password: "p".into() }, &mut ctx)
            .await
            .unwrap();
        assert!(out.headers.iter().any(|(k, v)| k == "Authorization" && v.starts_with("Digest ")));
    }

    #[tokio::test]
    async fn authorization_code_without_provider_errors() {
        let mut ctx = AuthContext::default();
        let auth = Auth::OAuth2 {
            grant: OAuth2Grant::AuthorizationCode,
            auth_url: Some("https://idp/authorize".into()),
            token_url: "https://idp/token".into(),
            client_id: "id".into(),
            client_secret: None,
            scope: None,
            username: None,
            password: None,
            pkce: true,
        };
        let err = apply(req("https://x/y"), &auth, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Auth);
    }

    #[tokio::test]
    async fn awsv4_adds_signature_headers() {
        let mut ctx = AuthContext::default();
        let auth = Auth::AwsV4 {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
            region: "us-east-1".into(),
            service: "execute-api".into(),
        };
        let out = apply(req("https://api.example.com/users"), &auth, &mut ctx).await.unwrap();
        assert!(out.headers.iter().any(|(k, _)| k == "Authorization"));
        assert!(out.headers.iter().any(|(k, _)| k == "X-Amz-Date"));
        assert!(!out.headers.iter().any(|(k, _)| k == "X-Amz-Security-Token"));
    }
}
