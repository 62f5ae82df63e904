// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth2 token acquisition (RFC 6749) with PKCE (RFC 7636) and an
//! in-process, coalescing token cache.

use base64::Engine;
use gottp_collection::OAuth2Grant;
use gottp_error::Error;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long before expiry a cached token is proactively refreshed.
const REFRESH_SKEW: Duration = Duration::from_secs(30);

/// Cache key: a token is reusable across requests that share these three
/// fields (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    /// Token endpoint URL.
    pub token_url: String,
    /// OAuth2 client id.
    pub client_id: String,
    /// Requested scope, if any.
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
    refresh_token: Option<String>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(exp) => Instant::now() + REFRESH_SKEW < exp,
            None => true,
        }
    }
}

/// Process-wide, in-memory token cache. Deliberately not persisted to disk:
/// collection files are meant to be committed to version control, and a
/// token must never ride along in one.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<HashMap<TokenKey, CachedToken>>>,
}

impl TokenCache {
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Supplies the `code` parameter for an `authorization_code` grant.
///
/// Opening a browser and running a loopback redirect listener is a UI-layer
/// concern; this crate only defines the seam. Headless callers that never
/// configure an implementation get a clear [`Error::Auth`] instead of
/// hanging.
#[async_trait::async_trait]
pub trait AuthorizationCodeProvider: Send + Sync {
    /// Drive the user through `auth_url` and return the resulting `code`.
    async fn obtain_code(&self, auth_url: &str, redirect_uri: &str, state: &str) -> Result<String, Error>;
}

/// Parameters needed to run one of the three OAuth2 grants.
pub struct GrantRequest<'a> {
    /// Which grant to execute.
    pub grant: OAuth2Grant,
    /// Authorization endpoint (authorization_code only).
    pub auth_url: Option<&'a str>,
    /// Token endpoint.
    pub token_url: &'a str,
    /// OAuth2 client id.
    pub client_id: &'a str,
    /// OAuth2 client secret, if confidential.
    pub client_secret: Option<&'a str>,
    /// Requested scope.
    pub scope: Option<&'a str>,
    /// Resource owner username (password grant only).
    pub username: Option<&'a str>,
    /// Resource owner password (password grant only).
    pub password: Option<&'a str>,
    /// Whether to use PKCE (authorization_code only).
    pub pkce: bool,
}

/// Generate a PKCE code verifier: 43-128 chars from the RFC 7636 unreserved
/// alphabet.
pub fn generate_code_verifier() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
    let mut rng = rand::thread_rng();
    (0..64).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

/// Derive `code_challenge = base64url(SHA-256(code_verifier))`.
pub fn derive_code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Acquire (or reuse a cached) access token for `request`, returning the
/// bearer token string to attach as `Authorization: Bearer <token>`.
pub async fn acquire_token(
    http: &reqwest::Client,
    cache: &TokenCache,
    request: GrantRequest<'_>,
    code_provider: Option<&dyn AuthorizationCodeProvider>,
) -> Result<String, Error> {
    let key = TokenKey {
        token_url: request.token_url.to_string(),
        client_id: request.client_id.to_string(),
        scope: request.scope.map(|s| s.to_string()),
    };

    {
        let guard = cache.inner.lock().await;
        if let Some(cached) = guard.get(&key) {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }
    }

    let mut guard = cache.inner.lock().await;
    // Re-check under the lock: a concurrent caller may have already
    // refreshed while we were waiting (coalesced refresh).
    if let Some(cached) = guard.get(&key) {
        if cached.is_fresh() {
            return Ok(cached.access_token.clone());
        }
    }

    let mut form: Vec<(&str, String)> = Vec::new();
    match request.grant {
        OAuth2Grant::ClientCredentials => {
            form.push(("grant_type", "client_credentials".to_string()));
            form.push(("client_id", request.client_id.to_string()));
            if let Some(secret) = request.client_secret {
                form.push(("client_secret", secret.to_string()));
            }
            if let Some(scope) = request.scope {
                form.push(("scope", scope.to_string()));
            }
        }
        OAuth2Grant::Password => {
            let username = request.username.ok_or_else(|| Error::auth("password grant requires a username"))?;
            let password = request.password.ok_or_else(|| Error::auth("password grant requires a password"))?;
            form.push(("grant_type", "password".to_string()));
            form.push(("username", username.to_string()));
            form.push(("password", password.to_string()));
            form.push(("client_id", request.client_id.to_string()));
            if let Some(secret) = request.client_secret {
                form.push(("client_secret", secret.to_string()));
            }
        }
        OAuth2Grant::AuthorizationCode => {
            let provider = code_provider.ok_or_else(|| {
                Error::auth("authorization_code grant requires an AuthorizationCodeProvider (UI-delegated)")
            })?;
            let auth_url = request.auth_url.ok_or_else(|| Error::auth("authorization_code grant requires auth_url"))?;
            let redirect_uri = "http://127.0.0.1:0/callback";
            let state = generate_code_verifier();

            let verifier = if request.pkce { Some(generate_code_verifier()) } else { None };

            let mut full_auth_url = format!(
                "{auth_url}?response_type=code&client_id={}&redirect_uri={redirect_uri}&state={state}",
                request.client_id
            );
            if let Some(v) = &verifier {
                full_auth_url.push_str(&format!("&code_challenge={}&code_challenge_method=S256", derive_code_challenge(v)));
            }

            let code = provider.obtain_code(&full_auth_url, redirect_uri, &state).await?;

            form.push(("grant_type", "authorization_code".to_string()));
            form.push(("code", code));
            form.push(("redirect_uri", redirect_uri.to_string()));
            form.push(("client_id", request.client_id.to_string()));
            if let Some(secret) = request.client_secret {
                form.push(("client_secret", secret.to_string()));
            }
            if let Some(v) = verifier {
                form.push(("code_verifier", v));
            }
        }
    }

    let response = http
        .post(request.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::network("token request failed").with_source(Box::new(e)))?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(Error::auth(format!("token endpoint returned {status}")));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::protocol("malformed token response").with_source(Box::new(e)))?;

    let expires_at = body.expires_in.map(|secs| Instant::now() + Duration::from_secs(secs));
    guard.insert(
        key,
        CachedToken {
            access_token: body.access_token.clone(),
            expires_at,
            refresh_token: body.refresh_token,
        },
    );

    Ok(body.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_verifier_is_in_spec_length_range() {
        let verifier = generate_code_verifier();
        assert!(verifier.len() >= 43 && verifier.len() <= 128);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric() || "-._~".contains(c)));
    }

    #[test]
    fn code_challenge_is_deterministic_per_verifier() {
        let verifier = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJKLMNOPQRSTUVWX12";
        let a = derive_code_challenge(verifier);
        let b = derive_code_challenge(verifier);
        assert_eq!(a, b);
        assert!(!a.contains('='));
    }

    #[tokio::test]
    async fn cached_token_key_distinguishes_by_scope() {
        let key_a = TokenKey { token_url: "https://x/token".into(), client_id: "c".into(), scope: Some("read".into()) };
        let key_b = TokenKey { token_url: "https://x/token".into(), client_id: "c".into(), scope: Some("write".into()) };
        assert_ne!(key_a, key_b);
    }
}
