// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authentication configuration attached to a collection or a single request.

use serde::{Deserialize, Serialize};

/// Placement of an API key credential on the wire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyPlacement {
    /// Sent as a header.
    Header,
    /// Sent as a query string parameter.
    Query,
}

/// OAuth2 grant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OAuth2Grant {
    /// Two-legged client credentials grant.
    ClientCredentials,
    /// Three-legged authorization code grant (with optional PKCE).
    AuthorizationCode,
    /// Resource owner password credentials grant.
    Password,
}

/// Discriminated authentication configuration. Each variant carries only its
/// own field set (§3 Auth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Auth {
    /// No authentication.
    None,
    /// HTTP Basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// Token value (may contain `{{variable}}` references).
        token: String,
    },
    /// API key sent as a header or query parameter.
    ApiKey {
        /// Header or query parameter name.
        key: String,
        /// Key value.
        value: String,
        /// Where the key is placed on the wire.
        placement: ApiKeyPlacement,
    },
    /// OAuth2, supporting three grant types (§4.3).
    OAuth2 {
        /// Which grant flow to run.
        grant: OAuth2Grant,
        /// Authorization endpoint (authorization_code grant only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_url: Option<String>,
        /// Token endpoint.
        token_url: String,
        /// OAuth2 client identifier.
        client_id: String,
        /// OAuth2 client secret.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
        /// Requested scope string.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
        /// Resource owner username (password grant only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Resource owner password (password grant only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        /// Whether to use PKCE (authorization_code grant only).
        #[serde(default)]
        pkce: bool,
    },
    /// AWS Signature Version 4.
    AwsV4 {
        /// AWS access key id.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// Optional temporary session token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        /// AWS region, e.g. `us-east-1`.
        region: String,
        /// AWS service name, e.g. `execute-api`.
        service: String,
    },
    /// HTTP Digest authentication (RFC 7616).
    Digest {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl Default for Auth {
    fn default() -> Self {
        Auth::None
    }
}

impl Auth {
    /// Human-readable scheme tag, matching the `type` discriminant.
    pub fn scheme(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Basic { .. } => "basic",
            Auth::Bearer { .. } => "bearer",
            Auth::ApiKey { .. } => "apikey",
            Auth::OAuth2 { .. } => "oauth2",
            Auth::AwsV4 { .. } => "awsv4",
            Auth::Digest { .. } => "digest",
        }
    }

    /// `true` for `Auth::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Auth::None)
    }
}
