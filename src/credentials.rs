// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use url::Url;

use crate::api_clients::TokenClient;
use crate::error::{Error, Result};
use crate::settings::{EcrSettings, RegistryLogin};

/// Registry login handed to the push.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub registry: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("registry", &self.registry)
            .finish()
    }
}

impl Credentials {
    /// Uses the configured username and password as they are. Both may be empty.
    pub fn pass_through(login: &RegistryLogin) -> Result<Self> {
        if login.username.is_empty() != login.password.is_empty() {
            return Err(Error::Configuration(
                "username and password must be provided together".to_string(),
            ));
        }

        Ok(Self {
            username: login.username.clone(),
            password: login.password.clone(),
            registry: None,
        })
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// How the identity used for the ECR token request is obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleStrategy {
    /// The session credentials are used directly.
    Ambient,
    AssumeRole { role_arn: String },
    AssumeRoleWithExternalId { role_arn: String, external_id: String },
}

impl RoleStrategy {
    pub fn from_settings(settings: &EcrSettings) -> Self {
        match (settings.assume_role.as_str(), settings.external_id.as_str()) {
            ("", "") => Self::Ambient,
            ("", _) => {
                tracing::warn!("ignoring external id, no role to assume was configured");
                Self::Ambient
            },
            (role_arn, "") => Self::AssumeRole {
                role_arn: role_arn.to_string(),
            },
            (role_arn, external_id) => Self::AssumeRoleWithExternalId {
                role_arn: role_arn.to_string(),
                external_id: external_id.to_string(),
            },
        }
    }
}

/// One entry of a registry token response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationData {
    pub token: Option<String>,
    pub proxy_endpoint: Option<String>,
}

/// Requests a registry token and turns it into credentials.
///
/// An explicitly configured registry wins over the one derived from the proxy endpoint.
pub async fn exchange(client: &impl TokenClient, configured_registry: &str) -> Result<Credentials> {
    let data = client.authorization_data().await?;
    let auth = data
        .first()
        .ok_or_else(|| Error::AuthExchange("token response contains no authorization data".to_string()))?;
    let token = auth
        .token
        .as_deref()
        .ok_or_else(|| Error::AuthExchange("authorization data contains no token".to_string()))?;
    let (username, password) = decode_token(token)?;

    let registry = if configured_registry.is_empty() {
        auth.proxy_endpoint.as_deref().map(registry_host)
    } else {
        Some(configured_registry.to_string())
    };

    Ok(Credentials {
        username,
        password,
        registry,
    })
}

/// Splits a base64 encoded `username:password` token at its first colon.
pub fn decode_token(token: &str) -> Result<(String, String)> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|e| Error::AuthExchange(format!("cannot decode authorization token: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| Error::AuthExchange("authorization token is not valid UTF-8".to_string()))?;

    decoded
        .split_once(':')
        .map(|(username, password)| (username.to_string(), password.to_string()))
        .ok_or_else(|| Error::AuthExchange("authorization token has no username:password separator".to_string()))
}

/// Strips the scheme from a proxy endpoint like `https://123.dkr.ecr.us-east-1.amazonaws.com`.
pub fn registry_host(proxy_endpoint: &str) -> String {
    if let Ok(endpoint) = Url::parse(proxy_endpoint) {
        if let Some(host) = endpoint.host_str() {
            return match endpoint.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
        }
    }

    proxy_endpoint
        .strip_prefix("https://")
        .or_else(|| proxy_endpoint.strip_prefix("http://"))
        .unwrap_or(proxy_endpoint)
        .trim_end_matches('/')
        .to_string()
}
