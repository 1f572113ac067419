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

use std::future::Future;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ecr::config::{Credentials as AwsCredentials, Region};
use aws_sdk_ecr::error::DisplayErrorContext;

use crate::credentials::{AuthorizationData, RoleStrategy};
use crate::error::{Error, Result};
use crate::settings::EcrSettings;

pub const DEFAULT_REGION: &str = "us-east-1";
const SESSION_NAME: &str = "manifest-publisher";

/// Source of short-lived registry tokens.
pub trait TokenClient {
    fn authorization_data(&self) -> impl Future<Output = Result<Vec<AuthorizationData>>> + Send;
}

/// Talks to Amazon ECR, optionally through an assumed role.
///
/// Nothing is loaded or requested before [`TokenClient::authorization_data`] is called.
#[derive(Debug)]
pub struct RealClient {
    settings: EcrSettings,
}

impl RealClient {
    pub fn new(settings: EcrSettings) -> Self {
        Self { settings }
    }

    pub fn region(&self) -> &str {
        if self.settings.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.settings.region
        }
    }

    async fn session(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region().to_string()));

        match (self.settings.access_key.is_empty(), self.settings.secret_key.is_empty()) {
            (false, false) => {
                loader = loader.credentials_provider(AwsCredentials::new(
                    &self.settings.access_key,
                    &self.settings.secret_key,
                    None,
                    None,
                    SESSION_NAME,
                ));
            },
            (true, true) => tracing::debug!("using the ambient AWS credential chain"),
            _ => tracing::warn!("access key and secret key must be set together, using the ambient AWS credential chain"),
        }

        loader.load().await
    }

    async fn ecr_client(&self) -> aws_sdk_ecr::Client {
        let session = self.session().await;

        match role_provider(&session, RoleStrategy::from_settings(&self.settings)).await {
            None => aws_sdk_ecr::Client::new(&session),
            Some(provider) => {
                let config = aws_sdk_ecr::config::Builder::from(&session)
                    .credentials_provider(provider)
                    .build();
                aws_sdk_ecr::Client::from_conf(config)
            },
        }
    }
}

/// Credentials of the role to assume on top of `session`, if any.
async fn role_provider(session: &SdkConfig, strategy: RoleStrategy) -> Option<AssumeRoleProvider> {
    let (role_arn, external_id) = match strategy {
        RoleStrategy::Ambient => return None,
        RoleStrategy::AssumeRole { role_arn } => (role_arn, None),
        RoleStrategy::AssumeRoleWithExternalId { role_arn, external_id } => (role_arn, Some(external_id)),
    };

    tracing::info!("assuming role {role_arn}");
    let mut provider = AssumeRoleProvider::builder(role_arn)
        .session_name(SESSION_NAME)
        .configure(session);
    if let Some(external_id) = external_id {
        provider = provider.external_id(external_id);
    }
    Some(provider.build().await)
}

impl TokenClient for RealClient {
    async fn authorization_data(&self) -> Result<Vec<AuthorizationData>> {
        let output = self
            .ecr_client()
            .await
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| {
                Error::AuthExchange(format!(
                    "failed to get ECR authorization token in {}: {}",
                    self.region(),
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(output
            .authorization_data()
            .iter()
            .map(|data| AuthorizationData {
                token: data.authorization_token().map(ToString::to_string),
                proxy_endpoint: data.proxy_endpoint().map(ToString::to_string),
            })
            .collect())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockClient {
    pub authorization_data: Vec<AuthorizationData>,
    pub error: Option<String>,
    pub calls: AtomicUsize,
}

#[cfg(test)]
impl MockClient {
    pub fn with_data(authorization_data: Vec<AuthorizationData>) -> Self {
        Self {
            authorization_data,
            ..Default::default()
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TokenClient for MockClient {
    async fn authorization_data(&self) -> Result<Vec<AuthorizationData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(error) => Err(Error::AuthExchange(error.clone())),
            None => Ok(self.authorization_data.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_config::retry::RetryConfig;
    use aws_credential_types::provider::ProvideCredentials;
    use aws_smithy_runtime::client::http::test_util::capture_request;

    use super::*;

    const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/pusher";

    /// Body of the STS request sent to obtain the role's credentials.
    async fn assume_role_request(strategy: RoleStrategy) -> String {
        let (http_client, request) = capture_request(None);
        let session = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(AwsCredentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .http_client(http_client)
            .load()
            .await;

        let provider = role_provider(&session, strategy).await.unwrap();
        // the canned response is empty, so only the request is of interest
        let _ = provider.provide_credentials().await;

        let request = request.expect_request();
        String::from_utf8(request.body().bytes().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn assume_role_sends_external_id() {
        let body = assume_role_request(RoleStrategy::AssumeRoleWithExternalId {
            role_arn: ROLE_ARN.into(),
            external_id: "corp-42".into(),
        })
        .await;
        assert!(body.contains("Action=AssumeRole"), "{body}");
        assert!(body.contains("ExternalId=corp-42"), "{body}");
        assert!(body.contains("RoleSessionName=manifest-publisher"), "{body}");
    }

    #[tokio::test]
    async fn assume_role_without_external_id() {
        let body = assume_role_request(RoleStrategy::AssumeRole {
            role_arn: ROLE_ARN.into(),
        })
        .await;
        assert!(body.contains("Action=AssumeRole"), "{body}");
        assert!(!body.contains("ExternalId"), "{body}");
    }

    #[tokio::test]
    async fn ambient_strategy_assumes_nothing() {
        let session = SdkConfig::builder().build();
        assert!(role_provider(&session, RoleStrategy::Ambient).await.is_none());
    }

    #[test]
    fn region_defaults_to_us_east_1() {
        assert_eq!(RealClient::new(EcrSettings::default()).region(), "us-east-1");

        let client = RealClient::new(EcrSettings {
            region: "eu-central-1".into(),
            ..Default::default()
        });
        assert_eq!(client.region(), "eu-central-1");
    }
}
