//! AWS STS adapter on the AWS SDK.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::Client;
use aws_sdk_sts::config::http::HttpResponse;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::types::Credentials;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use iamgate_application::{BridgeCredential, CspProvider, ProviderAssumeRequest};
use iamgate_core::{AppError, AppResult};
use iamgate_domain::{CspType, IssuedCredential};
use tracing::debug;

/// Region used to load the shared SDK configuration; every call overrides it.
const BOOTSTRAP_REGION: &str = "us-east-1";

/// Calls `AssumeRoleWithWebIdentity` and `AssumeRoleWithSAML`.
///
/// Both actions are unsigned; the bridge credential is the proof. Each
/// request region gets its own client so the SDK resolves the regional
/// endpoint unless an explicit endpoint is configured.
pub struct AwsStsProvider {
    base: aws_sdk_sts::config::Builder,
    clients: DashMap<String, Client>,
}

impl AwsStsProvider {
    /// Loads an anonymous SDK configuration and builds the adapter.
    pub async fn connect(endpoint: Option<&str>, timeout: Duration) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .no_credentials()
            .region(Region::new(BOOTSTRAP_REGION))
            .retry_config(RetryConfig::disabled())
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        Self::from_shared_config(&loader.load().await)
    }

    /// Builds the adapter from an already loaded SDK configuration.
    #[must_use]
    pub fn from_shared_config(shared_config: &SdkConfig) -> Self {
        Self {
            base: aws_sdk_sts::config::Builder::from(shared_config),
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, region: &str) -> Client {
        self.clients
            .entry(region.to_owned())
            .or_insert_with(|| {
                Client::from_conf(
                    self.base
                        .clone()
                        .region(Region::new(region.to_owned()))
                        .build(),
                )
            })
            .clone()
    }
}

fn duration_seconds(request: &ProviderAssumeRequest) -> AppResult<Option<i32>> {
    request
        .duration_seconds
        .map(|seconds| {
            i32::try_from(seconds).map_err(|_| {
                AppError::Validation(format!("session duration {seconds} is out of range"))
            })
        })
        .transpose()
}

/// Converts the STS credential block into the normalized shape.
fn issued_credential(credentials: Option<&Credentials>, region: &str) -> AppResult<IssuedCredential> {
    let credentials = credentials
        .ok_or_else(|| AppError::Internal("aws sts response has no Credentials".to_owned()))?;

    let expiration = credentials.expiration();
    let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .ok_or_else(|| AppError::Internal("invalid aws sts expiration".to_owned()))?;

    Ok(IssuedCredential {
        access_key_id: credentials.access_key_id().to_owned(),
        secret_access_key: credentials.secret_access_key().to_owned(),
        session_token: credentials.session_token().to_owned(),
        expiration,
        region: region.to_owned(),
    })
}

/// Maps STS rejections to `Forbidden` and everything else to `Internal`.
fn sts_error<E>(action: &str, error: SdkError<E, HttpResponse>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(service_error) = &error
        && service_error.raw().status().is_client_error()
    {
        let code = service_error.err().code().unwrap_or("Unknown");
        let message = service_error.err().message().unwrap_or_default();
        return AppError::Forbidden(format!("{code}: {message}"));
    }

    AppError::Internal(format!(
        "aws sts {action} failed: {}",
        DisplayErrorContext(&error)
    ))
}

#[async_trait]
impl CspProvider for AwsStsProvider {
    fn csp_type(&self) -> CspType {
        CspType::Aws
    }

    async fn assume_role(&self, request: &ProviderAssumeRequest) -> AppResult<IssuedCredential> {
        let client = self.client_for(request.region.as_str());
        let duration_seconds = duration_seconds(request)?;
        debug!(region = %request.region, role_arn = %request.role_arn, "calling aws sts");

        match &request.bridge {
            BridgeCredential::WebIdentity { token } => {
                let output = client
                    .assume_role_with_web_identity()
                    .role_arn(request.role_arn.as_str())
                    .role_session_name(request.session_name.as_str())
                    .web_identity_token(token.as_str())
                    .set_duration_seconds(duration_seconds)
                    .send()
                    .await
                    .map_err(|error| sts_error("AssumeRoleWithWebIdentity", error))?;

                issued_credential(output.credentials(), request.region.as_str())
            }
            BridgeCredential::Saml { assertion } => {
                let output = client
                    .assume_role_with_saml()
                    .role_arn(request.role_arn.as_str())
                    .principal_arn(request.trust_provider_arn.as_str())
                    .saml_assertion(assertion.as_str())
                    .set_duration_seconds(duration_seconds)
                    .send()
                    .await
                    .map_err(|error| sts_error("AssumeRoleWithSAML", error))?;

                issued_credential(output.credentials(), request.region.as_str())
            }
        }
    }
}
