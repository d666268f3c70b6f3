//! Provider registry in front of the cloud STS adapters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use iamgate_core::{AppError, AppResult, FederationError};
use iamgate_domain::{CspType, IssuedCredential, RoleSessionName};
use tracing::{info, warn};

use crate::{BridgeCredential, CspProvider, ProviderAssumeRequest};

/// Provider-neutral assume-role call.
#[derive(Debug, Clone)]
pub struct AssumeRoleRequest {
    /// Target provider.
    pub csp_type: CspType,
    /// Role to assume.
    pub role_arn: String,
    /// OIDC or SAML provider the role trusts.
    pub trust_provider_arn: String,
    /// Identity proof.
    pub bridge: BridgeCredential,
    /// Subject the session name is derived from.
    pub session_subject: String,
    /// Target region.
    pub region: String,
    /// Requested lifetime, overriding the client default.
    pub duration_seconds: Option<u32>,
}

/// Dispatches assume-role calls to the provider registered for a CSP.
#[derive(Clone)]
pub struct CspAssumeRoleClient {
    providers: HashMap<CspType, Arc<dyn CspProvider>>,
    default_duration_seconds: Option<u32>,
}

impl CspAssumeRoleClient {
    /// Creates a client from provider adapters. A later adapter for the same
    /// CSP replaces an earlier one.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn CspProvider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.csp_type(), provider))
            .collect();

        Self {
            providers,
            default_duration_seconds: None,
        }
    }

    /// Sets the duration used when a request does not specify one.
    #[must_use]
    pub fn with_default_duration(mut self, duration_seconds: Option<u32>) -> Self {
        self.default_duration_seconds = duration_seconds;
        self
    }

    /// Returns whether a provider is registered for the CSP.
    #[must_use]
    pub fn supports(&self, csp_type: CspType) -> bool {
        self.providers.contains_key(&csp_type)
    }

    /// Fails with `UnsupportedCspType` when no provider is registered.
    pub fn ensure_supported(&self, csp_type: CspType) -> AppResult<()> {
        if self.supports(csp_type) {
            return Ok(());
        }

        Err(FederationError::UnsupportedCspType(csp_type.to_string()).into())
    }

    /// Assumes the role once. Errors are never retried.
    pub async fn assume_role(&self, request: AssumeRoleRequest) -> AppResult<IssuedCredential> {
        let provider = self
            .providers
            .get(&request.csp_type)
            .ok_or_else(|| FederationError::UnsupportedCspType(request.csp_type.to_string()))?;

        let session_name = RoleSessionName::derive(request.session_subject.as_str(), Utc::now());
        let provider_request = ProviderAssumeRequest {
            role_arn: request.role_arn,
            trust_provider_arn: request.trust_provider_arn,
            bridge: request.bridge,
            session_name,
            region: request.region,
            duration_seconds: request.duration_seconds.or(self.default_duration_seconds),
        };

        let issued = provider
            .assume_role(&provider_request)
            .await
            .map_err(|error| assume_role_error(provider_request.role_arn.as_str(), error))?;
        issued.ensure_complete()?;

        info!(
            csp_type = %request.csp_type,
            role_arn = %provider_request.role_arn,
            session_name = %provider_request.session_name,
            expiration = %issued.expiration,
            "assumed cloud role"
        );

        Ok(issued)
    }
}

fn assume_role_error(role_arn: &str, error: AppError) -> AppError {
    match error {
        AppError::Forbidden(reason)
        | AppError::Unauthorized(reason)
        | AppError::Validation(reason) => {
            warn!(role_arn = %role_arn, reason = %reason, "cloud provider rejected assume role");
            FederationError::AssumeRoleFailed {
                role_arn: role_arn.to_owned(),
                reason,
            }
            .into()
        }
        AppError::Internal(reason) => {
            AppError::Internal(format!("AssumeRoleFailed: role={role_arn}: {reason}"))
        }
        other => other,
    }
}
