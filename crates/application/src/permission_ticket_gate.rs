//! UMA permission ticket enforcement.

use std::sync::Arc;

use iamgate_core::{AppError, AppResult};
use tracing::warn;

use crate::{GrantedPermission, IdentityProviderClient};

/// Request-scoped result of a granted permission ticket exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    /// Resource URI that was authorized.
    pub resource_uri: String,
    /// Requesting party token, used downstream instead of the caller's token.
    pub rpt: String,
    /// Permissions carried by the RPT.
    pub permissions: Vec<GrantedPermission>,
}

impl std::fmt::Debug for AuthorizationContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuthorizationContext")
            .field("resource_uri", &self.resource_uri)
            .field("rpt", &"<redacted>")
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Authorizes each request against the identity provider's policy engine.
#[derive(Clone)]
pub struct PermissionTicketGate {
    identity_provider: Arc<dyn IdentityProviderClient>,
}

impl PermissionTicketGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(identity_provider: Arc<dyn IdentityProviderClient>) -> Self {
        Self { identity_provider }
    }

    /// Exchanges the bearer token for an RPT scoped to the request path.
    pub async fn authorize(
        &self,
        bearer_token: Option<&str>,
        path_and_query: &str,
    ) -> AppResult<AuthorizationContext> {
        let bearer_token = bearer_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

        let resource_uri = resource_uri(path_and_query);
        let rpt = self
            .identity_provider
            .request_party_token(bearer_token, resource_uri.as_str())
            .await
            .map_err(|error| {
                warn!(resource_uri = %resource_uri, error = %error, "permission ticket denied");
                match error {
                    AppError::Unauthorized(_) => {
                        AppError::Unauthorized("authentication required".to_owned())
                    }
                    AppError::Forbidden(_) | AppError::Validation(_) => {
                        AppError::Forbidden("access denied".to_owned())
                    }
                    other => AppError::Internal(format!(
                        "permission ticket exchange failed: {other}"
                    )),
                }
            })?;

        Ok(AuthorizationContext {
            resource_uri,
            rpt: rpt.access_token,
            permissions: rpt.permissions,
        })
    }
}

/// Strips query string and fragment from a request target.
#[must_use]
pub fn resource_uri(path_and_query: &str) -> String {
    let end = path_and_query
        .find(['?', '#'])
        .unwrap_or(path_and_query.len());
    path_and_query[..end].to_owned()
}
