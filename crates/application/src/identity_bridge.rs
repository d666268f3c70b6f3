//! Turns caller identity into a credential a cloud STS will accept.

use std::str::FromStr;
use std::sync::Arc;

use iamgate_core::{AppError, AppResult, FederationError, UserIdentity};
use iamgate_domain::{AmbiguousRolePolicy, SamlRole, select_saml_role};
use tracing::debug;

use crate::{
    BridgeCredential, IdentityProviderClient, SamlAssertionDecoder, SamlLoginDetails,
    TokenExchangeRequest,
};

/// How the OIDC bridge obtains the web identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OidcBridgeMode {
    /// Client-credentials token of the broker's service account.
    #[default]
    ServiceAccount,
    /// Token exchange of the caller's own access token.
    TokenExchange,
    /// Token exchange of an admin token on behalf of the caller.
    Impersonation,
}

impl OidcBridgeMode {
    /// Returns the configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceAccount => "service-account",
            Self::TokenExchange => "token-exchange",
            Self::Impersonation => "impersonation",
        }
    }
}

impl FromStr for OidcBridgeMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "service-account" | "service_account" => Ok(Self::ServiceAccount),
            "token-exchange" | "token_exchange" => Ok(Self::TokenExchange),
            "impersonation" => Ok(Self::Impersonation),
            _ => Err(AppError::Validation(format!(
                "OIDC_BRIDGE_MODE must be 'service-account', 'token-exchange' or 'impersonation', got '{value}'"
            ))),
        }
    }
}

/// Web identity token ready to be presented to a provider.
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeToken {
    /// Proof presented to STS.
    pub credential: BridgeCredential,
    /// OIDC provider identifier the role trusts.
    pub idp_identifier: String,
}

impl BridgeToken {
    /// Returns the bridge kind label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.credential.kind()
    }
}

impl std::fmt::Debug for BridgeToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BridgeToken")
            .field("credential", &self.credential)
            .field("idp_identifier", &self.idp_identifier)
            .finish()
    }
}

/// Per-account SAML selection settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamlAccountConfig {
    /// Role that must be present in the assertion, when pinned.
    pub role_arn: Option<String>,
    /// Requested session duration.
    pub session_duration_seconds: Option<u32>,
    /// Behavior for several offered roles and no pin.
    pub ambiguous_role_policy: AmbiguousRolePolicy,
}

/// SAML assertion with the role chosen from it.
#[derive(Clone, PartialEq, Eq)]
pub struct SamlBridge {
    /// Base64 SAML response, as posted by the IdP.
    pub assertion: String,
    /// Role to assume.
    pub selected_role: SamlRole,
    /// Requested session duration.
    pub duration_seconds: Option<u32>,
}

impl SamlBridge {
    /// Returns the assertion as a provider bridge credential.
    #[must_use]
    pub fn credential(&self) -> BridgeCredential {
        BridgeCredential::Saml {
            assertion: self.assertion.clone(),
        }
    }
}

impl std::fmt::Debug for SamlBridge {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SamlBridge")
            .field("assertion", &"<redacted>")
            .field("selected_role", &self.selected_role)
            .field("duration_seconds", &self.duration_seconds)
            .finish()
    }
}

/// Stateless bridge from identity provider credentials to STS proofs.
#[derive(Clone)]
pub struct IdentityBridge {
    identity_provider: Arc<dyn IdentityProviderClient>,
    saml_decoder: Arc<dyn SamlAssertionDecoder>,
    oidc_mode: OidcBridgeMode,
}

impl IdentityBridge {
    /// Creates a bridge.
    #[must_use]
    pub fn new(
        identity_provider: Arc<dyn IdentityProviderClient>,
        saml_decoder: Arc<dyn SamlAssertionDecoder>,
        oidc_mode: OidcBridgeMode,
    ) -> Self {
        Self {
            identity_provider,
            saml_decoder,
            oidc_mode,
        }
    }

    /// Returns the configured OIDC mode.
    #[must_use]
    pub fn oidc_mode(&self) -> OidcBridgeMode {
        self.oidc_mode
    }

    /// Obtains a web identity token for the caller.
    pub async fn bridge_via_oidc(
        &self,
        actor: &UserIdentity,
        user_access_token: &str,
        idp_identifier: &str,
    ) -> AppResult<BridgeToken> {
        let token_set = match self.oidc_mode {
            OidcBridgeMode::ServiceAccount => self.identity_provider.service_account_token().await,
            OidcBridgeMode::TokenExchange => {
                self.identity_provider
                    .exchange_token(&TokenExchangeRequest {
                        subject_token: user_access_token.to_owned(),
                        requested_subject: None,
                        audience: None,
                    })
                    .await
            }
            OidcBridgeMode::Impersonation => match self.identity_provider.admin_token().await {
                Ok(admin) => {
                    self.identity_provider
                        .exchange_token(&TokenExchangeRequest {
                            subject_token: admin.access_token,
                            requested_subject: Some(actor.subject().to_owned()),
                            audience: None,
                        })
                        .await
                }
                Err(error) => Err(error),
            },
        }
        .map_err(bridge_error)?;

        debug!(
            subject = %actor.subject(),
            mode = self.oidc_mode.as_str(),
            "obtained web identity token"
        );

        Ok(BridgeToken {
            credential: BridgeCredential::WebIdentity {
                token: token_set.access_token,
            },
            idp_identifier: idp_identifier.to_owned(),
        })
    }

    /// Logs in through the SAML endpoint and selects the role to assume.
    pub async fn bridge_via_saml(
        &self,
        login_details: &SamlLoginDetails,
        account_config: &SamlAccountConfig,
    ) -> AppResult<SamlBridge> {
        login_details.validate()?;

        let assertion = self
            .identity_provider
            .saml_login(login_details)
            .await
            .map_err(bridge_error)?;

        let roles = self.saml_decoder.extract_roles(assertion.as_str())?;
        let selected_role = select_saml_role(
            roles.as_slice(),
            account_config.role_arn.as_deref(),
            account_config.ambiguous_role_policy,
        )?;

        debug!(
            role_arn = %selected_role.role_arn,
            offered_roles = roles.len(),
            "selected SAML role"
        );

        Ok(SamlBridge {
            assertion,
            selected_role,
            duration_seconds: account_config.session_duration_seconds,
        })
    }
}

fn bridge_error(error: AppError) -> AppError {
    match error {
        AppError::Unauthorized(message)
        | AppError::Forbidden(message)
        | AppError::Validation(message) => FederationError::IdentityRejected(message).into(),
        AppError::Internal(message) => FederationError::IdentityExchangeFailed(message).into(),
        other => other,
    }
}
