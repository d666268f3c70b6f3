//! Credential issuance orchestration.

use std::sync::Arc;

use async_trait::async_trait;
use iamgate_core::{AppError, AppResult, UserIdentity, WorkspaceId};
use iamgate_domain::{
    AmbiguousRolePolicy, AuthType, CredentialId, CredentialKey, CspRole, CspType,
    IssuedCredential, TempCredential,
};
use tracing::info;

use crate::{
    AssumeRoleRequest, CredentialMinter, CspAssumeRoleClient, IdentityBridge,
    RoleMappingResolver, SamlAccountConfig, SamlBridge, SamlLoginDetails, TempCredentialQuery,
    TemporaryCredentialCache,
};

/// Web identity credential request scoped to a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspCredentialRequest {
    /// Workspace whose role mappings apply.
    pub workspace_id: WorkspaceId,
    /// Target provider.
    pub csp_type: CspType,
    /// Target region.
    pub region: String,
}

/// SAML credential request.
#[derive(Clone, PartialEq, Eq)]
pub struct SamlCredentialRequest {
    /// Target provider.
    pub csp_type: CspType,
    /// Target region.
    pub region: String,
    /// IdP login name.
    pub username: String,
    /// IdP password.
    pub password: String,
    /// Role to pick from the assertion.
    pub role_arn: Option<String>,
}

impl std::fmt::Debug for SamlCredentialRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SamlCredentialRequest")
            .field("csp_type", &self.csp_type)
            .field("region", &self.region)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role_arn", &self.role_arn)
            .finish()
    }
}

/// SAML settings shared by every SAML issuance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamlIssuanceSettings {
    /// IdP-initiated login URL.
    pub login_url: String,
    /// Requested session duration.
    pub session_duration_seconds: Option<u32>,
    /// Behavior when several roles are offered and none is pinned.
    pub ambiguous_role_policy: AmbiguousRolePolicy,
}

/// Issues cloud credentials for authorized callers.
#[derive(Clone)]
pub struct CspCredentialService {
    resolver: RoleMappingResolver,
    bridge: IdentityBridge,
    assume_role_client: CspAssumeRoleClient,
    cache: TemporaryCredentialCache,
    saml_settings: SamlIssuanceSettings,
}

impl CspCredentialService {
    /// Creates the issuance service.
    #[must_use]
    pub fn new(
        resolver: RoleMappingResolver,
        bridge: IdentityBridge,
        assume_role_client: CspAssumeRoleClient,
        cache: TemporaryCredentialCache,
        saml_settings: SamlIssuanceSettings,
    ) -> Self {
        Self {
            resolver,
            bridge,
            assume_role_client,
            cache,
            saml_settings,
        }
    }

    /// Returns the credential cache.
    #[must_use]
    pub fn cache(&self) -> &TemporaryCredentialCache {
        &self.cache
    }

    /// Issues web identity credentials for the caller's mapped role.
    pub async fn issue_credentials(
        &self,
        actor: &UserIdentity,
        access_token: &str,
        request: CspCredentialRequest,
    ) -> AppResult<TempCredential> {
        let region = required_region(request.region.as_str())?;
        self.assume_role_client.ensure_supported(request.csp_type)?;

        let resolved = self
            .resolver
            .resolve(actor.subject(), request.workspace_id, request.csp_type)
            .await?;

        let key = CredentialKey::new(
            request.csp_type,
            AuthType::OidcWebIdentity,
            region,
            Some(resolved.role_id),
            actor.subject(),
        )?;

        let minter = WebIdentityMinter {
            bridge: &self.bridge,
            assume_role_client: &self.assume_role_client,
            actor,
            access_token,
            csp_role: &resolved.csp_role,
        };

        let credential = self.cache.get_or_create(&key, &minter).await?;
        info!(
            subject = %actor.subject(),
            workspace_id = %request.workspace_id,
            csp_type = %request.csp_type,
            credential_id = %credential.id,
            "issued web identity credential"
        );

        Ok(credential)
    }

    /// Issues credentials through a SAML login.
    ///
    /// The login and role selection run on every call; only the STS
    /// assumption for the selected role is served from the cache.
    pub async fn issue_saml_credentials(
        &self,
        actor: &UserIdentity,
        request: SamlCredentialRequest,
    ) -> AppResult<TempCredential> {
        let region = required_region(request.region.as_str())?;
        self.assume_role_client.ensure_supported(request.csp_type)?;

        let login_details = SamlLoginDetails {
            url: self.saml_settings.login_url.clone(),
            username: request.username,
            password: request.password,
        };
        let account_config = SamlAccountConfig {
            role_arn: request.role_arn,
            session_duration_seconds: self.saml_settings.session_duration_seconds,
            ambiguous_role_policy: self.saml_settings.ambiguous_role_policy,
        };
        let saml_bridge = self
            .bridge
            .bridge_via_saml(&login_details, &account_config)
            .await?;

        let key = CredentialKey::new(
            request.csp_type,
            AuthType::Saml,
            region,
            None,
            actor.subject(),
        )?
        .with_role_arn(saml_bridge.selected_role.role_arn.as_str());

        let minter = SamlMinter {
            assume_role_client: &self.assume_role_client,
            saml_bridge: &saml_bridge,
        };

        let credential = self.cache.get_or_create(&key, &minter).await?;
        info!(
            subject = %actor.subject(),
            csp_type = %request.csp_type,
            role_arn = %saml_bridge.selected_role.role_arn,
            credential_id = %credential.id,
            "issued SAML credential"
        );

        Ok(credential)
    }

    /// Lists stored credentials.
    pub async fn list_credentials(
        &self,
        query: &TempCredentialQuery,
    ) -> AppResult<Vec<TempCredential>> {
        self.cache.list(query).await
    }

    /// Deactivates one stored credential.
    pub async fn deactivate_credential(&self, credential_id: CredentialId) -> AppResult<()> {
        self.cache.deactivate(credential_id).await
    }
}

fn required_region(region: &str) -> AppResult<&str> {
    let region = region.trim();
    if region.is_empty() {
        return Err(AppError::Validation("region is required".to_owned()));
    }

    Ok(region)
}

struct WebIdentityMinter<'a> {
    bridge: &'a IdentityBridge,
    assume_role_client: &'a CspAssumeRoleClient,
    actor: &'a UserIdentity,
    access_token: &'a str,
    csp_role: &'a CspRole,
}

#[async_trait]
impl CredentialMinter for WebIdentityMinter<'_> {
    async fn mint(&self, key: &CredentialKey) -> AppResult<IssuedCredential> {
        let bridge_token = self
            .bridge
            .bridge_via_oidc(
                self.actor,
                self.access_token,
                self.csp_role.idp_identifier(),
            )
            .await?;

        self.assume_role_client
            .assume_role(AssumeRoleRequest {
                csp_type: key.provider,
                role_arn: self.csp_role.iam_identifier().to_owned(),
                trust_provider_arn: bridge_token.idp_identifier,
                bridge: bridge_token.credential,
                session_subject: key.issued_by.clone(),
                region: key.region.clone(),
                duration_seconds: None,
            })
            .await
    }
}

struct SamlMinter<'a> {
    assume_role_client: &'a CspAssumeRoleClient,
    saml_bridge: &'a SamlBridge,
}

#[async_trait]
impl CredentialMinter for SamlMinter<'_> {
    async fn mint(&self, key: &CredentialKey) -> AppResult<IssuedCredential> {
        let selected_role = &self.saml_bridge.selected_role;

        self.assume_role_client
            .assume_role(AssumeRoleRequest {
                csp_type: key.provider,
                role_arn: selected_role.role_arn.clone(),
                trust_provider_arn: selected_role.principal_arn.clone(),
                bridge: self.saml_bridge.credential(),
                session_subject: key.issued_by.clone(),
                region: key.region.clone(),
                duration_seconds: self.saml_bridge.duration_seconds,
            })
            .await
    }
}

#[cfg(test)]
mod tests;
