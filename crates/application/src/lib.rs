//! Application services and ports.

#![forbid(unsafe_code)]

mod csp_assume_role_client;
mod csp_credential_service;
mod federation_ports;
mod identity_bridge;
mod permission_ticket_gate;
mod role_mapping_resolver;
mod session_token_service;
mod temporary_credential_cache;

#[cfg(test)]
mod test_support;

pub use csp_assume_role_client::{AssumeRoleRequest, CspAssumeRoleClient};
pub use csp_credential_service::{
    CspCredentialRequest, CspCredentialService, SamlCredentialRequest, SamlIssuanceSettings,
};
pub use federation_ports::{
    AccessTokenVerifier, BridgeCredential, CredentialMinter, CspProvider, GrantedPermission,
    IdentityProviderClient, MintLease, MintLeaseCoordinator, ProviderAssumeRequest,
    RequestingPartyToken, RoleDirectory, RoleMappingRepository, SamlAssertionDecoder,
    SamlLoginDetails, SecretEncryptor, TempCredentialQuery, TempCredentialRepository,
    TokenExchangeRequest, TokenSet,
};
pub use identity_bridge::{
    BridgeToken, IdentityBridge, OidcBridgeMode, SamlAccountConfig, SamlBridge,
};
pub use permission_ticket_gate::{AuthorizationContext, PermissionTicketGate, resource_uri};
pub use role_mapping_resolver::{ResolvedCspRole, RoleMappingResolver};
pub use session_token_service::SessionTokenService;
pub use temporary_credential_cache::{
    DEFAULT_SAFETY_MARGIN_SECONDS, MintLeaseSettings, TemporaryCredentialCache,
};
