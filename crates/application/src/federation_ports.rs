mod credentials;
mod csp_provider;
mod directory;
mod identity_provider;
mod saml;
mod tokens;

pub use credentials::{
    CredentialMinter, MintLease, MintLeaseCoordinator, SecretEncryptor, TempCredentialQuery,
    TempCredentialRepository,
};
pub use csp_provider::{BridgeCredential, CspProvider, ProviderAssumeRequest};
pub use directory::{RoleDirectory, RoleMappingRepository};
pub use identity_provider::{
    GrantedPermission, IdentityProviderClient, RequestingPartyToken, SamlLoginDetails,
    TokenExchangeRequest, TokenSet,
};
pub use saml::SamlAssertionDecoder;
pub use tokens::AccessTokenVerifier;
