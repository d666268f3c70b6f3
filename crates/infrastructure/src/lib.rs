//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aes_secret_encryptor;
mod alibaba_sts_provider;
mod aws_sts_provider;
mod in_memory_role_directory;
mod in_memory_temp_credential_repository;
mod jwks_access_token_verifier;
mod keycloak_identity_provider;
mod postgres_role_directory;
mod postgres_temp_credential_repository;
mod redis_mint_lease_coordinator;
mod roxml_saml_assertion_decoder;

pub use aes_secret_encryptor::AesSecretEncryptor;
pub use alibaba_sts_provider::{AlibabaStsProvider, DEFAULT_ALIBABA_STS_ENDPOINT};
pub use aws_sts_provider::AwsStsProvider;
// Test doubles for the repository ports, shared with the app crates' tests.
pub use in_memory_role_directory::InMemoryRoleDirectory;
pub use in_memory_temp_credential_repository::InMemoryTempCredentialRepository;
pub use jwks_access_token_verifier::JwksAccessTokenVerifier;
pub use keycloak_identity_provider::{KeycloakIdentityProvider, KeycloakSettings};
pub use postgres_role_directory::PostgresRoleDirectory;
pub use postgres_temp_credential_repository::PostgresTempCredentialRepository;
pub use redis_mint_lease_coordinator::RedisMintLeaseCoordinator;
pub use roxml_saml_assertion_decoder::RoxmlSamlAssertionDecoder;
