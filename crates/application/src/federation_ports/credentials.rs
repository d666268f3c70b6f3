use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iamgate_core::AppResult;
use iamgate_domain::{
    AuthType, CredentialId, CredentialKey, CspType, IssuedCredential, RoleId, TempCredential,
};

/// Persistence port for temporary credentials.
#[async_trait]
pub trait TempCredentialRepository: Send + Sync {
    /// Returns the active row for the key with the latest expiry after
    /// `valid_after`.
    async fn find_valid(
        &self,
        key: &CredentialKey,
        valid_after: DateTime<Utc>,
    ) -> AppResult<Option<TempCredential>>;

    /// Deactivates active rows sharing provider, auth type, region and role,
    /// then inserts the credential, atomically.
    async fn replace_active(&self, credential: &TempCredential) -> AppResult<()>;

    /// Deletes rows whose expiry is at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Finds one credential.
    async fn find_by_id(&self, credential_id: CredentialId) -> AppResult<Option<TempCredential>>;

    /// Lists credentials, newest first.
    async fn list(&self, query: &TempCredentialQuery) -> AppResult<Vec<TempCredential>>;

    /// Marks one credential inactive. Fails with `NotFound` when unknown.
    async fn deactivate(&self, credential_id: CredentialId) -> AppResult<()>;
}

/// Filters for credential listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempCredentialQuery {
    /// Provider filter.
    pub provider: Option<CspType>,
    /// Auth type filter.
    pub auth_type: Option<AuthType>,
    /// Role filter.
    pub role_id: Option<RoleId>,
    /// Issuer filter.
    pub issued_by: Option<String>,
    /// Only rows with `is_active = true`.
    pub active_only: bool,
    /// Page size.
    pub limit: usize,
    /// Page offset.
    pub offset: usize,
}

impl Default for TempCredentialQuery {
    fn default() -> Self {
        Self {
            provider: None,
            auth_type: None,
            role_id: None,
            issued_by: None,
            active_only: false,
            limit: 50,
            offset: 0,
        }
    }
}

/// Mints a new credential on a cache miss.
#[async_trait]
pub trait CredentialMinter: Send + Sync {
    /// Performs the federation round-trip for the key.
    async fn mint(&self, key: &CredentialKey) -> AppResult<IssuedCredential>;
}

/// Lease held while minting for one key across processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintLease {
    /// Lease name, derived from the cache key.
    pub name: String,
    /// Ownership token for compare-and-delete release.
    pub token: String,
}

/// Distributed coordination port for credential minting.
#[async_trait]
pub trait MintLeaseCoordinator: Send + Sync {
    /// Attempts to acquire the lease. Returns `None` while another holder
    /// owns it.
    async fn try_acquire(
        &self,
        name: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<MintLease>>;

    /// Releases a lease if still owned.
    async fn release(&self, lease: &MintLease) -> AppResult<()>;
}

/// Symmetric encryption of secret columns at rest.
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts plaintext bytes.
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>>;

    /// Decrypts bytes produced by [`SecretEncryptor::encrypt`].
    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>>;
}
