//! Temporary credential cache with single-flight minting.
//!
//! Reads of valid credentials never block. A miss serializes minting per
//! cache key inside the process and, when a lease coordinator is configured,
//! across processes as well.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use iamgate_core::{AppError, AppResult};
use iamgate_domain::{CredentialId, CredentialKey, TempCredential};
use tracing::{debug, info, warn};

use crate::{
    CredentialMinter, MintLease, MintLeaseCoordinator, TempCredentialQuery,
    TempCredentialRepository,
};

mod keyed_lock;

use keyed_lock::KeyedMintLocks;

/// Default margin before expiry at which a cached credential is refreshed.
pub const DEFAULT_SAFETY_MARGIN_SECONDS: u32 = 60;

/// Cross-process mint lease configuration.
#[derive(Clone)]
pub struct MintLeaseSettings {
    /// Lease backend.
    pub coordinator: Arc<dyn MintLeaseCoordinator>,
    /// Identifier of this process.
    pub holder_id: String,
    /// Lease time-to-live.
    pub lease_seconds: u32,
    /// Upper bound on waiting for another holder's mint.
    pub wait: Duration,
    /// Interval between cache re-checks while waiting.
    pub poll_interval: Duration,
}

enum LeaseOutcome {
    Acquired(MintLease),
    Found(TempCredential),
}

/// Cache of temporary credentials keyed by provider, auth type, region, role
/// and issuer.
#[derive(Clone)]
pub struct TemporaryCredentialCache {
    repository: Arc<dyn TempCredentialRepository>,
    mint_locks: KeyedMintLocks,
    lease: Option<MintLeaseSettings>,
    safety_margin: chrono::Duration,
}

impl TemporaryCredentialCache {
    /// Creates a cache with the given safety margin.
    #[must_use]
    pub fn new(repository: Arc<dyn TempCredentialRepository>, safety_margin_seconds: u32) -> Self {
        Self {
            repository,
            mint_locks: KeyedMintLocks::default(),
            lease: None,
            safety_margin: chrono::Duration::seconds(i64::from(safety_margin_seconds)),
        }
    }

    /// Enables cross-process lease coordination around minting.
    #[must_use]
    pub fn with_mint_lease(mut self, settings: MintLeaseSettings) -> Self {
        self.lease = Some(settings);
        self
    }

    /// Returns the configured safety margin.
    #[must_use]
    pub fn safety_margin(&self) -> chrono::Duration {
        self.safety_margin
    }

    /// Returns whether a credential is usable right now.
    #[must_use]
    pub fn is_valid(&self, credential: &TempCredential) -> bool {
        credential.is_valid(Utc::now(), self.safety_margin)
    }

    /// Returns the newest valid credential for the key.
    pub async fn get_valid(&self, key: &CredentialKey) -> AppResult<TempCredential> {
        self.lookup_valid(key).await?.ok_or_else(|| {
            AppError::NotFound(format!("no valid credential for '{}'", key.lock_name()))
        })
    }

    /// Returns a valid cached credential or mints, stores and returns a new one.
    pub async fn get_or_create(
        &self,
        key: &CredentialKey,
        minter: &dyn CredentialMinter,
    ) -> AppResult<TempCredential> {
        if let Some(credential) = self.lookup_valid(key).await? {
            debug!(credential_id = %credential.id, "credential cache hit");
            return Ok(credential);
        }

        let _guard = self.mint_locks.lock(key.lock_name()).await;

        if let Some(credential) = self.lookup_valid(key).await? {
            debug!(credential_id = %credential.id, "credential minted by concurrent request");
            return Ok(credential);
        }

        let Some(settings) = self.lease.as_ref() else {
            return self.mint_and_store(key, minter).await;
        };

        let lease = match self.acquire_lease(settings, key).await? {
            LeaseOutcome::Acquired(lease) => lease,
            LeaseOutcome::Found(credential) => return Ok(credential),
        };

        let result = self.mint_and_store(key, minter).await;
        release_lease(settings, &lease).await;
        result
    }

    /// Deletes every credential whose expiry has passed.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let purged = self.repository.delete_expired(Utc::now()).await?;
        if purged > 0 {
            info!(purged, "purged expired temporary credentials");
        }

        Ok(purged)
    }

    /// Finds one credential by identifier.
    pub async fn find_by_id(&self, credential_id: CredentialId) -> AppResult<TempCredential> {
        self.repository
            .find_by_id(credential_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("credential '{credential_id}' not found")))
    }

    /// Lists credentials.
    pub async fn list(&self, query: &TempCredentialQuery) -> AppResult<Vec<TempCredential>> {
        if query.limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        self.repository.list(query).await
    }

    /// Marks one credential inactive.
    pub async fn deactivate(&self, credential_id: CredentialId) -> AppResult<()> {
        self.repository.deactivate(credential_id).await?;
        info!(credential_id = %credential_id, "deactivated temporary credential");
        Ok(())
    }

    async fn lookup_valid(&self, key: &CredentialKey) -> AppResult<Option<TempCredential>> {
        let now = Utc::now();
        let credential = self
            .repository
            .find_valid(key, now + self.safety_margin)
            .await?;

        Ok(credential.filter(|credential| credential.is_valid(now, self.safety_margin)))
    }

    async fn acquire_lease(
        &self,
        settings: &MintLeaseSettings,
        key: &CredentialKey,
    ) -> AppResult<LeaseOutcome> {
        let lease_name = format!("credential-mint:{}", key.lock_name());
        let started = tokio::time::Instant::now();

        loop {
            if let Some(lease) = settings
                .coordinator
                .try_acquire(
                    lease_name.as_str(),
                    settings.holder_id.as_str(),
                    settings.lease_seconds,
                )
                .await?
            {
                if let Some(credential) = self.lookup_valid(key).await? {
                    release_lease(settings, &lease).await;
                    return Ok(LeaseOutcome::Found(credential));
                }

                return Ok(LeaseOutcome::Acquired(lease));
            }

            if let Some(credential) = self.lookup_valid(key).await? {
                debug!(lease = %lease_name, "credential minted by lease holder");
                return Ok(LeaseOutcome::Found(credential));
            }

            if started.elapsed() >= settings.wait {
                return Err(AppError::Conflict(format!(
                    "credential mint for '{}' is still in progress",
                    key.lock_name()
                )));
            }

            tokio::time::sleep(settings.poll_interval).await;
        }
    }

    async fn mint_and_store(
        &self,
        key: &CredentialKey,
        minter: &dyn CredentialMinter,
    ) -> AppResult<TempCredential> {
        let issued = minter.mint(key).await?;
        issued.ensure_complete()?;

        let credential = TempCredential::from_issued(key.clone(), issued, Utc::now());
        self.repository.replace_active(&credential).await?;

        info!(
            credential_id = %credential.id,
            provider = %key.provider,
            auth_type = %key.auth_type,
            region = %key.region,
            expires_at = %credential.expires_at,
            "stored temporary credential"
        );

        Ok(credential)
    }
}

async fn release_lease(settings: &MintLeaseSettings, lease: &MintLease) {
    if let Err(error) = settings.coordinator.release(lease).await {
        warn!(lease = %lease.name, error = %error, "failed to release credential mint lease");
    }
}

#[cfg(test)]
mod tests;
