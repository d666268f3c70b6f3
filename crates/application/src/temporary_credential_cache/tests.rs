use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use iamgate_core::{AppError, AppResult};
use iamgate_domain::{
    AuthType, CredentialKey, CspType, IssuedCredential, RoleId, RoleSessionName, TempCredential,
};

use super::{MintLeaseSettings, TemporaryCredentialCache};
use crate::test_support::{
    FakeCspProvider, FakeTempCredentialRepository, OIDC_PROVIDER_ARN, OPS_ROLE_ARN,
};
use crate::{
    BridgeCredential, CredentialMinter, CspProvider, MintLease, MintLeaseCoordinator,
    ProviderAssumeRequest, TempCredentialQuery, TempCredentialRepository,
};

struct ProviderMinter {
    provider: Arc<FakeCspProvider>,
}

#[async_trait]
impl CredentialMinter for ProviderMinter {
    async fn mint(&self, key: &CredentialKey) -> AppResult<IssuedCredential> {
        self.provider
            .assume_role(&ProviderAssumeRequest {
                role_arn: OPS_ROLE_ARN.to_owned(),
                trust_provider_arn: OIDC_PROVIDER_ARN.to_owned(),
                bridge: BridgeCredential::WebIdentity {
                    token: "web-identity".to_owned(),
                },
                session_name: RoleSessionName::derive(key.issued_by.as_str(), Utc::now()),
                region: key.region.clone(),
                duration_seconds: None,
            })
            .await
    }
}

#[derive(Default)]
struct FakeLeaseCoordinator {
    held_by_other: bool,
    acquired: AtomicUsize,
    released: Mutex<Vec<String>>,
}

#[async_trait]
impl MintLeaseCoordinator for FakeLeaseCoordinator {
    async fn try_acquire(
        &self,
        name: &str,
        _holder_id: &str,
        _lease_seconds: u32,
    ) -> AppResult<Option<MintLease>> {
        if self.held_by_other {
            return Ok(None);
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Some(MintLease {
            name: name.to_owned(),
            token: "lease-token".to_owned(),
        }))
    }

    async fn release(&self, lease: &MintLease) -> AppResult<()> {
        self.released.lock().await.push(lease.name.clone());
        Ok(())
    }
}

fn key(role_id: Option<RoleId>) -> CredentialKey {
    match CredentialKey::new(
        CspType::Aws,
        AuthType::OidcWebIdentity,
        "us-east-1",
        role_id,
        "alice",
    ) {
        Ok(key) => key,
        Err(error) => panic!("fixture key must be valid: {error}"),
    }
}

fn stored(key: &CredentialKey, expires_in: chrono::Duration) -> TempCredential {
    let now = Utc::now();
    TempCredential::from_issued(
        key.clone(),
        IssuedCredential {
            access_key_id: "ASIACACHED".to_owned(),
            secret_access_key: "cached-secret".to_owned(),
            session_token: "cached-session".to_owned(),
            expiration: now + expires_in,
            region: key.region.clone(),
        },
        now,
    )
}

fn fixture() -> (
    TemporaryCredentialCache,
    Arc<FakeTempCredentialRepository>,
    Arc<FakeCspProvider>,
) {
    let repository = Arc::new(FakeTempCredentialRepository::default());
    let provider = Arc::new(FakeCspProvider::new(CspType::Aws));
    let cache = TemporaryCredentialCache::new(repository.clone(), 60);
    (cache, repository, provider)
}

#[tokio::test]
async fn get_valid_returns_active_unexpired_credential() {
    let (cache, repository, _) = fixture();
    let key = key(None);
    let credential = stored(&key, chrono::Duration::minutes(30));
    assert!(repository.replace_active(&credential).await.is_ok());

    let result = cache.get_valid(&key).await;

    assert!(matches!(result, Ok(ref found) if found.id == credential.id));
}

#[tokio::test]
async fn get_valid_misses_inside_safety_margin() {
    let (cache, repository, _) = fixture();
    let key = key(None);
    assert!(
        repository
            .replace_active(&stored(&key, chrono::Duration::seconds(30)))
            .await
            .is_ok()
    );

    let result = cache.get_valid(&key).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn cache_hit_skips_the_provider() {
    let (cache, repository, provider) = fixture();
    let key = key(None);
    let credential = stored(&key, chrono::Duration::minutes(30));
    assert!(repository.replace_active(&credential).await.is_ok());

    let minter = ProviderMinter {
        provider: provider.clone(),
    };
    let result = cache.get_or_create(&key, &minter).await;

    assert!(matches!(result, Ok(ref found) if found.id == credential.id));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn expired_credential_is_replaced_by_exactly_one_active_row() {
    let (cache, repository, provider) = fixture();
    let key = key(Some(RoleId::new()));
    let expired = stored(&key, chrono::Duration::seconds(-5));
    assert!(repository.replace_active(&expired).await.is_ok());

    let minter = ProviderMinter {
        provider: provider.clone(),
    };
    let result = cache.get_or_create(&key, &minter).await;

    let Ok(minted) = result else {
        panic!("expired credential should be replaced");
    };
    assert_ne!(minted.id, expired.id);
    assert!(minted.is_active);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(repository.active_count(&key).await, 1);
}

#[tokio::test]
async fn concurrent_requests_for_one_key_mint_once() {
    let repository = Arc::new(FakeTempCredentialRepository::default());
    let mut provider = FakeCspProvider::new(CspType::Aws);
    provider.delay = Duration::from_millis(50);
    let provider = Arc::new(provider);
    let cache = TemporaryCredentialCache::new(repository.clone(), 60);
    let minter = ProviderMinter {
        provider: provider.clone(),
    };
    let key = key(None);

    let (first, second, third) = tokio::join!(
        cache.get_or_create(&key, &minter),
        cache.get_or_create(&key, &minter),
        cache.get_or_create(&key, &minter),
    );

    assert_eq!(provider.call_count(), 1);
    let ids: Vec<_> = [first, second, third]
        .into_iter()
        .filter_map(Result::ok)
        .map(|credential| credential.id)
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(repository.active_count(&key).await, 1);
}

#[tokio::test]
async fn minter_failure_persists_nothing() {
    let repository = Arc::new(FakeTempCredentialRepository::default());
    let mut provider = FakeCspProvider::new(CspType::Aws);
    provider.rejection = Some("AccessDenied".to_owned());
    let cache = TemporaryCredentialCache::new(repository.clone(), 60);
    let minter = ProviderMinter {
        provider: Arc::new(provider),
    };

    let result = cache.get_or_create(&key(None), &minter).await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(repository.rows.lock().await.is_empty());
}

#[tokio::test]
async fn purge_expired_is_idempotent() {
    let (cache, repository, _) = fixture();
    let key = key(None);
    assert!(
        repository
            .replace_active(&stored(&key, chrono::Duration::seconds(-10)))
            .await
            .is_ok()
    );
    let live = stored(&key, chrono::Duration::minutes(10));
    assert!(repository.replace_active(&live).await.is_ok());

    assert_eq!(cache.purge_expired().await.unwrap_or_default(), 1);
    assert_eq!(cache.purge_expired().await.unwrap_or(u64::MAX), 0);
    assert!(cache.find_by_id(live.id).await.is_ok());
}

#[tokio::test]
async fn lease_is_acquired_and_released_around_mint() {
    let (cache, _, provider) = fixture();
    let coordinator = Arc::new(FakeLeaseCoordinator::default());
    let cache = cache.with_mint_lease(MintLeaseSettings {
        coordinator: coordinator.clone(),
        holder_id: "api-1".to_owned(),
        lease_seconds: 30,
        wait: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    });
    let key = key(None);

    let result = cache
        .get_or_create(
            &key,
            &ProviderMinter {
                provider: provider.clone(),
            },
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(coordinator.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(
        coordinator.released.lock().await.as_slice(),
        [format!("credential-mint:{}", key.lock_name())]
    );
}

#[tokio::test]
async fn waits_for_credential_minted_by_lease_holder() {
    let (cache, repository, provider) = fixture();
    let cache = cache.with_mint_lease(MintLeaseSettings {
        coordinator: Arc::new(FakeLeaseCoordinator {
            held_by_other: true,
            ..FakeLeaseCoordinator::default()
        }),
        holder_id: "api-2".to_owned(),
        lease_seconds: 30,
        wait: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
    });
    let key = key(None);
    let minted_elsewhere = stored(&key, chrono::Duration::minutes(30));

    let writer = {
        let repository = repository.clone();
        let credential = minted_elsewhere.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            repository.replace_active(&credential).await
        })
    };

    let result = cache
        .get_or_create(
            &key,
            &ProviderMinter {
                provider: provider.clone(),
            },
        )
        .await;

    assert!(matches!(writer.await, Ok(Ok(()))));
    assert!(matches!(result, Ok(ref found) if found.id == minted_elsewhere.id));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn lease_wait_is_bounded() {
    let (cache, _, provider) = fixture();
    let cache = cache.with_mint_lease(MintLeaseSettings {
        coordinator: Arc::new(FakeLeaseCoordinator {
            held_by_other: true,
            ..FakeLeaseCoordinator::default()
        }),
        holder_id: "api-3".to_owned(),
        lease_seconds: 30,
        wait: Duration::from_millis(30),
        poll_interval: Duration::from_millis(10),
    });

    let result = cache
        .get_or_create(
            &key(None),
            &ProviderMinter {
                provider: provider.clone(),
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn list_rejects_zero_limit_and_deactivate_flags_row() {
    let (cache, repository, _) = fixture();
    let key = key(None);
    let credential = stored(&key, chrono::Duration::minutes(30));
    assert!(repository.replace_active(&credential).await.is_ok());

    let invalid = cache
        .list(&TempCredentialQuery {
            limit: 0,
            ..TempCredentialQuery::default()
        })
        .await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));

    assert!(cache.deactivate(credential.id).await.is_ok());
    let active = cache
        .list(&TempCredentialQuery {
            active_only: true,
            ..TempCredentialQuery::default()
        })
        .await;
    assert!(matches!(active, Ok(ref rows) if rows.is_empty()));
    assert!(matches!(cache.get_valid(&key).await, Err(AppError::NotFound(_))));
}
