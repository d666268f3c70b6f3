use std::sync::Arc;

use iamgate_application::{
    CspAssumeRoleClient, CspProvider, MintLeaseSettings, RoleMappingResolver, SecretEncryptor,
    TemporaryCredentialCache,
};
use iamgate_core::AppError;
use iamgate_infrastructure::{
    AesSecretEncryptor, AlibabaStsProvider, AwsStsProvider, PostgresRoleDirectory,
    PostgresTempCredentialRepository, RedisMintLeaseCoordinator,
};
use sqlx::PgPool;
use tracing::info;

use crate::api_config::{ApiConfig, MintLeaseBackend};

const MINT_LEASE_KEY_PREFIX: &str = "iamgate:credential-mint";

pub(super) struct CredentialServices {
    pub(super) resolver: RoleMappingResolver,
    pub(super) assume_role_client: CspAssumeRoleClient,
    pub(super) cache: TemporaryCredentialCache,
}

pub(super) async fn build_credential_services(
    pool: &PgPool,
    config: &ApiConfig,
    redis_client: Option<redis::Client>,
) -> Result<CredentialServices, AppError> {
    let encryptor: Arc<dyn SecretEncryptor> = Arc::new(AesSecretEncryptor::from_hex(
        config.credential_encryption_key.trim(),
    )?);
    let repository = Arc::new(PostgresTempCredentialRepository::new(
        pool.clone(),
        encryptor,
    ));

    let mut cache =
        TemporaryCredentialCache::new(repository, config.credential_safety_margin_seconds);
    if config.mint_lease_backend == MintLeaseBackend::Redis {
        let redis_client = redis_client.ok_or_else(|| {
            AppError::Validation(
                "REDIS_URL is required when CREDENTIAL_MINT_LEASE_BACKEND=redis".to_owned(),
            )
        })?;

        cache = cache.with_mint_lease(MintLeaseSettings {
            coordinator: Arc::new(RedisMintLeaseCoordinator::new(
                redis_client,
                MINT_LEASE_KEY_PREFIX,
            )),
            holder_id: config.mint_lease.holder_id.clone(),
            lease_seconds: config.mint_lease.lease_seconds,
            wait: config.mint_lease.wait,
            poll_interval: config.mint_lease.poll_interval,
        });
        info!(holder_id = %config.mint_lease.holder_id, "credential mint lease uses redis");
    }

    let providers: Vec<Arc<dyn CspProvider>> = vec![
        Arc::new(
            AwsStsProvider::connect(config.aws_sts_endpoint.as_deref(), config.idp.http_timeout)
                .await,
        ),
        Arc::new(AlibabaStsProvider::new(
            config.alibaba_sts_endpoint.as_str(),
            config.idp.http_timeout,
        )?),
    ];

    Ok(CredentialServices {
        resolver: RoleMappingResolver::new(Arc::new(PostgresRoleDirectory::new(pool.clone()))),
        assume_role_client: CspAssumeRoleClient::new(providers)
            .with_default_duration(config.sts_duration_seconds),
        cache,
    })
}
