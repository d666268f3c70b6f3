//! iamgate background worker: purges expired temporary credentials.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use iamgate_application::{SecretEncryptor, TemporaryCredentialCache};
use iamgate_core::{AppError, AppResult};
use iamgate_infrastructure::{AesSecretEncryptor, PostgresTempCredentialRepository};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_PURGE_INTERVAL_SECONDS: u64 = 300;

#[derive(Clone)]
struct WorkerConfig {
    database_url: String,
    credential_encryption_key: String,
    purge_interval: Duration,
    worker_id: String,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WorkerConfig")
            .field("purge_interval", &self.purge_interval)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let cache = build_credential_cache(pool, &config)?;

    info!(
        worker_id = %config.worker_id,
        purge_interval_seconds = config.purge_interval.as_secs(),
        "iamgate-worker started"
    );

    let mut ticker = tokio::time::interval(config.purge_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                purge_once(&cache, config.worker_id.as_str()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(worker_id = %config.worker_id, "iamgate-worker shutting down");
                return Ok(());
            }
        }
    }
}

/// Runs one purge pass. Failures are logged and retried on the next tick.
async fn purge_once(cache: &TemporaryCredentialCache, worker_id: &str) -> Option<u64> {
    match cache.purge_expired().await {
        Ok(purged) => {
            if purged == 0 {
                debug!(worker_id = %worker_id, "no expired credentials to purge");
            }
            Some(purged)
        }
        Err(error) => {
            warn!(
                worker_id = %worker_id,
                error = %error,
                "failed to purge expired credentials"
            );
            None
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_credential_cache(
    pool: PgPool,
    config: &WorkerConfig,
) -> AppResult<TemporaryCredentialCache> {
    let encryptor: Arc<dyn SecretEncryptor> = Arc::new(AesSecretEncryptor::from_hex(
        config.credential_encryption_key.as_str(),
    )?);
    let repository = Arc::new(PostgresTempCredentialRepository::new(pool, encryptor));

    // Purging compares against the raw expiry; the margin only affects reads.
    Ok(TemporaryCredentialCache::new(repository, 0))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let required = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| AppError::Validation(format!("{name} is required")))
        };

        let database_url = required("DATABASE_URL")?;
        let credential_encryption_key = required("CREDENTIAL_ENCRYPTION_KEY")?;
        let purge_interval_seconds = match lookup("PURGE_INTERVAL_SECONDS") {
            Some(value) => value.trim().parse::<u64>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid PURGE_INTERVAL_SECONDS value '{value}': {error}"
                ))
            })?,
            None => DEFAULT_PURGE_INTERVAL_SECONDS,
        };

        if purge_interval_seconds == 0 {
            return Err(AppError::Validation(
                "PURGE_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let worker_id = lookup("WORKER_ID")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));

        Ok(Self {
            database_url,
            credential_encryption_key,
            purge_interval: Duration::from_secs(purge_interval_seconds),
            worker_id,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
