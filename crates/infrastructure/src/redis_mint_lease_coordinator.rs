//! Redis-backed lease serializing credential minting across processes.

use async_trait::async_trait;
use iamgate_application::{MintLease, MintLeaseCoordinator};
use iamgate_core::{AppError, AppResult};
use redis::Script;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of credential mint lease coordination.
#[derive(Clone)]
pub struct RedisMintLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisMintLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}:{name}", self.key_prefix)
    }
}

#[async_trait]
impl MintLeaseCoordinator for RedisMintLeaseCoordinator {
    async fn try_acquire(
        &self,
        name: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<MintLease>> {
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "mint lease name must not be empty".to_owned(),
            ));
        }

        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "mint lease holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "mint lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key_for(name))
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire credential mint lease: {error}"))
            })?;

        if reply.is_none() {
            return Ok(None);
        }

        Ok(Some(MintLease {
            name: name.to_owned(),
            token,
        }))
    }

    async fn release(&self, lease: &MintLease) -> AppResult<()> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        Script::new(RELEASE_LEASE_SCRIPT)
            .key(self.key_for(lease.name.as_str()))
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release credential mint lease: {error}"))
            })?;

        Ok(())
    }
}
