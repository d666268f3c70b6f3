//! PostgreSQL-backed temporary credential store with encrypted secrets.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use iamgate_application::{SecretEncryptor, TempCredentialQuery, TempCredentialRepository};
use iamgate_core::{AppError, AppResult};
use iamgate_domain::{AuthType, CredentialId, CredentialKey, CspType, RoleId, TempCredential};

const SELECT_COLUMNS: &str = r#"
    SELECT id, provider, auth_type, region, role_id, role_arn, issued_by, access_key_id,
           secret_access_key, session_token, issued_at, expires_at, is_active
    FROM temp_credentials
"#;

/// PostgreSQL implementation of the temporary credential repository port.
#[derive(Clone)]
pub struct PostgresTempCredentialRepository {
    pool: PgPool,
    encryptor: Arc<dyn SecretEncryptor>,
}

impl PostgresTempCredentialRepository {
    /// Creates a repository; secret columns are sealed with `encryptor`.
    #[must_use]
    pub fn new(pool: PgPool, encryptor: Arc<dyn SecretEncryptor>) -> Self {
        Self { pool, encryptor }
    }

    fn seal(&self, value: &str) -> AppResult<Vec<u8>> {
        self.encryptor.encrypt(value.as_bytes())
    }

    fn open(&self, value: &[u8]) -> AppResult<String> {
        let plaintext = self.encryptor.decrypt(value)?;
        String::from_utf8(plaintext).map_err(|error| {
            AppError::Internal(format!("stored credential secret is not utf-8: {error}"))
        })
    }

    fn into_domain(&self, row: TempCredentialRow) -> AppResult<TempCredential> {
        let mut key = CredentialKey::new(
            row.provider.parse::<CspType>()?,
            row.auth_type.parse::<AuthType>()?,
            row.region,
            row.role_id.map(RoleId::from_uuid),
            row.issued_by,
        )?;
        if let Some(role_arn) = row.role_arn {
            key = key.with_role_arn(role_arn);
        }

        Ok(TempCredential {
            id: CredentialId::from_uuid(row.id),
            key,
            access_key_id: row.access_key_id,
            secret_access_key: self.open(row.secret_access_key.as_slice())?,
            session_token: self.open(row.session_token.as_slice())?,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct TempCredentialRow {
    id: Uuid,
    provider: String,
    auth_type: String,
    region: String,
    role_id: Option<Uuid>,
    role_arn: Option<String>,
    issued_by: String,
    access_key_id: String,
    secret_access_key: Vec<u8>,
    session_token: Vec<u8>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
}

#[async_trait]
impl TempCredentialRepository for PostgresTempCredentialRepository {
    async fn find_valid(
        &self,
        key: &CredentialKey,
        valid_after: DateTime<Utc>,
    ) -> AppResult<Option<TempCredential>> {
        let row = sqlx::query_as::<_, TempCredentialRow>(
            format!(
                r#"{SELECT_COLUMNS}
                WHERE provider = $1
                  AND auth_type = $2
                  AND region = $3
                  AND role_id IS NOT DISTINCT FROM $4
                  AND role_arn IS NOT DISTINCT FROM $5
                  AND issued_by = $6
                  AND is_active
                  AND expires_at > $7
                ORDER BY expires_at DESC
                LIMIT 1
                "#
            )
            .as_str(),
        )
        .bind(key.provider.as_str())
        .bind(key.auth_type.as_str())
        .bind(key.region.as_str())
        .bind(key.role_id.map(|role_id| role_id.as_uuid()))
        .bind(key.role_arn.as_deref())
        .bind(key.issued_by.as_str())
        .bind(valid_after)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find valid credential for '{}': {error}",
                key.lock_name()
            ))
        })?;

        row.map(|row| self.into_domain(row)).transpose()
    }

    async fn replace_active(&self, credential: &TempCredential) -> AppResult<()> {
        let secret_access_key = self.seal(credential.secret_access_key.as_str())?;
        let session_token = self.seal(credential.session_token.as_str())?;
        let key = &credential.key;

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start credential replace transaction for '{}': {error}",
                key.lock_name()
            ))
        })?;

        sqlx::query(
            r#"
            UPDATE temp_credentials
            SET is_active = FALSE, updated_at = now()
            WHERE provider = $1
              AND auth_type = $2
              AND region = $3
              AND role_id IS NOT DISTINCT FROM $4
              AND role_arn IS NOT DISTINCT FROM $5
              AND is_active
            "#,
        )
        .bind(key.provider.as_str())
        .bind(key.auth_type.as_str())
        .bind(key.region.as_str())
        .bind(key.role_id.map(|role_id| role_id.as_uuid()))
        .bind(key.role_arn.as_deref())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to deactivate superseded credentials for '{}': {error}",
                key.lock_name()
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO temp_credentials (
                id,
                provider,
                auth_type,
                region,
                role_id,
                role_arn,
                issued_by,
                access_key_id,
                secret_access_key,
                session_token,
                issued_at,
                expires_at,
                is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(credential.id.as_uuid())
        .bind(key.provider.as_str())
        .bind(key.auth_type.as_str())
        .bind(key.region.as_str())
        .bind(key.role_id.map(|role_id| role_id.as_uuid()))
        .bind(key.role_arn.as_deref())
        .bind(key.issued_by.as_str())
        .bind(credential.access_key_id.as_str())
        .bind(secret_access_key)
        .bind(session_token)
        .bind(credential.issued_at)
        .bind(credential.expires_at)
        .bind(credential.is_active)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to insert credential '{}': {error}",
                credential.id
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit credential '{}': {error}",
                credential.id
            ))
        })
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM temp_credentials
            WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to purge expired credentials: {error}"))
        })?;

        Ok(result.rows_affected())
    }

    async fn find_by_id(&self, credential_id: CredentialId) -> AppResult<Option<TempCredential>> {
        let row = sqlx::query_as::<_, TempCredentialRow>(
            format!("{SELECT_COLUMNS} WHERE id = $1").as_str(),
        )
        .bind(credential_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find credential '{credential_id}': {error}"
            ))
        })?;

        row.map(|row| self.into_domain(row)).transpose()
    }

    async fn list(&self, query: &TempCredentialQuery) -> AppResult<Vec<TempCredential>> {
        let limit = i64::try_from(query.limit)
            .map_err(|_| AppError::Validation("limit is too large".to_owned()))?;
        let offset = i64::try_from(query.offset)
            .map_err(|_| AppError::Validation("offset is too large".to_owned()))?;

        let rows = sqlx::query_as::<_, TempCredentialRow>(
            format!(
                r#"{SELECT_COLUMNS}
                WHERE ($1::TEXT IS NULL OR provider = $1)
                  AND ($2::TEXT IS NULL OR auth_type = $2)
                  AND ($3::UUID IS NULL OR role_id = $3)
                  AND ($4::TEXT IS NULL OR issued_by = $4)
                  AND (NOT $5 OR is_active)
                ORDER BY issued_at DESC, id ASC
                LIMIT $6 OFFSET $7
                "#
            )
            .as_str(),
        )
        .bind(query.provider.map(|provider| provider.as_str()))
        .bind(query.auth_type.map(|auth_type| auth_type.as_str()))
        .bind(query.role_id.map(|role_id| role_id.as_uuid()))
        .bind(query.issued_by.as_deref())
        .bind(query.active_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list credentials: {error}")))?;

        rows.into_iter().map(|row| self.into_domain(row)).collect()
    }

    async fn deactivate(&self, credential_id: CredentialId) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE temp_credentials
            SET is_active = FALSE, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(credential_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to deactivate credential '{credential_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "credential '{credential_id}' not found"
            )));
        }

        Ok(())
    }
}
