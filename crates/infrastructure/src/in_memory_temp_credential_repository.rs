use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iamgate_application::{TempCredentialQuery, TempCredentialRepository};
use iamgate_core::{AppError, AppResult};
use iamgate_domain::{CredentialId, CredentialKey, TempCredential};
use tokio::sync::RwLock;

/// In-memory temporary credential store.
///
/// Backs handler and worker tests; state is lost on restart, so the servers
/// always wire [`crate::PostgresTempCredentialRepository`].
#[derive(Debug, Default)]
pub struct InMemoryTempCredentialRepository {
    credentials: RwLock<Vec<TempCredential>>,
}

impl InMemoryTempCredentialRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TempCredentialRepository for InMemoryTempCredentialRepository {
    async fn find_valid(
        &self,
        key: &CredentialKey,
        valid_after: DateTime<Utc>,
    ) -> AppResult<Option<TempCredential>> {
        Ok(self
            .credentials
            .read()
            .await
            .iter()
            .filter(|credential| {
                credential.is_active && credential.key == *key && credential.expires_at > valid_after
            })
            .max_by_key(|credential| credential.expires_at)
            .cloned())
    }

    async fn replace_active(&self, credential: &TempCredential) -> AppResult<()> {
        let mut credentials = self.credentials.write().await;
        if credentials.iter().any(|existing| existing.id == credential.id) {
            return Err(AppError::Conflict(format!(
                "credential '{}' already exists",
                credential.id
            )));
        }

        for existing in credentials
            .iter_mut()
            .filter(|existing| existing.is_active && existing.key.same_slot(&credential.key))
        {
            existing.is_active = false;
        }

        credentials.push(credential.clone());
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut credentials = self.credentials.write().await;
        let before = credentials.len();
        credentials.retain(|credential| !credential.is_expired(now));
        Ok(u64::try_from(before - credentials.len()).unwrap_or(u64::MAX))
    }

    async fn find_by_id(&self, credential_id: CredentialId) -> AppResult<Option<TempCredential>> {
        Ok(self
            .credentials
            .read()
            .await
            .iter()
            .find(|credential| credential.id == credential_id)
            .cloned())
    }

    async fn list(&self, query: &TempCredentialQuery) -> AppResult<Vec<TempCredential>> {
        let credentials = self.credentials.read().await;
        let mut matching: Vec<TempCredential> = credentials
            .iter()
            .filter(|credential| {
                query
                    .provider
                    .is_none_or(|provider| credential.key.provider == provider)
                    && query
                        .auth_type
                        .is_none_or(|auth_type| credential.key.auth_type == auth_type)
                    && query
                        .role_id
                        .is_none_or(|role_id| credential.key.role_id == Some(role_id))
                    && query
                        .issued_by
                        .as_deref()
                        .is_none_or(|issued_by| credential.key.issued_by == issued_by)
                    && (!query.active_only || credential.is_active)
            })
            .cloned()
            .collect();

        matching.sort_by(|left, right| right.issued_at.cmp(&left.issued_at));

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn deactivate(&self, credential_id: CredentialId) -> AppResult<()> {
        let mut credentials = self.credentials.write().await;
        let credential = credentials
            .iter_mut()
            .find(|credential| credential.id == credential_id)
            .ok_or_else(|| AppError::NotFound(format!("credential '{credential_id}' not found")))?;

        credential.is_active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use iamgate_application::{TempCredentialQuery, TempCredentialRepository};
    use iamgate_domain::{
        AuthType, CredentialKey, CspType, IssuedCredential, RoleId, TempCredential,
    };

    use super::InMemoryTempCredentialRepository;

    fn credential(issued_by: &str, role_id: RoleId) -> TempCredential {
        let key = match CredentialKey::new(
            CspType::Aws,
            AuthType::OidcWebIdentity,
            "us-east-1",
            Some(role_id),
            issued_by,
        ) {
            Ok(key) => key,
            Err(error) => panic!("fixture key must be valid: {error}"),
        };

        TempCredential::from_issued(
            key,
            IssuedCredential {
                access_key_id: "ASIAMEMORY".to_owned(),
                secret_access_key: "memory-secret".to_owned(),
                session_token: "memory-session".to_owned(),
                expiration: Utc::now() + Duration::minutes(20),
                region: "us-east-1".to_owned(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn supersession_ignores_issuer() {
        let repository = InMemoryTempCredentialRepository::new();
        let role_id = RoleId::new();
        let alice = credential("alice", role_id);
        let bob = credential("bob", role_id);

        assert!(repository.replace_active(&alice).await.is_ok());
        assert!(repository.replace_active(&bob).await.is_ok());

        let alice_active = repository.find_valid(&alice.key, Utc::now()).await;
        assert!(matches!(alice_active, Ok(None)));

        let listed = repository
            .list(&TempCredentialQuery {
                active_only: true,
                ..TempCredentialQuery::default()
            })
            .await;
        assert!(matches!(listed, Ok(ref rows) if rows.len() == 1 && rows[0].id == bob.id));
    }

    #[tokio::test]
    async fn list_filters_by_issuer() {
        let repository = InMemoryTempCredentialRepository::new();
        assert!(
            repository
                .replace_active(&credential("alice", RoleId::new()))
                .await
                .is_ok()
        );
        assert!(
            repository
                .replace_active(&credential("bob", RoleId::new()))
                .await
                .is_ok()
        );

        let listed = repository
            .list(&TempCredentialQuery {
                issued_by: Some("bob".to_owned()),
                ..TempCredentialQuery::default()
            })
            .await;

        assert!(matches!(listed, Ok(ref rows) if rows.len() == 1 && rows[0].key.issued_by == "bob"));
    }
}
