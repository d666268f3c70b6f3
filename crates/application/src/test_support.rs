use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use iamgate_core::{AppError, AppResult, WorkspaceId};
use iamgate_domain::{
    CredentialId, CredentialKey, CspRole, CspRoleId, CspType, IssuedCredential, RoleId, SamlRole,
    TempCredential,
};

use crate::{
    CspProvider, IdentityProviderClient, ProviderAssumeRequest, RequestingPartyToken,
    RoleDirectory, SamlAssertionDecoder, SamlLoginDetails, TempCredentialQuery,
    TempCredentialRepository, TokenExchangeRequest, TokenSet,
};

pub(crate) const OPS_ROLE_ARN: &str = "arn:aws:iam::111111111111:role/Ops";
pub(crate) const OIDC_PROVIDER_ARN: &str =
    "arn:aws:iam::111111111111:oidc-provider/idp.example.com";

pub(crate) fn ops_csp_role() -> CspRole {
    match CspRole::new(
        CspRoleId::new(),
        CspType::Aws,
        OPS_ROLE_ARN,
        OIDC_PROVIDER_ARN,
        Some("operators".to_owned()),
    ) {
        Ok(role) => role,
        Err(error) => panic!("fixture csp role must be valid: {error}"),
    }
}

pub(crate) fn token_set(access_token: &str) -> TokenSet {
    TokenSet {
        access_token: access_token.to_owned(),
        refresh_token: None,
        expires_in: Some(300),
        refresh_expires_in: None,
        token_type: Some("Bearer".to_owned()),
    }
}

#[derive(Default)]
pub(crate) struct FakeRoleDirectory {
    pub(crate) assignments: Vec<(String, WorkspaceId, RoleId)>,
    pub(crate) mappings: Vec<(RoleId, CspRole)>,
}

#[async_trait]
impl RoleDirectory for FakeRoleDirectory {
    async fn find_user_roles_in_workspace(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
    ) -> AppResult<Vec<RoleId>> {
        Ok(self
            .assignments
            .iter()
            .filter(|(assigned_subject, assigned_workspace, _)| {
                assigned_subject == subject && *assigned_workspace == workspace_id
            })
            .map(|(_, _, role_id)| *role_id)
            .collect())
    }

    async fn list_csp_roles_for_role(
        &self,
        role_id: RoleId,
        csp_type: CspType,
    ) -> AppResult<Vec<CspRole>> {
        Ok(self
            .mappings
            .iter()
            .filter(|(mapped_role, csp_role)| {
                *mapped_role == role_id && csp_role.csp_type() == csp_type
            })
            .map(|(_, csp_role)| csp_role.clone())
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeTempCredentialRepository {
    pub(crate) rows: Mutex<Vec<TempCredential>>,
}

impl FakeTempCredentialRepository {
    pub(crate) async fn active_count(&self, key: &CredentialKey) -> usize {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|row| row.is_active && supersedes(&row.key, key))
            .count()
    }
}

fn supersedes(existing: &CredentialKey, incoming: &CredentialKey) -> bool {
    existing.same_slot(incoming)
}

#[async_trait]
impl TempCredentialRepository for FakeTempCredentialRepository {
    async fn find_valid(
        &self,
        key: &CredentialKey,
        valid_after: DateTime<Utc>,
    ) -> AppResult<Option<TempCredential>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.is_active && row.key == *key && row.expires_at > valid_after)
            .max_by_key(|row| row.expires_at)
            .cloned())
    }

    async fn replace_active(&self, credential: &TempCredential) -> AppResult<()> {
        let mut rows = self.rows.lock().await;
        for row in rows.iter_mut() {
            if row.is_active && supersedes(&row.key, &credential.key) {
                row.is_active = false;
            }
        }
        rows.push(credential.clone());
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| !row.is_expired(now));
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }

    async fn find_by_id(&self, credential_id: CredentialId) -> AppResult<Option<TempCredential>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.id == credential_id)
            .cloned())
    }

    async fn list(&self, query: &TempCredentialQuery) -> AppResult<Vec<TempCredential>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| !query.active_only || row.is_active)
            .filter(|row| query.provider.is_none_or(|provider| row.key.provider == provider))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn deactivate(&self, credential_id: CredentialId) -> AppResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == credential_id)
            .ok_or_else(|| AppError::NotFound(format!("credential '{credential_id}'")))?;
        row.is_active = false;
        Ok(())
    }
}

pub(crate) struct FakeCspProvider {
    pub(crate) csp_type: CspType,
    pub(crate) calls: AtomicUsize,
    pub(crate) requests: Mutex<Vec<ProviderAssumeRequest>>,
    pub(crate) delay: Duration,
    pub(crate) rejection: Option<String>,
}

impl FakeCspProvider {
    pub(crate) fn new(csp_type: CspType) -> Self {
        Self {
            csp_type,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            rejection: None,
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CspProvider for FakeCspProvider {
    fn csp_type(&self) -> CspType {
        self.csp_type
    }

    async fn assume_role(&self, request: &ProviderAssumeRequest) -> AppResult<IssuedCredential> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().await.push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(rejection) = &self.rejection {
            return Err(AppError::Forbidden(rejection.clone()));
        }

        Ok(IssuedCredential {
            access_key_id: format!("ASIA{call:012}"),
            secret_access_key: format!("secret-{call}"),
            session_token: format!("session-{call}"),
            expiration: Utc::now() + chrono::Duration::hours(1),
            region: request.region.clone(),
        })
    }
}

pub(crate) struct FakeIdentityProvider {
    pub(crate) service_account_calls: AtomicUsize,
    pub(crate) exchanges: Mutex<Vec<TokenExchangeRequest>>,
    pub(crate) saml_response: String,
    pub(crate) saml_logins: AtomicUsize,
    pub(crate) ticket_outcome: Option<AppError>,
    pub(crate) ticket_requests: Mutex<Vec<String>>,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        Self {
            service_account_calls: AtomicUsize::new(0),
            exchanges: Mutex::new(Vec::new()),
            saml_response: "PHNhbWxwOlJlc3BvbnNlLz4=".to_owned(),
            saml_logins: AtomicUsize::new(0),
            ticket_outcome: None,
            ticket_requests: Mutex::new(Vec::new()),
        }
    }
}

fn clone_error(error: &AppError) -> AppError {
    match error {
        AppError::Validation(message) => AppError::Validation(message.clone()),
        AppError::NotFound(message) => AppError::NotFound(message.clone()),
        AppError::Conflict(message) => AppError::Conflict(message.clone()),
        AppError::Unauthorized(message) => AppError::Unauthorized(message.clone()),
        AppError::Forbidden(message) => AppError::Forbidden(message.clone()),
        AppError::Federation(error) => AppError::Federation(error.clone()),
        AppError::Internal(message) => AppError::Internal(message.clone()),
    }
}

#[async_trait]
impl IdentityProviderClient for FakeIdentityProvider {
    async fn password_login(&self, username: &str, password: &str) -> AppResult<TokenSet> {
        if username == "alice" && password == "correct-horse" {
            return Ok(TokenSet {
                refresh_token: Some("refresh-alice".to_owned()),
                ..token_set("access-alice")
            });
        }

        Err(AppError::Unauthorized("invalid_grant".to_owned()))
    }

    async fn admin_token(&self) -> AppResult<TokenSet> {
        Ok(token_set("admin-token"))
    }

    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenSet> {
        if refresh_token == "refresh-alice" {
            return Ok(token_set("access-alice-2"));
        }

        Err(AppError::Validation("invalid_grant".to_owned()))
    }

    async fn service_account_token(&self) -> AppResult<TokenSet> {
        self.service_account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(token_set("service-account-token"))
    }

    async fn exchange_token(&self, request: &TokenExchangeRequest) -> AppResult<TokenSet> {
        self.exchanges.lock().await.push(request.clone());
        if request.subject_token == "revoked" {
            return Err(AppError::Unauthorized("invalid_token".to_owned()));
        }

        Ok(token_set("exchanged-token"))
    }

    async fn saml_login(&self, details: &SamlLoginDetails) -> AppResult<String> {
        self.saml_logins.fetch_add(1, Ordering::SeqCst);
        if details.password != "correct-horse" {
            return Err(AppError::Unauthorized("invalid user credentials".to_owned()));
        }

        Ok(self.saml_response.clone())
    }

    async fn request_party_token(
        &self,
        _access_token: &str,
        resource_uri: &str,
    ) -> AppResult<RequestingPartyToken> {
        self.ticket_requests
            .lock()
            .await
            .push(resource_uri.to_owned());

        if let Some(error) = &self.ticket_outcome {
            return Err(clone_error(error));
        }

        Ok(RequestingPartyToken {
            access_token: "rpt-token".to_owned(),
            expires_in: Some(300),
            permissions: Vec::new(),
        })
    }
}

pub(crate) struct FakeSamlDecoder {
    pub(crate) roles: Vec<SamlRole>,
}

impl SamlAssertionDecoder for FakeSamlDecoder {
    fn extract_roles(&self, _encoded_response: &str) -> AppResult<Vec<SamlRole>> {
        Ok(self.roles.clone())
    }
}
