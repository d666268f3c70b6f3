use chrono::SecondsFormat;
use iamgate_domain::TempCredential;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Web identity credential request.
#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/csp-credential-request.ts"
)]
pub struct CspCredentialRequestBody {
    pub workspace_id: String,
    pub csp_type: String,
    pub region: String,
}

/// SAML credential request.
#[derive(Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/saml-credential-request.ts"
)]
pub struct SamlCredentialRequestBody {
    pub csp_type: String,
    pub region: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role_arn: Option<String>,
}

impl std::fmt::Debug for SamlCredentialRequestBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SamlCredentialRequestBody")
            .field("csp_type", &self.csp_type)
            .field("region", &self.region)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role_arn", &self.role_arn)
            .finish()
    }
}

/// Issued temporary credential.
#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/csp-credential-response.ts"
)]
pub struct CspCredentialResponse {
    pub csp_type: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: String,
    pub region: String,
}

impl std::fmt::Debug for CspCredentialResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CspCredentialResponse")
            .field("csp_type", &self.csp_type)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .field("region", &self.region)
            .finish()
    }
}

impl From<TempCredential> for CspCredentialResponse {
    fn from(credential: TempCredential) -> Self {
        Self {
            csp_type: credential.key.provider.as_str().to_owned(),
            access_key_id: credential.access_key_id,
            secret_access_key: credential.secret_access_key,
            session_token: credential.session_token,
            expiration: credential
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            region: credential.key.region,
        }
    }
}

/// Stored credential metadata without secret material.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/credential-summary-response.ts"
)]
pub struct CredentialSummaryResponse {
    pub id: String,
    pub csp_type: String,
    pub auth_type: String,
    pub region: String,
    pub role_id: Option<String>,
    pub role_arn: Option<String>,
    pub issued_by: String,
    pub access_key_id: String,
    pub issued_at: String,
    pub expiration: String,
    pub is_active: bool,
}

impl From<TempCredential> for CredentialSummaryResponse {
    fn from(credential: TempCredential) -> Self {
        Self {
            id: credential.id.to_string(),
            csp_type: credential.key.provider.as_str().to_owned(),
            auth_type: credential.key.auth_type.as_str().to_owned(),
            region: credential.key.region,
            role_id: credential.key.role_id.map(|role_id| role_id.to_string()),
            role_arn: credential.key.role_arn,
            issued_by: credential.key.issued_by,
            access_key_id: credential.access_key_id,
            issued_at: credential
                .issued_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            expiration: credential
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            is_active: credential.is_active,
        }
    }
}

/// Filters accepted by the credential listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCredentialsQuery {
    pub provider: Option<String>,
    pub auth_type: Option<String>,
    pub role_id: Option<String>,
    pub active_only: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
