//! Temporary cloud credentials and their cache key.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use iamgate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CspType, RoleId};

/// Maximum role session name length accepted by STS.
pub const ROLE_SESSION_NAME_MAX_LENGTH: usize = 64;

const ROLE_SESSION_NAME_PREFIX: &str = "iamgate";

/// Federation path used to obtain a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    /// OIDC token presented as a web identity.
    #[serde(rename = "oidc-web-identity")]
    OidcWebIdentity,
    /// SAML assertion with role attributes.
    #[serde(rename = "saml")]
    Saml,
}

impl AuthType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OidcWebIdentity => "oidc-web-identity",
            Self::Saml => "saml",
        }
    }
}

impl Display for AuthType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "oidc-web-identity" => Ok(Self::OidcWebIdentity),
            "saml" => Ok(Self::Saml),
            _ => Err(AppError::Validation(format!(
                "unknown auth type value '{value}'"
            ))),
        }
    }
}

/// Unique identifier for a stored temporary credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(Uuid);

impl CredentialId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CredentialId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CredentialId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for CredentialId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self).map_err(|error| {
            AppError::Validation(format!("invalid credential id '{value}': {error}"))
        })
    }
}

/// Lookup key of the credential cache.
///
/// Supersession ignores `issued_by`: a new row deactivates every active row
/// sharing provider, auth type, region, role and cloud role ARN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    /// Cloud provider.
    pub provider: CspType,
    /// Federation path.
    pub auth_type: AuthType,
    /// Provider region.
    pub region: String,
    /// Mapped role, `None` for provider-wide credentials.
    pub role_id: Option<RoleId>,
    /// Subject that requested the credential.
    pub issued_by: String,
    /// Cloud role assumed, set for SAML credentials whose role comes from the
    /// assertion rather than a mapping.
    pub role_arn: Option<String>,
}

impl CredentialKey {
    /// Creates a validated key.
    pub fn new(
        provider: CspType,
        auth_type: AuthType,
        region: impl Into<String>,
        role_id: Option<RoleId>,
        issued_by: impl Into<String>,
    ) -> AppResult<Self> {
        let region = region.into().trim().to_owned();
        if region.is_empty() {
            return Err(AppError::Validation("region must not be empty".to_owned()));
        }

        let issued_by = issued_by.into();
        if issued_by.trim().is_empty() {
            return Err(AppError::Validation(
                "credential issuer must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            provider,
            auth_type,
            region,
            role_id,
            issued_by,
            role_arn: None,
        })
    }

    /// Scopes the key to one cloud role ARN.
    #[must_use]
    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        let role_arn = role_arn.into();
        self.role_arn = (!role_arn.trim().is_empty()).then_some(role_arn);
        self
    }

    /// Returns whether both keys compete for the same active row.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.auth_type == other.auth_type
            && self.region == other.region
            && self.role_id == other.role_id
            && self.role_arn == other.role_arn
    }

    /// Returns a stable string form used for lock and lease names.
    #[must_use]
    pub fn lock_name(&self) -> String {
        let role = self
            .role_id
            .map(|role_id| role_id.to_string())
            .unwrap_or_else(|| "*".to_owned());

        let mut name = format!(
            "{}:{}:{}:{}:{}",
            self.provider.as_str(),
            self.auth_type.as_str(),
            self.region,
            role,
            self.issued_by
        );
        if let Some(role_arn) = &self.role_arn {
            name.push(':');
            name.push_str(role_arn);
        }

        name
    }
}

/// Credential returned by a provider's STS call, before persistence.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Expiration instant reported by the provider.
    pub expiration: DateTime<Utc>,
    /// Region the credential was issued for.
    pub region: String,
}

impl IssuedCredential {
    /// Ensures the provider returned every credential field.
    pub fn ensure_complete(&self) -> AppResult<()> {
        if self.access_key_id.is_empty()
            || self.secret_access_key.is_empty()
            || self.session_token.is_empty()
        {
            return Err(AppError::Internal(
                "provider returned an incomplete credential".to_owned(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IssuedCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .field("region", &self.region)
            .finish()
    }
}

/// Persisted temporary credential.
#[derive(Clone, PartialEq, Eq)]
pub struct TempCredential {
    /// Record identifier.
    pub id: CredentialId,
    /// Cache key the credential was issued for.
    pub key: CredentialKey,
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Issue instant.
    pub issued_at: DateTime<Utc>,
    /// Expiration instant.
    pub expires_at: DateTime<Utc>,
    /// Whether this row is the active one for its key.
    pub is_active: bool,
}

impl TempCredential {
    /// Builds an active credential row from a freshly issued credential.
    #[must_use]
    pub fn from_issued(key: CredentialKey, issued: IssuedCredential, now: DateTime<Utc>) -> Self {
        Self {
            id: CredentialId::new(),
            key,
            access_key_id: issued.access_key_id,
            secret_access_key: issued.secret_access_key,
            session_token: issued.session_token,
            issued_at: now,
            expires_at: issued.expiration,
            is_active: true,
        }
    }

    /// Returns whether the credential is active and still valid after the
    /// safety margin.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        self.is_active && self.expires_at > now + safety_margin
    }

    /// Returns whether the row may be purged.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for TempCredential {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TempCredential")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// STS role session name derived from a subject and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleSessionName(String);

impl RoleSessionName {
    /// Derives `iamgate-<subject>-<unix seconds>`, replacing characters STS
    /// rejects and truncating to 64 characters.
    #[must_use]
    pub fn derive(subject: &str, issued_at: DateTime<Utc>) -> Self {
        let raw = format!(
            "{ROLE_SESSION_NAME_PREFIX}-{subject}-{}",
            issued_at.timestamp()
        );
        let sanitized: String = raw
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() || "_=,.@-".contains(character) {
                    character
                } else {
                    '-'
                }
            })
            .take(ROLE_SESSION_NAME_MAX_LENGTH)
            .collect();

        Self(sanitized)
    }

    /// Returns the session name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RoleSessionName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}
