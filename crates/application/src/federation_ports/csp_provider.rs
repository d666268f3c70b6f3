use async_trait::async_trait;
use iamgate_core::AppResult;
use iamgate_domain::{CspType, IssuedCredential, RoleSessionName};

/// Identity proof presented to a provider's STS.
#[derive(Clone, PartialEq, Eq)]
pub enum BridgeCredential {
    /// OIDC token for web-identity federation.
    WebIdentity {
        /// The web identity token.
        token: String,
    },
    /// Base64 SAML response for role-attribute federation.
    Saml {
        /// The encoded assertion.
        assertion: String,
    },
}

impl BridgeCredential {
    /// Returns a short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WebIdentity { .. } => "web_identity",
            Self::Saml { .. } => "saml",
        }
    }
}

impl std::fmt::Debug for BridgeCredential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "BridgeCredential::{}(<redacted>)", self.kind())
    }
}

/// Normalized assume-role call handed to a provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderAssumeRequest {
    /// Role to assume.
    pub role_arn: String,
    /// OIDC or SAML provider trusted by the role.
    pub trust_provider_arn: String,
    /// Identity proof.
    pub bridge: BridgeCredential,
    /// STS session name.
    pub session_name: RoleSessionName,
    /// Target region.
    pub region: String,
    /// Requested lifetime; provider default when `None`.
    pub duration_seconds: Option<u32>,
}

/// One cloud provider's STS capability.
///
/// Adapters map STS rejections (4xx) to `Forbidden` and transport or 5xx
/// failures to `Internal`, never including secret material in messages.
#[async_trait]
pub trait CspProvider: Send + Sync {
    /// Provider served by this adapter.
    fn csp_type(&self) -> CspType;

    /// Assumes the role with the bridge credential.
    async fn assume_role(&self, request: &ProviderAssumeRequest) -> AppResult<IssuedCredential>;
}
