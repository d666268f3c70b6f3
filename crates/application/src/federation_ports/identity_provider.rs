use async_trait::async_trait;
use iamgate_core::{AppError, AppResult};

/// Tokens returned by the identity provider token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when the grant issues one.
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: Option<u64>,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: Option<u64>,
    /// Token type, usually `Bearer`.
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// RFC 8693 token exchange parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenExchangeRequest {
    /// Token being exchanged.
    pub subject_token: String,
    /// Subject to impersonate, when the exchange is an impersonation.
    pub requested_subject: Option<String>,
    /// Audience of the issued token.
    pub audience: Option<String>,
}

impl std::fmt::Debug for TokenExchangeRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenExchangeRequest")
            .field("subject_token", &"<redacted>")
            .field("requested_subject", &self.requested_subject)
            .field("audience", &self.audience)
            .finish()
    }
}

/// Credentials posted to the SAML IdP-initiated login endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct SamlLoginDetails {
    /// IdP-initiated login URL.
    pub url: String,
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl SamlLoginDetails {
    /// Ensures every field is present.
    pub fn validate(&self) -> AppResult<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::Validation("saml login url is required".to_owned()));
        }

        if self.username.trim().is_empty() {
            return Err(AppError::Validation("username is required".to_owned()));
        }

        if self.password.is_empty() {
            return Err(AppError::Validation("password is required".to_owned()));
        }

        Ok(())
    }
}

impl std::fmt::Debug for SamlLoginDetails {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SamlLoginDetails")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One resource permission granted inside a requesting party token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrantedPermission {
    /// Resource server identifier of the resource.
    pub resource_id: Option<String>,
    /// Resource name.
    pub resource_name: Option<String>,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

/// Requesting party token issued after a granted UMA ticket exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestingPartyToken {
    /// The RPT itself.
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: Option<u64>,
    /// Permissions embedded in the token claims.
    pub permissions: Vec<GrantedPermission>,
}

impl std::fmt::Debug for RequestingPartyToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestingPartyToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Port over the identity provider protocols the broker consumes.
///
/// Implementations map HTTP 401 to `Unauthorized`, 403 to `Forbidden`, other
/// 4xx to `Validation` and transport or 5xx failures to `Internal`.
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Resource-owner password login.
    async fn password_login(&self, username: &str, password: &str) -> AppResult<TokenSet>;

    /// Administrator login against the master realm.
    async fn admin_token(&self) -> AppResult<TokenSet>;

    /// Refresh-token grant.
    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenSet>;

    /// Client-credentials grant for the broker's service account.
    async fn service_account_token(&self) -> AppResult<TokenSet>;

    /// Token exchange, optionally impersonating another subject.
    async fn exchange_token(&self, request: &TokenExchangeRequest) -> AppResult<TokenSet>;

    /// Authenticates against the SAML endpoint and returns the base64
    /// `SAMLResponse`.
    async fn saml_login(&self, details: &SamlLoginDetails) -> AppResult<String>;

    /// Exchanges an access token for an RPT covering one resource URI.
    async fn request_party_token(
        &self,
        access_token: &str,
        resource_uri: &str,
    ) -> AppResult<RequestingPartyToken>;
}
