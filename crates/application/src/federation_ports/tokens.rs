use async_trait::async_trait;
use iamgate_core::{AppResult, UserIdentity};

/// Validates bearer access tokens issued by the identity provider.
#[async_trait]
pub trait AccessTokenVerifier: Send + Sync {
    /// Verifies signature, issuer and expiry, returning the caller identity.
    async fn verify(&self, access_token: &str) -> AppResult<UserIdentity>;
}
