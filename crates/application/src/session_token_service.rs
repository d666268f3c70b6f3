use std::sync::Arc;

use iamgate_core::{AppError, AppResult};
use tracing::info;

use crate::{IdentityProviderClient, TokenSet};

/// Password login and refresh against the identity provider.
#[derive(Clone)]
pub struct SessionTokenService {
    identity_provider: Arc<dyn IdentityProviderClient>,
}

impl SessionTokenService {
    /// Creates a session token service.
    #[must_use]
    pub fn new(identity_provider: Arc<dyn IdentityProviderClient>) -> Self {
        Self { identity_provider }
    }

    /// Logs a user in with username and password.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<TokenSet> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "username and password are required".to_owned(),
            ));
        }

        let tokens = self
            .identity_provider
            .password_login(username, password)
            .await
            .map_err(|error| match error {
                AppError::Unauthorized(_) | AppError::Validation(_) | AppError::Forbidden(_) => {
                    AppError::Unauthorized("invalid credentials".to_owned())
                }
                other => other,
            })?;

        info!(username = %username, "user logged in");
        Ok(tokens)
    }

    /// Exchanges a refresh token for a new token set.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenSet> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AppError::Validation("refresh token is required".to_owned()));
        }

        self.identity_provider
            .refresh_token(refresh_token)
            .await
            .map_err(|error| match error {
                AppError::Unauthorized(_) | AppError::Validation(_) | AppError::Forbidden(_) => {
                    AppError::Unauthorized("invalid refresh token".to_owned())
                }
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use iamgate_core::AppError;

    use super::SessionTokenService;
    use crate::test_support::FakeIdentityProvider;

    fn service() -> SessionTokenService {
        SessionTokenService::new(Arc::new(FakeIdentityProvider::default()))
    }

    #[tokio::test]
    async fn login_returns_tokens_for_valid_credentials() {
        let tokens = service().login(" alice ", "correct-horse").await;

        assert!(matches!(
            tokens,
            Ok(ref tokens) if tokens.refresh_token.as_deref() == Some("refresh-alice")
        ));
    }

    #[tokio::test]
    async fn login_rejection_is_generic() {
        let result = service().login("alice", "wrong").await;

        assert!(matches!(
            result,
            Err(AppError::Unauthorized(ref message)) if message == "invalid credentials"
        ));
    }

    #[tokio::test]
    async fn blank_login_is_a_validation_error() {
        let result = service().login("", "secret").await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn refresh_maps_invalid_grant_to_unauthorized() {
        let service = service();

        assert!(service.refresh("refresh-alice").await.is_ok());
        assert!(matches!(
            service.refresh("stale").await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
