use axum::Json;
use axum::extract::{FromRef, State};
use iamgate_application::SessionTokenService;

use crate::dto::{SessionLoginRequest, SessionRefreshRequest, SessionTokenResponse};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Clone)]
pub struct SessionState {
    pub session_token_service: SessionTokenService,
}

impl FromRef<AppState> for SessionState {
    fn from_ref(input: &AppState) -> Self {
        Self {
            session_token_service: input.session_token_service.clone(),
        }
    }
}

pub async fn login_handler(
    State(state): State<SessionState>,
    Json(payload): Json<SessionLoginRequest>,
) -> ApiResult<Json<SessionTokenResponse>> {
    let tokens = state
        .session_token_service
        .login(payload.username.as_str(), payload.password.as_str())
        .await?;

    Ok(Json(SessionTokenResponse::from(tokens)))
}

pub async fn refresh_handler(
    State(state): State<SessionState>,
    Json(payload): Json<SessionRefreshRequest>,
) -> ApiResult<Json<SessionTokenResponse>> {
    let tokens = state
        .session_token_service
        .refresh(payload.refresh_token.as_str())
        .await?;

    Ok(Json(SessionTokenResponse::from(tokens)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::Json;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use iamgate_application::{
        IdentityProviderClient, RequestingPartyToken, SamlLoginDetails, SessionTokenService,
        TokenExchangeRequest, TokenSet,
    };
    use iamgate_core::{AppError, AppResult};

    use super::{SessionState, login_handler, refresh_handler};
    use crate::dto::{SessionLoginRequest, SessionRefreshRequest};

    struct PasswordOnlyIdentityProvider;

    fn tokens(access_token: &str) -> TokenSet {
        TokenSet {
            access_token: access_token.to_owned(),
            refresh_token: Some("refresh-1".to_owned()),
            expires_in: Some(300),
            refresh_expires_in: Some(1800),
            token_type: None,
        }
    }

    #[async_trait]
    impl IdentityProviderClient for PasswordOnlyIdentityProvider {
        async fn password_login(&self, username: &str, password: &str) -> AppResult<TokenSet> {
            if username == "alice" && password == "correct-horse" {
                return Ok(tokens("access-1"));
            }

            Err(AppError::Unauthorized("invalid_grant".to_owned()))
        }

        async fn admin_token(&self) -> AppResult<TokenSet> {
            Err(AppError::Internal("not used".to_owned()))
        }

        async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenSet> {
            if refresh_token == "refresh-1" {
                return Ok(tokens("access-2"));
            }

            Err(AppError::Validation("invalid_grant".to_owned()))
        }

        async fn service_account_token(&self) -> AppResult<TokenSet> {
            Err(AppError::Internal("not used".to_owned()))
        }

        async fn exchange_token(&self, _request: &TokenExchangeRequest) -> AppResult<TokenSet> {
            Err(AppError::Internal("not used".to_owned()))
        }

        async fn saml_login(&self, _details: &SamlLoginDetails) -> AppResult<String> {
            Err(AppError::Internal("not used".to_owned()))
        }

        async fn request_party_token(
            &self,
            _access_token: &str,
            _resource_uri: &str,
        ) -> AppResult<RequestingPartyToken> {
            Err(AppError::Internal("not used".to_owned()))
        }
    }

    fn state() -> SessionState {
        SessionState {
            session_token_service: SessionTokenService::new(Arc::new(
                PasswordOnlyIdentityProvider,
            )),
        }
    }

    #[tokio::test]
    async fn login_returns_tokens_with_default_type() {
        let result = login_handler(
            State(state()),
            Json(SessionLoginRequest {
                username: "alice".to_owned(),
                password: "correct-horse".to_owned(),
            }),
        )
        .await;

        let Ok(Json(response)) = result else {
            panic!("login should succeed");
        };
        assert_eq!(response.access_token, "access-1");
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.refresh_expires_in, Some(1800));
    }

    #[tokio::test]
    async fn bad_password_and_stale_refresh_token_are_unauthorized() {
        let login = login_handler(
            State(state()),
            Json(SessionLoginRequest {
                username: "alice".to_owned(),
                password: "wrong".to_owned(),
            }),
        )
        .await;
        let Err(error) = login else {
            panic!("wrong password must fail");
        };
        assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);

        let refresh = refresh_handler(
            State(state()),
            Json(SessionRefreshRequest {
                refresh_token: "refresh-0".to_owned(),
            }),
        )
        .await;
        let Err(error) = refresh else {
            panic!("unknown refresh token must fail");
        };
        assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn blank_refresh_token_is_a_validation_error() {
        let refresh = refresh_handler(
            State(state()),
            Json(SessionRefreshRequest {
                refresh_token: "  ".to_owned(),
            }),
        )
        .await;

        let Err(error) = refresh else {
            panic!("blank refresh token must fail");
        };
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
