use iamgate_application::TokenSet;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Password login payload.
#[derive(Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/session-login-request.ts"
)]
pub struct SessionLoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SessionLoginRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SessionLoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Refresh-token payload.
#[derive(Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/session-refresh-request.ts"
)]
pub struct SessionRefreshRequest {
    pub refresh_token: String,
}

/// Tokens returned by login and refresh.
#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/session-token-response.ts"
)]
pub struct SessionTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[ts(type = "number | null")]
    pub expires_in: Option<u64>,
    #[ts(type = "number | null")]
    pub refresh_expires_in: Option<u64>,
    pub token_type: String,
}

impl From<TokenSet> for SessionTokenResponse {
    fn from(tokens: TokenSet) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            refresh_expires_in: tokens.refresh_expires_in,
            token_type: tokens.token_type.unwrap_or_else(|| "Bearer".to_owned()),
        }
    }
}
