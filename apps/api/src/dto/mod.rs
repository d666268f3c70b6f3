mod auth;
mod common;
mod credentials;

pub use auth::{SessionLoginRequest, SessionRefreshRequest, SessionTokenResponse};
pub use common::{HealthDependencyStatus, HealthResponse};
pub use credentials::{
    CredentialSummaryResponse, CspCredentialRequestBody, CspCredentialResponse,
    ListCredentialsQuery, SamlCredentialRequestBody,
};
