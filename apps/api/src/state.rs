use std::sync::Arc;

use iamgate_application::{
    AccessTokenVerifier, CspCredentialService, PermissionTicketGate, SessionTokenService,
};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub credential_service: CspCredentialService,
    pub session_token_service: SessionTokenService,
    pub permission_ticket_gate: PermissionTicketGate,
    pub access_token_verifier: Arc<dyn AccessTokenVerifier>,
    pub postgres_pool: PgPool,
    pub redis_client: Option<redis::Client>,
    pub redis_required: bool,
}
