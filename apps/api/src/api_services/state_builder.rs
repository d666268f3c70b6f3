use std::sync::Arc;

use iamgate_application::{
    CspCredentialService, PermissionTicketGate, SamlIssuanceSettings, SessionTokenService,
};
use iamgate_core::AppError;
use sqlx::PgPool;

use crate::api_config::ApiConfig;
use crate::state::AppState;

use super::redis::build_redis_client;

mod credentials;
mod identity;

pub async fn build_app_state(pool: PgPool, config: &ApiConfig) -> Result<AppState, AppError> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?;

    let identity_services = identity::build_identity_services(config)?;
    let credential_services =
        credentials::build_credential_services(&pool, config, redis_client.clone()).await?;

    let credential_service = CspCredentialService::new(
        credential_services.resolver,
        identity_services.bridge,
        credential_services.assume_role_client,
        credential_services.cache,
        SamlIssuanceSettings {
            login_url: config.idp.saml_login_url.clone(),
            session_duration_seconds: config.saml_session_duration_seconds,
            ambiguous_role_policy: config.saml_ambiguous_role_policy,
        },
    );

    Ok(AppState {
        credential_service,
        session_token_service: SessionTokenService::new(Arc::clone(
            &identity_services.identity_provider,
        )),
        permission_ticket_gate: PermissionTicketGate::new(identity_services.identity_provider),
        access_token_verifier: identity_services.access_token_verifier,
        postgres_pool: pool,
        redis_client,
        redis_required: config.requires_redis(),
    })
}
