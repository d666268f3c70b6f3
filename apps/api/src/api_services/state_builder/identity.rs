use std::sync::Arc;

use iamgate_application::{AccessTokenVerifier, IdentityBridge, IdentityProviderClient};
use iamgate_core::AppError;
use iamgate_infrastructure::{
    JwksAccessTokenVerifier, KeycloakIdentityProvider, KeycloakSettings,
    RoxmlSamlAssertionDecoder,
};
use tracing::info;

use crate::api_config::ApiConfig;

pub(super) struct IdentityServices {
    pub(super) identity_provider: Arc<dyn IdentityProviderClient>,
    pub(super) access_token_verifier: Arc<dyn AccessTokenVerifier>,
    pub(super) bridge: IdentityBridge,
}

pub(super) fn build_identity_services(config: &ApiConfig) -> Result<IdentityServices, AppError> {
    let settings = KeycloakSettings {
        base_url: config.idp.base_url.clone(),
        realm: config.idp.realm.clone(),
        client_id: config.idp.client_id.clone(),
        client_secret: config.idp.client_secret.clone(),
        admin_username: config.idp.admin_username.clone(),
        admin_password: config.idp.admin_password.clone(),
        timeout: config.idp.http_timeout,
    };

    let jwks_http = reqwest::Client::builder()
        .timeout(config.idp.http_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build jwks client: {error}")))?;
    let access_token_verifier: Arc<dyn AccessTokenVerifier> = Arc::new(
        JwksAccessTokenVerifier::new(jwks_http, settings.issuer(), settings.jwks_uri()),
    );

    let identity_provider: Arc<dyn IdentityProviderClient> =
        Arc::new(KeycloakIdentityProvider::new(settings)?);
    let bridge = IdentityBridge::new(
        Arc::clone(&identity_provider),
        Arc::new(RoxmlSamlAssertionDecoder::new()),
        config.oidc_bridge_mode,
    );

    info!(
        realm = %config.idp.realm,
        oidc_bridge_mode = config.oidc_bridge_mode.as_str(),
        "identity provider configured"
    );

    Ok(IdentityServices {
        identity_provider,
        access_token_verifier,
        bridge,
    })
}
