use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use iamgate_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

use cors::build_cors_layer;

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let credential_routes = Router::new()
        .route(
            "/csp/credentials",
            get(handlers::credentials::list_credentials_handler)
                .post(handlers::credentials::issue_credentials_handler),
        )
        .route(
            "/csp/credentials/saml",
            post(handlers::credentials::issue_saml_credentials_handler),
        )
        .route(
            "/csp/credentials/{credential_id}/deactivate",
            post(handlers::credentials::deactivate_credential_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_bearer_ticket,
        ));

    let session_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login_handler))
        .route("/auth/refresh", post(handlers::auth::refresh_handler));

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(session_routes)
        .merge(credential_routes)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(frontend_url)?)
        .with_state(app_state))
}
