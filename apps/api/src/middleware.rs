use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use iamgate_core::AppError;
use tracing::debug;

use crate::error::ApiResult;
use crate::state::AppState;

/// Verifies the bearer token, then exchanges it for a requesting party token
/// scoped to the request path.
pub async fn require_bearer_ticket(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let access_token = bearer_token(&request)?.to_owned();
    let identity = state.access_token_verifier.verify(&access_token).await?;

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let authorization = state
        .permission_ticket_gate
        .authorize(Some(access_token.as_str()), path_and_query.as_str())
        .await?;

    debug!(
        subject = %identity.subject(),
        resource_uri = %authorization.resource_uri,
        "request authorized"
    );

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(authorization);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("malformed authorization header".to_owned()))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "malformed authorization header".to_owned(),
        ));
    }

    Ok(token.trim())
}
