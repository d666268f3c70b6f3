use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, FromRef, Path, Query, State};
use axum::http::StatusCode;
use iamgate_application::{
    AuthorizationContext, CspCredentialRequest, CspCredentialService, SamlCredentialRequest,
    TempCredentialQuery,
};
use iamgate_core::{AppError, UserIdentity, WorkspaceId};
use iamgate_domain::{AuthType, CredentialId, CspType, RoleId};

use crate::dto::{
    CredentialSummaryResponse, CspCredentialRequestBody, CspCredentialResponse,
    ListCredentialsQuery, SamlCredentialRequestBody,
};
use crate::error::ApiResult;
use crate::state::AppState;


const MAX_PAGE_SIZE: usize = 200;

#[derive(Clone)]
pub struct CredentialsState {
    pub credential_service: CspCredentialService,
}

impl FromRef<AppState> for CredentialsState {
    fn from_ref(input: &AppState) -> Self {
        Self {
            credential_service: input.credential_service.clone(),
        }
    }
}

/// Issues web identity credentials. The requesting party token stands in for
/// the caller's access token downstream.
pub async fn issue_credentials_handler(
    State(state): State<CredentialsState>,
    Extension(identity): Extension<UserIdentity>,
    Extension(authorization): Extension<AuthorizationContext>,
    Json(payload): Json<CspCredentialRequestBody>,
) -> ApiResult<Json<CspCredentialResponse>> {
    let request = CspCredentialRequest {
        workspace_id: WorkspaceId::from_str(payload.workspace_id.as_str())?,
        csp_type: CspType::from_transport(payload.csp_type.as_str())?,
        region: payload.region,
    };

    let credential = state
        .credential_service
        .issue_credentials(&identity, authorization.rpt.as_str(), request)
        .await?;

    Ok(Json(CspCredentialResponse::from(credential)))
}

pub async fn issue_saml_credentials_handler(
    State(state): State<CredentialsState>,
    Extension(identity): Extension<UserIdentity>,
    Json(payload): Json<SamlCredentialRequestBody>,
) -> ApiResult<Json<CspCredentialResponse>> {
    let request = SamlCredentialRequest {
        csp_type: CspType::from_transport(payload.csp_type.as_str())?,
        region: payload.region,
        username: payload.username,
        password: payload.password,
        role_arn: payload
            .role_arn
            .map(|role_arn| role_arn.trim().to_owned())
            .filter(|role_arn| !role_arn.is_empty()),
    };

    let credential = state
        .credential_service
        .issue_saml_credentials(&identity, request)
        .await?;

    Ok(Json(CspCredentialResponse::from(credential)))
}

/// Lists the caller's own credentials.
pub async fn list_credentials_handler(
    State(state): State<CredentialsState>,
    Extension(identity): Extension<UserIdentity>,
    Query(query): Query<ListCredentialsQuery>,
) -> ApiResult<Json<Vec<CredentialSummaryResponse>>> {
    let query = credential_query(query, &identity)?;
    let credentials = state.credential_service.list_credentials(&query).await?;

    Ok(Json(
        credentials
            .into_iter()
            .map(CredentialSummaryResponse::from)
            .collect(),
    ))
}

pub async fn deactivate_credential_handler(
    State(state): State<CredentialsState>,
    Extension(identity): Extension<UserIdentity>,
    Path(credential_id): Path<String>,
) -> ApiResult<StatusCode> {
    let credential_id = CredentialId::from_str(credential_id.as_str())?;

    // Foreign credentials are reported as missing so ids cannot be probed.
    let credential = state
        .credential_service
        .cache()
        .find_by_id(credential_id)
        .await?;
    if credential.key.issued_by != identity.subject() {
        return Err(AppError::NotFound(format!("credential '{credential_id}' not found")).into());
    }

    state
        .credential_service
        .deactivate_credential(credential_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn credential_query(
    query: ListCredentialsQuery,
    identity: &UserIdentity,
) -> Result<TempCredentialQuery, AppError> {
    let defaults = TempCredentialQuery::default();

    Ok(TempCredentialQuery {
        provider: query
            .provider
            .as_deref()
            .map(CspType::from_transport)
            .transpose()?,
        auth_type: query
            .auth_type
            .as_deref()
            .map(|value| AuthType::from_str(value.trim()))
            .transpose()?,
        role_id: query.role_id.as_deref().map(RoleId::from_str).transpose()?,
        issued_by: Some(identity.subject().to_owned()),
        active_only: query.active_only.unwrap_or(defaults.active_only),
        limit: query.limit.unwrap_or(defaults.limit).min(MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(defaults.offset),
    })
}
