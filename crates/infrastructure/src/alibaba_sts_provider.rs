//! Alibaba Cloud STS RPC adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use iamgate_application::{BridgeCredential, CspProvider, ProviderAssumeRequest};
use iamgate_core::{AppError, AppResult};
use iamgate_domain::{CspType, IssuedCredential};
use reqwest::Client;
use serde::Deserialize;

/// Default public STS endpoint.
pub const DEFAULT_ALIBABA_STS_ENDPOINT: &str = "https://sts.aliyuncs.com";

const STS_API_VERSION: &str = "2015-04-01";

/// Calls `AssumeRoleWithOIDC` and `AssumeRoleWithSAML`.
#[derive(Debug, Clone)]
pub struct AlibabaStsProvider {
    http: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    credentials: Option<AlibabaCredentials>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AlibabaCredentials {
    access_key_id: String,
    access_key_secret: String,
    security_token: String,
    expiration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AlibabaErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl AlibabaStsProvider {
    /// Creates an adapter for an STS endpoint.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|error| {
            AppError::Internal(format!("failed to build alibaba sts client: {error}"))
        })?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

fn action_parameters(request: &ProviderAssumeRequest, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let mut parameters = vec![
        ("Format", "JSON".to_owned()),
        ("Version", STS_API_VERSION.to_owned()),
        ("Timestamp", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("SignatureNonce", uuid::Uuid::new_v4().to_string()),
        ("RoleArn", request.role_arn.clone()),
    ];

    match &request.bridge {
        BridgeCredential::WebIdentity { token } => {
            parameters.push(("Action", "AssumeRoleWithOIDC".to_owned()));
            parameters.push(("OIDCProviderArn", request.trust_provider_arn.clone()));
            parameters.push(("OIDCToken", token.clone()));
            parameters.push(("RoleSessionName", request.session_name.as_str().to_owned()));
        }
        BridgeCredential::Saml { assertion } => {
            parameters.push(("Action", "AssumeRoleWithSAML".to_owned()));
            parameters.push(("SAMLProviderArn", request.trust_provider_arn.clone()));
            parameters.push(("SAMLAssertion", assertion.clone()));
        }
    }

    if let Some(duration_seconds) = request.duration_seconds {
        parameters.push(("DurationSeconds", duration_seconds.to_string()));
    }

    parameters
}

fn parse_credentials(body: &str, region: &str) -> AppResult<IssuedCredential> {
    let response: AssumeRoleResponse = serde_json::from_str(body)
        .map_err(|error| AppError::Internal(format!("invalid alibaba sts response: {error}")))?;
    let credentials = response
        .credentials
        .ok_or_else(|| AppError::Internal("alibaba sts response has no Credentials".to_owned()))?;

    let expiration = DateTime::parse_from_rfc3339(credentials.expiration.as_str())
        .map_err(|error| AppError::Internal(format!("invalid alibaba sts expiration: {error}")))?
        .with_timezone(&Utc);

    Ok(IssuedCredential {
        access_key_id: credentials.access_key_id,
        secret_access_key: credentials.access_key_secret,
        session_token: credentials.security_token,
        expiration,
        region: region.to_owned(),
    })
}

fn parse_error(body: &str) -> Option<String> {
    let error: AlibabaErrorBody = serde_json::from_str(body).ok()?;
    let code = error.code?;
    Some(format!("{code}: {}", error.message.unwrap_or_default()))
}

#[async_trait]
impl CspProvider for AlibabaStsProvider {
    fn csp_type(&self) -> CspType {
        CspType::Alibaba
    }

    async fn assume_role(&self, request: &ProviderAssumeRequest) -> AppResult<IssuedCredential> {
        let response = self
            .http
            .post(self.endpoint.as_str())
            .form(&action_parameters(request, Utc::now()))
            .send()
            .await
            .map_err(|error| AppError::Internal(format!("alibaba sts request failed: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            AppError::Internal(format!("failed to read alibaba sts response: {error}"))
        })?;

        if status.is_client_error() {
            let reason = parse_error(body.as_str()).unwrap_or_else(|| status.to_string());
            return Err(AppError::Forbidden(reason));
        }

        if !status.is_success() {
            let reason = parse_error(body.as_str()).unwrap_or_else(|| status.to_string());
            return Err(AppError::Internal(format!(
                "alibaba sts returned {status}: {reason}"
            )));
        }

        parse_credentials(body.as_str(), request.region.as_str())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use iamgate_application::{BridgeCredential, ProviderAssumeRequest};
    use iamgate_domain::RoleSessionName;

    use super::{action_parameters, parse_credentials, parse_error};

    fn request(bridge: BridgeCredential) -> ProviderAssumeRequest {
        ProviderAssumeRequest {
            role_arn: "acs:ram::1234567890:role/ops".to_owned(),
            trust_provider_arn: "acs:ram::1234567890:oidc-provider/idp".to_owned(),
            bridge,
            session_name: RoleSessionName::derive("alice", Utc::now()),
            region: "cn-hangzhou".to_owned(),
            duration_seconds: None,
        }
    }

    #[test]
    fn credentials_map_alibaba_field_names() {
        let body = r#"{
            "RequestId": "3D57EAD2-8723-1F26-B69C-F8707D8B565D",
            "Credentials": {
                "AccessKeyId": "STS.NUgYrLnoC37mZZCNnAbez****",
                "AccessKeySecret": "CVwjCkNzTMupZ8NbTCxCBRq3K16jtcWFTJAyBEv2****",
                "SecurityToken": "CAIS****",
                "Expiration": "2026-10-19T13:00:00Z"
            }
        }"#;

        let Ok(credential) = parse_credentials(body, "cn-hangzhou") else {
            panic!("valid response should parse");
        };

        assert_eq!(credential.access_key_id, "STS.NUgYrLnoC37mZZCNnAbez****");
        assert_eq!(credential.secret_access_key, "CVwjCkNzTMupZ8NbTCxCBRq3K16jtcWFTJAyBEv2****");
        assert_eq!(credential.session_token, "CAIS****");
        assert_eq!(credential.region, "cn-hangzhou");
    }

    #[test]
    fn error_body_yields_code_and_message() {
        let body = r#"{"RequestId":"x","Code":"AuthenticationFail.OIDCToken.Invalid","Message":"The OIDC token is invalid."}"#;

        assert_eq!(
            parse_error(body).as_deref(),
            Some("AuthenticationFail.OIDCToken.Invalid: The OIDC token is invalid.")
        );
        assert!(parse_credentials(body, "cn-hangzhou").is_err());
    }

    #[test]
    fn oidc_action_uses_oidc_parameter_names() {
        let parameters = action_parameters(
            &request(BridgeCredential::WebIdentity {
                token: "eyJ.token".to_owned(),
            }),
            Utc::now(),
        );

        assert!(parameters.contains(&("Action", "AssumeRoleWithOIDC".to_owned())));
        assert!(parameters.contains(&(
            "OIDCProviderArn",
            "acs:ram::1234567890:oidc-provider/idp".to_owned()
        )));
        assert!(parameters.contains(&("OIDCToken", "eyJ.token".to_owned())));
        assert!(parameters.contains(&("Format", "JSON".to_owned())));
        assert!(parameters.iter().all(|(name, _)| *name != "DurationSeconds"));
    }

    #[test]
    fn saml_action_uses_saml_provider_arn() {
        let parameters = action_parameters(
            &request(BridgeCredential::Saml {
                assertion: "PHNhbWw+".to_owned(),
            }),
            Utc::now(),
        );

        assert!(parameters.contains(&("Action", "AssumeRoleWithSAML".to_owned())));
        assert!(parameters.contains(&("SAMLAssertion", "PHNhbWw+".to_owned())));
        assert!(parameters.iter().any(|(name, _)| *name == "SAMLProviderArn"));
    }
}
