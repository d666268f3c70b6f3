//! Keycloak adapter for the identity provider port.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use iamgate_application::{
    GrantedPermission, IdentityProviderClient, RequestingPartyToken, SamlLoginDetails,
    TokenExchangeRequest, TokenSet,
};
use iamgate_core::{AppError, AppResult};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";
const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const ADMIN_REALM: &str = "master";
const ADMIN_CLIENT_ID: &str = "admin-cli";

/// Connection settings for one Keycloak realm.
#[derive(Clone)]
pub struct KeycloakSettings {
    /// Server base URL, without the `/realms` suffix.
    pub base_url: String,
    /// Realm operators authenticate against.
    pub realm: String,
    /// Confidential client used for every grant.
    pub client_id: String,
    /// Secret of the confidential client.
    pub client_secret: String,
    /// Master realm administrator, used for impersonation.
    pub admin_username: String,
    /// Password of the master realm administrator.
    pub admin_password: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for KeycloakSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("KeycloakSettings")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KeycloakSettings {
    fn realm_url(&self, realm: &str) -> String {
        format!("{}/realms/{realm}", self.base_url.trim_end_matches('/'))
    }

    /// Issuer claim of tokens minted by the realm.
    #[must_use]
    pub fn issuer(&self) -> String {
        self.realm_url(self.realm.as_str())
    }

    /// JWKS endpoint of the realm.
    #[must_use]
    pub fn jwks_uri(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    fn token_endpoint(&self, realm: &str) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url(realm))
    }
}

/// Keycloak token endpoint, UMA and SAML login client.
#[derive(Debug, Clone)]
pub struct KeycloakIdentityProvider {
    http: Client,
    settings: KeycloakSettings,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    refresh_expires_in: Option<u64>,
    token_type: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(value: TokenResponse) -> Self {
        Self {
            access_token: value.access_token,
            refresh_token: value.refresh_token,
            expires_in: value.expires_in,
            refresh_expires_in: value.refresh_expires_in,
            token_type: value.token_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RptClaims {
    #[serde(default)]
    authorization: Option<RptAuthorization>,
}

#[derive(Debug, Default, Deserialize)]
struct RptAuthorization {
    #[serde(default)]
    permissions: Vec<RptPermission>,
}

#[derive(Debug, Deserialize)]
struct RptPermission {
    rsid: Option<String>,
    rsname: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

impl KeycloakIdentityProvider {
    /// Creates a client with its own timeout-bound HTTP client.
    pub fn new(settings: KeycloakSettings) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build identity provider client: {error}"))
            })?;

        Ok(Self { http, settings })
    }

    /// Returns the connection settings.
    #[must_use]
    pub fn settings(&self) -> &KeycloakSettings {
        &self.settings
    }

    async fn token_request(
        &self,
        realm: &str,
        grant: &str,
        form: &[(&str, &str)],
    ) -> AppResult<Response> {
        let response = self
            .http
            .post(self.settings.token_endpoint(realm))
            .form(form)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("identity provider {grant} request failed: {error}"))
            })?;

        ensure_success(response, grant).await
    }

    async fn token_grant(&self, grant: &str, form: &[(&str, &str)]) -> AppResult<TokenSet> {
        let response = self
            .token_request(self.settings.realm.as_str(), grant, form)
            .await?;
        decode_tokens(response, grant).await
    }
}

async fn ensure_success(response: Response, grant: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, grant, body.as_str()))
}

async fn decode_tokens(response: Response, grant: &str) -> AppResult<TokenSet> {
    response
        .json::<TokenResponse>()
        .await
        .map(TokenSet::from)
        .map_err(|error| {
            AppError::Internal(format!("failed to decode {grant} token response: {error}"))
        })
}

fn status_error(status: StatusCode, grant: &str, body: &str) -> AppError {
    let detail = serde_json::from_str::<OAuthErrorBody>(body)
        .ok()
        .and_then(|body| body.error_description.or(body.error))
        .unwrap_or_else(|| status.to_string());
    let message = format!("{grant} rejected: {detail}");

    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        status if status.is_client_error() => AppError::Validation(message),
        _ => AppError::Internal(message),
    }
}

/// Reads the granted permissions out of an RPT without verifying it; the
/// token arrives straight from the token endpoint over TLS.
fn decode_rpt_permissions(rpt: &str) -> AppResult<Vec<GrantedPermission>> {
    let payload = rpt
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::Internal("requesting party token is not a JWT".to_owned()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|error| AppError::Internal(format!("invalid RPT payload encoding: {error}")))?;
    let claims: RptClaims = serde_json::from_slice(&bytes)
        .map_err(|error| AppError::Internal(format!("invalid RPT claims: {error}")))?;

    Ok(claims
        .authorization
        .unwrap_or_default()
        .permissions
        .into_iter()
        .map(|permission| GrantedPermission {
            resource_id: permission.rsid,
            resource_name: permission.rsname,
            scopes: permission.scopes,
        })
        .collect())
}

fn html_unescape(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Splits the attributes of one start tag into lowercase names and
/// unescaped values. Values may be double quoted, single quoted or bare.
fn attributes(tag: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    let mut rest = tag
        .trim_start_matches('<')
        .trim_start_matches(|c: char| !c.is_whitespace() && c != '/');

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let mut value = String::new();
        if let Some(assigned) = rest.strip_prefix('=') {
            let assigned = assigned.trim_start();
            let (raw, remainder) = match assigned.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let inner = &assigned[1..];
                    let close = inner.find(quote).unwrap_or(inner.len());
                    (&inner[..close], inner.get(close + 1..).unwrap_or_default())
                }
                _ => {
                    let close = assigned.find(char::is_whitespace).unwrap_or(assigned.len());
                    assigned.split_at(close)
                }
            };
            value = html_unescape(raw);
            rest = remainder;
        }

        if !name.is_empty() {
            attributes.push((name, value));
        }
    }

    attributes
}

fn attribute_value(tag: &str, name: &str) -> Option<String> {
    attributes(tag)
        .into_iter()
        .find_map(|(attribute, value)| (attribute == name).then_some(value))
}

/// Byte offset of the `>` closing a start tag, skipping quoted values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (index, c) in tag.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(index),
            (None, _) => {}
        }
    }
    None
}

fn tags<'a>(html: &'a str, tag_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let opening = format!("<{tag_name}");
    let lowered = html.to_ascii_lowercase();
    let starts: Vec<usize> = lowered
        .match_indices(opening.as_str())
        .map(|(index, _)| index)
        .filter(|index| {
            html[index + opening.len()..]
                .starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/')
        })
        .collect();

    starts
        .into_iter()
        .filter_map(move |start| tag_end(&html[start..]).map(|end| &html[start..start + end]))
}

/// Finds the action URL of the login form on the IdP login page.
fn login_form_action(html: &str) -> Option<String> {
    tags(html, "form").find_map(|tag| attribute_value(tag, "action"))
}

/// Finds the value of one named input on a page.
fn input_value(html: &str, input_name: &str) -> Option<String> {
    tags(html, "input").find_map(|tag| {
        (attribute_value(tag, "name").as_deref() == Some(input_name))
            .then(|| attribute_value(tag, "value"))
            .flatten()
    })
}

#[async_trait]
impl IdentityProviderClient for KeycloakIdentityProvider {
    async fn password_login(&self, username: &str, password: &str) -> AppResult<TokenSet> {
        self.token_grant(
            "password",
            &[
                ("grant_type", "password"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("username", username),
                ("password", password),
                ("scope", "openid"),
            ],
        )
        .await
    }

    async fn admin_token(&self) -> AppResult<TokenSet> {
        let response = self
            .token_request(
                ADMIN_REALM,
                "admin password",
                &[
                    ("grant_type", "password"),
                    ("client_id", ADMIN_CLIENT_ID),
                    ("username", self.settings.admin_username.as_str()),
                    ("password", self.settings.admin_password.as_str()),
                ],
            )
            .await?;

        decode_tokens(response, "admin password").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenSet> {
        self.token_grant(
            "refresh_token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn service_account_token(&self) -> AppResult<TokenSet> {
        self.token_grant(
            "client_credentials",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ],
        )
        .await
    }

    async fn exchange_token(&self, request: &TokenExchangeRequest) -> AppResult<TokenSet> {
        let mut form = vec![
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("subject_token", request.subject_token.as_str()),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
        ];
        if let Some(requested_subject) = request.requested_subject.as_deref() {
            form.push(("requested_subject", requested_subject));
        }
        if let Some(audience) = request.audience.as_deref() {
            form.push(("audience", audience));
        }

        self.token_grant("token_exchange", &form).await
    }

    async fn saml_login(&self, details: &SamlLoginDetails) -> AppResult<String> {
        // Each login gets its own cookie jar so sessions never leak across users.
        let client = Client::builder()
            .timeout(self.settings.timeout)
            .cookie_store(true)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build saml login client: {error}"))
            })?;

        let login_page = client
            .get(details.url.as_str())
            .send()
            .await
            .map_err(|error| AppError::Internal(format!("saml login page request failed: {error}")))?;
        let login_page = ensure_success(login_page, "saml login page")
            .await?
            .text()
            .await
            .map_err(|error| AppError::Internal(format!("failed to read saml login page: {error}")))?;

        // An active IdP session answers with the response straight away.
        if let Some(response) = input_value(login_page.as_str(), "SAMLResponse") {
            return Ok(response);
        }

        let action = login_form_action(login_page.as_str()).ok_or_else(|| {
            AppError::Internal("saml login page has no login form".to_owned())
        })?;
        debug!(action = %action, "posting saml login form");

        let submitted = client
            .post(action.as_str())
            .form(&[
                ("username", details.username.as_str()),
                ("password", details.password.as_str()),
                ("credentialId", ""),
            ])
            .send()
            .await
            .map_err(|error| AppError::Internal(format!("saml login submit failed: {error}")))?;
        let submitted = ensure_success(submitted, "saml login")
            .await?
            .text()
            .await
            .map_err(|error| AppError::Internal(format!("failed to read saml login result: {error}")))?;

        input_value(submitted.as_str(), "SAMLResponse").ok_or_else(|| {
            AppError::Unauthorized("identity provider did not return a SAML response".to_owned())
        })
    }

    async fn request_party_token(
        &self,
        access_token: &str,
        resource_uri: &str,
    ) -> AppResult<RequestingPartyToken> {
        let response = self
            .http
            .post(self.settings.token_endpoint(self.settings.realm.as_str()))
            .bearer_auth(access_token)
            .form(&[
                ("grant_type", UMA_TICKET_GRANT),
                ("audience", self.settings.client_id.as_str()),
                ("permission", resource_uri),
                ("permission_resource_format", "uri"),
                ("permission_resource_matching_uri", "true"),
            ])
            .send()
            .await
            .map_err(|error| AppError::Internal(format!("uma ticket request failed: {error}")))?;

        let tokens = decode_tokens(ensure_success(response, "uma_ticket").await?, "uma_ticket").await?;
        let permissions = decode_rpt_permissions(tokens.access_token.as_str())?;

        Ok(RequestingPartyToken {
            access_token: tokens.access_token,
            expires_in: tokens.expires_in,
            permissions,
        })
    }
}
