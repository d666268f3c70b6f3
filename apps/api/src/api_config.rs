use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use iamgate_application::{DEFAULT_SAFETY_MARGIN_SECONDS, OidcBridgeMode};
use iamgate_core::AppError;
use iamgate_domain::AmbiguousRolePolicy;
use iamgate_infrastructure::DEFAULT_ALIBABA_STS_ENDPOINT;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintLeaseBackend {
    Local,
    Redis,
}

impl MintLeaseBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::Validation(format!(
                "CREDENTIAL_MINT_LEASE_BACKEND must be either 'local' or 'redis', got '{other}'"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct IdpConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub admin_username: String,
    pub admin_password: String,
    pub saml_login_url: String,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for IdpConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IdpConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("admin_username", &self.admin_username)
            .field("saml_login_url", &self.saml_login_url)
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct MintLeaseConfig {
    pub holder_id: String,
    pub lease_seconds: u32,
    pub wait: Duration,
    pub poll_interval: Duration,
}

#[derive(Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub redis_url: Option<String>,
    pub mint_lease_backend: MintLeaseBackend,
    pub mint_lease: MintLeaseConfig,
    pub credential_encryption_key: String,
    pub credential_safety_margin_seconds: u32,
    pub idp: IdpConfig,
    pub oidc_bridge_mode: OidcBridgeMode,
    pub saml_ambiguous_role_policy: AmbiguousRolePolicy,
    pub saml_session_duration_seconds: Option<u32>,
    /// Explicit STS endpoint; the SDK resolves a regional one when unset.
    pub aws_sts_endpoint: Option<String>,
    pub alibaba_sts_endpoint: String,
    pub sts_duration_seconds: Option<u32>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(|name| env::var(name).ok(), migrate_only)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        migrate_only: bool,
    ) -> Result<Self, AppError> {
        let required = |name: &str| -> Result<String, AppError> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Validation(format!("{name} is required")))
        };
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = required("DATABASE_URL")?;
        let frontend_url =
            optional("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_owned());
        let api_host = optional("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = optional("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let redis_url = optional("REDIS_URL");
        let mint_lease_backend = optional("CREDENTIAL_MINT_LEASE_BACKEND")
            .map(|value| MintLeaseBackend::parse(value.as_str()))
            .transpose()?
            .unwrap_or(MintLeaseBackend::Local);
        if mint_lease_backend == MintLeaseBackend::Redis && redis_url.is_none() {
            return Err(AppError::Validation(
                "REDIS_URL is required when CREDENTIAL_MINT_LEASE_BACKEND is 'redis'".to_owned(),
            ));
        }

        let mint_lease = MintLeaseConfig {
            holder_id: optional("API_INSTANCE_ID")
                .unwrap_or_else(|| format!("api-{}", uuid::Uuid::new_v4())),
            lease_seconds: parse_number(optional("CREDENTIAL_MINT_LEASE_SECONDS"), "CREDENTIAL_MINT_LEASE_SECONDS")?
                .unwrap_or(30),
            wait: Duration::from_millis(
                parse_number(optional("CREDENTIAL_MINT_WAIT_MS"), "CREDENTIAL_MINT_WAIT_MS")?
                    .unwrap_or(15_000),
            ),
            poll_interval: Duration::from_millis(250),
        };

        let credential_encryption_key = required("CREDENTIAL_ENCRYPTION_KEY")?;
        if credential_encryption_key.trim().len() != 64 {
            return Err(AppError::Validation(
                "CREDENTIAL_ENCRYPTION_KEY must be 64 hex characters".to_owned(),
            ));
        }

        let credential_safety_margin_seconds = parse_number(
            optional("CREDENTIAL_SAFETY_MARGIN_SECONDS"),
            "CREDENTIAL_SAFETY_MARGIN_SECONDS",
        )?
        .unwrap_or(DEFAULT_SAFETY_MARGIN_SECONDS);

        let idp = IdpConfig {
            base_url: required("IDP_BASE_URL")?,
            realm: required("IDP_REALM")?,
            client_id: required("IDP_CLIENT_ID")?,
            client_secret: required("IDP_CLIENT_SECRET")?,
            admin_username: optional("IDP_ADMIN_USERNAME").unwrap_or_default(),
            admin_password: optional("IDP_ADMIN_PASSWORD").unwrap_or_default(),
            saml_login_url: optional("IDP_SAML_LOGIN_URL").unwrap_or_default(),
            http_timeout: Duration::from_secs(
                parse_number(optional("IDP_HTTP_TIMEOUT_SECONDS"), "IDP_HTTP_TIMEOUT_SECONDS")?
                    .unwrap_or(10),
            ),
        };

        validate_url("IDP_BASE_URL", idp.base_url.as_str())?;
        if !idp.saml_login_url.is_empty() {
            validate_url("IDP_SAML_LOGIN_URL", idp.saml_login_url.as_str())?;
        }

        let oidc_bridge_mode = optional("OIDC_BRIDGE_MODE")
            .map(|value| OidcBridgeMode::from_str(value.as_str()))
            .transpose()?
            .unwrap_or_default();
        if oidc_bridge_mode == OidcBridgeMode::Impersonation
            && (idp.admin_username.is_empty() || idp.admin_password.is_empty())
        {
            return Err(AppError::Validation(
                "IDP_ADMIN_USERNAME and IDP_ADMIN_PASSWORD are required for impersonation"
                    .to_owned(),
            ));
        }

        let saml_ambiguous_role_policy = if optional("SAML_LEGACY_FIRST_ROLE_FALLBACK")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
        {
            AmbiguousRolePolicy::FirstAccountFirstRole
        } else {
            AmbiguousRolePolicy::FailClosed
        };

        Ok(Self {
            migrate_only,
            database_url,
            frontend_url,
            api_host,
            api_port,
            redis_url,
            mint_lease_backend,
            mint_lease,
            credential_encryption_key,
            credential_safety_margin_seconds,
            idp,
            oidc_bridge_mode,
            saml_ambiguous_role_policy,
            saml_session_duration_seconds: parse_number(
                optional("SAML_SESSION_DURATION_SECONDS"),
                "SAML_SESSION_DURATION_SECONDS",
            )?,
            aws_sts_endpoint: optional("AWS_STS_ENDPOINT")
                .map(|endpoint| {
                    validate_url("AWS_STS_ENDPOINT", endpoint.as_str())?;
                    Ok::<_, AppError>(endpoint)
                })
                .transpose()?,
            alibaba_sts_endpoint: optional("ALIBABA_STS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ALIBABA_STS_ENDPOINT.to_owned()),
            sts_duration_seconds: parse_number(
                optional("STS_DURATION_SECONDS"),
                "STS_DURATION_SECONDS",
            )?,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }

    pub fn requires_redis(&self) -> bool {
        self.mint_lease_backend == MintLeaseBackend::Redis
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn validate_url(name: &str, value: &str) -> Result<(), AppError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
}

fn parse_number<T: FromStr>(value: Option<String>, name: &str) -> Result<Option<T>, AppError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
        })
        .transpose()
}
