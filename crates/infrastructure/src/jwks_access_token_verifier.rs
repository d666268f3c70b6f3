//! Bearer token validation against the identity provider's JWKS.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use iamgate_application::AccessTokenVerifier;
use iamgate_core::{AppError, AppResult, UserIdentity};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Verifies RS256/ES256 access tokens with keys from a JWKS endpoint.
#[derive(Clone)]
pub struct JwksAccessTokenVerifier {
    http: Client,
    issuer: String,
    jwks_uri: String,
    audience: Option<String>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    leeway_seconds: u64,
    cache: Arc<DashMap<String, CachedJwks>>,
}

#[derive(Clone)]
struct CachedJwks {
    fetched_at: Instant,
    jwks: Arc<JwkSet>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    preferred_username: Option<String>,
    email: Option<String>,
}

impl JwksAccessTokenVerifier {
    /// Creates a verifier for one issuer and its JWKS URI.
    #[must_use]
    pub fn new(http: Client, issuer: impl Into<String>, jwks_uri: impl Into<String>) -> Self {
        Self {
            http,
            issuer: issuer.into(),
            jwks_uri: jwks_uri.into(),
            audience: None,
            cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            leeway_seconds: 30,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Requires the `aud` claim to contain the given audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Overrides how long fetched keys are reused.
    #[must_use]
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Sets the minimum age of cached keys before an unknown `kid` may
    /// trigger a refetch.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, min_refresh_interval: Duration) -> Self {
        self.min_refresh_interval = min_refresh_interval;
        self
    }

    async fn jwks(&self, force_refresh: bool) -> AppResult<Arc<JwkSet>> {
        if let Some(entry) = self.cache.get(&self.jwks_uri) {
            let age = entry.fetched_at.elapsed();
            // Forced refreshes are rate limited; unknown kids are attacker controlled.
            if age <= self.cache_ttl && (!force_refresh || age < self.min_refresh_interval) {
                return Ok(entry.jwks.clone());
            }
        }

        match self.fetch_jwks().await {
            Ok(jwks) => {
                let jwks = Arc::new(jwks);
                self.cache.insert(
                    self.jwks_uri.clone(),
                    CachedJwks {
                        fetched_at: Instant::now(),
                        jwks: jwks.clone(),
                    },
                );
                Ok(jwks)
            }
            Err(error) => {
                if let Some(entry) = self.cache.get(&self.jwks_uri) {
                    warn!(
                        jwks_uri = %self.jwks_uri,
                        error = %error,
                        "jwks refresh failed; using cached keys"
                    );
                    return Ok(entry.jwks.clone());
                }

                Err(error)
            }
        }
    }

    async fn fetch_jwks(&self) -> AppResult<JwkSet> {
        let response = self
            .http
            .get(self.jwks_uri.as_str())
            .send()
            .await
            .map_err(|error| AppError::Internal(format!("failed to fetch jwks: {error}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "GET {} returned {}",
                self.jwks_uri,
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|error| AppError::Internal(format!("failed to decode jwks: {error}")))
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.leeway = self.leeway_seconds;
        match self.audience.as_deref() {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

#[async_trait]
impl AccessTokenVerifier for JwksAccessTokenVerifier {
    async fn verify(&self, access_token: &str) -> AppResult<UserIdentity> {
        if !looks_like_jwt(access_token) {
            return Err(AppError::Unauthorized("malformed bearer token".to_owned()));
        }

        let header = decode_header(access_token)
            .map_err(|error| AppError::Unauthorized(format!("invalid token header: {error}")))?;
        if header.alg != Algorithm::RS256 && header.alg != Algorithm::ES256 {
            return Err(AppError::Unauthorized(format!(
                "unsupported token algorithm {:?}",
                header.alg
            )));
        }

        let jwks = self.jwks(false).await?;
        let jwks = match select_jwk(&jwks, header.kid.as_deref()) {
            Ok(_) => jwks,
            // Key rotation: refetch once when the kid is unknown.
            Err(_) => self.jwks(true).await?,
        };
        let jwk = select_jwk(&jwks, header.kid.as_deref())?;

        let key = DecodingKey::from_jwk(jwk)
            .map_err(|error| AppError::Internal(format!("unusable jwk: {error}")))?;
        let token = decode::<AccessTokenClaims>(access_token, &key, &self.validation(header.alg))
            .map_err(|error| AppError::Unauthorized(format!("invalid bearer token: {error}")))?;

        Ok(identity_from_claims(token.claims))
    }
}

fn identity_from_claims(claims: AccessTokenClaims) -> UserIdentity {
    let display_name = claims
        .preferred_username
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| claims.sub.clone());

    UserIdentity::new(claims.sub, display_name, claims.email)
}

fn looks_like_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}

fn select_jwk<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> AppResult<&'a Jwk> {
    if let Some(kid) = kid {
        return jwks
            .keys
            .iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| AppError::Unauthorized(format!("unknown signing key '{kid}'")));
    }

    match jwks.keys.as_slice() {
        [only] => Ok(only),
        [] => Err(AppError::Internal("jwks contains no keys".to_owned())),
        _ => Err(AppError::Unauthorized(
            "token kid is required when several signing keys exist".to_owned(),
        )),
    }
}
