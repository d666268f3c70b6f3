//! SAML role attribute values and role selection.

use iamgate_core::{AppError, AppResult, FederationError};
use serde::{Deserialize, Serialize};

/// SAML attribute carrying `role,principal` pairs.
pub const SAML_ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

/// Role offered by a SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamlRole {
    /// Cloud-side role identifier.
    pub role_arn: String,
    /// SAML provider identifier trusted by the role.
    pub principal_arn: String,
}

impl SamlRole {
    /// Parses one attribute value. Tokens may appear in either order.
    pub fn parse(value: &str) -> AppResult<Self> {
        let tokens: Vec<&str> = value.split(',').map(str::trim).collect();
        if tokens.len() != 2 {
            return Err(AppError::Validation(format!(
                "invalid role string only {} tokens",
                tokens.len()
            )));
        }

        let mut role_arn = None;
        let mut principal_arn = None;
        for token in tokens {
            if token.contains(":saml-provider") {
                principal_arn = Some(token.to_owned());
            } else if token.contains(":role") {
                role_arn = Some(token.to_owned());
            }
        }

        let principal_arn = principal_arn.ok_or_else(|| {
            AppError::Validation("saml provider ARN was not specified".to_owned())
        })?;
        let role_arn = role_arn
            .ok_or_else(|| AppError::Validation("role ARN was not specified".to_owned()))?;

        Ok(Self {
            role_arn,
            principal_arn,
        })
    }
}

/// How to choose among several offered roles when none is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousRolePolicy {
    /// Refuse to pick a role.
    #[default]
    FailClosed,
    /// Use the first account's first role, accounts ordered by first
    /// appearance in the assertion. That is always the first role offered.
    FirstAccountFirstRole,
}

/// Selects the role to assume from the roles offered by an assertion.
pub fn select_saml_role(
    roles: &[SamlRole],
    pinned_role_arn: Option<&str>,
    policy: AmbiguousRolePolicy,
) -> Result<SamlRole, FederationError> {
    if roles.is_empty() {
        return Err(FederationError::NoRolesAvailable);
    }

    if let Some(pinned) = pinned_role_arn.map(str::trim).filter(|value| !value.is_empty()) {
        return roles
            .iter()
            .find(|role| role.role_arn == pinned)
            .cloned()
            .ok_or_else(|| FederationError::RoleNotFound(pinned.to_owned()));
    }

    if let [only] = roles {
        return Ok(only.clone());
    }

    match policy {
        AmbiguousRolePolicy::FailClosed => Err(FederationError::AmbiguousRoleSelection(roles.len())),
        AmbiguousRolePolicy::FirstAccountFirstRole => roles
            .first()
            .cloned()
            .ok_or(FederationError::NoRolesAvailable),
    }
}
