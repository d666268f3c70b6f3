use std::fmt::{Display, Formatter};
use std::str::FromStr;

use iamgate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RoleId;

/// Cloud service providers known to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CspType {
    /// Amazon Web Services.
    Aws,
    /// Alibaba Cloud.
    Alibaba,
    /// Google Cloud Platform.
    Gcp,
    /// Microsoft Azure.
    Azure,
}

impl CspType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Alibaba => "alibaba",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
        }
    }

    /// Returns all known providers.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[CspType] = &[CspType::Aws, CspType::Alibaba, CspType::Gcp, CspType::Azure];

        ALL
    }

    /// Parses a transport value, accepting any letter case.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value.trim().to_ascii_lowercase().as_str())
    }
}

impl Display for CspType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for CspType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "aws" => Ok(Self::Aws),
            "alibaba" => Ok(Self::Alibaba),
            "gcp" => Ok(Self::Gcp),
            "azure" => Ok(Self::Azure),
            _ => Err(AppError::Validation(format!(
                "unknown csp type value '{value}'"
            ))),
        }
    }
}

/// Unique identifier for a cloud-side role record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CspRoleId(Uuid);

impl CspRoleId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CspRoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CspRoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Cloud-side role that federated users may assume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CspRole {
    id: CspRoleId,
    csp_type: CspType,
    iam_identifier: NonEmptyString,
    idp_identifier: NonEmptyString,
    description: Option<String>,
}

impl CspRole {
    /// Creates a validated CSP role.
    pub fn new(
        id: CspRoleId,
        csp_type: CspType,
        iam_identifier: impl Into<String>,
        idp_identifier: impl Into<String>,
        description: Option<String>,
    ) -> AppResult<Self> {
        let iam_identifier = NonEmptyString::new(iam_identifier).map_err(|_| {
            AppError::Validation("csp role iam identifier must not be empty".to_owned())
        })?;
        let idp_identifier = NonEmptyString::new(idp_identifier).map_err(|_| {
            AppError::Validation("csp role idp identifier must not be empty".to_owned())
        })?;

        Ok(Self {
            id,
            csp_type,
            iam_identifier,
            idp_identifier,
            description,
        })
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> CspRoleId {
        self.id
    }

    /// Returns the provider this role belongs to.
    #[must_use]
    pub fn csp_type(&self) -> CspType {
        self.csp_type
    }

    /// Returns the cloud-side role ARN or identifier to assume.
    #[must_use]
    pub fn iam_identifier(&self) -> &str {
        self.iam_identifier.as_str()
    }

    /// Returns the trust-provider identifier registered on the cloud side.
    #[must_use]
    pub fn idp_identifier(&self) -> &str {
        self.idp_identifier.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Link between a platform role and a CSP role, unique on
/// `(role_id, csp_type, csp_role_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCspRoleMapping {
    /// Mapped platform role.
    pub role_id: RoleId,
    /// Provider the mapping applies to.
    pub csp_type: CspType,
    /// Mapped cloud-side role.
    pub csp_role_id: CspRoleId,
    /// Optional operator note.
    pub description: Option<String>,
}

impl RoleCspRoleMapping {
    /// Creates a mapping scoped to the CSP role's provider.
    #[must_use]
    pub fn new(role_id: RoleId, csp_role: &CspRole, description: Option<String>) -> Self {
        Self {
            role_id,
            csp_type: csp_role.csp_type(),
            csp_role_id: csp_role.id(),
            description,
        }
    }
}
