use std::fmt::{Display, Formatter};
use std::str::FromStr;

use iamgate_core::{AppError, AppResult, NonEmptyString, WorkspaceId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a platform or workspace role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
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

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for RoleId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid role id '{value}': {error}")))
    }
}

/// Scope tags a role can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// Role granted platform-wide.
    Platform,
    /// Role assignable inside a workspace.
    Workspace,
}

impl RoleType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Workspace => "workspace",
        }
    }
}

impl FromStr for RoleType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "platform" => Ok(Self::Platform),
            "workspace" => Ok(Self::Workspace),
            _ => Err(AppError::Validation(format!(
                "unknown role type value '{value}'"
            ))),
        }
    }
}

/// Role definition with its hierarchy and scope tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    description: Option<String>,
    parent_id: Option<RoleId>,
    predefined: bool,
    role_types: Vec<RoleType>,
}

impl Role {
    /// Creates a validated role. Tags are deduplicated and at least one is
    /// required.
    pub fn new(
        id: RoleId,
        name: impl Into<String>,
        description: Option<String>,
        parent_id: Option<RoleId>,
        predefined: bool,
        role_types: Vec<RoleType>,
    ) -> AppResult<Self> {
        if parent_id == Some(id) {
            return Err(AppError::Validation(
                "role must not be its own parent".to_owned(),
            ));
        }

        let mut unique_types: Vec<RoleType> = Vec::with_capacity(role_types.len());
        for role_type in role_types {
            if !unique_types.contains(&role_type) {
                unique_types.push(role_type);
            }
        }

        if unique_types.is_empty() {
            return Err(AppError::Validation(
                "role must carry at least one role type".to_owned(),
            ));
        }

        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            description,
            parent_id,
            predefined,
            role_types: unique_types,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the parent role, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<RoleId> {
        self.parent_id
    }

    /// Returns whether the role is built in and cannot be deleted.
    #[must_use]
    pub fn predefined(&self) -> bool {
        self.predefined
    }

    /// Returns the scope tags.
    #[must_use]
    pub fn role_types(&self) -> &[RoleType] {
        &self.role_types
    }

    /// Returns whether the role carries the given tag.
    #[must_use]
    pub fn has_type(&self, role_type: RoleType) -> bool {
        self.role_types.contains(&role_type)
    }

    /// Ensures this role can be assigned inside a workspace.
    pub fn ensure_workspace_assignable(&self) -> AppResult<()> {
        if self.has_type(RoleType::Workspace) {
            return Ok(());
        }

        Err(AppError::Validation(format!(
            "role '{}' is not tagged as a workspace role",
            self.name.as_str()
        )))
    }
}

/// Assignment of one role to one subject inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWorkspaceRole {
    /// Identity provider subject of the user.
    pub subject: String,
    /// Workspace the assignment is scoped to.
    pub workspace_id: WorkspaceId,
    /// Assigned role.
    pub role_id: RoleId,
}
