//! Workspace role to CSP role resolution.

use std::sync::Arc;

use iamgate_core::{AppResult, FederationError, WorkspaceId};
use iamgate_domain::{CspRole, CspType, RoleId};

use crate::RoleDirectory;

/// CSP role selected for a caller, with the workspace role that granted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCspRole {
    /// Workspace role whose mapping was used.
    pub role_id: RoleId,
    /// Mapped cloud role.
    pub csp_role: CspRole,
}

/// Resolves which cloud role a caller may assume in a workspace.
#[derive(Clone)]
pub struct RoleMappingResolver {
    directory: Arc<dyn RoleDirectory>,
}

impl RoleMappingResolver {
    /// Creates a resolver over a role directory.
    #[must_use]
    pub fn new(directory: Arc<dyn RoleDirectory>) -> Self {
        Self { directory }
    }

    /// Returns the first mapping of the first role, in assignment order, that
    /// has any mapping for the provider.
    pub async fn resolve(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
        csp_type: CspType,
    ) -> AppResult<ResolvedCspRole> {
        let role_ids = self
            .directory
            .find_user_roles_in_workspace(subject, workspace_id)
            .await?;

        if role_ids.is_empty() {
            return Err(FederationError::RoleNotAssigned {
                subject: subject.to_owned(),
                workspace_id: workspace_id.to_string(),
            }
            .into());
        }

        for role_id in role_ids {
            let csp_roles = self
                .directory
                .list_csp_roles_for_role(role_id, csp_type)
                .await?;

            if let Some(csp_role) = csp_roles.into_iter().next() {
                return Ok(ResolvedCspRole { role_id, csp_role });
            }
        }

        Err(FederationError::NoCspRoleMapping {
            csp_type: csp_type.to_string(),
            workspace_id: workspace_id.to_string(),
        }
        .into())
    }
}
