use std::collections::HashMap;

use async_trait::async_trait;
use iamgate_application::{RoleDirectory, RoleMappingRepository};
use iamgate_core::{AppError, AppResult, WorkspaceId};
use iamgate_domain::{CspRole, CspRoleId, CspType, Role, RoleCspRoleMapping, RoleId, UserWorkspaceRole};
use tokio::sync::RwLock;

/// In-memory role directory. Assignment and mapping order is insertion order.
///
/// Backs handler and service tests. The servers always wire
/// [`crate::PostgresRoleDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    roles: RwLock<HashMap<RoleId, Role>>,
    csp_roles: RwLock<HashMap<CspRoleId, CspRole>>,
    mappings: RwLock<Vec<RoleCspRoleMapping>>,
    assignments: RwLock<Vec<UserWorkspaceRole>>,
}

impl InMemoryRoleDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn find_user_roles_in_workspace(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
    ) -> AppResult<Vec<RoleId>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|assignment| {
                assignment.subject == subject && assignment.workspace_id == workspace_id
            })
            .map(|assignment| assignment.role_id)
            .collect())
    }

    async fn list_csp_roles_for_role(
        &self,
        role_id: RoleId,
        csp_type: CspType,
    ) -> AppResult<Vec<CspRole>> {
        let mappings = self.mappings.read().await;
        let csp_roles = self.csp_roles.read().await;

        Ok(mappings
            .iter()
            .filter(|mapping| mapping.role_id == role_id && mapping.csp_type == csp_type)
            .filter_map(|mapping| csp_roles.get(&mapping.csp_role_id).cloned())
            .collect())
    }
}

#[async_trait]
impl RoleMappingRepository for InMemoryRoleDirectory {
    async fn save_role(&self, role: &Role) -> AppResult<()> {
        self.roles.write().await.insert(role.id(), role.clone());
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.roles.read().await.get(&role_id).cloned())
    }

    async fn save_csp_role(&self, csp_role: &CspRole) -> AppResult<()> {
        self.csp_roles
            .write()
            .await
            .insert(csp_role.id(), csp_role.clone());
        Ok(())
    }

    async fn add_mapping(&self, mapping: &RoleCspRoleMapping) -> AppResult<()> {
        if !self.roles.read().await.contains_key(&mapping.role_id) {
            return Err(AppError::NotFound(format!(
                "role '{}' not found",
                mapping.role_id
            )));
        }

        if !self
            .csp_roles
            .read()
            .await
            .contains_key(&mapping.csp_role_id)
        {
            return Err(AppError::NotFound(format!(
                "csp role '{}' not found",
                mapping.csp_role_id
            )));
        }

        let mut mappings = self.mappings.write().await;
        if mappings.iter().any(|existing| {
            existing.role_id == mapping.role_id
                && existing.csp_type == mapping.csp_type
                && existing.csp_role_id == mapping.csp_role_id
        }) {
            return Err(AppError::Conflict(format!(
                "role '{}' is already mapped to {} role '{}'",
                mapping.role_id, mapping.csp_type, mapping.csp_role_id
            )));
        }

        mappings.push(mapping.clone());
        Ok(())
    }

    async fn remove_mapping(&self, mapping: &RoleCspRoleMapping) -> AppResult<()> {
        let mut mappings = self.mappings.write().await;
        let before = mappings.len();
        mappings.retain(|existing| {
            !(existing.role_id == mapping.role_id
                && existing.csp_type == mapping.csp_type
                && existing.csp_role_id == mapping.csp_role_id)
        });

        if mappings.len() == before {
            return Err(AppError::NotFound(format!(
                "mapping of role '{}' to {} role '{}' not found",
                mapping.role_id, mapping.csp_type, mapping.csp_role_id
            )));
        }

        Ok(())
    }

    async fn assign_workspace_role(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
        role_id: RoleId,
    ) -> AppResult<()> {
        let roles = self.roles.read().await;
        let role = roles
            .get(&role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' not found")))?;
        role.ensure_workspace_assignable()?;

        let assignment = UserWorkspaceRole {
            subject: subject.to_owned(),
            workspace_id,
            role_id,
        };

        let mut assignments = self.assignments.write().await;
        if !assignments.contains(&assignment) {
            assignments.push(assignment);
        }

        Ok(())
    }

    async fn revoke_workspace_role(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
        role_id: RoleId,
    ) -> AppResult<()> {
        let mut assignments = self.assignments.write().await;
        let before = assignments.len();
        assignments.retain(|assignment| {
            !(assignment.subject == subject
                && assignment.workspace_id == workspace_id
                && assignment.role_id == role_id)
        });

        if assignments.len() == before {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' is not assigned to '{subject}' in workspace '{workspace_id}'"
            )));
        }

        Ok(())
    }
}
