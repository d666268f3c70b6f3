use async_trait::async_trait;
use iamgate_core::{AppResult, WorkspaceId};
use iamgate_domain::{CspRole, CspType, Role, RoleCspRoleMapping, RoleId};

/// Read port over workspace role assignments and CSP role mappings.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Lists the roles a subject holds in a workspace, oldest assignment first.
    async fn find_user_roles_in_workspace(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
    ) -> AppResult<Vec<RoleId>>;

    /// Lists CSP roles mapped to a role for one provider, in persisted order.
    async fn list_csp_roles_for_role(
        &self,
        role_id: RoleId,
        csp_type: CspType,
    ) -> AppResult<Vec<CspRole>>;
}

/// Write port for roles, CSP roles, mappings and workspace assignments.
#[async_trait]
pub trait RoleMappingRepository: Send + Sync {
    /// Inserts or updates one role.
    async fn save_role(&self, role: &Role) -> AppResult<()>;

    /// Finds one role by identifier.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Inserts or updates one CSP role.
    async fn save_csp_role(&self, csp_role: &CspRole) -> AppResult<()>;

    /// Adds one mapping. Fails with `NotFound` for unknown roles and
    /// `Conflict` for duplicates.
    async fn add_mapping(&self, mapping: &RoleCspRoleMapping) -> AppResult<()>;

    /// Removes one mapping. Fails with `NotFound` when absent.
    async fn remove_mapping(&self, mapping: &RoleCspRoleMapping) -> AppResult<()>;

    /// Assigns a workspace-tagged role to a subject.
    async fn assign_workspace_role(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
        role_id: RoleId,
    ) -> AppResult<()>;

    /// Revokes one workspace role assignment.
    async fn revoke_workspace_role(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
        role_id: RoleId,
    ) -> AppResult<()>;
}
