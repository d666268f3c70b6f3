//! PostgreSQL-backed role directory and CSP role mapping store.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use iamgate_application::{RoleDirectory, RoleMappingRepository};
use iamgate_core::{AppError, AppResult, WorkspaceId};
use iamgate_domain::{CspRole, CspRoleId, CspType, Role, RoleCspRoleMapping, RoleId, RoleType};

/// PostgreSQL implementation of the role directory ports.
#[derive(Clone)]
pub struct PostgresRoleDirectory {
    pool: PgPool,
}

impl PostgresRoleDirectory {
    /// Creates a directory with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn role_types(&self, role_id: RoleId) -> AppResult<Vec<RoleType>> {
        let values: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT role_type
            FROM role_types
            WHERE role_id = $1
            ORDER BY role_type
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load role types for role '{role_id}': {error}"
            ))
        })?;

        values
            .iter()
            .map(|value| value.parse::<RoleType>())
            .collect()
    }

    async fn ensure_exists(&self, table: Table, id: Uuid) -> AppResult<()> {
        let exists: bool = sqlx::query_scalar(table.exists_query())
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to look up {} '{id}': {error}", table.label()))
            })?;

        if !exists {
            return Err(AppError::NotFound(format!("{} '{id}' not found", table.label())));
        }

        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Table {
    Roles,
    CspRoles,
}

impl Table {
    fn exists_query(self) -> &'static str {
        match self {
            Self::Roles => "SELECT EXISTS (SELECT 1 FROM roles WHERE id = $1)",
            Self::CspRoles => "SELECT EXISTS (SELECT 1 FROM csp_roles WHERE id = $1)",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Roles => "role",
            Self::CspRoles => "csp role",
        }
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    parent_id: Option<Uuid>,
    predefined: bool,
}

#[derive(FromRow)]
struct CspRoleRow {
    id: Uuid,
    csp_type: String,
    iam_identifier: String,
    idp_identifier: String,
    description: Option<String>,
}

impl CspRoleRow {
    fn into_domain(self) -> AppResult<CspRole> {
        CspRole::new(
            CspRoleId::from_uuid(self.id),
            self.csp_type.parse::<CspType>()?,
            self.iam_identifier,
            self.idp_identifier,
            self.description,
        )
    }
}

#[async_trait]
impl RoleDirectory for PostgresRoleDirectory {
    async fn find_user_roles_in_workspace(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
    ) -> AppResult<Vec<RoleId>> {
        let role_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT role_id
            FROM user_workspace_roles
            WHERE subject = $1 AND workspace_id = $2
            ORDER BY assigned_at ASC, id ASC
            "#,
        )
        .bind(subject)
        .bind(workspace_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list roles for '{subject}' in workspace '{workspace_id}': {error}"
            ))
        })?;

        Ok(role_ids.into_iter().map(RoleId::from_uuid).collect())
    }

    async fn list_csp_roles_for_role(
        &self,
        role_id: RoleId,
        csp_type: CspType,
    ) -> AppResult<Vec<CspRole>> {
        let rows = sqlx::query_as::<_, CspRoleRow>(
            r#"
            SELECT csp.id, csp.csp_type, csp.iam_identifier, csp.idp_identifier, csp.description
            FROM role_csp_role_mappings mapping
            INNER JOIN csp_roles csp ON csp.id = mapping.csp_role_id
            WHERE mapping.role_id = $1 AND mapping.csp_type = $2
            ORDER BY mapping.created_at ASC, mapping.id ASC
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(csp_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list {csp_type} roles for role '{role_id}': {error}"
            ))
        })?;

        rows.into_iter().map(CspRoleRow::into_domain).collect()
    }
}

#[async_trait]
impl RoleMappingRepository for PostgresRoleDirectory {
    async fn save_role(&self, role: &Role) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start role save transaction for '{}': {error}",
                role.id()
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, parent_id, predefined)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                parent_id = EXCLUDED.parent_id,
                predefined = EXCLUDED.predefined,
                updated_at = now()
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.name().as_str())
        .bind(role.description())
        .bind(role.parent_id().map(|parent_id| parent_id.as_uuid()))
        .bind(role.predefined())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to save role '{}': {error}", role.id()))
        })?;

        sqlx::query("DELETE FROM role_types WHERE role_id = $1")
            .bind(role.id().as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to reset role types for '{}': {error}",
                    role.id()
                ))
            })?;

        for role_type in role.role_types() {
            sqlx::query("INSERT INTO role_types (role_id, role_type) VALUES ($1, $2)")
                .bind(role.id().as_uuid())
                .bind(role_type.as_str())
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!(
                        "failed to save role type '{}' for '{}': {error}",
                        role_type.as_str(),
                        role.id()
                    ))
                })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit role save for '{}': {error}",
                role.id()
            ))
        })
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, description, parent_id, predefined
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find role '{role_id}': {error}"))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role_types = self.role_types(role_id).await?;
        Role::new(
            RoleId::from_uuid(row.id),
            row.name,
            row.description,
            row.parent_id.map(RoleId::from_uuid),
            row.predefined,
            role_types,
        )
        .map(Some)
    }

    async fn save_csp_role(&self, csp_role: &CspRole) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO csp_roles (id, csp_type, iam_identifier, idp_identifier, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET csp_type = EXCLUDED.csp_type,
                iam_identifier = EXCLUDED.iam_identifier,
                idp_identifier = EXCLUDED.idp_identifier,
                description = EXCLUDED.description,
                updated_at = now()
            "#,
        )
        .bind(csp_role.id().as_uuid())
        .bind(csp_role.csp_type().as_str())
        .bind(csp_role.iam_identifier())
        .bind(csp_role.idp_identifier())
        .bind(csp_role.description())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save csp role '{}': {error}",
                csp_role.id().as_uuid()
            ))
        })?;

        Ok(())
    }

    async fn add_mapping(&self, mapping: &RoleCspRoleMapping) -> AppResult<()> {
        self.ensure_exists(Table::Roles, mapping.role_id.as_uuid())
            .await?;
        self.ensure_exists(Table::CspRoles, mapping.csp_role_id.as_uuid())
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO role_csp_role_mappings (role_id, csp_type, csp_role_id, description)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(mapping.role_id.as_uuid())
        .bind(mapping.csp_type.as_str())
        .bind(mapping.csp_role_id.as_uuid())
        .bind(mapping.description.as_deref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) => {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23505")
                {
                    return Err(AppError::Conflict(format!(
                        "role '{}' is already mapped to {} role '{}'",
                        mapping.role_id,
                        mapping.csp_type,
                        mapping.csp_role_id.as_uuid()
                    )));
                }

                Err(AppError::Internal(format!(
                    "failed to add csp role mapping for role '{}': {error}",
                    mapping.role_id
                )))
            }
        }
    }

    async fn remove_mapping(&self, mapping: &RoleCspRoleMapping) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_csp_role_mappings
            WHERE role_id = $1 AND csp_type = $2 AND csp_role_id = $3
            "#,
        )
        .bind(mapping.role_id.as_uuid())
        .bind(mapping.csp_type.as_str())
        .bind(mapping.csp_role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to remove csp role mapping for role '{}': {error}",
                mapping.role_id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "mapping of role '{}' to {} role '{}' not found",
                mapping.role_id,
                mapping.csp_type,
                mapping.csp_role_id.as_uuid()
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
        let role = self
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' not found")))?;
        role.ensure_workspace_assignable()?;

        sqlx::query(
            r#"
            INSERT INTO user_workspace_roles (subject, workspace_id, role_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject, workspace_id, role_id) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(workspace_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to assign role '{role_id}' to '{subject}' in workspace '{workspace_id}': {error}"
            ))
        })?;

        Ok(())
    }

    async fn revoke_workspace_role(
        &self,
        subject: &str,
        workspace_id: WorkspaceId,
        role_id: RoleId,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_workspace_roles
            WHERE subject = $1 AND workspace_id = $2 AND role_id = $3
            "#,
        )
        .bind(subject)
        .bind(workspace_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to revoke role '{role_id}' from '{subject}' in workspace '{workspace_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' is not assigned to '{subject}' in workspace '{workspace_id}'"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
