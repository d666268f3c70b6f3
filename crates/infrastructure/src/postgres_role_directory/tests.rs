use iamgate_application::{RoleDirectory, RoleMappingRepository};
use iamgate_core::{AppError, WorkspaceId};
use iamgate_domain::{CspRole, CspRoleId, CspType, Role, RoleCspRoleMapping, RoleId, RoleType};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresRoleDirectory;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres role directory tests: {error}");
    }

    Some(pool)
}

fn workspace_role(name: &str) -> Role {
    match Role::new(
        RoleId::new(),
        name,
        None,
        None,
        false,
        vec![RoleType::Workspace],
    ) {
        Ok(role) => role,
        Err(error) => panic!("fixture role must be valid: {error}"),
    }
}

fn aws_role(name: &str) -> CspRole {
    match CspRole::new(
        CspRoleId::new(),
        CspType::Aws,
        format!("arn:aws:iam::111111111111:role/{name}"),
        "arn:aws:iam::111111111111:oidc-provider/idp.example.com",
        None,
    ) {
        Ok(role) => role,
        Err(error) => panic!("fixture csp role must be valid: {error}"),
    }
}

#[tokio::test]
async fn resolves_roles_and_mappings_in_persisted_order() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let directory = PostgresRoleDirectory::new(pool);
    let workspace_id = WorkspaceId::new();
    let subject = format!("subject-{}", RoleId::new());
    let operators = workspace_role("operators");
    let auditors = workspace_role("auditors");
    let first = aws_role("Ops");
    let second = aws_role("OpsReadOnly");

    for role in [&operators, &auditors] {
        assert!(directory.save_role(role).await.is_ok());
    }
    for csp_role in [&first, &second] {
        assert!(directory.save_csp_role(csp_role).await.is_ok());
    }
    assert!(
        directory
            .add_mapping(&RoleCspRoleMapping::new(operators.id(), &first, None))
            .await
            .is_ok()
    );
    assert!(
        directory
            .add_mapping(&RoleCspRoleMapping::new(operators.id(), &second, None))
            .await
            .is_ok()
    );
    assert!(
        directory
            .assign_workspace_role(subject.as_str(), workspace_id, operators.id())
            .await
            .is_ok()
    );
    assert!(
        directory
            .assign_workspace_role(subject.as_str(), workspace_id, auditors.id())
            .await
            .is_ok()
    );

    let roles = directory
        .find_user_roles_in_workspace(subject.as_str(), workspace_id)
        .await;
    assert!(matches!(roles, Ok(ref ids) if ids == &vec![operators.id(), auditors.id()]));

    let mapped = directory
        .list_csp_roles_for_role(operators.id(), CspType::Aws)
        .await;
    assert!(matches!(mapped, Ok(ref roles) if roles == &vec![first.clone(), second.clone()]));

    let duplicate = directory
        .add_mapping(&RoleCspRoleMapping::new(operators.id(), &first, None))
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    assert!(
        directory
            .revoke_workspace_role(subject.as_str(), workspace_id, operators.id())
            .await
            .is_ok()
    );
    let remaining = directory
        .find_user_roles_in_workspace(subject.as_str(), workspace_id)
        .await;
    assert!(matches!(remaining, Ok(ref ids) if ids == &vec![auditors.id()]));
}

#[tokio::test]
async fn mapping_requires_existing_role() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let directory = PostgresRoleDirectory::new(pool);
    let csp_role = aws_role("Orphan");
    assert!(directory.save_csp_role(&csp_role).await.is_ok());

    let result = directory
        .add_mapping(&RoleCspRoleMapping::new(RoleId::new(), &csp_role, None))
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn platform_roles_cannot_be_assigned_to_workspaces() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let directory = PostgresRoleDirectory::new(pool);
    let platform = match Role::new(
        RoleId::new(),
        "platform-admin",
        None,
        None,
        true,
        vec![RoleType::Platform],
    ) {
        Ok(role) => role,
        Err(error) => panic!("fixture role must be valid: {error}"),
    };
    assert!(directory.save_role(&platform).await.is_ok());

    let stored = directory.find_role(platform.id()).await;
    assert!(matches!(stored, Ok(Some(ref role)) if role == &platform));

    let result = directory
        .assign_workspace_role("alice", WorkspaceId::new(), platform.id())
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}
