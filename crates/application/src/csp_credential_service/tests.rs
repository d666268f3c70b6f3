use std::sync::Arc;
use std::sync::atomic::Ordering;

use iamgate_core::{AppError, FederationError, UserIdentity, WorkspaceId};
use iamgate_domain::{AmbiguousRolePolicy, AuthType, CspType, RoleId, SamlRole};

use super::{
    CspCredentialRequest, CspCredentialService, SamlCredentialRequest, SamlIssuanceSettings,
};
use crate::test_support::{
    FakeCspProvider, FakeIdentityProvider, FakeRoleDirectory, FakeSamlDecoder,
    FakeTempCredentialRepository, OIDC_PROVIDER_ARN, OPS_ROLE_ARN, ops_csp_role,
};
use crate::{
    BridgeCredential, CspAssumeRoleClient, IdentityBridge, OidcBridgeMode, RoleMappingResolver,
    TempCredentialQuery, TemporaryCredentialCache,
};

struct Fixture {
    service: CspCredentialService,
    provider: Arc<FakeCspProvider>,
    identity_provider: Arc<FakeIdentityProvider>,
    repository: Arc<FakeTempCredentialRepository>,
    workspace_id: WorkspaceId,
    role_id: RoleId,
}

fn actor() -> UserIdentity {
    UserIdentity::new("alice", "Alice", Some("alice@example.com".to_owned()))
}

fn fixture(mapped: bool, saml_roles: Vec<SamlRole>) -> Fixture {
    let workspace_id = WorkspaceId::new();
    let role_id = RoleId::new();
    let directory = FakeRoleDirectory {
        assignments: vec![("alice".to_owned(), workspace_id, role_id)],
        mappings: if mapped {
            vec![(role_id, ops_csp_role())]
        } else {
            Vec::new()
        },
    };

    let provider = Arc::new(FakeCspProvider::new(CspType::Aws));
    let repository = Arc::new(FakeTempCredentialRepository::default());
    let identity_provider = Arc::new(FakeIdentityProvider::default());
    let bridge = IdentityBridge::new(
        identity_provider.clone(),
        Arc::new(FakeSamlDecoder { roles: saml_roles }),
        OidcBridgeMode::ServiceAccount,
    );

    let service = CspCredentialService::new(
        RoleMappingResolver::new(Arc::new(directory)),
        bridge,
        CspAssumeRoleClient::new(vec![provider.clone()]),
        TemporaryCredentialCache::new(repository.clone(), 60),
        SamlIssuanceSettings {
            login_url: "https://idp.example.com/realms/main/protocol/saml/clients/aws".to_owned(),
            session_duration_seconds: Some(3_600),
            ambiguous_role_policy: AmbiguousRolePolicy::FailClosed,
        },
    );

    Fixture {
        service,
        provider,
        identity_provider,
        repository,
        workspace_id,
        role_id,
    }
}

fn saml_role(name: &str) -> SamlRole {
    SamlRole {
        role_arn: format!("arn:aws:iam::111111111111:role/{name}"),
        principal_arn: "arn:aws:iam::111111111111:saml-provider/idp".to_owned(),
    }
}

#[tokio::test]
async fn aws_web_identity_issuance_end_to_end() {
    let fixture = fixture(true, Vec::new());

    let result = fixture
        .service
        .issue_credentials(
            &actor(),
            "rpt-token",
            CspCredentialRequest {
                workspace_id: fixture.workspace_id,
                csp_type: CspType::Aws,
                region: " us-east-1 ".to_owned(),
            },
        )
        .await;

    let Ok(credential) = result else {
        panic!("issuance should succeed");
    };
    assert_eq!(credential.key.provider, CspType::Aws);
    assert_eq!(credential.key.auth_type, AuthType::OidcWebIdentity);
    assert_eq!(credential.key.region, "us-east-1");
    assert_eq!(credential.key.role_id, Some(fixture.role_id));
    assert_eq!(credential.key.issued_by, "alice");
    assert!(credential.is_active);

    let requests = fixture.provider.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].role_arn, OPS_ROLE_ARN);
    assert_eq!(requests[0].trust_provider_arn, OIDC_PROVIDER_ARN);
    assert_eq!(
        requests[0].bridge,
        BridgeCredential::WebIdentity {
            token: "service-account-token".to_owned()
        }
    );
}

#[tokio::test]
async fn repeated_issuance_is_served_from_cache() {
    let fixture = fixture(true, Vec::new());
    let request = CspCredentialRequest {
        workspace_id: fixture.workspace_id,
        csp_type: CspType::Aws,
        region: "us-east-1".to_owned(),
    };

    let first = fixture
        .service
        .issue_credentials(&actor(), "rpt-token", request.clone())
        .await;
    let second = fixture
        .service
        .issue_credentials(&actor(), "rpt-token", request)
        .await;

    assert!(matches!((first, second), (Ok(a), Ok(b)) if a.id == b.id));
    assert_eq!(fixture.provider.call_count(), 1);
}

#[tokio::test]
async fn missing_mapping_never_calls_sts() {
    let fixture = fixture(false, Vec::new());

    let result = fixture
        .service
        .issue_credentials(
            &actor(),
            "rpt-token",
            CspCredentialRequest {
                workspace_id: fixture.workspace_id,
                csp_type: CspType::Aws,
                region: "us-east-1".to_owned(),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(AppError::Federation(FederationError::NoCspRoleMapping { .. }))
    ));
    assert_eq!(fixture.provider.call_count(), 0);
    assert!(fixture.repository.rows.lock().await.is_empty());
}

#[tokio::test]
async fn unsupported_provider_is_rejected_before_resolution() {
    let fixture = fixture(true, Vec::new());

    let result = fixture
        .service
        .issue_credentials(
            &actor(),
            "rpt-token",
            CspCredentialRequest {
                workspace_id: fixture.workspace_id,
                csp_type: CspType::Azure,
                region: "westeurope".to_owned(),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(AppError::Federation(FederationError::UnsupportedCspType(_)))
    ));
}

#[tokio::test]
async fn blank_region_is_a_validation_error() {
    let fixture = fixture(true, Vec::new());

    let result = fixture
        .service
        .issue_credentials(
            &actor(),
            "rpt-token",
            CspCredentialRequest {
                workspace_id: fixture.workspace_id,
                csp_type: CspType::Aws,
                region: "  ".to_owned(),
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn saml_issuance_assumes_selected_role() {
    let fixture = fixture(false, vec![saml_role("Ops"), saml_role("Audit")]);

    let result = fixture
        .service
        .issue_saml_credentials(
            &actor(),
            SamlCredentialRequest {
                csp_type: CspType::Aws,
                region: "eu-west-1".to_owned(),
                username: "alice".to_owned(),
                password: "correct-horse".to_owned(),
                role_arn: Some("arn:aws:iam::111111111111:role/Audit".to_owned()),
            },
        )
        .await;

    let Ok(credential) = result else {
        panic!("SAML issuance should succeed");
    };
    assert_eq!(credential.key.auth_type, AuthType::Saml);
    assert_eq!(credential.key.role_id, None);

    let requests = fixture.provider.requests.lock().await;
    assert_eq!(requests[0].role_arn, "arn:aws:iam::111111111111:role/Audit");
    assert_eq!(
        requests[0].trust_provider_arn,
        "arn:aws:iam::111111111111:saml-provider/idp"
    );
    assert_eq!(requests[0].duration_seconds, Some(3_600));
    assert_eq!(requests[0].bridge.kind(), "saml");
}

#[tokio::test]
async fn saml_issuance_with_ambiguous_roles_fails_closed() {
    let fixture = fixture(false, vec![saml_role("Ops"), saml_role("Audit")]);

    let result = fixture
        .service
        .issue_saml_credentials(
            &actor(),
            SamlCredentialRequest {
                csp_type: CspType::Aws,
                region: "eu-west-1".to_owned(),
                username: "alice".to_owned(),
                password: "correct-horse".to_owned(),
                role_arn: None,
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(AppError::Federation(FederationError::AmbiguousRoleSelection(2)))
    ));
    assert_eq!(fixture.provider.call_count(), 0);
}

fn saml_request(role: Option<&str>, password: &str) -> SamlCredentialRequest {
    SamlCredentialRequest {
        csp_type: CspType::Aws,
        region: "eu-west-1".to_owned(),
        username: "alice".to_owned(),
        password: password.to_owned(),
        role_arn: role.map(|name| format!("arn:aws:iam::111111111111:role/{name}")),
    }
}

#[tokio::test]
async fn saml_cache_is_scoped_to_the_pinned_role() {
    let fixture = fixture(false, vec![saml_role("Ops"), saml_role("Audit")]);

    let audit = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Audit"), "correct-horse"))
        .await;
    let ops = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Ops"), "correct-horse"))
        .await;
    let audit_again = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Audit"), "correct-horse"))
        .await;

    let (Ok(audit), Ok(ops), Ok(audit_again)) = (audit, ops, audit_again) else {
        panic!("pinned SAML issuances should succeed");
    };
    assert_ne!(audit.id, ops.id);
    assert_eq!(audit.id, audit_again.id);
    assert_eq!(
        ops.key.role_arn.as_deref(),
        Some("arn:aws:iam::111111111111:role/Ops")
    );

    let requests = fixture.provider.requests.lock().await;
    let assumed: Vec<&str> = requests.iter().map(|request| request.role_arn.as_str()).collect();
    assert_eq!(
        assumed,
        vec![
            "arn:aws:iam::111111111111:role/Audit",
            "arn:aws:iam::111111111111:role/Ops",
        ]
    );
    assert_eq!(fixture.identity_provider.saml_logins.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn saml_pin_missing_from_assertion_fails_even_with_cached_credential() {
    let fixture = fixture(false, vec![saml_role("Ops"), saml_role("Audit")]);
    let cached = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Audit"), "correct-horse"))
        .await;
    assert!(cached.is_ok());

    let missing = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Missing"), "correct-horse"))
        .await;

    assert!(matches!(
        missing,
        Err(AppError::Federation(FederationError::RoleNotFound(_)))
    ));
    assert_eq!(fixture.provider.call_count(), 1);
}

#[tokio::test]
async fn saml_wrong_password_is_rejected_even_with_cached_credential() {
    let fixture = fixture(false, vec![saml_role("Audit")]);
    let cached = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Audit"), "correct-horse"))
        .await;
    assert!(cached.is_ok());

    let rejected = fixture
        .service
        .issue_saml_credentials(&actor(), saml_request(Some("Audit"), "wrong"))
        .await;

    assert!(matches!(
        rejected,
        Err(AppError::Federation(FederationError::IdentityRejected(_)))
    ));
    assert_eq!(fixture.provider.call_count(), 1);
}

#[tokio::test]
async fn deactivated_credential_is_excluded_from_active_listing() {
    let fixture = fixture(true, Vec::new());
    let issued = fixture
        .service
        .issue_credentials(
            &actor(),
            "rpt-token",
            CspCredentialRequest {
                workspace_id: fixture.workspace_id,
                csp_type: CspType::Aws,
                region: "us-east-1".to_owned(),
            },
        )
        .await;
    let Ok(issued) = issued else {
        panic!("issuance should succeed");
    };

    assert!(fixture.service.deactivate_credential(issued.id).await.is_ok());
    let listed = fixture
        .service
        .list_credentials(&TempCredentialQuery {
            active_only: true,
            ..TempCredentialQuery::default()
        })
        .await;

    assert!(matches!(listed, Ok(ref rows) if rows.is_empty()));
}
