use thiserror::Error;

/// Failures raised while resolving roles and federating identities into
/// cloud credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederationError {
    /// The caller holds no role in the requested workspace.
    #[error("no role assigned to '{subject}' in workspace '{workspace_id}'")]
    RoleNotAssigned {
        /// Subject that requested credentials.
        subject: String,
        /// Workspace the lookup was scoped to.
        workspace_id: String,
    },

    /// None of the caller's roles is mapped to a role of the requested CSP.
    #[error("no {csp_type} role mapping found for workspace '{workspace_id}'")]
    NoCspRoleMapping {
        /// Requested cloud service provider.
        csp_type: String,
        /// Workspace the lookup was scoped to.
        workspace_id: String,
    },

    /// The requested CSP has no federation provider configured.
    #[error("unsupported CSP type '{0}'")]
    UnsupportedCspType(String),

    /// The identity provider rejected the presented credentials or token.
    #[error("identity provider rejected the request: {0}")]
    IdentityRejected(String),

    /// The identity provider could not be reached or failed unexpectedly.
    #[error("identity exchange failed: {0}")]
    IdentityExchangeFailed(String),

    /// A pinned SAML role is not present in the assertion.
    #[error("role '{0}' not found in SAML assertion")]
    RoleNotFound(String),

    /// The SAML assertion offered no role attribute values.
    #[error("no roles available in SAML assertion")]
    NoRolesAvailable,

    /// Several SAML roles were offered and none was pinned.
    #[error("ambiguous role selection: {0} roles offered and none configured")]
    AmbiguousRoleSelection(usize),

    /// The cloud provider refused to assume the role.
    #[error("AssumeRoleFailed: role={role_arn}: {reason}")]
    AssumeRoleFailed {
        /// Target role identifier.
        role_arn: String,
        /// Provider error detail, never containing secret material.
        reason: String,
    },
}

impl FederationError {
    /// Returns the message that is safe to show to external callers.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::IdentityRejected(_) => "identity provider rejected the request".to_owned(),
            Self::IdentityExchangeFailed(_) => "identity exchange failed".to_owned(),
            Self::AssumeRoleFailed { .. } => {
                "cloud provider rejected the role assumption".to_owned()
            }
            other => other.to_string(),
        }
    }
}
