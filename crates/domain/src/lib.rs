//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod credential;
mod csp;
mod role;
mod saml;

pub use credential::{
    AuthType, CredentialId, CredentialKey, IssuedCredential, ROLE_SESSION_NAME_MAX_LENGTH,
    RoleSessionName, TempCredential,
};
pub use csp::{CspRole, CspRoleId, CspType, RoleCspRoleMapping};
pub use role::{Role, RoleId, RoleType, UserWorkspaceRole};
pub use saml::{AmbiguousRolePolicy, SAML_ROLE_ATTRIBUTE, SamlRole, select_saml_role};
