use iamgate_core::AppResult;
use iamgate_domain::SamlRole;

/// Decodes a base64 SAML response and extracts the offered roles.
pub trait SamlAssertionDecoder: Send + Sync {
    /// Returns the roles of the role attribute, in document order.
    fn extract_roles(&self, encoded_response: &str) -> AppResult<Vec<SamlRole>>;
}
