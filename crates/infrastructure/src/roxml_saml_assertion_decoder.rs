//! SAML response decoding and role attribute extraction.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use iamgate_application::SamlAssertionDecoder;
use iamgate_core::{AppError, AppResult, FederationError};
use iamgate_domain::{SAML_ROLE_ATTRIBUTE, SamlRole};
use roxmltree::Document;

/// Extracts offered roles from a SAML response with `roxmltree`.
///
/// Signature validation is left to the cloud provider, which rejects
/// tampered assertions during `AssumeRoleWithSAML`.
#[derive(Debug, Clone)]
pub struct RoxmlSamlAssertionDecoder {
    role_attribute: String,
}

impl RoxmlSamlAssertionDecoder {
    /// Creates a decoder reading the standard role attribute.
    #[must_use]
    pub fn new() -> Self {
        Self {
            role_attribute: SAML_ROLE_ATTRIBUTE.to_owned(),
        }
    }

    /// Overrides the attribute name carrying `role,principal` values.
    #[must_use]
    pub fn with_role_attribute(mut self, role_attribute: impl Into<String>) -> Self {
        self.role_attribute = role_attribute.into();
        self
    }
}

impl Default for RoxmlSamlAssertionDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SamlAssertionDecoder for RoxmlSamlAssertionDecoder {
    fn extract_roles(&self, encoded_response: &str) -> AppResult<Vec<SamlRole>> {
        let xml = decode_response(encoded_response)?;
        let document = Document::parse(&xml)
            .map_err(|error| exchange_failed(format!("invalid saml response xml: {error}")))?;

        attribute_values(&document, self.role_attribute.as_str())
            .iter()
            .map(|value| SamlRole::parse(value).map_err(|error| exchange_failed(error.to_string())))
            .collect()
    }
}

/// The response comes from the identity provider, so a malformed one is a
/// failed exchange rather than a bad caller request.
fn exchange_failed(message: String) -> AppError {
    FederationError::IdentityExchangeFailed(message).into()
}

fn decode_response(encoded: &str) -> AppResult<String> {
    let trimmed = encoded.trim();
    if trimmed.starts_with('<') {
        return Ok(trimmed.to_owned());
    }

    let decoded = STANDARD
        .decode(trimmed.as_bytes())
        .map_err(|error| exchange_failed(format!("saml response base64 decode failed: {error}")))?;

    String::from_utf8(decoded)
        .map_err(|error| exchange_failed(format!("saml response is not utf-8: {error}")))
}

fn attribute_values(document: &Document<'_>, attribute_name: &str) -> Vec<String> {
    let mut values = Vec::new();
    for attribute in document.descendants().filter(|node| {
        node.is_element()
            && node.tag_name().name() == "Attribute"
            && node
                .attribute("Name")
                .or_else(|| node.attribute("FriendlyName"))
                == Some(attribute_name)
    }) {
        for value in attribute
            .children()
            .filter(|node| node.is_element() && node.tag_name().name() == "AttributeValue")
        {
            if let Some(text) = value.text().map(str::trim).filter(|text| !text.is_empty()) {
                values.push(text.to_owned());
            }
        }
    }

    values
}
