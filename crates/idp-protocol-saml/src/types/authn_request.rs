//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use chrono::{DateTime, Utc};

use crate::xml::{self, Element, ParseLimits, XmlError};

use super::{
    expect_root, format_instant, parse_bool, parse_instant, required_attribute, NameIdPolicy,
    SamlBinding, SAMLP_NS, SAML_NS, SAML_VERSION,
};

/// SAML Authentication Request.
///
/// An authentication request message sent from a service provider to an
/// identity provider requesting authentication of a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol as sent.
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: Option<String>,

    /// The URL where the response should be sent.
    pub assertion_consumer_service_url: Option<String>,

    /// The URL the request was addressed to.
    pub destination: Option<String>,

    /// Binding requested for the response, as sent.
    pub protocol_binding: Option<String>,

    /// Name ID policy constraints.
    pub name_id_policy: Option<NameIdPolicy>,

    /// Whether the IdP must authenticate the user directly.
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    pub is_passive: bool,

    /// A human-readable name for the requester.
    pub provider_name: Option<String>,
}

impl AuthnRequest {
    /// Creates a new authentication request.
    #[must_use]
    pub fn new(id: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            version: SAML_VERSION.to_string(),
            issue_instant,
            issuer: None,
            assertion_consumer_service_url: None,
            destination: None,
            protocol_binding: None,
            name_id_policy: None,
            force_authn: false,
            is_passive: false,
            provider_name: None,
        }
    }

    /// Sets the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets the requested name ID format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: impl Into<String>) -> Self {
        self.name_id_policy = Some(NameIdPolicy {
            format: Some(format.into()),
            allow_create: None,
        });
        self
    }

    /// Sets force authentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets passive authentication.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Returns the requested `NameIDPolicy` format URI, if any.
    #[must_use]
    pub fn name_id_format(&self) -> Option<&str> {
        self.name_id_policy.as_ref().and_then(|p| p.format.as_deref())
    }

    /// Parses an `samlp:AuthnRequest` document.
    ///
    /// # Errors
    ///
    /// Returns an [`XmlError`] if the document is malformed or is not an
    /// `AuthnRequest`.
    pub fn from_xml(input: &str, limits: ParseLimits) -> Result<Self, XmlError> {
        Self::from_element(&xml::parse(input, limits)?)
    }

    /// Reads an already parsed `samlp:AuthnRequest` element.
    ///
    /// # Errors
    ///
    /// Returns an [`XmlError`] if required attributes are missing or invalid.
    pub fn from_element(root: &Element) -> Result<Self, XmlError> {
        expect_root(root, SAMLP_NS, "AuthnRequest")?;
        let optional = |name: &str| root.attribute(name).map(str::to_string);
        let flag = |name: &'static str| -> Result<bool, XmlError> {
            root.attribute(name)
                .map(|v| parse_bool(name, v))
                .transpose()
                .map(Option::unwrap_or_default)
        };

        Ok(Self {
            id: required_attribute(root, "ID")?.to_string(),
            version: required_attribute(root, "Version")?.to_string(),
            issue_instant: parse_instant("IssueInstant", required_attribute(root, "IssueInstant")?)?,
            issuer: root.child(SAML_NS, "Issuer").map(|e| e.text().trim().to_string()),
            assertion_consumer_service_url: optional("AssertionConsumerServiceURL"),
            destination: optional("Destination"),
            protocol_binding: optional("ProtocolBinding"),
            name_id_policy: root
                .child(SAMLP_NS, "NameIDPolicy")
                .map(NameIdPolicy::from_element)
                .transpose()?,
            force_authn: flag("ForceAuthn")?,
            is_passive: flag("IsPassive")?,
            provider_name: optional("ProviderName"),
        })
    }

    /// Converts the request to XML.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut element = Element::ns("samlp", "AuthnRequest", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", self.id.as_str())
            .with_attribute("Version", self.version.as_str())
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.as_deref())
            .with_optional_attribute("ProtocolBinding", self.protocol_binding.as_deref())
            .with_optional_attribute(
                "AssertionConsumerServiceURL",
                self.assertion_consumer_service_url.as_deref(),
            )
            .with_optional_attribute("ProviderName", self.provider_name.as_deref());
        if self.force_authn {
            element = element.with_attribute("ForceAuthn", "true");
        }
        if self.is_passive {
            element = element.with_attribute("IsPassive", "true");
        }
        element = element.with_optional_child(
            self.issuer
                .as_deref()
                .map(|issuer| Element::ns("saml", "Issuer", SAML_NS).with_text(issuer)),
        );
        if let Some(policy) = &self.name_id_policy {
            let mut policy_element = Element::ns("samlp", "NameIDPolicy", SAMLP_NS)
                .with_optional_attribute("Format", policy.format.as_deref());
            if let Some(allow_create) = policy.allow_create {
                policy_element =
                    policy_element.with_attribute("AllowCreate", allow_create.to_string());
            }
            element = element.with_child(policy_element);
        }
        element
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameIdFormat;

    const REQUEST: &str = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="id_test" Version="2.0" IssueInstant="2006-01-02T15:00:05Z" Destination="http://idp.local/login" AssertionConsumerServiceURL="http://localhost/saml-test" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" IsPassive="1">
  <saml:Issuer>testsp</saml:Issuer>
  <samlp:NameIDPolicy Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress" AllowCreate="true"/>
</samlp:AuthnRequest>"#;

    #[test]
    fn parses_request_fields() {
        let request = AuthnRequest::from_xml(REQUEST, ParseLimits::default()).unwrap();
        assert_eq!(request.id, "id_test");
        assert_eq!(request.version, "2.0");
        assert_eq!(format_instant(request.issue_instant), "2006-01-02T15:00:05Z");
        assert_eq!(request.issuer.as_deref(), Some("testsp"));
        assert_eq!(request.destination.as_deref(), Some("http://idp.local/login"));
        assert_eq!(
            request.assertion_consumer_service_url.as_deref(),
            Some("http://localhost/saml-test")
        );
        assert_eq!(request.protocol_binding.as_deref(), Some(SamlBinding::HttpPost.uri()));
        assert_eq!(request.name_id_format(), Some(NameIdFormat::Email.uri()));
        assert!(request.is_passive);
        assert!(!request.force_authn);
    }

    #[test]
    fn rejects_other_root_elements() {
        let err = AuthnRequest::from_xml(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#,
            ParseLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, XmlError::UnexpectedElement { .. }));
    }

    #[test]
    fn rejects_missing_or_invalid_attributes() {
        let missing = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" Version="2.0" IssueInstant="2006-01-02T15:00:05Z"/>"#;
        assert!(matches!(
            AuthnRequest::from_xml(missing, ParseLimits::default()),
            Err(XmlError::MissingAttribute("ID"))
        ));

        let bad_instant = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="a" Version="2.0" IssueInstant="soon"/>"#;
        assert!(matches!(
            AuthnRequest::from_xml(bad_instant, ParseLimits::default()),
            Err(XmlError::InvalidValue { name: "IssueInstant", .. })
        ));
    }

    #[test]
    fn element_roundtrip() {
        let request = AuthnRequest::from_xml(REQUEST, ParseLimits::default()).unwrap();
        let reparsed =
            AuthnRequest::from_xml(&request.to_element().to_xml().unwrap(), ParseLimits::default())
                .unwrap();
        assert_eq!(reparsed, request);
    }
}
