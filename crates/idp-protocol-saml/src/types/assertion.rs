//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Utc};

use crate::xml::Element;

use super::{
    format_instant, issuer_element, AttributeNameFormat, NameId, AUTHN_CONTEXT_UNSPECIFIED,
    SAML_NS, SAML_VERSION, SUBJECT_CONFIRMATION_BEARER, XSI_NS, XS_NS,
};

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// Enveloped signature, placed right after the issuer.
    pub signature: Option<Element>,

    /// The subject of this assertion.
    pub subject: Subject,

    /// Conditions that must be evaluated for the assertion to be valid.
    pub conditions: Conditions,

    /// Authentication statement describing how the subject authenticated.
    pub authn_statement: AuthnStatement,

    /// Attributes about the subject.
    pub attributes: Vec<Attribute>,
}

impl Assertion {
    /// Converts the assertion to XML, including the signature when present.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let attribute_statement = (!self.attributes.is_empty()).then(|| {
            self.attributes
                .iter()
                .map(Attribute::to_element)
                .fold(Element::ns("saml", "AttributeStatement", SAML_NS), Element::with_child)
        });

        Element::ns("saml", "Assertion", SAML_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", self.id.as_str())
            .with_attribute("Version", SAML_VERSION)
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_child(issuer_element(&self.issuer))
            .with_optional_child(self.signature.clone())
            .with_child(self.subject.to_element())
            .with_child(self.conditions.to_element())
            .with_child(self.authn_statement.to_element())
            .with_optional_child(attribute_statement)
    }
}

/// SAML Subject with a single bearer confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// The name identifier.
    pub name_id: NameId,

    /// Bearer confirmation data.
    pub confirmation: SubjectConfirmationData,
}

impl Subject {
    fn to_element(&self) -> Element {
        Element::ns("saml", "Subject", SAML_NS)
            .with_child(self.name_id.to_element())
            .with_child(
                Element::ns("saml", "SubjectConfirmation", SAML_NS)
                    .with_attribute("Method", SUBJECT_CONFIRMATION_BEARER)
                    .with_child(self.confirmation.to_element()),
            )
    }
}

/// Subject confirmation data for the bearer method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfirmationData {
    /// The request this assertion answers.
    pub in_response_to: Option<String>,

    /// Time after which the subject can no longer be confirmed.
    pub not_on_or_after: DateTime<Utc>,

    /// The URL the assertion is delivered to.
    pub recipient: String,
}

impl SubjectConfirmationData {
    fn to_element(&self) -> Element {
        Element::ns("saml", "SubjectConfirmationData", SAML_NS)
            .with_optional_attribute("InResponseTo", self.in_response_to.as_deref())
            .with_attribute("NotOnOrAfter", format_instant(self.not_on_or_after))
            .with_attribute("Recipient", self.recipient.as_str())
    }
}

/// Validity window and audience restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    /// Start of validity.
    pub not_before: DateTime<Utc>,

    /// End of validity.
    pub not_on_or_after: DateTime<Utc>,

    /// The single intended audience.
    pub audience: String,
}

impl Conditions {
    fn to_element(&self) -> Element {
        Element::ns("saml", "Conditions", SAML_NS)
            .with_attribute("NotBefore", format_instant(self.not_before))
            .with_attribute("NotOnOrAfter", format_instant(self.not_on_or_after))
            .with_child(
                Element::ns("saml", "AudienceRestriction", SAML_NS)
                    .with_child(Element::ns("saml", "Audience", SAML_NS).with_text(self.audience.as_str())),
            )
    }
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    /// When the user authenticated.
    pub authn_instant: DateTime<Utc>,

    /// IdP session identifier.
    pub session_index: String,

    /// Authentication context class reference.
    pub authn_context_class_ref: String,
}

impl AuthnStatement {
    /// Creates a statement with the unspecified context class.
    #[must_use]
    pub fn new(authn_instant: DateTime<Utc>, session_index: impl Into<String>) -> Self {
        Self {
            authn_instant,
            session_index: session_index.into(),
            authn_context_class_ref: AUTHN_CONTEXT_UNSPECIFIED.to_string(),
        }
    }

    fn to_element(&self) -> Element {
        Element::ns("saml", "AuthnStatement", SAML_NS)
            .with_attribute("AuthnInstant", format_instant(self.authn_instant))
            .with_attribute("SessionIndex", self.session_index.as_str())
            .with_child(
                Element::ns("saml", "AuthnContext", SAML_NS).with_child(
                    Element::ns("saml", "AuthnContextClassRef", SAML_NS)
                        .with_text(self.authn_context_class_ref.as_str()),
                ),
            )
    }
}

/// XML Schema type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValueType {
    /// `xs:string`.
    String,
    /// `xs:boolean`.
    Boolean,
    /// `xs:decimal`.
    Decimal,
}

impl AttributeValueType {
    /// Returns the `xsi:type` value.
    #[must_use]
    pub const fn xsi_type(&self) -> &'static str {
        match self {
            Self::String => "xs:string",
            Self::Boolean => "xs:boolean",
            Self::Decimal => "xs:decimal",
        }
    }
}

/// A single attribute value. `None` renders as `xsi:nil="true"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    /// Typed lexical value.
    pub value: Option<(AttributeValueType, String)>,
}

impl AttributeValue {
    /// A typed value.
    #[must_use]
    pub fn typed(value_type: AttributeValueType, value: impl Into<String>) -> Self {
        Self {
            value: Some((value_type, value.into())),
        }
    }

    /// A string value.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::typed(AttributeValueType::String, value)
    }

    /// The nil value.
    #[must_use]
    pub const fn nil() -> Self {
        Self { value: None }
    }

    fn to_element(&self) -> Element {
        let element = Element::ns("saml", "AttributeValue", SAML_NS);
        match &self.value {
            Some((value_type, value)) => element
                .with_namespace("xs", XS_NS)
                .with_ns_attribute("xsi", "type", XSI_NS, value_type.xsi_type())
                .with_text(value.as_str()),
            None => element.with_ns_attribute("xsi", "nil", XSI_NS, "true"),
        }
    }
}

/// A SAML attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,

    /// Name format.
    pub name_format: AttributeNameFormat,

    /// Display name.
    pub friendly_name: Option<String>,

    /// Values. May be empty.
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    /// Converts the attribute to XML.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let element = Element::ns("saml", "Attribute", SAML_NS)
            .with_optional_attribute("FriendlyName", self.friendly_name.as_deref())
            .with_attribute("Name", self.name.as_str())
            .with_attribute("NameFormat", self.name_format.uri());
        self.values
            .iter()
            .map(AttributeValue::to_element)
            .fold(element, Element::with_child)
    }
}
