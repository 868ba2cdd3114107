//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions.

use crate::xml::Element;

use super::{NameIdFormat, SAML_NS};

/// SAML Name ID.
///
/// Represents the identifier of a subject in a SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    pub format: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value and format.
    #[must_use]
    pub fn new(value: impl Into<String>, format: NameIdFormat) -> Self {
        Self {
            value: value.into(),
            format: Some(format.uri().to_string()),
            sp_name_qualifier: None,
        }
    }

    /// Converts to a `saml:NameID` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::ns("saml", "NameID", SAML_NS)
            .with_optional_attribute("Format", self.format.as_deref())
            .with_optional_attribute("SPNameQualifier", self.sp_name_qualifier.as_deref())
            .with_text(self.value.as_str())
    }

    /// Reads a parsed `saml:NameID` element.
    #[must_use]
    pub fn from_element(element: &Element) -> Self {
        Self {
            value: element.text(),
            format: element.attribute("Format").map(str::to_string),
            sp_name_qualifier: element.attribute("SPNameQualifier").map(str::to_string),
        }
    }
}

/// Name ID policy for authentication requests.
///
/// Specifies constraints on the name identifier to be returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIdPolicy {
    /// The requested name ID format URI, as sent.
    pub format: Option<String>,

    /// Whether the IdP may create a new identifier.
    pub allow_create: Option<bool>,
}

impl NameIdPolicy {
    /// Returns the requested format as one the IdP can issue, if it is one.
    #[must_use]
    pub fn parsed_format(&self) -> Option<NameIdFormat> {
        self.format.as_deref().and_then(NameIdFormat::from_uri)
    }

    pub(crate) fn from_element(element: &Element) -> Result<Self, crate::xml::XmlError> {
        Ok(Self {
            format: element.attribute("Format").map(str::to_string),
            allow_create: element
                .attribute("AllowCreate")
                .map(|v| super::parse_bool("AllowCreate", v))
                .transpose()?,
        })
    }
}
