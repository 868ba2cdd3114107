//! SAML 2.0 types and data structures.
//!
//! Requests, responses, assertions and status, each convertible to and
//! from the [`crate::xml`] tree.

mod assertion;
mod authn_request;
mod constants;
mod logout;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::xml::{Element, XmlError};

/// Formats an instant the way SAML expects: UTC with a trailing `Z`.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_instant(name: &'static str, value: &str) -> Result<DateTime<Utc>, XmlError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| XmlError::InvalidValue {
            name,
            value: value.to_string(),
        })
}

pub(crate) fn parse_bool(name: &'static str, value: &str) -> Result<bool, XmlError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(XmlError::InvalidValue {
            name,
            value: other.to_string(),
        }),
    }
}

pub(crate) fn expect_root(element: &Element, namespace: &str, name: &str) -> Result<(), XmlError> {
    if element.is(namespace, name) {
        Ok(())
    } else {
        Err(XmlError::UnexpectedElement {
            expected: name.to_string(),
            found: element.qualified_name().into_owned(),
        })
    }
}

pub(crate) fn required_attribute<'a>(
    element: &'a Element,
    name: &'static str,
) -> Result<&'a str, XmlError> {
    element
        .attribute(name)
        .ok_or(XmlError::MissingAttribute(name))
}

pub(crate) fn issuer_element(issuer: &str) -> Element {
    Element::ns("saml", "Issuer", SAML_NS)
        .with_attribute("Format", NAMEID_FORMAT_ENTITY)
        .with_text(issuer)
}
