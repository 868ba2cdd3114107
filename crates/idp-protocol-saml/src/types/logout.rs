//! SAML Single Logout types.
//!
//! `LogoutRequest` travels in both directions: service providers send one
//! to start a logout and the identity provider sends one to every other
//! participating service provider. `LogoutResponse` closes each leg.

use chrono::{DateTime, Utc};
use idp_crypto::SecureRandom;

use crate::id::generate_id;
use crate::xml::{self, Element, ParseLimits, XmlError};

use super::{
    expect_root, format_instant, issuer_element, parse_instant, required_attribute, NameId,
    Status, SAMLP_NS, SAML_NS, SAML_VERSION,
};

/// SAML Logout Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol as sent.
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The URL this request is addressed to.
    pub destination: Option<String>,

    /// The issuing entity.
    pub issuer: Option<String>,

    /// The principal being logged out.
    pub name_id: Option<NameId>,

    /// Session indexes to terminate. Empty means all sessions of the principal.
    pub session_indexes: Vec<String>,

    /// Time after which the request expires.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Reason for the logout.
    pub reason: Option<String>,
}

impl LogoutRequest {
    /// Creates a request with a fresh identifier.
    #[must_use]
    pub fn new(rng: &dyn SecureRandom, now: DateTime<Utc>, issuer: &str) -> Self {
        Self {
            id: generate_id(rng, "id"),
            version: SAML_VERSION.to_string(),
            issue_instant: now,
            destination: None,
            issuer: Some(issuer.to_string()),
            name_id: None,
            session_indexes: Vec::new(),
            not_on_or_after: None,
            reason: None,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the principal.
    #[must_use]
    pub fn with_name_id(mut self, name_id: NameId) -> Self {
        self.name_id = Some(name_id);
        self
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Returns the first session index, if any.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.session_indexes.first().map(String::as_str)
    }

    /// Parses a `samlp:LogoutRequest` document.
    ///
    /// # Errors
    ///
    /// Returns an [`XmlError`] if the document is malformed or is not a
    /// `LogoutRequest`.
    pub fn from_xml(input: &str, limits: ParseLimits) -> Result<Self, XmlError> {
        let root = xml::parse(input, limits)?;
        expect_root(&root, SAMLP_NS, "LogoutRequest")?;
        Ok(Self {
            id: required_attribute(&root, "ID")?.to_string(),
            version: required_attribute(&root, "Version")?.to_string(),
            issue_instant: parse_instant("IssueInstant", required_attribute(&root, "IssueInstant")?)?,
            destination: root.attribute("Destination").map(str::to_string),
            issuer: root.child(SAML_NS, "Issuer").map(|e| e.text().trim().to_string()),
            name_id: root.child(SAML_NS, "NameID").map(NameId::from_element),
            session_indexes: root
                .children_named(SAMLP_NS, "SessionIndex")
                .map(|e| e.text().trim().to_string())
                .collect(),
            not_on_or_after: root
                .attribute("NotOnOrAfter")
                .map(|v| parse_instant("NotOnOrAfter", v))
                .transpose()?,
            reason: root.attribute("Reason").map(str::to_string),
        })
    }

    /// Converts the request to XML.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let element = Element::ns("samlp", "LogoutRequest", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", self.id.as_str())
            .with_attribute("Version", self.version.as_str())
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.as_deref())
            .with_optional_attribute(
                "NotOnOrAfter",
                self.not_on_or_after.map(format_instant).as_deref(),
            )
            .with_optional_attribute("Reason", self.reason.as_deref())
            .with_optional_child(self.issuer.as_deref().map(issuer_element))
            .with_optional_child(self.name_id.as_ref().map(NameId::to_element));
        self.session_indexes
            .iter()
            .map(|index| Element::ns("samlp", "SessionIndex", SAMLP_NS).with_text(index.as_str()))
            .fold(element, Element::with_child)
    }
}

/// SAML Logout Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// The request this answers.
    pub in_response_to: Option<String>,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The URL this response is delivered to.
    pub destination: Option<String>,

    /// The issuing entity.
    pub issuer: Option<String>,

    /// Outcome of the logout.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a response with a fresh identifier.
    #[must_use]
    pub fn new(rng: &dyn SecureRandom, now: DateTime<Utc>, issuer: &str, status: Status) -> Self {
        Self {
            id: generate_id(rng, "id"),
            in_response_to: None,
            issue_instant: now,
            destination: None,
            issuer: Some(issuer.to_string()),
            status,
        }
    }

    /// Sets the request this answers.
    #[must_use]
    pub fn in_response_to(mut self, request_id: Option<&str>) -> Self {
        self.in_response_to = request_id.map(str::to_string);
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Parses a `samlp:LogoutResponse` document.
    ///
    /// # Errors
    ///
    /// Returns an [`XmlError`] if the document is malformed or is not a
    /// `LogoutResponse`.
    pub fn from_xml(input: &str, limits: ParseLimits) -> Result<Self, XmlError> {
        let root = xml::parse(input, limits)?;
        expect_root(&root, SAMLP_NS, "LogoutResponse")?;
        let status = root
            .child(SAMLP_NS, "Status")
            .and_then(Status::from_element)
            .ok_or(XmlError::MissingAttribute("Status"))?;
        Ok(Self {
            id: required_attribute(&root, "ID")?.to_string(),
            in_response_to: root.attribute("InResponseTo").map(str::to_string),
            issue_instant: parse_instant("IssueInstant", required_attribute(&root, "IssueInstant")?)?,
            destination: root.attribute("Destination").map(str::to_string),
            issuer: root.child(SAML_NS, "Issuer").map(|e| e.text().trim().to_string()),
            status,
        })
    }

    /// Converts the response to XML.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::ns("samlp", "LogoutResponse", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", self.id.as_str())
            .with_optional_attribute("InResponseTo", self.in_response_to.as_deref())
            .with_attribute("Version", SAML_VERSION)
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.as_deref())
            .with_optional_child(self.issuer.as_deref().map(issuer_element))
            .with_child(self.status.to_element())
    }
}

/// Creates the final logout response: `Success`, or `Success`/`PartialLogout`
/// when some service provider could not be logged out.
#[must_use]
pub fn new_logout_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
    in_response_to: Option<&str>,
    is_some_failed: bool,
) -> LogoutResponse {
    let status = if is_some_failed {
        Status::partial_logout()
    } else {
        Status::success()
    };
    LogoutResponse::new(rng, now, issuer, status).in_response_to(in_response_to)
}
