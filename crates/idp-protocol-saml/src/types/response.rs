//! SAML Response types.
//!
//! The `samlp:Response` message and the builders for every status the
//! identity provider answers an `AuthnRequest` with.

use chrono::{DateTime, Utc};
use idp_crypto::SecureRandom;

use crate::error::SamlErrorCode;
use crate::id::generate_id;
use crate::xml::Element;

use super::{format_instant, issuer_element, Assertion, Status, SAMLP_NS, SAML_NS, SAML_VERSION};

/// SAML Response.
///
/// A response message from an identity provider containing a status and,
/// on success, one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// The request this answers.
    pub in_response_to: Option<String>,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The URL this response is delivered to.
    pub destination: Option<String>,

    /// The identity provider's entity ID.
    pub issuer: String,

    /// Status of the response.
    pub status: Status,

    /// The assertion, on success.
    pub assertion: Option<Assertion>,
}

impl Response {
    /// Creates a response with a fresh identifier.
    #[must_use]
    pub fn new(rng: &dyn SecureRandom, now: DateTime<Utc>, issuer: &str, status: Status) -> Self {
        Self {
            id: generate_id(rng, "id"),
            in_response_to: None,
            issue_instant: now,
            destination: None,
            issuer: issuer.to_string(),
            status,
            assertion: None,
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

    /// Returns true if the status is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Converts the response to XML. The response itself is signed when it
    /// is encoded for a binding.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::ns("samlp", "Response", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", self.id.as_str())
            .with_optional_attribute("InResponseTo", self.in_response_to.as_deref())
            .with_attribute("Version", SAML_VERSION)
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.as_deref())
            .with_child(issuer_element(&self.issuer))
            .with_child(self.status.to_element())
            .with_optional_child(self.assertion.as_ref().map(Assertion::to_element))
    }
}

/// Creates a `Success` response shell; the caller adds the assertion.
#[must_use]
pub fn new_success_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
    in_response_to: Option<&str>,
) -> Response {
    Response::new(rng, now, issuer, Status::success()).in_response_to(in_response_to)
}

/// Creates a `Requester`/`NoPassive` response.
#[must_use]
pub fn new_no_passive_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
    in_response_to: Option<&str>,
) -> Response {
    Response::new(rng, now, issuer, Status::no_passive()).in_response_to(in_response_to)
}

/// Creates a `Requester`/`RequestDenied` response.
#[must_use]
pub fn new_request_denied_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
    message: &str,
    details: Vec<Element>,
) -> Response {
    Response::new(
        rng,
        now,
        issuer,
        Status::request_denied(message).with_detail(details),
    )
}

/// Creates a `Responder` response.
#[must_use]
pub fn new_server_error_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
    message: &str,
    details: Vec<Element>,
) -> Response {
    Response::new(rng, now, issuer, Status::server_error(message).with_detail(details))
}

/// Creates the generic `Responder` response with message `unexpected error`.
#[must_use]
pub fn new_unexpected_server_error_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
) -> Response {
    Response::new(rng, now, issuer, Status::unexpected_server_error())
}

/// Creates the response describing a protocol error.
#[must_use]
pub fn new_error_response(
    rng: &dyn SecureRandom,
    now: DateTime<Utc>,
    issuer: &str,
    code: &SamlErrorCode,
) -> Response {
    Response::new(rng, now, issuer, Status::for_error(code))
}
