//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use crate::error::SamlErrorCode;
use crate::xml::Element;

use super::{status_codes, sub_status_codes, SAMLP_NS};

/// SAML protocol status.
///
/// Contains the status code and optional message for a SAML response.
/// `status_detail` is only ever populated for non-success statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    pub status_message: Option<String>,

    /// Machine-readable detail elements.
    pub status_detail: Vec<Element>,
}

impl Status {
    fn new(status_code: StatusCode, message: Option<&str>) -> Self {
        Self {
            status_code,
            status_message: message.map(str::to_string),
            status_detail: Vec::new(),
        }
    }

    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self::new(StatusCode::new(status_codes::SUCCESS), None)
    }

    /// Creates a success status with the `PartialLogout` second-level code.
    #[must_use]
    pub fn partial_logout() -> Self {
        Self::new(
            StatusCode::new(status_codes::SUCCESS).with_sub(sub_status_codes::PARTIAL_LOGOUT),
            None,
        )
    }

    /// Creates a `Requester`/`RequestDenied` status.
    #[must_use]
    pub fn request_denied(message: &str) -> Self {
        Self::new(
            StatusCode::new(status_codes::REQUESTER).with_sub(sub_status_codes::REQUEST_DENIED),
            Some(message),
        )
    }

    /// Creates a `Requester`/`NoPassive` status.
    #[must_use]
    pub fn no_passive() -> Self {
        Self::new(
            StatusCode::new(status_codes::REQUESTER).with_sub(sub_status_codes::NO_PASSIVE),
            None,
        )
    }

    /// Creates a `Responder` status.
    #[must_use]
    pub fn server_error(message: &str) -> Self {
        Self::new(StatusCode::new(status_codes::RESPONDER), Some(message))
    }

    /// Creates the generic `Responder` status used when nothing more can be said.
    #[must_use]
    pub fn unexpected_server_error() -> Self {
        Self::server_error("unexpected error")
    }

    /// Builds the status describing a protocol error, with its detail elements.
    #[must_use]
    pub fn for_error(code: &SamlErrorCode) -> Self {
        let message = match code {
            SamlErrorCode::ParseRequestFailed { .. } => "failed to parse SAMLRequest".to_string(),
            SamlErrorCode::InvalidSignature { .. } => "invalid signature".to_string(),
            SamlErrorCode::InvalidRequest(_) => "invalid SAMLRequest".to_string(),
            SamlErrorCode::ServiceProviderNotFound => "service provider not found".to_string(),
            other => other.to_string(),
        };
        let (top, sub) = code.status();
        let status_code = match sub {
            Some(sub) => StatusCode::new(top).with_sub(sub),
            None => StatusCode::new(top),
        };
        Self::new(status_code, Some(&message)).with_detail(code.to_detail_elements())
    }

    /// Attaches detail elements. Ignored for success statuses.
    #[must_use]
    pub fn with_detail(mut self, detail: Vec<Element>) -> Self {
        if !self.is_success() {
            self.status_detail = detail;
        }
        self
    }

    /// Returns true if the top-level code is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Returns true for a full success, without a second-level code.
    #[must_use]
    pub fn is_full_success(&self) -> bool {
        self.is_success() && self.status_code.status_code.is_none()
    }

    /// Converts the status to XML.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut status = Element::ns("samlp", "Status", SAMLP_NS)
            .with_child(self.status_code.to_element());
        if let Some(message) = &self.status_message {
            status = status.with_child(Element::ns("samlp", "StatusMessage", SAMLP_NS).with_text(message));
        }
        if !self.status_detail.is_empty() {
            let detail = self
                .status_detail
                .iter()
                .cloned()
                .fold(Element::ns("samlp", "StatusDetail", SAMLP_NS), Element::with_child);
            status = status.with_child(detail);
        }
        status
    }

    /// Reads a status from a parsed `samlp:Status` element.
    #[must_use]
    pub fn from_element(element: &Element) -> Option<Self> {
        let status_code = StatusCode::from_element(element.child(SAMLP_NS, "StatusCode")?)?;
        let status_message = element.child(SAMLP_NS, "StatusMessage").map(Element::text);
        let status_detail = element
            .child(SAMLP_NS, "StatusDetail")
            .map(|d| d.child_elements().cloned().collect())
            .unwrap_or_default();
        Some(Self {
            status_code,
            status_message,
            status_detail,
        })
    }
}

/// SAML status code.
///
/// Status codes can be nested, with a top-level code and optional sub-code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Nests a second-level code.
    #[must_use]
    pub fn with_sub(mut self, value: &str) -> Self {
        self.status_code = Some(Box::new(Self::new(value)));
        self
    }

    fn to_element(&self) -> Element {
        let element =
            Element::ns("samlp", "StatusCode", SAMLP_NS).with_attribute("Value", self.value.as_str());
        match &self.status_code {
            Some(sub) => element.with_child(sub.to_element()),
            None => element,
        }
    }

    fn from_element(element: &Element) -> Option<Self> {
        Some(Self {
            value: element.attribute("Value")?.to_string(),
            status_code: element
                .child(SAMLP_NS, "StatusCode")
                .and_then(Self::from_element)
                .map(Box::new),
        })
    }
}
