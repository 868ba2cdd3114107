//! SAML error types.
//!
//! [`SamlErrorCode`] is the protocol-level taxonomy: every variant maps onto
//! a SAML status and can describe itself as `StatusDetail` elements.
//! [`SamlError`] wraps it together with the infrastructure failures that
//! never reach the requester in detail.

use thiserror::Error;

use crate::types::{status_codes, sub_status_codes};
use crate::xml::{Element, XmlError};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// A request that failed validation against the service provider's settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request field {field}: {reason}")]
pub struct InvalidRequestError {
    /// Path of the offending field, e.g. `NameIDPolicy/Format`.
    pub field: String,
    /// The value found in the request.
    pub actual: String,
    /// Acceptable values, when there is a finite set.
    pub expected: Vec<String>,
    /// Human readable reason.
    pub reason: String,
}

impl InvalidRequestError {
    /// Creates a validation failure without an expected-value list.
    #[must_use]
    pub fn new(field: &str, actual: impl Into<String>, reason: &str) -> Self {
        Self {
            field: field.to_string(),
            actual: actual.into(),
            expected: Vec::new(),
            reason: reason.to_string(),
        }
    }

    /// Sets the acceptable values.
    #[must_use]
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }
}

/// Why a message could not be decoded or parsed.
#[derive(Debug, Error)]
pub enum ParseFailure {
    /// The body could not be read as a form.
    #[error("invalid form body: {0}")]
    Form(String),

    /// A protocol parameter appears more than once.
    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),

    /// A required protocol parameter is absent.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Both `SAMLRequest` and `SAMLResponse` were supplied.
    #[error("both SAMLRequest and SAMLResponse present")]
    AmbiguousMessage,

    /// A parameter could not be percent-decoded.
    #[error("invalid percent-encoding in {0}")]
    PercentEncoding(&'static str),

    /// The message is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The message is not valid raw DEFLATE.
    #[error("invalid deflate stream: {0}")]
    Deflate(#[source] std::io::Error),

    /// The inflated message would exceed the configured ceiling.
    #[error("inflated message exceeds {limit} bytes")]
    InflatedTooLarge {
        /// The byte ceiling.
        limit: u64,
    },

    /// The message is not UTF-8.
    #[error("message is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The XML is malformed or has the wrong shape.
    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Why a signature was not accepted.
#[derive(Debug, Error)]
pub enum SignatureFailure {
    /// The service provider has no trusted certificates.
    #[error("no certificates configured for the service provider")]
    NoCertificates,

    /// No `Signature` child of the root element.
    #[error("document is not signed")]
    MissingSignature,

    /// More than one `Signature` child of the root element.
    #[error("document has more than one signature")]
    MultipleSignatures,

    /// The signature structure is incomplete or invalid.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// The reference does not point at the root element.
    #[error("signature reference does not cover the root element")]
    ReferenceMismatch,

    /// The root `ID` is not unique within the document.
    #[error("ID attribute is not unique")]
    DuplicateId,

    /// An algorithm URI is not supported.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The digest of the referenced content does not match.
    #[error("digest mismatch")]
    DigestMismatch,

    /// No trusted certificate verifies the signature.
    #[error("signature does not match any trusted certificate")]
    NoMatchingCertificate,
}

/// Protocol errors reported back to the requester.
#[derive(Debug, Error)]
pub enum SamlErrorCode {
    /// The requesting service provider is unknown.
    #[error("service provider not found")]
    ServiceProviderNotFound,

    /// The request failed validation.
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequestError),

    /// The request could not be decoded or parsed.
    #[error("{reason}: {cause}")]
    ParseRequestFailed {
        /// Short description, e.g. `malformed AuthnRequest`.
        reason: String,
        /// The underlying failure.
        #[source]
        cause: ParseFailure,
    },

    /// The user has no value for the required name identifier.
    #[error("missing name identifier for format {expected_nameid_format}")]
    MissingNameId {
        /// The NameID format that was required.
        expected_nameid_format: String,
        /// The user-profile pointer that was consulted, if any.
        nameid_attribute_pointer: Option<String>,
    },

    /// The request signature was not accepted.
    #[error("invalid signature: {cause}")]
    InvalidSignature {
        /// Why verification failed.
        #[source]
        cause: SignatureFailure,
    },

    /// A mapped user-profile value has a type SAML attributes cannot carry.
    #[error("unsupported type for attribute {attribute_name} at {user_profile_pointer}")]
    UnsupportedAttributeType {
        /// The SAML attribute being produced.
        attribute_name: String,
        /// The user-profile pointer it was mapped from.
        user_profile_pointer: String,
    },
}

impl SamlErrorCode {
    /// Creates a parse failure with the given reason.
    #[must_use]
    pub fn parse_failed(reason: &str, cause: impl Into<ParseFailure>) -> Self {
        Self::ParseRequestFailed {
            reason: reason.to_string(),
            cause: cause.into(),
        }
    }

    /// Stable identifier emitted as `ErrorCode` in status details.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ServiceProviderNotFound => "ServiceProviderNotFound",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::ParseRequestFailed { .. } => "ParseRequestFailed",
            Self::MissingNameId { .. } => "MissingNameID",
            Self::InvalidSignature { .. } => "InvalidSignature",
            Self::UnsupportedAttributeType { .. } => "UnsupportedAttributeType",
        }
    }

    /// Returns the top-level and second-level SAML status for this error.
    #[must_use]
    pub const fn status(&self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::ServiceProviderNotFound
            | Self::InvalidRequest(_)
            | Self::ParseRequestFailed { .. }
            | Self::InvalidSignature { .. } => {
                (status_codes::REQUESTER, Some(sub_status_codes::REQUEST_DENIED))
            }
            Self::MissingNameId { .. } | Self::UnsupportedAttributeType { .. } => {
                (status_codes::RESPONDER, None)
            }
        }
    }

    /// Renders the error as `StatusDetail` children.
    #[must_use]
    pub fn to_detail_elements(&self) -> Vec<Element> {
        let mut elements = vec![detail("ErrorCode", self.error_code())];
        match self {
            Self::ServiceProviderNotFound => {}
            Self::InvalidRequest(err) => {
                if !err.field.is_empty() {
                    elements.push(detail("Field", &err.field));
                }
                elements.push(detail("Actual", &err.actual));
                elements.extend(err.expected.iter().map(|e| detail("Expected", e)));
                elements.push(detail("Reason", &err.reason));
            }
            Self::ParseRequestFailed { reason, cause } => {
                elements.push(detail("Reason", reason));
                elements.push(detail("Cause", &cause.to_string()));
            }
            Self::MissingNameId {
                expected_nameid_format,
                nameid_attribute_pointer,
            } => {
                elements.push(detail("ExpectedNameIDFormat", expected_nameid_format));
                if let Some(pointer) = nameid_attribute_pointer {
                    elements.push(detail("NameIDAttributePointer", pointer));
                }
            }
            Self::InvalidSignature { cause } => {
                elements.push(detail("Cause", &cause.to_string()));
            }
            Self::UnsupportedAttributeType {
                attribute_name,
                user_profile_pointer,
            } => {
                elements.push(detail("AttributeName", attribute_name));
                elements.push(detail("UserProfilePointer", user_profile_pointer));
            }
        }
        elements
    }
}

fn detail(name: &str, value: &str) -> Element {
    Element::local(name).with_text(value)
}

/// Errors raised by the SAML engine.
#[derive(Debug, Error)]
pub enum SamlError {
    /// A protocol error that is reported to the requester.
    #[error(transparent)]
    Protocol(#[from] SamlErrorCode),

    /// Building or serializing an outbound document failed.
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// A signing key operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] idp_crypto::SignatureError),

    /// The HTTP method or binding URI is not supported.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A collaborator failed.
    #[error(transparent)]
    Core(#[from] idp_core::Error),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<InvalidRequestError> for SamlError {
    fn from(err: InvalidRequestError) -> Self {
        Self::Protocol(SamlErrorCode::InvalidRequest(err))
    }
}

impl From<SignatureFailure> for SamlErrorCode {
    fn from(cause: SignatureFailure) -> Self {
        Self::InvalidSignature { cause }
    }
}

impl From<SignatureFailure> for SamlError {
    fn from(cause: SignatureFailure) -> Self {
        Self::Protocol(SamlErrorCode::InvalidSignature { cause })
    }
}

impl SamlError {
    /// Returns the protocol error, if this is one.
    #[must_use]
    pub const fn protocol(&self) -> Option<&SamlErrorCode> {
        match self {
            Self::Protocol(code) => Some(code),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Protocol(SamlErrorCode::ServiceProviderNotFound) => 404,
            Self::Protocol(
                SamlErrorCode::InvalidRequest(_) | SamlErrorCode::ParseRequestFailed { .. },
            )
            | Self::UnsupportedBinding(_) => 400,
            Self::Protocol(SamlErrorCode::InvalidSignature { .. }) => 401,
            _ => 500,
        }
    }
}
