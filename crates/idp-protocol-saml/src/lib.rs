//! SAML 2.0 identity provider engine.
//!
//! This crate provides the protocol core of a SAML 2.0 IdP:
//!
//! - **AuthnRequest decoding and validation** - against each service provider's settings
//! - **SAML Response/Assertion issuance** - signed with the IdP key
//! - **XML signature** - enveloped signatures and Redirect-binding query signatures
//! - **POST and Redirect bindings** - decoding with hard size limits, encoding for the browser
//! - **Single Logout (SLO)** - fan-out of logout requests across service providers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`types`] - Core SAML types and data structures
//! - [`xml`] - Owned XML tree, strict parser and exclusive canonicalization
//! - [`signature`] - XML signature signing and validation
//! - [`bindings`] - POST and Redirect binding implementations
//! - [`validator`] - AuthnRequest checks
//! - [`attributes`] - NameID and attribute resolution from the user profile
//! - [`provider`] - Service provider configuration
//! - [`service`] - The per-app facade tying it together
//! - [`slo`] - Single logout orchestration
//! - [`error`] - Error types for SAML operations
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_protocol_saml::{SamlBinding, SamlService};
//!
//! let sso = service.handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())?;
//! // authenticate the user, then
//! let response = service.issue_success_response(
//!     &sso.callback_url,
//!     "sp1",
//!     &auth_info,
//!     &sso.request,
//!     &user_info,
//! )?;
//! let message = service.encode_response(&response, &sso.callback_url, sso.relay_state.as_deref())?;
//! ```
//!
//! # SAML Specifications
//!
//! This implementation follows these specifications:
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod bindings;
pub mod error;
pub mod id;
pub mod provider;
pub mod service;
pub mod signature;
pub mod slo;
pub mod types;
pub mod validator;
pub mod xml;

pub use bindings::{DecodedMessage, DetachedSignature, EncodedMessage, SamlMessageType};
pub use error::{
    InvalidRequestError, ParseFailure, SamlError, SamlErrorCode, SamlResult, SignatureFailure,
};
pub use provider::{
    OriginEndpoints, SamlConfig, SamlEndpoints, ServiceProviderConfig, ServiceProviderRegistry,
};
pub use service::{AuthenticationInfo, SamlService, SsoRequest};
pub use signature::{SignatureAlgorithm, SignatureConfig, XmlSignatureValidator, XmlSigner};
pub use slo::{
    InMemorySloSessionStore, SessionTerminator, SloOrchestrator, SloSession, SloSessionEntry,
    SloSessionStore, TerminatedSession,
};
pub use types::*;
