//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! Decoding yields a [`DecodedMessage`]; encoding yields an
//! [`EncodedMessage`] that an axum handler can return directly.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::error::ParseFailure;
use crate::types::SamlBinding;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// A protocol request (`AuthnRequest`, `LogoutRequest`).
    Request,
    /// A protocol response (`Response`, `LogoutResponse`).
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The binding the message arrived on.
    pub binding: SamlBinding,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The decoded XML message.
    pub xml: String,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// The query-string signature, for the Redirect binding.
    pub detached_signature: Option<DetachedSignature>,
}

/// A Redirect-binding signature together with the raw parameters it covers.
///
/// Values are kept exactly as they appeared in the query string, because
/// the signature is computed over the encoded octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// Which message parameter was present.
    pub message_type: SamlMessageType,
    /// Raw value of `SAMLRequest`/`SAMLResponse`.
    pub raw_message: String,
    /// Raw value of `RelayState`.
    pub raw_relay_state: Option<String>,
    /// Raw value of `SigAlg`.
    pub raw_sig_alg: String,
    /// Base64 signature value, percent-decoded.
    pub signature: String,
}

impl DetachedSignature {
    /// Returns the octets the signature covers.
    #[must_use]
    pub fn signed_bytes(&self) -> Vec<u8> {
        signed_query(
            self.message_type,
            &self.raw_message,
            self.raw_relay_state.as_deref(),
            &self.raw_sig_alg,
        )
        .into_bytes()
    }

    /// Returns the decoded signature algorithm URI.
    ///
    /// # Errors
    ///
    /// Returns [`ParseFailure::PercentEncoding`] if `SigAlg` is malformed.
    pub fn sig_alg(&self) -> Result<String, ParseFailure> {
        urlencoding::decode(&self.raw_sig_alg)
            .map(std::borrow::Cow::into_owned)
            .map_err(|_| ParseFailure::PercentEncoding("SigAlg"))
    }
}

/// Builds `SAMLRequest=..[&RelayState=..]&SigAlg=..` from encoded values.
pub(crate) fn signed_query(
    message_type: SamlMessageType,
    raw_message: &str,
    raw_relay_state: Option<&str>,
    raw_sig_alg: &str,
) -> String {
    let mut query = format!("{}={raw_message}", message_type.form_param());
    if let Some(relay_state) = raw_relay_state {
        query.push_str("&RelayState=");
        query.push_str(relay_state);
    }
    query.push_str("&SigAlg=");
    query.push_str(raw_sig_alg);
    query
}

/// Decodes a message received on `binding`.
///
/// `raw` is the form body for HTTP-POST and the query string (without `?`)
/// for HTTP-Redirect.
///
/// # Errors
///
/// Returns a [`ParseFailure`] describing the first problem found.
pub fn decode(
    binding: SamlBinding,
    raw: &[u8],
    max_inflated_bytes: u64,
) -> Result<DecodedMessage, ParseFailure> {
    match binding {
        SamlBinding::HttpPost => HttpPostBinding::decode(raw),
        SamlBinding::HttpRedirect => {
            let query = std::str::from_utf8(raw).map_err(|e| ParseFailure::Form(e.to_string()))?;
            HttpRedirectBinding::decode(query, max_inflated_bytes)
        }
    }
}

/// An outbound message ready to be handed to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedMessage {
    /// HTTP-Redirect: send a 302 to `location`.
    Redirect {
        /// Full URL including the query string.
        location: String,
    },
    /// HTTP-POST: serve an auto-submitting form.
    AutoPostForm {
        /// Form action URL.
        action: String,
        /// Complete HTML document.
        html: String,
    },
}

const NO_CACHE: &str = "no-cache, no-store";

impl IntoResponse for EncodedMessage {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect { location } => (
                StatusCode::FOUND,
                [
                    (header::LOCATION, location.as_str()),
                    (header::CACHE_CONTROL, NO_CACHE),
                ],
            )
                .into_response(),
            Self::AutoPostForm { html, .. } => {
                ([(header::CACHE_CONTROL, NO_CACHE)], Html(html)).into_response()
            }
        }
    }
}
