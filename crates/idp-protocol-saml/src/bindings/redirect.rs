//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use std::collections::HashMap;
use std::io::{self, Write};

use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{ParseFailure, SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

use super::{signed_query, DecodedMessage, DetachedSignature, SamlMessageType};

const PROTOCOL_PARAMS: [&str; 5] = [
    "SAMLRequest",
    "SAMLResponse",
    "RelayState",
    "SigAlg",
    "Signature",
];

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a SAML message for HTTP-Redirect binding.
    ///
    /// With a signer, `SigAlg` and `Signature` are appended and the
    /// signature covers the query string in its encoded form.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode(
        message_type: SamlMessageType,
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);
        let raw_message = urlencoding::encode(&encoded);
        let raw_relay_state = relay_state.map(urlencoding::encode);

        let separator = if destination.contains('?') { '&' } else { '?' };

        let query = match signer {
            Some(signer) => {
                let raw_sig_alg = urlencoding::encode(signer.algorithm().uri());
                let signed = signed_query(
                    message_type,
                    &raw_message,
                    raw_relay_state.as_deref(),
                    &raw_sig_alg,
                );
                let signature = signer.sign_query(signed.as_bytes())?;
                format!("{signed}&Signature={}", urlencoding::encode(&signature))
            }
            None => {
                let mut query = format!("{}={raw_message}", message_type.form_param());
                if let Some(rs) = raw_relay_state {
                    query.push_str(&format!("&RelayState={rs}"));
                }
                query
            }
        };

        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a SAML message from a raw query string.
    ///
    /// Parameter values are kept in their encoded form for signature
    /// verification. The inflated message may not exceed
    /// `max_inflated_bytes`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseFailure`] describing the first problem found.
    pub fn decode(query: &str, max_inflated_bytes: u64) -> Result<DecodedMessage, ParseFailure> {
        let mut params = raw_query_params(query)?;

        let (raw_message, message_type) =
            match (params.remove("SAMLRequest"), params.remove("SAMLResponse")) {
                (Some(req), None) => (req, SamlMessageType::Request),
                (None, Some(resp)) => (resp, SamlMessageType::Response),
                (Some(_), Some(_)) => return Err(ParseFailure::AmbiguousMessage),
                (None, None) => return Err(ParseFailure::MissingParameter("SAMLRequest")),
            };

        let url_decoded = urlencoding::decode(raw_message)
            .map_err(|_| ParseFailure::PercentEncoding(message_type.form_param()))?;
        let compact: String = url_decoded.chars().filter(|c| !c.is_whitespace()).collect();
        let compressed = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(inflate_bounded(&compressed, max_inflated_bytes)?)?;

        let raw_relay_state = params.remove("RelayState");
        let relay_state = raw_relay_state
            .map(|raw| {
                urlencoding::decode(&raw.replace('+', " "))
                    .map(std::borrow::Cow::into_owned)
                    .map_err(|_| ParseFailure::PercentEncoding("RelayState"))
            })
            .transpose()?;

        let detached_signature = match (params.remove("Signature"), params.remove("SigAlg")) {
            (Some(signature), Some(raw_sig_alg)) => Some(DetachedSignature {
                message_type,
                raw_message: raw_message.to_string(),
                raw_relay_state: raw_relay_state.map(str::to_string),
                raw_sig_alg: raw_sig_alg.to_string(),
                signature: urlencoding::decode(signature)
                    .map_err(|_| ParseFailure::PercentEncoding("Signature"))?
                    .into_owned(),
            }),
            (Some(_), None) => return Err(ParseFailure::MissingParameter("SigAlg")),
            (None, _) => None,
        };

        Ok(DecodedMessage {
            binding: SamlBinding::HttpRedirect,
            message_type,
            xml,
            relay_state,
            detached_signature,
        })
    }
}

/// Splits a query string into raw protocol parameters, rejecting repeats.
fn raw_query_params(query: &str) -> Result<HashMap<&str, &str>, ParseFailure> {
    let mut params = HashMap::new();
    let query = query.strip_prefix('?').unwrap_or(query);
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if !PROTOCOL_PARAMS.contains(&key) {
            continue;
        }
        if params.insert(key, value).is_some() {
            return Err(ParseFailure::DuplicateParameter(key.to_string()));
        }
    }
    Ok(params)
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Internal(format!("compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Internal(format!("compression finish error: {e}")))
}

const INFLATE_CHUNK: usize = 32 * 1024;

/// Decompresses DEFLATE data without ever producing more than `limit`
/// bytes. A stream that has not ended by then is refused.
fn inflate_bounded(data: &[u8], limit: u64) -> Result<Vec<u8>, ParseFailure> {
    let limit_len = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut inflater = Decompress::new(false);
    let mut decompressed = Vec::new();
    let mut chunk = vec![0u8; INFLATE_CHUNK];

    loop {
        let window = (limit_len - decompressed.len()).min(INFLATE_CHUNK);
        let consumed = usize::try_from(inflater.total_in()).unwrap_or(usize::MAX);
        let input = data.get(consumed..).unwrap_or_default();
        let produced_before = inflater.total_out();

        let status = inflater
            .decompress(input, &mut chunk[..window], FlushDecompress::None)
            .map_err(|e| ParseFailure::Deflate(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let produced = usize::try_from(inflater.total_out() - produced_before).unwrap_or(window);
        decompressed.extend_from_slice(&chunk[..produced]);

        if status == Status::StreamEnd {
            return Ok(decompressed);
        }
        if decompressed.len() >= limit_len {
            return Err(ParseFailure::InflatedTooLarge { limit });
        }
        let progressed = produced > 0 || inflater.total_in() > consumed as u64;
        if !progressed {
            return Err(ParseFailure::Deflate(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated deflate stream",
            )));
        }
    }
}
