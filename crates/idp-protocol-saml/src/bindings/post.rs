//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use std::collections::HashMap;

use base64::Engine;

use crate::error::ParseFailure;
use crate::types::SamlBinding;

use super::{DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a SAML message for HTTP-POST binding.
    ///
    /// Returns an HTML form that will auto-submit to the destination.
    #[must_use]
    pub fn encode(
        message_type: SamlMessageType,
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
    ) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
        let param_name = message_type.form_param();

        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(destination),
            param_name,
            encoded,
            relay_state_input
        )
    }

    /// Decodes a SAML message from an `application/x-www-form-urlencoded` body.
    ///
    /// Exactly one of `SAMLRequest` or `SAMLResponse` must be present, and
    /// no protocol parameter may repeat. Whitespace inside the base64 value
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseFailure`] for missing, repeated or undecodable
    /// parameters.
    pub fn decode(body: &[u8]) -> Result<DecodedMessage, ParseFailure> {
        let mut params: HashMap<String, String> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            if !matches!(key.as_ref(), "SAMLRequest" | "SAMLResponse" | "RelayState") {
                continue;
            }
            if params.contains_key(key.as_ref()) {
                return Err(ParseFailure::DuplicateParameter(key.into_owned()));
            }
            params.insert(key.into_owned(), value.into_owned());
        }

        let (encoded, message_type) = match (
            params.remove("SAMLRequest"),
            params.remove("SAMLResponse"),
        ) {
            (Some(req), None) => (req, SamlMessageType::Request),
            (None, Some(resp)) => (resp, SamlMessageType::Response),
            (Some(_), Some(_)) => return Err(ParseFailure::AmbiguousMessage),
            (None, None) => return Err(ParseFailure::MissingParameter("SAMLRequest")),
        };

        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(decoded)?;

        Ok(DecodedMessage {
            binding: SamlBinding::HttpPost,
            message_type,
            xml,
            relay_state: params.remove("RelayState"),
            detached_signature: None,
        })
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_value<'a>(html: &'a str, name: &str) -> &'a str {
        let marker = format!("name=\"{name}\" value=\"");
        let start = html.find(&marker).unwrap() + marker.len();
        let end = html[start..].find('"').unwrap();
        &html[start..start + end]
    }

    fn form_body(pairs: &[(&str, &str)]) -> Vec<u8> {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
            .into_bytes()
    }

    #[test]
    fn encode_and_decode_response() {
        let xml = r#"<samlp:Response>test</samlp:Response>"#;
        let html = HttpPostBinding::encode(
            SamlMessageType::Response,
            xml,
            "https://sp.example.com/acs",
            Some("state&123"),
        );

        assert!(html.contains(r#"action="https://sp.example.com/acs""#));
        assert_eq!(form_value(&html, "RelayState"), "state&amp;123");

        let body = form_body(&[
            ("SAMLResponse", form_value(&html, "SAMLResponse")),
            ("RelayState", "state&123"),
        ]);
        let decoded = HttpPostBinding::decode(&body).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Response);
        assert_eq!(decoded.binding, SamlBinding::HttpPost);
        assert_eq!(decoded.relay_state.as_deref(), Some("state&123"));
        assert!(decoded.detached_signature.is_none());
    }

    #[test]
    fn decode_tolerates_wrapped_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("<a>wrapped request</a>");
        let wrapped = format!("{}\r\n{}", &encoded[..8], &encoded[8..]);
        let decoded =
            HttpPostBinding::decode(&form_body(&[("SAMLRequest", &wrapped)])).unwrap();
        assert_eq!(decoded.xml, "<a>wrapped request</a>");
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state, None);
    }

    #[test]
    fn decode_missing_message() {
        assert!(matches!(
            HttpPostBinding::decode(b"RelayState=x"),
            Err(ParseFailure::MissingParameter("SAMLRequest"))
        ));
    }

    #[test]
    fn decode_rejects_duplicates_and_ambiguity() {
        assert!(matches!(
            HttpPostBinding::decode(b"SAMLRequest=PGEvPg%3D%3D&SAMLRequest=PGEvPg%3D%3D"),
            Err(ParseFailure::DuplicateParameter(p)) if p == "SAMLRequest"
        ));
        assert!(matches!(
            HttpPostBinding::decode(b"SAMLRequest=PGEvPg%3D%3D&SAMLResponse=PGEvPg%3D%3D"),
            Err(ParseFailure::AmbiguousMessage)
        ));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert!(matches!(
            HttpPostBinding::decode(b"SAMLRequest=%%%"),
            Err(ParseFailure::Base64(_))
        ));
    }

    #[test]
    fn html_escape_special_chars() {
        let input = r#"<script>alert("xss")</script>"#;
        let escaped = html_escape(input);
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('>'));
        assert!(!escaped.contains('"'));
    }
}
