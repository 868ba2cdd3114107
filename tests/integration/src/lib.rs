//! Shared harness for the end-to-end SAML tests.
//!
//! Builds a [`SamlService`] with a pinned clock and seeded randomness, and
//! offers helpers to produce binding payloads the way a browser would and to
//! open the messages the IdP sends back.

use std::sync::{Arc, Once};

use anyhow::{anyhow, Context};
use base64::Engine;
use idp_core::{FixedClock, SamlEnvironmentConfig};
use idp_crypto::SeededRandom;
use idp_protocol_saml::bindings::HttpRedirectBinding;
use idp_protocol_saml::{EncodedMessage, OriginEndpoints, SamlConfig, SamlService, XmlSigner};

/// IdP signing key.
pub const IDP_KEY_PEM: &str = include_str!("../../../crates/idp-protocol-saml/testdata/idp.key.pem");
/// IdP certificate.
pub const IDP_CERT_PEM: &str = include_str!("../../../crates/idp-protocol-saml/testdata/idp.cert.pem");
/// Certificate that signed the recorded Redirect-binding request.
pub const SP_CERT_PEM: &str = include_str!("../../../crates/idp-protocol-saml/testdata/sp.cert.pem");
/// A certificate no fixture was signed with.
pub const SP_OTHER_CERT_PEM: &str =
    include_str!("../../../crates/idp-protocol-saml/testdata/sp_other.cert.pem");
/// A second SP key pair, for requests signed during the test.
pub const SP_ALT_KEY_PEM: &str = include_str!("../../../crates/idp-protocol-saml/testdata/sp_alt.key.pem");
/// Certificate of [`SP_ALT_KEY_PEM`].
pub const SP_ALT_CERT_PEM: &str =
    include_str!("../../../crates/idp-protocol-saml/testdata/sp_alt.cert.pem");

/// Origin the IdP endpoints are served from.
pub const ORIGIN: &str = "http://localhost:3000";

/// Recorded `SAMLRequest` for `sp1`, base64 of raw DEFLATE, issued
/// 2024-09-05T07:35:34Z.
pub const RECORDED_SAML_REQUEST: &str = "fVLLTuMwFN0jzT9Y3rdxnZQGq4kmTDWaSDwqUmYxO9e5pUaxnfF1gM8njyKVBSx97rnnceU1StO0oujC0T7A/w4wkDfTWBTjIKOdt8JJ1CisNIAiKFEVtzeCz5lovQtOuYaerXy/IRHBB+0sJb+dVzD6ZvQgGwRKSLnJqAQes328ulRpquJDckjVSib1fsFrnkCcxssVZ8uUX1FSInZQWgzShoxyxpMZu5qx5Y6tRLwUcfKPkk3fSFs5eGb0GEIroqhxSjZHh0HEjLFoiM178EnbCNsFJcVHyl/OYmfAV+BftILHh5tJA3sRbEMvPdfS4NG9KokwV85EUmFfZHu6zLW2tbZP3x9lP5FQ/NnttrPtfbXrFchf8DiG7ik0Xw8hxVjYk7wsbquT6To6m5xoVbd/BhVI/uNiAu56z3IznNzI8HWYxXwxIrqeHUaqACN1U9S1B0SaD4V/wps0bTOWPXlP6oNZdG6fT8/Pnyt/Bw==";

/// RSA-SHA256 signature over [`RECORDED_SAML_REQUEST`] with RelayState
/// `indigo`, made with the key of [`SP_CERT_PEM`].
pub const RECORDED_SIGNATURE: &str = "LAre0pDAbJPSP1swdYTIDuTltnQGyfDtmJBnXyCr6Hij/EWvAhtS7g3SuDx3GYaUc2gv/NE1JFIXMEewziF80n2GcP9Xfog8ToxEqKcjT2VUTvAZGnY66u9jRcoqVhnbG15Q11HmQiGFVD0MoPVebOD8LtDOD1l6+IzuIYk+uHsiqHNM98UM+VDIZ0YlHGoO/bu9cJIpGStr+xQEA/VJcrpD+qB6a2QB7Tn2D+CIK5cf+7uROm44loJeI7vs9bwSvNQM7xvJPewXhWtqWCqg/mFsaV/FgYoHfP8zsBAi2RNJLf454Klih47he7wps8VN4FvtW4DP4ZE8J9HXXaYO/Q==";

/// ACS URL of the recorded request.
pub const RECORDED_ACS_URL: &str = "https://sptest.iamshowcase.com/acs";

const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

static TRACING: Once = Once::new();

/// Routes engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("idp_protocol_saml=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Builds the service for app `test` with the clock frozen at `now`.
///
/// # Errors
///
/// Fails if the fixtures do not load.
pub fn service(now: &str, config: SamlConfig) -> anyhow::Result<Arc<SamlService>> {
    init_tracing();
    let signer = XmlSigner::from_pem(IDP_KEY_PEM, IDP_CERT_PEM)?.with_config(config.signature);
    Ok(Arc::new(
        SamlService::new(
            "test",
            SamlEnvironmentConfig::for_testing(),
            Arc::new(config),
            Arc::new(OriginEndpoints::new(ORIGIN)?),
            Arc::new(signer),
        )
        .with_clock(Arc::new(FixedClock::at(now)?))
        .with_random(Arc::new(SeededRandom::new([42; 32]))),
    ))
}

/// Query string carrying the recorded request, RelayState and `signature`.
#[must_use]
pub fn recorded_redirect_query(signature: &str) -> String {
    format!(
        "SAMLRequest={}&RelayState=indigo&SigAlg={}&Signature={}",
        urlencoding::encode(RECORDED_SAML_REQUEST),
        urlencoding::encode(RSA_SHA256),
        urlencoding::encode(signature),
    )
}

/// Form body for the HTTP-POST binding.
#[must_use]
pub fn post_body(param: &str, xml: &str, relay_state: Option<&str>) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
    let mut body = format!("{param}={}", urlencoding::encode(&encoded));
    if let Some(relay_state) = relay_state {
        body.push_str("&RelayState=");
        body.push_str(&urlencoding::encode(relay_state));
    }
    body.into_bytes()
}

/// What the browser would submit after receiving `message`.
#[derive(Debug)]
pub struct Opened {
    /// Where the browser goes.
    pub target: String,
    /// The carried XML.
    pub xml: String,
    /// The carried RelayState.
    pub relay_state: Option<String>,
    /// The raw query string, for Redirect-binding messages.
    pub query: Option<String>,
}

/// Opens a message the IdP produced.
///
/// # Errors
///
/// Fails if the message is not well formed.
pub fn open(message: &EncodedMessage) -> anyhow::Result<Opened> {
    match message {
        EncodedMessage::Redirect { location } => {
            let (target, query) = location
                .split_once('?')
                .ok_or_else(|| anyhow!("redirect without query: {location}"))?;
            let decoded = HttpRedirectBinding::decode(query, 1 << 20)?;
            Ok(Opened {
                target: target.to_string(),
                xml: decoded.xml,
                relay_state: decoded.relay_state,
                query: Some(query.to_string()),
            })
        }
        EncodedMessage::AutoPostForm { action, html } => {
            let param = form_value(html, "SAMLResponse")
                .or_else(|| form_value(html, "SAMLRequest"))
                .context("form without SAML message")?;
            let xml = base64::engine::general_purpose::STANDARD.decode(param)?;
            Ok(Opened {
                target: action.clone(),
                xml: String::from_utf8(xml)?,
                relay_state: form_value(html, "RelayState"),
                query: None,
            })
        }
    }
}

fn form_value(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\" value=\"");
    let (_, rest) = html.split_once(marker.as_str())?;
    rest.split('"').next().map(str::to_string)
}
