//! Single sign-on, from the SP's AuthnRequest to the signed Response.

use std::io::Write;

use anyhow::Context;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use idp_crypto::Certificate;
use idp_integration_tests::{
    open, post_body, recorded_redirect_query, service, IDP_CERT_PEM, RECORDED_ACS_URL,
    RECORDED_SIGNATURE, SP_ALT_CERT_PEM, SP_ALT_KEY_PEM, SP_CERT_PEM, SP_OTHER_CERT_PEM,
};
use idp_protocol_saml::xml::{self, ParseLimits};
use idp_protocol_saml::{
    AuthenticationInfo, AuthnRequest, EncodedMessage, NameIdFormat, ParseFailure, SamlBinding,
    SamlConfig, SamlError, SamlErrorCode, ServiceProviderConfig, SignatureFailure,
    XmlSignatureValidator, XmlSigner, SAMLP_NS, SAML_NS,
};
use serde_json::json;

const NOW: &str = "2024-09-05T07:37:00Z";
const LOGIN_URL: &str = "http://localhost:3000/saml2/login/sp1";

fn sp1(certificates: &[&str]) -> anyhow::Result<ServiceProviderConfig> {
    let mut sp = ServiceProviderConfig::new("sp1").with_certificate_pems(certificates)?;
    sp.acs_urls = vec![RECORDED_ACS_URL.to_string()];
    sp.name_id_format = NameIdFormat::Email;
    sp.signature_verification_enabled = true;
    Ok(sp)
}

fn config(sp: ServiceProviderConfig) -> SamlConfig {
    SamlConfig {
        service_providers: vec![sp],
        ..SamlConfig::default()
    }
}

fn status_detail(err: &SamlError) -> Vec<(String, String)> {
    err.protocol()
        .map(|code| {
            code.to_detail_elements()
                .iter()
                .map(|e| (e.name.clone(), e.text()))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn redirect_request_to_signed_post_response() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_CERT_PEM])?))?;
    let query = recorded_redirect_query(RECORDED_SIGNATURE);

    let sso = service.handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())?;
    assert_eq!(sso.request.id, "ae230b376c88c3f4f8c7a4db12d24e38357205829");
    assert_eq!(sso.request.destination.as_deref(), Some(LOGIN_URL));
    assert_eq!(sso.relay_state.as_deref(), Some("indigo"));
    assert_eq!(sso.callback_url, RECORDED_ACS_URL);

    let auth_info = AuthenticationInfo {
        user_id: "userid".to_string(),
        session_id: "sid-1".to_string(),
    };
    let user_info = json!({"sub": "userid", "email": "user@example.com"});
    let response = service.issue_success_response(
        &sso.callback_url,
        "sp1",
        &auth_info,
        &sso.request,
        &user_info,
    )?;
    let message =
        service.encode_response(&response, &sso.callback_url, sso.relay_state.as_deref())?;

    let opened = open(&message)?;
    assert_eq!(opened.target, RECORDED_ACS_URL);
    assert_eq!(opened.relay_state.as_deref(), Some("indigo"));

    let root = xml::parse(&opened.xml, ParseLimits::default())?;
    assert!(root.is(SAMLP_NS, "Response"));
    assert_eq!(root.attribute("InResponseTo"), Some(sso.request.id.as_str()));

    let idp_certificates = [Certificate::from_pem(IDP_CERT_PEM)?];
    let validator = XmlSignatureValidator::new(&idp_certificates);
    validator.validate_element(&root)?;

    let assertion = root
        .child(SAML_NS, "Assertion")
        .context("response carries an assertion")?;
    validator.validate_element(assertion)?;

    let name_id = assertion
        .child(SAML_NS, "Subject")
        .and_then(|subject| subject.child(SAML_NS, "NameID"))
        .context("assertion has a NameID")?;
    assert_eq!(name_id.text(), "user@example.com");
    assert_eq!(name_id.attribute("Format"), Some(NameIdFormat::Email.uri()));

    // The response itself is only signed once.
    let signatures = root
        .child_elements()
        .filter(|e| e.name == "Signature")
        .count();
    assert_eq!(signatures, 1);
    Ok(())
}

#[test]
fn redirect_signature_from_unregistered_certificate_is_rejected() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_OTHER_CERT_PEM])?))?;
    let query = recorded_redirect_query(RECORDED_SIGNATURE);

    let err = service
        .handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        SamlError::Protocol(SamlErrorCode::InvalidSignature {
            cause: SignatureFailure::NoMatchingCertificate
        })
    ));
    assert_eq!(err.http_status(), 401);

    let response = service
        .error_response(&err, None)
        .context("signature failures are answered")?;
    assert!(!response.is_success());
    assert_eq!(response.status.status_message.as_deref(), Some("invalid signature"));
    assert_eq!(status_detail(&err)[0], ("ErrorCode".to_string(), "InvalidSignature".to_string()));
    Ok(())
}

#[test]
fn any_registered_certificate_verifies() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_OTHER_CERT_PEM, SP_CERT_PEM])?))?;
    let query = recorded_redirect_query(RECORDED_SIGNATURE);
    service.handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())?;
    Ok(())
}

#[test]
fn redirect_request_without_signature_is_rejected() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_CERT_PEM])?))?;
    let query = format!(
        "SAMLRequest={}&RelayState=indigo",
        urlencoding::encode(idp_integration_tests::RECORDED_SAML_REQUEST)
    );
    let err = service
        .handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        SamlError::Protocol(SamlErrorCode::InvalidSignature {
            cause: SignatureFailure::MissingSignature
        })
    ));
    Ok(())
}

#[test]
fn post_request_signed_with_rotated_key() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_CERT_PEM, SP_ALT_CERT_PEM])?))?;
    let sp_signer = XmlSigner::from_pem(SP_ALT_KEY_PEM, SP_ALT_CERT_PEM)?;

    let issue_instant = chrono::DateTime::parse_from_rfc3339("2024-09-05T07:36:00Z")?.to_utc();
    let mut element = AuthnRequest::new("id_post", issue_instant)
        .with_issuer("urn:sp1")
        .with_destination(LOGIN_URL)
        .with_binding(SamlBinding::HttpPost)
        .with_acs_url(RECORDED_ACS_URL)
        .to_element();
    sp_signer.sign_enveloped(&mut element)?;
    let body = post_body("SAMLRequest", &element.to_xml()?, Some("violet"));

    let sso = service.handle_authn_request("sp1", SamlBinding::HttpPost, &body)?;
    assert_eq!(sso.request.id, "id_post");
    assert_eq!(sso.relay_state.as_deref(), Some("violet"));

    let unsigned = AuthnRequest::new("id_unsigned", issue_instant)
        .with_acs_url(RECORDED_ACS_URL)
        .to_element()
        .to_xml()?;
    let err = service
        .handle_authn_request("sp1", SamlBinding::HttpPost, &post_body("SAMLRequest", &unsigned, None))
        .unwrap_err();
    assert!(matches!(
        err,
        SamlError::Protocol(SamlErrorCode::InvalidSignature {
            cause: SignatureFailure::MissingSignature
        })
    ));
    Ok(())
}

#[test]
fn expired_request_is_rejected_after_signature_check() -> anyhow::Result<()> {
    let service = service("2024-09-05T08:35:34Z", config(sp1(&[SP_CERT_PEM])?))?;
    let query = recorded_redirect_query(RECORDED_SIGNATURE);
    let err = service
        .handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(
        status_detail(&err),
        [
            ("ErrorCode".to_string(), "InvalidRequest".to_string()),
            ("Field".to_string(), "IssueInstant".to_string()),
            ("Actual".to_string(), "2024-09-05T07:35:34Z".to_string()),
            ("Reason".to_string(), "request expired".to_string()),
        ]
    );

    let response = service
        .error_response(&err, None)
        .context("validation failures are answered")?;
    assert_eq!(response.status.status_message.as_deref(), Some("invalid SAMLRequest"));
    Ok(())
}

#[test]
fn decompression_bomb_is_refused() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_CERT_PEM])?))?;
    let limit = service.environment().max_inflated_bytes;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    let chunk = vec![b' '; 1 << 20];
    for _ in 0..=(limit >> 20) {
        encoder.write_all(&chunk)?;
    }
    let compressed = encoder.finish()?;
    let query = format!(
        "SAMLRequest={}",
        urlencoding::encode(&base64::engine::general_purpose::STANDARD.encode(compressed))
    );

    let err = service
        .handle_authn_request("sp1", SamlBinding::HttpRedirect, query.as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        SamlError::Protocol(SamlErrorCode::ParseRequestFailed {
            cause: ParseFailure::InflatedTooLarge { .. },
            ..
        })
    ));
    Ok(())
}

#[test]
fn unknown_service_provider_gets_no_saml_response() -> anyhow::Result<()> {
    let service = service(NOW, config(sp1(&[SP_CERT_PEM])?))?;
    let query = recorded_redirect_query(RECORDED_SIGNATURE);
    let err = service
        .handle_authn_request("nobody", SamlBinding::HttpRedirect, query.as_bytes())
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
    assert!(service.error_response(&err, None).is_none());
    Ok(())
}

#[test]
fn encoded_messages_become_http_responses() -> anyhow::Result<()> {
    let redirect = EncodedMessage::Redirect {
        location: "http://sp.local/slo?SAMLResponse=abc".to_string(),
    }
    .into_response();
    assert_eq!(redirect.status(), StatusCode::FOUND);
    assert_eq!(
        redirect.headers().get(header::LOCATION).map(|v| v.as_bytes()),
        Some(&b"http://sp.local/slo?SAMLResponse=abc"[..])
    );
    assert_eq!(
        redirect.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
        Some(&b"no-cache, no-store"[..])
    );

    let form = EncodedMessage::AutoPostForm {
        action: RECORDED_ACS_URL.to_string(),
        html: "<html></html>".to_string(),
    }
    .into_response();
    assert_eq!(form.status(), StatusCode::OK);
    assert!(form
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"text/html")));
    Ok(())
}
