//! Single logout across several service providers.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Utc};
use idp_crypto::{Certificate, SeededRandom};
use idp_integration_tests::{
    open, post_body, service, IDP_CERT_PEM, IDP_KEY_PEM, SP_ALT_CERT_PEM, SP_ALT_KEY_PEM,
};
use idp_protocol_saml::bindings::HttpRedirectBinding;
use idp_protocol_saml::xml::ParseLimits;
use idp_protocol_saml::{
    new_logout_response, EncodedMessage, InMemorySloSessionStore, LogoutRequest, LogoutResponse,
    NameId, NameIdFormat, SamlBinding, SamlConfig, SamlError, SamlMessageType, SamlResult,
    ServiceProviderConfig, SessionTerminator, SloOrchestrator, TerminatedSession,
    XmlSignatureValidator, XmlSigner,
};

const NOW: &str = "2024-09-05T07:37:00Z";
const SP1_LOGOUT_URL: &str = "http://localhost:3000/saml2/logout/sp1";

/// Session backend that remembers which sessions were ended.
#[derive(Default)]
struct RecordingSessions {
    terminated: Mutex<Vec<String>>,
}

impl SessionTerminator for RecordingSessions {
    fn terminate(&self, sid: &str) -> SamlResult<Option<TerminatedSession>> {
        self.terminated
            .lock()
            .map_err(|_| SamlError::Internal("poisoned".to_string()))?
            .push(sid.to_string());
        Ok(Some(TerminatedSession {
            user_id: "userid".to_string(),
            participated_service_provider_ids: ["sp1", "sp2", "sp3"]
                .into_iter()
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        }))
    }
}

fn sp(id: &str, binding: SamlBinding) -> ServiceProviderConfig {
    let mut sp = ServiceProviderConfig::new(id);
    sp.slo_enabled = true;
    sp.slo_callback_url = Some(format!("http://{id}.local/slo"));
    sp.slo_binding = binding;
    sp
}

struct Fixture {
    orchestrator: SloOrchestrator,
    store: Arc<InMemorySloSessionStore>,
    sessions: Arc<RecordingSessions>,
    idp_certificates: Vec<Certificate>,
}

fn fixture() -> anyhow::Result<Fixture> {
    let mut sp1 = sp("sp1", SamlBinding::HttpRedirect).with_certificate_pems(&[SP_ALT_CERT_PEM])?;
    sp1.signature_verification_enabled = true;
    let config = SamlConfig {
        service_providers: vec![
            sp1,
            sp("sp2", SamlBinding::HttpPost),
            sp("sp3", SamlBinding::HttpRedirect),
        ],
        ..SamlConfig::default()
    };
    let store = Arc::new(InMemorySloSessionStore::new());
    let sessions = Arc::new(RecordingSessions::default());
    let orchestrator = SloOrchestrator::new(service(NOW, config)?, store.clone(), sessions.clone());
    Ok(Fixture {
        orchestrator,
        store,
        sessions,
        idp_certificates: vec![Certificate::from_pem(IDP_CERT_PEM)?],
    })
}

fn now() -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(NOW)?.to_utc())
}

/// Query string of a LogoutRequest from sp1, signed with its key.
fn signed_logout_query() -> anyhow::Result<(String, String)> {
    let rng = SeededRandom::new([7; 32]);
    let request = LogoutRequest::new(&rng, now()?, "urn:sp1")
        .with_destination(SP1_LOGOUT_URL)
        .with_name_id(NameId::new("userid", NameIdFormat::Unspecified))
        .with_session_index("sid-1");
    let signer = XmlSigner::from_pem(SP_ALT_KEY_PEM, SP_ALT_CERT_PEM)?;
    let location = HttpRedirectBinding::encode(
        SamlMessageType::Request,
        &request.to_element().to_xml()?,
        SP1_LOGOUT_URL,
        Some("sp1-state"),
        Some(&signer),
    )?;
    let (_, query) = location
        .split_once('?')
        .context("redirect carries a query")?;
    Ok((request.id, query.to_string()))
}

/// An SP's LogoutResponse answering the request carried by `xml`.
fn sp_logout_response(xml: &str) -> anyhow::Result<LogoutResponse> {
    let request = LogoutRequest::from_xml(xml, ParseLimits::default())?;
    let rng = SeededRandom::new([8; 32]);
    Ok(new_logout_response(&rng, now()?, "urn:sp", Some(&request.id), false))
}

fn sp_logout_response_xml(xml: &str) -> anyhow::Result<String> {
    Ok(sp_logout_response(xml)?.to_element().to_xml()?)
}

fn partial(message: &EncodedMessage) -> anyhow::Result<bool> {
    let response = LogoutResponse::from_xml(&open(message)?.xml, ParseLimits::default())?;
    anyhow::ensure!(response.status.is_success(), "logout was answered with an error");
    Ok(!response.status.is_full_success())
}

#[test]
fn signed_logout_fans_out_and_answers_the_initiator() -> anyhow::Result<()> {
    let fixture = fixture()?;
    let validator = XmlSignatureValidator::new(&fixture.idp_certificates);
    let (request_id, query) = signed_logout_query()?;

    // sp2 comes first and is reached through an auto-submitted form.
    let to_sp2 = fixture.orchestrator.handle_logout_request(
        "sp1",
        SamlBinding::HttpRedirect,
        query.as_bytes(),
    )?;
    let terminated = fixture
        .sessions
        .terminated
        .lock()
        .map_err(|_| anyhow::anyhow!("poisoned"))?
        .clone();
    assert_eq!(terminated, ["sid-1"]);
    let opened = open(&to_sp2)?;
    assert_eq!(opened.target, "http://sp2.local/slo");
    validator.validate_document(&opened.xml, ParseLimits::default())?;
    let request = LogoutRequest::from_xml(&opened.xml, ParseLimits::default())?;
    assert_eq!(request.session_index(), Some("sid-1"));
    assert_eq!(request.destination.as_deref(), Some("http://sp2.local/slo"));
    assert_eq!(request.name_id.map(|n| n.value).as_deref(), Some("userid"));
    let slo_session = opened.relay_state.context("logout session in RelayState")?;
    assert_eq!(fixture.store.len(), 1);

    // sp3 is reached through a signed redirect.
    let body = post_body(
        "SAMLResponse",
        &sp_logout_response_xml(&opened.xml)?,
        Some(&slo_session),
    );
    let to_sp3 = fixture
        .orchestrator
        .handle_sp_return(SamlBinding::HttpPost, &body)?;
    let opened = open(&to_sp3)?;
    assert_eq!(opened.target, "http://sp3.local/slo");
    let decoded = HttpRedirectBinding::decode(
        opened.query.as_deref().context("redirect query")?,
        1 << 20,
    )?;
    let detached = decoded
        .detached_signature
        .context("IdP signs redirect messages")?;
    validator.validate_detached(&detached)?;
    assert_eq!(opened.relay_state.as_deref(), Some(slo_session.as_str()));

    // sp3 answers by redirect; the initiator gets the final response.
    let location = HttpRedirectBinding::encode(
        SamlMessageType::Response,
        &sp_logout_response_xml(&decoded.xml)?,
        "http://localhost:3000/saml2/logout",
        Some(&slo_session),
        None,
    )?;
    let (_, sp3_query) = location.split_once('?').context("query")?;
    let final_message = fixture
        .orchestrator
        .handle_sp_return(SamlBinding::HttpRedirect, sp3_query.as_bytes())?;
    assert!(matches!(final_message, EncodedMessage::Redirect { .. }));
    let opened = open(&final_message)?;
    assert_eq!(opened.target, "http://sp1.local/slo");
    assert_eq!(opened.relay_state.as_deref(), Some("sp1-state"));
    let response = LogoutResponse::from_xml(&opened.xml, ParseLimits::default())?;
    assert!(response.status.is_full_success());
    assert_eq!(response.in_response_to.as_deref(), Some(request_id.as_str()));
    assert!(fixture.store.is_empty());
    Ok(())
}

#[test]
fn tampered_logout_request_is_answered_with_an_error() -> anyhow::Result<()> {
    let fixture = fixture()?;
    let (_, query) = signed_logout_query()?;
    let tampered = query.replace("RelayState=sp1-state", "RelayState=sp1-other");
    assert_ne!(tampered, query);

    let message = fixture.orchestrator.handle_logout_request(
        "sp1",
        SamlBinding::HttpRedirect,
        tampered.as_bytes(),
    )?;
    let opened = open(&message)?;
    assert_eq!(opened.target, "http://sp1.local/slo");
    assert_eq!(opened.relay_state.as_deref(), Some("sp1-other"));

    let response = LogoutResponse::from_xml(&opened.xml, ParseLimits::default())?;
    assert!(!response.status.is_success());
    assert_eq!(response.status.status_message.as_deref(), Some("invalid signature"));
    assert!(fixture
        .sessions
        .terminated
        .lock()
        .map_err(|_| anyhow::anyhow!("poisoned"))?
        .is_empty());
    assert!(fixture.store.is_empty());
    Ok(())
}

#[test]
fn unknown_service_provider_cannot_start_logout() -> anyhow::Result<()> {
    let fixture = fixture()?;
    let (_, query) = signed_logout_query()?;
    let err = fixture
        .orchestrator
        .handle_logout_request("nobody", SamlBinding::HttpRedirect, query.as_bytes())
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
    Ok(())
}

/// Fixture where sp2 signs its messages with the alternate SP key.
fn signing_sp2_fixture() -> anyhow::Result<Fixture> {
    let mut sp2 = sp("sp2", SamlBinding::HttpPost).with_certificate_pems(&[SP_ALT_CERT_PEM])?;
    sp2.signature_verification_enabled = true;
    let config = SamlConfig {
        service_providers: vec![sp("sp1", SamlBinding::HttpRedirect), sp2],
        ..SamlConfig::default()
    };
    let store = Arc::new(InMemorySloSessionStore::new());
    let sessions = Arc::new(RecordingSessions::default());
    let orchestrator = SloOrchestrator::new(service(NOW, config)?, store.clone(), sessions.clone());
    Ok(Fixture {
        orchestrator,
        store,
        sessions,
        idp_certificates: vec![Certificate::from_pem(IDP_CERT_PEM)?],
    })
}

fn unsigned_logout_query() -> anyhow::Result<String> {
    let rng = SeededRandom::new([7; 32]);
    let request = LogoutRequest::new(&rng, now()?, "urn:sp1")
        .with_name_id(NameId::new("userid", NameIdFormat::Unspecified))
        .with_session_index("sid-1");
    let location = HttpRedirectBinding::encode(
        SamlMessageType::Request,
        &request.to_element().to_xml()?,
        SP1_LOGOUT_URL,
        Some("sp1-state"),
        None,
    )?;
    let (_, query) = location.split_once('?').context("query")?;
    Ok(query.to_string())
}

#[test]
fn signed_answer_confirms_logout() -> anyhow::Result<()> {
    let fixture = signing_sp2_fixture()?;
    let to_sp2 = fixture.orchestrator.handle_logout_request(
        "sp1",
        SamlBinding::HttpRedirect,
        unsigned_logout_query()?.as_bytes(),
    )?;
    let opened = open(&to_sp2)?;
    let slo_session = opened.relay_state.context("logout session in RelayState")?;

    let mut answer = sp_logout_response(&opened.xml)?.to_element();
    XmlSigner::from_pem(SP_ALT_KEY_PEM, SP_ALT_CERT_PEM)?.sign_enveloped(&mut answer)?;
    let body = post_body("SAMLResponse", &answer.to_xml()?, Some(&slo_session));
    let final_message = fixture
        .orchestrator
        .handle_sp_return(SamlBinding::HttpPost, &body)?;
    assert!(!partial(&final_message)?);
    assert!(fixture.store.is_empty());
    Ok(())
}

#[test]
fn forged_answer_does_not_confirm_logout() -> anyhow::Result<()> {
    let fixture = signing_sp2_fixture()?;
    let to_sp2 = fixture.orchestrator.handle_logout_request(
        "sp1",
        SamlBinding::HttpRedirect,
        unsigned_logout_query()?.as_bytes(),
    )?;
    let opened = open(&to_sp2)?;
    let slo_session = opened.relay_state.context("logout session in RelayState")?;

    // Right InResponseTo, but nobody signed it.
    let body = post_body(
        "SAMLResponse",
        &sp_logout_response_xml(&opened.xml)?,
        Some(&slo_session),
    );
    let final_message = fixture
        .orchestrator
        .handle_sp_return(SamlBinding::HttpPost, &body)?;
    let final_opened = open(&final_message)?;
    assert_eq!(final_opened.target, "http://sp1.local/slo");
    assert!(partial(&final_message)?);
    assert!(fixture.store.is_empty());
    Ok(())
}

#[test]
fn answer_signed_by_another_key_does_not_confirm_logout() -> anyhow::Result<()> {
    let fixture = signing_sp2_fixture()?;
    let to_sp2 = fixture.orchestrator.handle_logout_request(
        "sp1",
        SamlBinding::HttpRedirect,
        unsigned_logout_query()?.as_bytes(),
    )?;
    let opened = open(&to_sp2)?;
    let slo_session = opened.relay_state.context("logout session in RelayState")?;

    let mut answer = sp_logout_response(&opened.xml)?.to_element();
    XmlSigner::from_pem(IDP_KEY_PEM, IDP_CERT_PEM)?.sign_enveloped(&mut answer)?;
    let body = post_body("SAMLResponse", &answer.to_xml()?, Some(&slo_session));
    let final_message = fixture
        .orchestrator
        .handle_sp_return(SamlBinding::HttpPost, &body)?;
    assert!(partial(&final_message)?);
    Ok(())
}
