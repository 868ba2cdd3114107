//! SAML service facade.
//!
//! [`SamlService`] ties the engine together for one app: it decodes inbound
//! messages, verifies and validates them against the service provider's
//! settings, issues signed responses and logout messages, and encodes them
//! for the browser. Time and randomness are injected so tests can pin them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use idp_core::{Clock, SamlEnvironmentConfig, SystemClock};
use idp_crypto::{SecureRandom, SystemRandom};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::attributes::{resolve_name_id, resolve_user_attributes};
use crate::bindings::{
    self, DecodedMessage, DetachedSignature, EncodedMessage, HttpPostBinding, HttpRedirectBinding,
    SamlMessageType,
};
use crate::error::{SamlError, SamlErrorCode, SamlResult, SignatureFailure};
use crate::id::generate_id;
use crate::provider::{SamlEndpoints, ServiceProviderConfig, ServiceProviderRegistry};
use crate::signature::{XmlSignatureValidator, XmlSigner};
use crate::slo::SloSession;
use crate::types::{
    new_error_response, new_logout_response, new_no_passive_response, new_success_response,
    new_unexpected_server_error_response, Assertion, AuthnRequest, AuthnStatement, Conditions,
    LogoutRequest, LogoutResponse, NameId, NameIdFormat, Response, SamlBinding, Status, Subject,
    SubjectConfirmationData, XMLDSIG_NS,
};
use crate::validator::validate_authn_request;
use crate::xml::{Element, ParseLimits};

/// The authenticated user a response is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationInfo {
    /// Stable user identifier.
    pub user_id: String,
    /// IdP session identifier, emitted as `SessionIndex`.
    pub session_id: String,
}

/// An AuthnRequest that passed decoding, signature verification and
/// validation.
///
/// The host authenticates the user and then answers with
/// [`SamlService::issue_success_response`] to `callback_url`.
#[derive(Debug, Clone)]
pub struct SsoRequest {
    /// The requesting service provider.
    pub service_provider: ServiceProviderConfig,
    /// The parsed request.
    pub request: AuthnRequest,
    /// RelayState to echo back.
    pub relay_state: Option<String>,
    /// Where the response goes: the requested ACS URL or the SP default.
    pub callback_url: String,
}

/// SAML identity provider service for one app.
pub struct SamlService {
    app_id: String,
    env: SamlEnvironmentConfig,
    registry: Arc<dyn ServiceProviderRegistry>,
    endpoints: Arc<dyn SamlEndpoints>,
    signer: Arc<XmlSigner>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn SecureRandom>,
}

impl SamlService {
    /// Creates a service using the system clock and random source.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        env: SamlEnvironmentConfig,
        registry: Arc<dyn ServiceProviderRegistry>,
        endpoints: Arc<dyn SamlEndpoints>,
        signer: Arc<XmlSigner>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            env,
            registry,
            endpoints,
            signer,
            clock: Arc::new(SystemClock),
            random: Arc::new(SystemRandom),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the random source.
    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = random;
        self
    }

    /// Returns the IdP entity ID for this app.
    #[must_use]
    pub fn idp_entity_id(&self) -> String {
        self.env.idp_entity_id(&self.app_id)
    }

    /// Returns the environment settings.
    #[must_use]
    pub const fn environment(&self) -> &SamlEnvironmentConfig {
        &self.env
    }

    /// Returns the endpoint resolver.
    #[must_use]
    pub fn endpoints(&self) -> &dyn SamlEndpoints {
        self.endpoints.as_ref()
    }

    /// Returns the current time from the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    pub(crate) fn random(&self) -> &dyn SecureRandom {
        self.random.as_ref()
    }

    fn parse_limits(&self) -> ParseLimits {
        ParseLimits::from(&self.env)
    }

    /// Looks up a service provider.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ServiceProviderNotFound`] for unknown ids, or
    /// the registry's own failure.
    pub fn service_provider(&self, client_id: &str) -> SamlResult<ServiceProviderConfig> {
        self.registry
            .service_provider(client_id)?
            .ok_or(SamlError::Protocol(SamlErrorCode::ServiceProviderNotFound))
    }

    /// Decodes a message received on `binding`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ParseRequestFailed`] if the transport
    /// encoding is invalid.
    pub fn decode_message(&self, binding: SamlBinding, raw: &[u8]) -> SamlResult<DecodedMessage> {
        bindings::decode(binding, raw, self.env.max_inflated_bytes).map_err(|cause| {
            SamlErrorCode::parse_failed("failed to decode SAML message", cause).into()
        })
    }

    /// Parses an `AuthnRequest` document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ParseRequestFailed`] for malformed XML.
    pub fn parse_authn_request(&self, xml: &str) -> SamlResult<AuthnRequest> {
        AuthnRequest::from_xml(xml, self.parse_limits())
            .map_err(|cause| SamlErrorCode::parse_failed("malformed AuthnRequest", cause).into())
    }

    /// Parses a `LogoutRequest` document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ParseRequestFailed`] for malformed XML.
    pub fn parse_logout_request(&self, xml: &str) -> SamlResult<LogoutRequest> {
        LogoutRequest::from_xml(xml, self.parse_limits())
            .map_err(|cause| SamlErrorCode::parse_failed("malformed LogoutRequest", cause).into())
    }

    /// Parses a `LogoutResponse` document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ParseRequestFailed`] for malformed XML.
    pub fn parse_logout_response(&self, xml: &str) -> SamlResult<LogoutResponse> {
        LogoutResponse::from_xml(xml, self.parse_limits())
            .map_err(|cause| SamlErrorCode::parse_failed("malformed LogoutResponse", cause).into())
    }

    /// Validates an `AuthnRequest` for `sp` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::InvalidRequest`] for the first failed check.
    pub fn validate_authn_request(
        &self,
        sp: &ServiceProviderConfig,
        request: &AuthnRequest,
    ) -> SamlResult<()> {
        let login_url = self.endpoints.login_url(&sp.client_id);
        validate_authn_request(sp, &login_url, request, self.now(), &self.env)?;
        Ok(())
    }

    /// Verifies the enveloped signature of `raw_xml` against the SP's
    /// certificates.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::InvalidSignature`] unless some trusted
    /// certificate verifies the document.
    pub fn verify_embedded(&self, sp: &ServiceProviderConfig, raw_xml: &str) -> SamlResult<()> {
        XmlSignatureValidator::new(&sp.certificates)
            .validate_document(raw_xml, self.parse_limits())
            .map_err(|cause| signature_rejected(sp, cause))?;
        debug!(sp = %sp.client_id, "verified embedded signature");
        Ok(())
    }

    /// Verifies a Redirect-binding query signature against the SP's
    /// certificates.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::InvalidSignature`] unless some trusted
    /// certificate verifies the signed octets.
    pub fn verify_external(
        &self,
        sp: &ServiceProviderConfig,
        signature: &DetachedSignature,
    ) -> SamlResult<()> {
        XmlSignatureValidator::new(&sp.certificates)
            .validate_detached(signature)
            .map_err(|cause| signature_rejected(sp, cause))?;
        debug!(sp = %sp.client_id, "verified query signature");
        Ok(())
    }

    /// Verifies whichever signature the binding carries, if the SP requires
    /// signed requests.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::InvalidSignature`] for missing or invalid
    /// signatures.
    pub fn verify_request_signature(
        &self,
        sp: &ServiceProviderConfig,
        message: &DecodedMessage,
    ) -> SamlResult<()> {
        if !sp.signature_verification_enabled {
            return Ok(());
        }
        match message.binding {
            SamlBinding::HttpRedirect => match &message.detached_signature {
                Some(signature) => self.verify_external(sp, signature),
                None => Err(signature_rejected(sp, SignatureFailure::MissingSignature)),
            },
            SamlBinding::HttpPost => self.verify_embedded(sp, &message.xml),
        }
    }

    /// Runs an inbound SSO request through decoding, signature verification
    /// and validation.
    ///
    /// # Errors
    ///
    /// Returns the first protocol error encountered. Render it with
    /// [`Self::error_response`].
    pub fn handle_authn_request(
        &self,
        sp_id: &str,
        binding: SamlBinding,
        raw: &[u8],
    ) -> SamlResult<SsoRequest> {
        let sp = self.service_provider(sp_id)?;
        let message = self.decode_message(binding, raw)?;
        let request = self.parse_authn_request(&message.xml)?;
        self.verify_request_signature(&sp, &message)?;
        self.validate_authn_request(&sp, &request)?;

        if request.is_passive && request.force_authn {
            return Err(crate::error::InvalidRequestError::new(
                "ForceAuthn",
                "true",
                "IsPassive=true with ForceAuthn=true is not allowed",
            )
            .into());
        }

        let callback_url = match request.assertion_consumer_service_url.as_deref() {
            Some(url) => url.to_string(),
            None => sp
                .default_acs_url()
                .ok_or_else(|| {
                    SamlError::Config(format!("service provider {} has no ACS URL", sp.client_id))
                })?
                .to_string(),
        };

        info!(
            sp = %sp.client_id,
            request_id = %request.id,
            binding = ?binding,
            "accepted AuthnRequest"
        );
        Ok(SsoRequest {
            service_provider: sp,
            request,
            relay_state: message.relay_state,
            callback_url,
        })
    }

    /// Issues a signed-assertion success response.
    ///
    /// The assertion is signed here; the response envelope is signed when
    /// it is encoded.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::MissingNameId`] or
    /// [`SamlErrorCode::UnsupportedAttributeType`] when the user profile
    /// cannot satisfy the SP, and internal errors if signing fails.
    pub fn issue_success_response(
        &self,
        callback_url: &str,
        sp_id: &str,
        auth_info: &AuthenticationInfo,
        request: &AuthnRequest,
        user_info: &Value,
    ) -> SamlResult<Response> {
        let sp = self.service_provider(sp_id)?;
        let now = self.now();
        let issuer = self.idp_entity_id();

        let destination = sp.destination.as_deref().unwrap_or(callback_url);
        let recipient = sp.recipient.as_deref().unwrap_or(callback_url);
        let audience = sp.audience.as_deref().unwrap_or(callback_url);

        let name_id_format = request
            .name_id_policy
            .as_ref()
            .and_then(|policy| policy.parsed_format())
            .unwrap_or(sp.name_id_format);
        let name_id = resolve_name_id(name_id_format, &sp, user_info)?;
        let attributes = resolve_user_attributes(&sp, user_info)?;

        let (not_before, not_on_or_after) = self.validity_window(&sp, request.issue_instant, now);

        let mut assertion = Assertion {
            id: generate_id(self.random(), "id"),
            issue_instant: now,
            issuer: issuer.clone(),
            signature: None,
            subject: Subject {
                name_id: NameId::new(name_id, name_id_format),
                confirmation: SubjectConfirmationData {
                    in_response_to: Some(request.id.clone()),
                    not_on_or_after,
                    recipient: recipient.to_string(),
                },
            },
            conditions: Conditions {
                not_before,
                not_on_or_after,
                audience: audience.to_string(),
            },
            authn_statement: AuthnStatement::new(not_before, auth_info.session_id.as_str()),
            attributes,
        };
        assertion.signature = Some(self.signer.signature_for(&assertion.to_element())?);

        let mut response = new_success_response(self.random(), now, &issuer, Some(&request.id))
            .with_destination(destination);
        response.assertion = Some(assertion);

        info!(
            sp = %sp.client_id,
            user_id = %auth_info.user_id,
            response_id = %response.id,
            "issued SAML response"
        );
        Ok(response)
    }

    /// `NotBefore` is now minus the clock skew, but never earlier than the
    /// request itself. `NotOnOrAfter` follows from the SP's assertion lifetime.
    fn validity_window(
        &self,
        sp: &ServiceProviderConfig,
        request_issue_instant: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let not_before = now
            .checked_sub_signed(self.env.clock_skew())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .max(request_issue_instant);
        let not_on_or_after = not_before
            .checked_add_signed(sp.assertion_valid_duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (not_before, not_on_or_after)
    }

    /// Issues the `NoPassive` answer for a passive request the IdP cannot
    /// satisfy without user interaction.
    #[must_use]
    pub fn issue_no_passive_response(&self, callback_url: &str, request: &AuthnRequest) -> Response {
        new_no_passive_response(self.random(), self.now(), &self.idp_entity_id(), Some(&request.id))
            .with_destination(callback_url)
    }

    /// Issues a `LogoutRequest` asking `sp` to end the user's session.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Config`] if the SP has no SLO callback URL.
    pub fn issue_logout_request(
        &self,
        sp: &ServiceProviderConfig,
        slo_session: &SloSession,
    ) -> SamlResult<LogoutRequest> {
        let destination = sp.slo_callback_url.as_deref().ok_or_else(|| {
            SamlError::Config(format!(
                "service provider {} has no SLO callback URL",
                sp.client_id
            ))
        })?;
        Ok(
            LogoutRequest::new(self.random(), self.now(), &self.idp_entity_id())
                .with_destination(destination)
                .with_name_id(NameId::new(
                    slo_session.entry.user_id.as_str(),
                    NameIdFormat::Unspecified,
                ))
                .with_session_index(slo_session.entry.sid.as_str()),
        )
    }

    /// Issues the final `LogoutResponse` to the SP that started a logout.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ServiceProviderNotFound`] for unknown SPs.
    pub fn issue_logout_response(
        &self,
        callback_url: &str,
        sp_id: &str,
        in_response_to: Option<&str>,
        is_some_failed: bool,
    ) -> SamlResult<LogoutResponse> {
        let sp = self.service_provider(sp_id)?;
        let response = new_logout_response(
            self.random(),
            self.now(),
            &self.idp_entity_id(),
            in_response_to,
            is_some_failed,
        )
        .with_destination(callback_url);
        info!(
            sp = %sp.client_id,
            partial = is_some_failed,
            "issued LogoutResponse"
        );
        Ok(response)
    }

    /// Renders an error as the `Response` returned to the requester.
    ///
    /// Returns `None` when no SAML response should be sent, which is the
    /// case for unknown service providers: there is nowhere trustworthy to
    /// deliver it.
    #[must_use]
    pub fn error_response(&self, err: &SamlError, in_response_to: Option<&str>) -> Option<Response> {
        let now = self.now();
        let issuer = self.idp_entity_id();
        match err {
            SamlError::Protocol(SamlErrorCode::ServiceProviderNotFound) => {
                warn!("SAML request for unknown service provider");
                None
            }
            SamlError::Protocol(code) => {
                warn!(error_code = code.error_code(), error = %code, "SAML request rejected");
                Some(new_error_response(self.random(), now, &issuer, code).in_response_to(in_response_to))
            }
            other => {
                error!(error = %other, "unexpected SAML failure");
                Some(
                    new_unexpected_server_error_response(self.random(), now, &issuer)
                        .in_response_to(in_response_to),
                )
            }
        }
    }

    /// Renders an error met while processing a logout as the
    /// `LogoutResponse` returned to the SP's SLO callback.
    #[must_use]
    pub fn logout_error_response(&self, err: &SamlError, callback_url: &str) -> LogoutResponse {
        let status = match err {
            SamlError::Protocol(code) => {
                warn!(error_code = code.error_code(), error = %code, "SAML logout rejected");
                Status::for_error(code)
            }
            other => {
                error!(error = %other, "unexpected SAML logout failure");
                Status::unexpected_server_error()
            }
        };
        LogoutResponse::new(self.random(), self.now(), &self.idp_entity_id(), status)
            .with_destination(callback_url)
    }

    /// Signs and encodes `element` for delivery to `destination`.
    ///
    /// With HTTP-POST the element gets an enveloped signature unless it is
    /// already signed; with HTTP-Redirect the query string is signed instead.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or serialization fails.
    pub fn encode_message(
        &self,
        binding: SamlBinding,
        message_type: SamlMessageType,
        destination: &str,
        mut element: Element,
        relay_state: Option<&str>,
    ) -> SamlResult<EncodedMessage> {
        match binding {
            SamlBinding::HttpPost => {
                if element.child(XMLDSIG_NS, "Signature").is_none() {
                    self.signer.sign_enveloped(&mut element)?;
                }
                let html =
                    HttpPostBinding::encode(message_type, &element.to_xml()?, destination, relay_state);
                Ok(EncodedMessage::AutoPostForm {
                    action: destination.to_string(),
                    html,
                })
            }
            SamlBinding::HttpRedirect => {
                let location = HttpRedirectBinding::encode(
                    message_type,
                    &element.to_xml()?,
                    destination,
                    relay_state,
                    Some(&self.signer),
                )?;
                Ok(EncodedMessage::Redirect { location })
            }
        }
    }

    /// Encodes an SSO response. Responses to AuthnRequests always use
    /// HTTP-POST.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or serialization fails.
    pub fn encode_response(
        &self,
        response: &Response,
        callback_url: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<EncodedMessage> {
        self.encode_message(
            SamlBinding::HttpPost,
            SamlMessageType::Response,
            callback_url,
            response.to_element(),
            relay_state,
        )
    }
}

impl std::fmt::Debug for SamlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlService")
            .field("app_id", &self.app_id)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

fn signature_rejected(sp: &ServiceProviderConfig, cause: SignatureFailure) -> SamlError {
    warn!(sp = %sp.client_id, cause = %cause, "rejected request signature");
    cause.into()
}
