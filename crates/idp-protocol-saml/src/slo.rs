//! Single logout.
//!
//! When a service provider asks the IdP to log a user out, every other SP
//! that took part in the user's session is sent a `LogoutRequest` in turn,
//! one browser round trip each. Progress is kept in an [`SloSession`] whose
//! id travels as `RelayState`, so each SP's `LogoutResponse` can be matched
//! back up. Once no SP is pending, the originating SP gets the final
//! `LogoutResponse`.
//!
//! An SP's answer only counts as a successful logout if it comes from the SP
//! that was asked, answers the request that was sent, and passes that SP's
//! signature requirements.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use idp_core::{Clock, SamlEnvironmentConfig, SystemClock};
use idp_crypto::SecureRandom;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bindings::{DecodedMessage, EncodedMessage, SamlMessageType};
use crate::error::{InvalidRequestError, ParseFailure, SamlError, SamlErrorCode, SamlResult};
use crate::id::generate_id;
use crate::provider::ServiceProviderConfig;
use crate::service::SamlService;
use crate::types::{LogoutRequest, SamlBinding};

/// State of one single logout in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloSession {
    /// Session id, used as `RelayState` towards the other SPs.
    pub id: String,
    /// What remains to be done.
    pub entry: SloSessionEntry,
}

impl SloSession {
    /// Creates a session with a fresh id.
    #[must_use]
    pub fn new(rng: &dyn SecureRandom, entry: SloSessionEntry) -> Self {
        Self {
            id: generate_id(rng, "slo"),
            entry,
        }
    }
}

/// Bookkeeping for a single logout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloSessionEntry {
    /// SPs that still have to be sent a `LogoutRequest`.
    pub pending_logout_service_provider_ids: BTreeSet<String>,
    /// The SP that started the logout.
    pub service_provider_id: String,
    /// The originating `LogoutRequest`, answered once everything is done.
    pub logout_request_xml: String,
    /// Binding for the final `LogoutResponse`.
    pub response_binding: SamlBinding,
    /// Where the final `LogoutResponse` goes.
    pub callback_url: String,
    /// RelayState received with the originating request.
    pub relay_state: Option<String>,
    /// The IdP session being terminated.
    pub sid: String,
    /// The user being logged out.
    pub user_id: String,
    /// Whether some SP could not be logged out.
    #[serde(default)]
    pub some_failed: bool,
    /// The SP whose `LogoutResponse` is expected next.
    #[serde(default)]
    pub awaiting_service_provider_id: Option<String>,
    /// ID of the `LogoutRequest` that SP was sent.
    #[serde(default)]
    pub awaiting_request_id: Option<String>,
}

/// Storage for [`SloSession`]s.
pub trait SloSessionStore: Send + Sync {
    /// Loads a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn get(&self, id: &str) -> SamlResult<Option<SloSession>>;

    /// Inserts or replaces a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn save(&self, session: &SloSession) -> SamlResult<()>;

    /// Removes a session. Removing an absent session is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn delete(&self, id: &str) -> SamlResult<()>;
}

struct StoredSession {
    saved_at: DateTime<Utc>,
    bytes: Vec<u8>,
}

/// Process-local [`SloSessionStore`] keeping sessions as JSON.
///
/// A session is forgotten once it has gone untouched for longer than the
/// store's time to live, so logouts abandoned halfway do not pile up.
pub struct InMemorySloSessionStore {
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl Default for InMemorySloSessionStore {
    fn default() -> Self {
        Self::from_environment(&SamlEnvironmentConfig::default())
    }
}

impl InMemorySloSessionStore {
    /// Creates an empty store with the default time to live.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store using the environment's SLO session lifetime.
    #[must_use]
    pub fn from_environment(env: &SamlEnvironmentConfig) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ttl: env.slo_session_ttl(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the clock used to stamp and expire sessions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the time to live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of sessions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn purge_expired(&self, sessions: &mut HashMap<String, StoredSession>, now: DateTime<Utc>) {
        let before = sessions.len();
        sessions.retain(|_, stored| {
            stored
                .saved_at
                .checked_add_signed(self.ttl)
                .map_or(true, |expires_at| now <= expires_at)
        });
        let purged = before - sessions.len();
        if purged > 0 {
            debug!(purged, "dropped expired SLO sessions");
        }
    }
}

impl SloSessionStore for InMemorySloSessionStore {
    fn get(&self, id: &str) -> SamlResult<Option<SloSession>> {
        let now = self.clock.now_utc();
        let mut sessions = self.sessions.write();
        self.purge_expired(&mut sessions, now);
        sessions
            .get(id)
            .map(|stored| serde_json::from_slice(&stored.bytes).map_err(|e| storage_error(&e)))
            .transpose()
    }

    fn save(&self, session: &SloSession) -> SamlResult<()> {
        let bytes = serde_json::to_vec(session).map_err(|e| storage_error(&e))?;
        let now = self.clock.now_utc();
        let mut sessions = self.sessions.write();
        self.purge_expired(&mut sessions, now);
        sessions.insert(
            session.id.clone(),
            StoredSession {
                saved_at: now,
                bytes,
            },
        );
        Ok(())
    }

    fn delete(&self, id: &str) -> SamlResult<()> {
        self.sessions.write().remove(id);
        Ok(())
    }
}

impl std::fmt::Debug for InMemorySloSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySloSessionStore")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

fn storage_error(err: &serde_json::Error) -> SamlError {
    idp_core::Error::Storage(format!("SLO session encoding: {err}")).into()
}

/// An IdP session that was ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminatedSession {
    /// The session's user.
    pub user_id: String,
    /// Every SP that took part in the terminated sessions.
    pub participated_service_provider_ids: BTreeSet<String>,
}

/// Ends IdP sessions on behalf of a logout.
pub trait SessionTerminator: Send + Sync {
    /// Ends the session identified by `sid` and everything linked to it.
    ///
    /// Returns `None` if there is no such session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    fn terminate(&self, sid: &str) -> SamlResult<Option<TerminatedSession>>;
}

/// Drives single logout across service providers.
pub struct SloOrchestrator {
    service: Arc<SamlService>,
    store: Arc<dyn SloSessionStore>,
    sessions: Arc<dyn SessionTerminator>,
}

impl SloOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        service: Arc<SamlService>,
        store: Arc<dyn SloSessionStore>,
        sessions: Arc<dyn SessionTerminator>,
    ) -> Self {
        Self {
            service,
            store,
            sessions,
        }
    }

    /// Builds, signs and encodes a `LogoutRequest` for `sp`, carrying the
    /// session id as `RelayState`.
    ///
    /// The session records `sp` and the request's ID so the answer can be
    /// checked against them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built or signed.
    pub fn send_slo_request(
        &self,
        slo_session: &mut SloSession,
        sp: &ServiceProviderConfig,
    ) -> SamlResult<EncodedMessage> {
        let request = self.service.issue_logout_request(sp, slo_session)?;
        let destination = request.destination.clone().unwrap_or_default();
        let message = self.service.encode_message(
            sp.slo_binding,
            SamlMessageType::Request,
            &destination,
            request.to_element(),
            Some(&slo_session.id),
        )?;
        debug!(sp = %sp.client_id, slo_session = %slo_session.id, "sending LogoutRequest");
        slo_session.entry.awaiting_service_provider_id = Some(sp.client_id.clone());
        slo_session.entry.awaiting_request_id = Some(request.id);
        Ok(message)
    }

    /// Handles a `LogoutRequest` from `sp_id`.
    ///
    /// Failures after the SP is known are answered with an error
    /// `LogoutResponse` to its SLO callback, so the result is `Ok` for them.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ServiceProviderNotFound`] for unknown SPs and
    /// SPs without single logout, and [`SamlError::Config`] if the SP has no
    /// SLO callback URL.
    pub fn handle_logout_request(
        &self,
        sp_id: &str,
        binding: SamlBinding,
        raw: &[u8],
    ) -> SamlResult<EncodedMessage> {
        let sp = self.service.service_provider(sp_id)?;
        if !sp.slo_enabled {
            return Err(SamlErrorCode::ServiceProviderNotFound.into());
        }
        let callback_url = sp.slo_callback_url.clone().ok_or_else(|| {
            SamlError::Config(format!(
                "service provider {} has no SLO callback URL",
                sp.client_id
            ))
        })?;

        let message = match self.service.decode_message(binding, raw) {
            Ok(message) => message,
            Err(err) => return self.error_message(&sp, &callback_url, None, &err),
        };
        let relay_state = message.relay_state.clone();

        let outcome = self
            .service
            .parse_logout_request(&message.xml)
            .and_then(|request| {
                self.service.verify_request_signature(&sp, &message)?;
                self.start_logout(&sp, &callback_url, relay_state.as_deref(), &request)
            });
        match outcome {
            Ok(message) => Ok(message),
            Err(err) => self.error_message(&sp, &callback_url, relay_state.as_deref(), &err),
        }
    }

    fn start_logout(
        &self,
        sp: &ServiceProviderConfig,
        callback_url: &str,
        relay_state: Option<&str>,
        request: &LogoutRequest,
    ) -> SamlResult<EncodedMessage> {
        let terminated = match request.session_index() {
            Some(sid) => self
                .sessions
                .terminate(sid)?
                .map(|terminated| (sid.to_string(), terminated)),
            None => None,
        };

        if let Some((sid, mut terminated)) = terminated {
            terminated
                .participated_service_provider_ids
                .remove(&sp.client_id);
            if !terminated.user_id.is_empty()
                && !terminated.participated_service_provider_ids.is_empty()
            {
                let session = SloSession::new(
                    self.service.random(),
                    SloSessionEntry {
                        pending_logout_service_provider_ids: terminated
                            .participated_service_provider_ids,
                        service_provider_id: sp.client_id.clone(),
                        logout_request_xml: request.to_element().to_xml()?,
                        response_binding: sp.slo_binding,
                        callback_url: callback_url.to_string(),
                        relay_state: relay_state.map(str::to_string),
                        sid,
                        user_id: terminated.user_id,
                        some_failed: false,
                        awaiting_service_provider_id: None,
                        awaiting_request_id: None,
                    },
                );
                info!(
                    sp = %sp.client_id,
                    slo_session = %session.id,
                    pending = session.entry.pending_logout_service_provider_ids.len(),
                    "started single logout"
                );
                self.store.save(&session)?;
                return self.continue_logout(session);
            }
        }

        let response =
            self.service
                .issue_logout_response(callback_url, &sp.client_id, Some(&request.id), false)?;
        self.service.encode_message(
            sp.slo_binding,
            SamlMessageType::Response,
            callback_url,
            response.to_element(),
            relay_state,
        )
    }

    /// Sends the next pending SP its `LogoutRequest`, or finishes the logout
    /// with the final `LogoutResponse` when none is left.
    ///
    /// SPs that are unknown or have single logout disabled are skipped. An SP
    /// whose request cannot be built is skipped and the final response
    /// reports a partial logout.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the final response cannot be
    /// built.
    pub fn continue_logout(&self, mut session: SloSession) -> SamlResult<EncodedMessage> {
        while let Some(sp_id) = session
            .entry
            .pending_logout_service_provider_ids
            .pop_first()
        {
            let sp = match self.service.service_provider(&sp_id) {
                Ok(sp) if sp.slo_enabled => sp,
                Ok(_) | Err(SamlError::Protocol(SamlErrorCode::ServiceProviderNotFound)) => {
                    debug!(sp = %sp_id, "skipping service provider without single logout");
                    continue;
                }
                Err(err) => {
                    warn!(sp = %sp_id, error = %err, "failed to load service provider for logout");
                    session.entry.some_failed = true;
                    continue;
                }
            };
            match self.send_slo_request(&mut session, &sp) {
                Ok(message) => {
                    self.store.save(&session)?;
                    return Ok(message);
                }
                Err(err) => {
                    warn!(sp = %sp_id, error = %err, "failed to send LogoutRequest");
                    session.entry.some_failed = true;
                }
            }
        }
        self.finish_logout(&session)
    }

    fn finish_logout(&self, session: &SloSession) -> SamlResult<EncodedMessage> {
        let entry = &session.entry;
        let request = self.service.parse_logout_request(&entry.logout_request_xml)?;
        let response = self.service.issue_logout_response(
            &entry.callback_url,
            &entry.service_provider_id,
            Some(&request.id),
            entry.some_failed,
        )?;
        self.store.delete(&session.id)?;
        info!(
            slo_session = %session.id,
            partial = entry.some_failed,
            "finished single logout"
        );
        self.service.encode_message(
            entry.response_binding,
            SamlMessageType::Response,
            &entry.callback_url,
            response.to_element(),
            entry.relay_state.as_deref(),
        )
    }

    /// Handles an SP's `LogoutResponse` and moves on to the next SP.
    ///
    /// The response is matched to its logout through `RelayState`. It
    /// confirms the logout only if it answers the last `LogoutRequest` sent,
    /// carries a valid signature from that SP when the SP signs its
    /// messages, and reports success. Anything else marks the logout as
    /// partial.
    ///
    /// # Errors
    ///
    /// Returns [`SamlErrorCode::ParseRequestFailed`] if the message has no
    /// `RelayState` or cannot be decoded, and [`idp_core::Error::NotFound`]
    /// if the logout it belongs to is unknown or has expired.
    pub fn handle_sp_return(&self, binding: SamlBinding, raw: &[u8]) -> SamlResult<EncodedMessage> {
        let message = self.service.decode_message(binding, raw)?;
        let relay_state = message.relay_state.as_deref().ok_or_else(|| {
            SamlError::from(SamlErrorCode::parse_failed(
                "missing RelayState",
                ParseFailure::MissingParameter("RelayState"),
            ))
        })?;
        let mut session = self.store.get(relay_state)?.ok_or_else(|| {
            SamlError::Core(idp_core::Error::NotFound(format!("SLO session {relay_state}")))
        })?;

        let sp_id = session.entry.awaiting_service_provider_id.take();
        let request_id = session.entry.awaiting_request_id.take();
        if let Err(err) = self.confirm_logout(&message, sp_id.as_deref(), request_id.as_deref()) {
            warn!(
                slo_session = %session.id,
                sp = sp_id.as_deref().unwrap_or_default(),
                error = %err,
                "service provider did not confirm logout"
            );
            session.entry.some_failed = true;
        }
        self.continue_logout(session)
    }

    fn confirm_logout(
        &self,
        message: &DecodedMessage,
        sp_id: Option<&str>,
        request_id: Option<&str>,
    ) -> SamlResult<()> {
        if message.message_type != SamlMessageType::Response {
            return Err(
                InvalidRequestError::new("SAMLResponse", "", "expected a LogoutResponse").into(),
            );
        }
        let (Some(sp_id), Some(request_id)) = (sp_id, request_id) else {
            return Err(
                InvalidRequestError::new("RelayState", "", "no LogoutRequest outstanding").into(),
            );
        };
        let sp = self.service.service_provider(sp_id)?;
        self.service.verify_request_signature(&sp, message)?;
        let response = self.service.parse_logout_response(&message.xml)?;
        if response.in_response_to.as_deref() != Some(request_id) {
            return Err(InvalidRequestError::new(
                "InResponseTo",
                response.in_response_to.unwrap_or_default(),
                "does not answer the outstanding LogoutRequest",
            )
            .with_expected(vec![request_id.to_string()])
            .into());
        }
        if !response.status.is_success() {
            return Err(InvalidRequestError::new(
                "Status/StatusCode",
                response.status.status_code.value,
                "logout refused",
            )
            .into());
        }
        Ok(())
    }

    fn error_message(
        &self,
        sp: &ServiceProviderConfig,
        callback_url: &str,
        relay_state: Option<&str>,
        err: &SamlError,
    ) -> SamlResult<EncodedMessage> {
        let response = self.service.logout_error_response(err, callback_url);
        self.service.encode_message(
            sp.slo_binding,
            SamlMessageType::Response,
            callback_url,
            response.to_element(),
            relay_state,
        )
    }
}

impl std::fmt::Debug for SloOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SloOrchestrator")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
