//! AuthnRequest validation against a service provider's configuration.
//!
//! Pure function of its inputs: no I/O and no clock access. The first failing
//! check determines the reported error.

use chrono::{DateTime, Utc};
use idp_core::SamlEnvironmentConfig;

use crate::error::InvalidRequestError;
use crate::provider::ServiceProviderConfig;
use crate::types::{format_instant, AuthnRequest, NameIdFormat, SamlBinding, SAML_VERSION};

/// Bindings the IdP answers SSO requests with.
const SUPPORTED_RESPONSE_BINDINGS: [SamlBinding; 1] = [SamlBinding::HttpPost];

/// Validates `request` for `sp`.
///
/// Checks, in order: `Destination`, `ProtocolBinding`, `Version`,
/// `IssueInstant` freshness, `NameIDPolicy` format and the ACS URL.
///
/// # Errors
///
/// Returns the first failed check as an [`InvalidRequestError`].
pub fn validate_authn_request(
    sp: &ServiceProviderConfig,
    login_url: &str,
    request: &AuthnRequest,
    now: DateTime<Utc>,
    env: &SamlEnvironmentConfig,
) -> Result<(), InvalidRequestError> {
    if let Some(destination) = request.destination.as_deref().filter(|d| !d.is_empty()) {
        if destination != login_url {
            return Err(
                InvalidRequestError::new("Destination", destination, "unexpected Destination")
                    .with_expected(vec![login_url.to_string()]),
            );
        }
    }

    let binding_uri = request
        .protocol_binding
        .as_deref()
        .filter(|b| !b.is_empty())
        .unwrap_or(SamlBinding::HttpPost.uri());
    let binding_supported = SamlBinding::from_uri(binding_uri)
        .is_some_and(|b| SUPPORTED_RESPONSE_BINDINGS.contains(&b));
    if !binding_supported {
        return Err(InvalidRequestError::new(
            "ProtocolBinding",
            binding_uri,
            "unsupported ProtocolBinding",
        )
        .with_expected(
            SUPPORTED_RESPONSE_BINDINGS
                .iter()
                .map(|b| b.uri().to_string())
                .collect(),
        ));
    }

    if request.version != SAML_VERSION {
        return Err(
            InvalidRequestError::new("Version", request.version.as_str(), "unsupported Version")
                .with_expected(vec![SAML_VERSION.to_string()]),
        );
    }

    check_issue_instant(request.issue_instant, now, env)?;

    if let Some(format) = request.name_id_format() {
        let mut allowed = vec![
            sp.name_id_format.uri().to_string(),
            NameIdFormat::Unspecified.uri().to_string(),
        ];
        allowed.sort();
        allowed.dedup();
        if !allowed.iter().any(|a| a == format) {
            return Err(InvalidRequestError::new(
                "NameIDPolicy/Format",
                format,
                "unsupported NameIDPolicy Format",
            )
            .with_expected(allowed));
        }
    }

    if let Some(acs_url) = request.assertion_consumer_service_url.as_deref() {
        if !sp.is_allowed_acs_url(acs_url) {
            return Err(InvalidRequestError::new(
                "AssertionConsumerServiceURL",
                acs_url,
                "AssertionConsumerServiceURL not allowed",
            ));
        }
    }

    Ok(())
}

fn check_issue_instant(
    issue_instant: DateTime<Utc>,
    now: DateTime<Utc>,
    env: &SamlEnvironmentConfig,
) -> Result<(), InvalidRequestError> {
    let expires_at = issue_instant
        .checked_add_signed(env.max_authn_request_age())
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if expires_at < now {
        return Err(InvalidRequestError::new(
            "IssueInstant",
            format_instant(issue_instant),
            "request expired",
        ));
    }

    let latest_accepted = now
        .checked_add_signed(env.clock_skew())
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if issue_instant > latest_accepted {
        return Err(InvalidRequestError::new(
            "IssueInstant",
            format_instant(issue_instant),
            "request issued in the future",
        ));
    }

    Ok(())
}
