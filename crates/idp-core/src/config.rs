//! SAML environment configuration.
//!
//! Process-level settings shared by every tenant. Loaded from environment
//! variables (and a `.env` file when present) with sensible defaults.

use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default template for the IdP entity ID.
pub const DEFAULT_IDP_ENTITY_ID_TEMPLATE: &str = "urn:{{.app_id}}.localhost";

/// Default ceiling on inflated HTTP-Redirect payloads (10 MiB).
pub const DEFAULT_MAX_INFLATED_BYTES: u64 = 10 * 1024 * 1024;

/// SAML environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlEnvironmentConfig {
    /// Template rendered with the app id to produce the IdP entity ID.
    pub idp_entity_id_template: String,

    /// How long after its `IssueInstant` an AuthnRequest is accepted, in seconds.
    pub max_authn_request_age_secs: i64,

    /// Tolerated clock difference with service providers, in seconds.
    pub clock_skew_secs: i64,

    /// Ceiling on DEFLATE output for HTTP-Redirect messages, in bytes.
    pub max_inflated_bytes: u64,

    /// Largest XML document accepted by the parser, in bytes.
    pub max_document_bytes: usize,

    /// Deepest element nesting accepted by the parser.
    pub max_document_depth: usize,

    /// How long an unfinished single logout is kept after its last step, in seconds.
    pub slo_session_ttl_secs: i64,
}

impl Default for SamlEnvironmentConfig {
    fn default() -> Self {
        Self {
            idp_entity_id_template: DEFAULT_IDP_ENTITY_ID_TEMPLATE.to_string(),
            max_authn_request_age_secs: 300,
            clock_skew_secs: 300,
            max_inflated_bytes: DEFAULT_MAX_INFLATED_BYTES,
            max_document_bytes: 10 * 1024 * 1024,
            max_document_depth: 64,
            slo_session_ttl_secs: 600,
        }
    }
}

impl SamlEnvironmentConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SAML_IDP_ENTITY_ID_TEMPLATE` | `urn:{{.app_id}}.localhost` |
    /// | `SAML_MAX_AUTHN_REQUEST_AGE_SECS` | 300 |
    /// | `SAML_CLOCK_SKEW_SECS` | 300 |
    /// | `SAML_MAX_INFLATED_BYTES` | 10485760 |
    /// | `SAML_MAX_DOCUMENT_BYTES` | 10485760 |
    /// | `SAML_MAX_DOCUMENT_DEPTH` | 64 |
    /// | `SAML_SLO_SESSION_TTL_SECS` | 600 |
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a `.env` file exists but cannot be
    /// parsed, or a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        load_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            idp_entity_id_template: lookup("SAML_IDP_ENTITY_ID_TEMPLATE")
                .unwrap_or(defaults.idp_entity_id_template),
            max_authn_request_age_secs: parse_var(
                &lookup,
                "SAML_MAX_AUTHN_REQUEST_AGE_SECS",
                defaults.max_authn_request_age_secs,
            )?,
            clock_skew_secs: parse_var(&lookup, "SAML_CLOCK_SKEW_SECS", defaults.clock_skew_secs)?,
            max_inflated_bytes: parse_var(
                &lookup,
                "SAML_MAX_INFLATED_BYTES",
                defaults.max_inflated_bytes,
            )?,
            max_document_bytes: parse_var(
                &lookup,
                "SAML_MAX_DOCUMENT_BYTES",
                defaults.max_document_bytes,
            )?,
            max_document_depth: parse_var(
                &lookup,
                "SAML_MAX_DOCUMENT_DEPTH",
                defaults.max_document_depth,
            )?,
            slo_session_ttl_secs: parse_var(
                &lookup,
                "SAML_SLO_SESSION_TTL_SECS",
                defaults.slo_session_ttl_secs,
            )?,
        };
        config.validate()?;
        tracing::debug!(
            max_authn_request_age_secs = config.max_authn_request_age_secs,
            clock_skew_secs = config.clock_skew_secs,
            "loaded SAML environment configuration"
        );
        Ok(config)
    }

    /// Creates a configuration suitable for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_inflated_bytes: 64 * 1024,
            max_document_bytes: 256 * 1024,
            ..Self::default()
        }
    }

    /// Checks that limits and windows are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.max_authn_request_age_secs <= 0 {
            return Err(Error::Config(
                "max_authn_request_age_secs must be positive".to_string(),
            ));
        }
        if self.clock_skew_secs < 0 {
            return Err(Error::Config("clock_skew_secs must not be negative".to_string()));
        }
        if self.max_inflated_bytes == 0 || self.max_document_bytes == 0 {
            return Err(Error::Config("size limits must be positive".to_string()));
        }
        if self.max_document_depth == 0 {
            return Err(Error::Config("max_document_depth must be positive".to_string()));
        }
        if self.slo_session_ttl_secs <= 0 {
            return Err(Error::Config("slo_session_ttl_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the AuthnRequest freshness window.
    #[must_use]
    pub fn max_authn_request_age(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.max_authn_request_age_secs).unwrap_or(TimeDelta::MAX)
    }

    /// Returns the tolerated clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.clock_skew_secs).unwrap_or(TimeDelta::MAX)
    }

    /// Returns how long an abandoned single logout is remembered.
    #[must_use]
    pub fn slo_session_ttl(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.slo_session_ttl_secs).unwrap_or(TimeDelta::MAX)
    }

    /// Renders the IdP entity ID for an app.
    ///
    /// Both `{{.app_id}}` and `{{app_id}}` placeholders are substituted.
    #[must_use]
    pub fn idp_entity_id(&self, app_id: &str) -> String {
        self.idp_entity_id_template
            .replace("{{.app_id}}", app_id)
            .replace("{{app_id}}", app_id)
    }
}

/// A missing `.env` file is fine; an unreadable or malformed one is not.
fn load_dotenv<T>(result: dotenvy::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(Error::Config(format!("failed to load .env: {err}"))),
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
    }
}
