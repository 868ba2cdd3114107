//! Service provider configuration and the collaborators the engine reads it
//! through.
//!
//! Persistence is out of scope: hosts implement [`ServiceProviderRegistry`]
//! and [`SamlEndpoints`] over whatever storage and routing they have.
//! [`SamlConfig`] is a ready-made in-memory registry.

use chrono::TimeDelta;
use idp_crypto::Certificate;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::SignatureConfig;
use crate::types::{AttributeNameFormat, NameIdFormat, SamlBinding};

/// Default JSON pointer used to resolve an unspecified-format NameID.
pub const DEFAULT_NAME_ID_ATTRIBUTE_POINTER: &str = "/sub";

/// Default assertion lifetime, in seconds.
pub const DEFAULT_ASSERTION_VALID_DURATION_SECS: i64 = 1200;

/// Per service provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderConfig {
    /// Identifier the SP is registered under.
    pub client_id: String,

    /// NameID format the IdP issues to this SP.
    #[serde(default)]
    pub name_id_format: NameIdFormat,

    /// JSON pointer into the user profile for unspecified-format NameIDs.
    #[serde(default = "default_name_id_attribute_pointer")]
    pub name_id_attribute_pointer: String,

    /// Allowed assertion consumer service URLs. The first one is the default.
    #[serde(default)]
    pub acs_urls: Vec<String>,

    /// Overrides the Response `Destination`.
    #[serde(default)]
    pub destination: Option<String>,

    /// Overrides the subject confirmation `Recipient`.
    #[serde(default)]
    pub recipient: Option<String>,

    /// Overrides the assertion `Audience`.
    #[serde(default)]
    pub audience: Option<String>,

    /// Assertion lifetime in seconds.
    #[serde(default = "default_assertion_valid_duration_secs")]
    pub assertion_valid_duration_secs: i64,

    /// Whether inbound requests must be signed.
    #[serde(default)]
    pub signature_verification_enabled: bool,

    /// Whether this SP takes part in single logout.
    #[serde(default)]
    pub slo_enabled: bool,

    /// Where logout requests for this SP are delivered.
    #[serde(default)]
    pub slo_callback_url: Option<String>,

    /// Binding used to deliver logout requests.
    #[serde(default = "default_slo_binding")]
    pub slo_binding: SamlBinding,

    /// Attribute definitions and their user-profile mappings.
    #[serde(default)]
    pub attributes: AttributesConfig,

    /// Certificates trusted for this SP's signatures. Any one suffices.
    #[serde(skip)]
    pub certificates: Vec<Certificate>,
}

fn default_name_id_attribute_pointer() -> String {
    DEFAULT_NAME_ID_ATTRIBUTE_POINTER.to_string()
}

const fn default_assertion_valid_duration_secs() -> i64 {
    DEFAULT_ASSERTION_VALID_DURATION_SECS
}

const fn default_slo_binding() -> SamlBinding {
    SamlBinding::HttpRedirect
}

impl ServiceProviderConfig {
    /// Creates a configuration with defaults for everything but the id.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name_id_format: NameIdFormat::default(),
            name_id_attribute_pointer: default_name_id_attribute_pointer(),
            acs_urls: Vec::new(),
            destination: None,
            recipient: None,
            audience: None,
            assertion_valid_duration_secs: DEFAULT_ASSERTION_VALID_DURATION_SECS,
            signature_verification_enabled: false,
            slo_enabled: false,
            slo_callback_url: None,
            slo_binding: default_slo_binding(),
            attributes: AttributesConfig::default(),
            certificates: Vec::new(),
        }
    }

    /// Adds trusted certificates from PEM.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Crypto`] for the first PEM that does not parse.
    pub fn with_certificate_pems(mut self, pems: &[&str]) -> SamlResult<Self> {
        for pem in pems {
            self.certificates.push(Certificate::from_pem(pem)?);
        }
        Ok(self)
    }

    /// Returns the default ACS URL.
    #[must_use]
    pub fn default_acs_url(&self) -> Option<&str> {
        self.acs_urls.first().map(String::as_str)
    }

    /// Returns true if `url` is an allowed ACS URL.
    #[must_use]
    pub fn is_allowed_acs_url(&self, url: &str) -> bool {
        self.acs_urls.iter().any(|allowed| allowed == url)
    }

    /// Returns the assertion lifetime.
    #[must_use]
    pub fn assertion_valid_duration(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.assertion_valid_duration_secs).unwrap_or(TimeDelta::MAX)
    }
}

/// SAML attributes released to a service provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributesConfig {
    /// Attribute definitions, in release order.
    #[serde(default)]
    pub definitions: Vec<AttributeDefinition>,

    /// Where each attribute's values come from.
    #[serde(default)]
    pub mappings: Vec<AttributeMapping>,
}

/// A SAML attribute the IdP may release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Attribute `Name`.
    pub name: String,

    /// Attribute `NameFormat`.
    #[serde(default)]
    pub name_format: AttributeNameFormat,

    /// Attribute `FriendlyName`.
    #[serde(default)]
    pub friendly_name: Option<String>,
}

/// Maps a value source onto a defined SAML attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Value source.
    pub from: AttributeSource,

    /// Name of the target attribute definition.
    pub to: String,
}

/// Where an attribute value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    /// A JSON pointer into the user profile.
    UserProfile {
        /// The pointer, e.g. `/address/country`.
        pointer: String,
    },
    /// A text template rendered against the user profile.
    TextTemplate {
        /// The template, e.g. `{{.sub}}@example.com`.
        template: String,
    },
}

/// Per-app SAML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlConfig {
    /// Registered service providers.
    pub service_providers: Vec<ServiceProviderConfig>,

    /// How the IdP signs outbound messages.
    pub signature: SignatureConfig,
}

impl SamlConfig {
    /// Loads the configuration from JSON.
    ///
    /// Certificates are not part of the serialized form; attach them with
    /// [`ServiceProviderConfig::with_certificate_pems`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Config`] if the JSON does not match.
    pub fn from_json(json: &str) -> SamlResult<Self> {
        serde_json::from_str(json).map_err(|e| SamlError::Config(e.to_string()))
    }

    /// Finds a service provider by id.
    #[must_use]
    pub fn find(&self, client_id: &str) -> Option<&ServiceProviderConfig> {
        self.service_providers
            .iter()
            .find(|sp| sp.client_id == client_id)
    }
}

/// Read-only lookup of service providers.
pub trait ServiceProviderRegistry: Send + Sync {
    /// Returns the SP registered under `client_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn service_provider(&self, client_id: &str) -> SamlResult<Option<ServiceProviderConfig>>;
}

impl ServiceProviderRegistry for SamlConfig {
    fn service_provider(&self, client_id: &str) -> SamlResult<Option<ServiceProviderConfig>> {
        Ok(self.find(client_id).cloned())
    }
}

/// The IdP's own URLs, per service provider.
pub trait SamlEndpoints: Send + Sync {
    /// URL AuthnRequests from `client_id` must be addressed to.
    fn login_url(&self, client_id: &str) -> String;

    /// URL logout messages from `client_id` must be addressed to.
    fn logout_url(&self, client_id: &str) -> String;
}

/// Endpoints under `{origin}/saml2/login/{id}` and `{origin}/saml2/logout/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginEndpoints {
    origin: url::Url,
}

impl OriginEndpoints {
    /// Creates endpoints under the given origin.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Config`] if `origin` is not an absolute URL.
    pub fn new(origin: &str) -> SamlResult<Self> {
        let origin = url::Url::parse(origin)
            .map_err(|e| SamlError::Config(format!("invalid origin {origin}: {e}")))?;
        Ok(Self { origin })
    }

    fn path(&self, segment: &str, client_id: &str) -> String {
        let mut url = self.origin.clone();
        url.set_query(None);
        url.set_path(&format!("/saml2/{segment}/{}", urlencoding::encode(client_id)));
        url.to_string()
    }
}

impl SamlEndpoints for OriginEndpoints {
    fn login_url(&self, client_id: &str) -> String {
        self.path("login", client_id)
    }

    fn logout_url(&self, client_id: &str) -> String {
        self.path("logout", client_id)
    }
}
