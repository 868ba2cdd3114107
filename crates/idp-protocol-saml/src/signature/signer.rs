//! XML Signature creation.
//!
//! Produces enveloped signatures for SAML documents and the detached
//! signatures used by the HTTP-Redirect binding.

use base64::Engine;
use idp_crypto::{digest, Certificate, RsaSigningKey};

use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, XMLDSIG_NS};
use crate::xml::c14n::canonicalize;
use crate::xml::Element;

use super::{SignatureAlgorithm, SignatureConfig};

/// XML document signer.
///
/// Signs SAML documents using the identity provider's key.
pub struct XmlSigner {
    key: RsaSigningKey,
    certificate: Certificate,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a new signer from a key and its certificate.
    #[must_use]
    pub fn new(key: RsaSigningKey, certificate: Certificate) -> Self {
        Self {
            key,
            certificate,
            config: SignatureConfig::default(),
        }
    }

    /// Creates a new signer from PEM-encoded key and certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Crypto`] if either PEM cannot be parsed.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> SamlResult<Self> {
        Ok(Self::new(
            RsaSigningKey::from_pem(private_key_pem)?,
            Certificate::from_pem(certificate_pem)?,
        ))
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configured signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.config.algorithm
    }

    /// Returns the signing certificate.
    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Computes the enveloped `ds:Signature` for `element`.
    ///
    /// The element must carry an `ID` attribute and must not already contain
    /// the signature being produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the element has no `ID` or signing fails.
    pub fn signature_for(&self, element: &Element) -> SamlResult<Element> {
        let id = element
            .attribute("ID")
            .ok_or_else(|| SamlError::Internal(format!("{} has no ID to sign", element.name)))?;

        let digest_algorithm = self.config.algorithm.digest();
        let canonical = canonicalize(element, &[], &[]);
        let digest_value = digest(digest_algorithm.hash_algorithm(), canonical.as_bytes());

        let signed_info = ds("SignedInfo")
            .with_child(
                ds("CanonicalizationMethod")
                    .with_attribute("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
            )
            .with_child(ds("SignatureMethod").with_attribute("Algorithm", self.config.algorithm.uri()))
            .with_child(
                ds("Reference")
                    .with_attribute("URI", format!("#{id}"))
                    .with_child(
                        ds("Transforms")
                            .with_child(ds("Transform").with_attribute(
                                "Algorithm",
                                canonicalization_algorithms::ENVELOPED_SIGNATURE,
                            ))
                            .with_child(ds("Transform").with_attribute(
                                "Algorithm",
                                canonicalization_algorithms::EXCLUSIVE_C14N,
                            )),
                    )
                    .with_child(ds("DigestMethod").with_attribute("Algorithm", digest_algorithm.uri()))
                    .with_child(ds("DigestValue").with_text(base64_encode(&digest_value))),
            );

        let canonical_signed_info = canonicalize(&signed_info, &[], &[]);
        let signature_value = self
            .key
            .sign(self.config.algorithm.rsa_algorithm(), canonical_signed_info.as_bytes())?;

        let key_info = self.config.include_certificate.then(|| {
            ds("KeyInfo").with_child(
                ds("X509Data").with_child(ds("X509Certificate").with_text(self.certificate.to_base64())),
            )
        });

        Ok(ds("Signature")
            .with_namespace("ds", XMLDSIG_NS)
            .with_child(signed_info)
            .with_child(ds("SignatureValue").with_text(base64_encode(&signature_value)))
            .with_optional_child(key_info))
    }

    /// Signs `element` in place, inserting the signature after its `Issuer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the element has no `ID` or signing fails.
    pub fn sign_enveloped(&self, element: &mut Element) -> SamlResult<()> {
        let signature = self.signature_for(element)?;
        element.insert_after("Issuer", signature);
        Ok(())
    }

    /// Signs the octets of a Redirect-binding query and returns the base64
    /// signature value.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Crypto`] if signing fails.
    pub fn sign_query(&self, signed_bytes: &[u8]) -> SamlResult<String> {
        let signature = self
            .key
            .sign(self.config.algorithm.rsa_algorithm(), signed_bytes)?;
        Ok(base64_encode(&signature))
    }
}

impl std::fmt::Debug for XmlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSigner")
            .field("certificate", &self.certificate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn ds(name: &str) -> Element {
    Element::ns("ds", name, XMLDSIG_NS)
}

fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SAML_NS;

    const KEY_PEM: &str = include_str!("../../testdata/idp.key.pem");
    const CERT_PEM: &str = include_str!("../../testdata/idp.cert.pem");

    fn signer() -> XmlSigner {
        XmlSigner::from_pem(KEY_PEM, CERT_PEM).unwrap()
    }

    fn document() -> Element {
        Element::ns("saml", "Assertion", SAML_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", "id_abc")
            .with_child(Element::ns("saml", "Issuer", SAML_NS).with_text("urn:idp"))
            .with_child(Element::ns("saml", "Subject", SAML_NS))
    }

    #[test]
    fn inserts_signature_after_issuer() {
        let mut element = document();
        signer().sign_enveloped(&mut element).unwrap();
        let names: Vec<&str> = element.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Issuer", "Signature", "Subject"]);

        let signature = element.child(XMLDSIG_NS, "Signature").unwrap();
        let reference = signature
            .child(XMLDSIG_NS, "SignedInfo")
            .and_then(|s| s.child(XMLDSIG_NS, "Reference"))
            .unwrap();
        assert_eq!(reference.attribute("URI"), Some("#id_abc"));
        assert!(signature.child(XMLDSIG_NS, "KeyInfo").is_some());
    }

    #[test]
    fn omits_key_info_when_configured() {
        let signer = signer().with_config(SignatureConfig {
            algorithm: SignatureAlgorithm::RsaSha512,
            include_certificate: false,
        });
        let signature = signer.signature_for(&document()).unwrap();
        assert!(signature.child(XMLDSIG_NS, "KeyInfo").is_none());
    }

    #[test]
    fn requires_an_id() {
        let element = Element::ns("saml", "Assertion", SAML_NS);
        assert!(matches!(
            signer().signature_for(&element),
            Err(SamlError::Internal(_))
        ));
    }

    #[test]
    fn refuses_sha1() {
        let signer = signer().with_config(SignatureConfig::with_algorithm(SignatureAlgorithm::RsaSha1));
        assert!(matches!(
            signer.sign_query(b"SAMLRequest=x"),
            Err(SamlError::Crypto(_))
        ));
    }

    #[test]
    fn query_signature_verifies_with_certificate() {
        let signer = signer();
        let data = b"SAMLResponse=abc&RelayState=xyz&SigAlg=alg";
        let b64 = signer.sign_query(data).unwrap();
        let sig = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        signer
            .certificate()
            .verify(idp_crypto::RsaAlgorithm::Rs256, data, &sig)
            .unwrap();
    }
}
