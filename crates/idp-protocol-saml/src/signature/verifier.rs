//! XML Signature validation.
//!
//! Verifies enveloped signatures on inbound SAML documents and the detached
//! query-string signatures of the HTTP-Redirect binding against a service
//! provider's trusted certificates.

use base64::Engine;
use idp_crypto::{digest, Certificate};

use crate::bindings::DetachedSignature;
use crate::error::SignatureFailure;
use crate::types::{canonicalization_algorithms, XMLDSIG_NS};
use crate::xml::c14n::{canonicalize, inherited_namespaces};
use crate::xml::{parse, Element, Node, ParseLimits};

use super::{DigestAlgorithm, SignatureAlgorithm};

/// `InclusiveNamespaces` lives in the exclusive c14n namespace.
const EXC_C14N_NS: &str = canonicalization_algorithms::EXCLUSIVE_C14N;

/// XML signature validator.
///
/// Validates signatures using the certificates trusted for one service
/// provider. A signature is accepted if any certificate verifies it.
#[derive(Debug, Clone, Copy)]
pub struct XmlSignatureValidator<'a> {
    trusted_certificates: &'a [Certificate],
}

impl<'a> XmlSignatureValidator<'a> {
    /// Creates a validator over the given trusted certificates.
    #[must_use]
    pub const fn new(trusted_certificates: &'a [Certificate]) -> Self {
        Self {
            trusted_certificates,
        }
    }

    /// Parses `xml` and validates the enveloped signature on its root.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureFailure`] if the document is unsigned, the
    /// signature is malformed, or no trusted certificate verifies it.
    pub fn validate_document(&self, xml: &str, limits: ParseLimits) -> Result<(), SignatureFailure> {
        self.require_certificates()?;
        let root = parse(xml, limits).map_err(|e| SignatureFailure::Malformed(e.to_string()))?;
        self.validate_element(&root)
    }

    /// Validates the enveloped signature on an already parsed root element.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_document`].
    pub fn validate_element(&self, root: &Element) -> Result<(), SignatureFailure> {
        self.require_certificates()?;

        let mut signatures = root.children_named(XMLDSIG_NS, "Signature");
        let signature = signatures.next().ok_or(SignatureFailure::MissingSignature)?;
        if signatures.next().is_some() {
            return Err(SignatureFailure::MultipleSignatures);
        }

        let signed_info = ds_child(signature, "SignedInfo")?;

        let c14n_method = algorithm_of(ds_child(signed_info, "CanonicalizationMethod")?)?;
        if c14n_method != canonicalization_algorithms::EXCLUSIVE_C14N {
            return Err(SignatureFailure::UnsupportedAlgorithm(c14n_method.to_string()));
        }
        let signed_info_prefixes = inclusive_prefixes(ds_child(signed_info, "CanonicalizationMethod")?);

        let method_uri = algorithm_of(ds_child(signed_info, "SignatureMethod")?)?;
        let algorithm = SignatureAlgorithm::from_uri(method_uri)
            .ok_or_else(|| SignatureFailure::UnsupportedAlgorithm(method_uri.to_string()))?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| SignatureFailure::Malformed("missing Reference".to_string()))?;
        if references.next().is_some() {
            return Err(SignatureFailure::Malformed(
                "more than one Reference".to_string(),
            ));
        }
        check_reference_target(root, reference.attribute("URI").unwrap_or(""))?;

        let reference_prefixes = check_transforms(reference)?;

        let digest_uri = algorithm_of(ds_child(reference, "DigestMethod")?)?;
        let digest_algorithm = DigestAlgorithm::from_uri(digest_uri)
            .ok_or_else(|| SignatureFailure::UnsupportedAlgorithm(digest_uri.to_string()))?;
        let expected_digest = decode_base64(&ds_child(reference, "DigestValue")?.text())?;

        let canonical = canonicalize(&without_signature(root), &[], &reference_prefixes);
        if digest(digest_algorithm.hash_algorithm(), canonical.as_bytes()) != expected_digest {
            return Err(SignatureFailure::DigestMismatch);
        }

        let inherited = inherited_namespaces(&[root, signature, signed_info]);
        let canonical_signed_info = canonicalize(signed_info, &inherited, &signed_info_prefixes);
        let signature_value = decode_base64(&ds_child(signature, "SignatureValue")?.text())?;

        self.verify_with_any(algorithm, canonical_signed_info.as_bytes(), &signature_value)
    }

    /// Validates a Redirect-binding query-string signature.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureFailure`] if the algorithm is unsupported, the
    /// signature is not base64, or no trusted certificate verifies it.
    pub fn validate_detached(&self, detached: &DetachedSignature) -> Result<(), SignatureFailure> {
        self.require_certificates()?;

        let sig_alg = detached
            .sig_alg()
            .map_err(|e| SignatureFailure::Malformed(e.to_string()))?;
        let algorithm = SignatureAlgorithm::from_uri(&sig_alg)
            .ok_or(SignatureFailure::UnsupportedAlgorithm(sig_alg))?;
        let signature = decode_base64(&detached.signature)?;

        self.verify_with_any(algorithm, &detached.signed_bytes(), &signature)
    }

    fn require_certificates(&self) -> Result<(), SignatureFailure> {
        if self.trusted_certificates.is_empty() {
            return Err(SignatureFailure::NoCertificates);
        }
        Ok(())
    }

    fn verify_with_any(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureFailure> {
        let rsa = algorithm.rsa_algorithm();
        if self
            .trusted_certificates
            .iter()
            .any(|cert| cert.verify(rsa, data, signature).is_ok())
        {
            Ok(())
        } else {
            Err(SignatureFailure::NoMatchingCertificate)
        }
    }
}

fn ds_child<'e>(parent: &'e Element, name: &str) -> Result<&'e Element, SignatureFailure> {
    parent
        .child(XMLDSIG_NS, name)
        .ok_or_else(|| SignatureFailure::Malformed(format!("missing {name}")))
}

fn algorithm_of(element: &Element) -> Result<&str, SignatureFailure> {
    element.attribute("Algorithm").ok_or_else(|| {
        SignatureFailure::Malformed(format!("{} has no Algorithm", element.name))
    })
}

fn inclusive_prefixes(element: &Element) -> Vec<String> {
    element
        .child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|e| e.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// The reference must select the whole document: an empty URI, or the
/// root's own `ID`, which has to be unique.
fn check_reference_target(root: &Element, uri: &str) -> Result<(), SignatureFailure> {
    let root_id = root.attribute("ID");
    if !uri.is_empty() {
        let target = uri.strip_prefix('#').ok_or(SignatureFailure::ReferenceMismatch)?;
        if root_id != Some(target) {
            return Err(SignatureFailure::ReferenceMismatch);
        }
    }
    if let Some(id) = root_id {
        if root.count_ids(id) != 1 {
            return Err(SignatureFailure::DuplicateId);
        }
    }
    Ok(())
}

/// Accepts only the enveloped-signature and exclusive c14n transforms and
/// returns the inclusive prefix list of the latter.
fn check_transforms(reference: &Element) -> Result<Vec<String>, SignatureFailure> {
    let mut enveloped = false;
    let mut prefixes = Vec::new();
    if let Some(transforms) = reference.child(XMLDSIG_NS, "Transforms") {
        for transform in transforms.children_named(XMLDSIG_NS, "Transform") {
            match algorithm_of(transform)? {
                canonicalization_algorithms::ENVELOPED_SIGNATURE => enveloped = true,
                canonicalization_algorithms::EXCLUSIVE_C14N => {
                    prefixes = inclusive_prefixes(transform);
                }
                other => return Err(SignatureFailure::UnsupportedAlgorithm(other.to_string())),
            }
        }
    }
    if !enveloped {
        return Err(SignatureFailure::Malformed(
            "enveloped-signature transform required".to_string(),
        ));
    }
    Ok(prefixes)
}

fn without_signature(root: &Element) -> Element {
    let mut copy = root.clone();
    copy.children
        .retain(|node| !matches!(node, Node::Element(e) if e.is(XMLDSIG_NS, "Signature")));
    copy
}

fn decode_base64(value: &str) -> Result<Vec<u8>, SignatureFailure> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| SignatureFailure::Malformed(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::SamlMessageType;
    use crate::signature::XmlSigner;
    use crate::types::SAML_NS;

    const SIGNED_REQUEST: &str = include_str!("../../testdata/signed_authn_request.xml");
    const SP_CERT_PEM: &str = include_str!("../../testdata/sp.cert.pem");
    const OTHER_CERT_PEM: &str = include_str!("../../testdata/sp_other.cert.pem");
    const IDP_KEY_PEM: &str = include_str!("../../testdata/idp.key.pem");
    const IDP_CERT_PEM: &str = include_str!("../../testdata/idp.cert.pem");

    const REDIRECT_REQUEST: &str = "fVLLTuMwFN0jzT9Y3rdxnZQGq4kmTDWaSDwqUmYxO9e5pUaxnfF1gM8njyKVBSx97rnnceU1StO0oujC0T7A/w4wkDfTWBTjIKOdt8JJ1CisNIAiKFEVtzeCz5lovQtOuYaerXy/IRHBB+0sJb+dVzD6ZvQgGwRKSLnJqAQes328ulRpquJDckjVSib1fsFrnkCcxssVZ8uUX1FSInZQWgzShoxyxpMZu5qx5Y6tRLwUcfKPkk3fSFs5eGb0GEIroqhxSjZHh0HEjLFoiM178EnbCNsFJcVHyl/OYmfAV+BftILHh5tJA3sRbEMvPdfS4NG9KokwV85EUmFfZHu6zLW2tbZP3x9lP5FQ/NnttrPtfbXrFchf8DiG7ik0Xw8hxVjYk7wsbquT6To6m5xoVbd/BhVI/uNiAu56z3IznNzI8HWYxXwxIrqeHUaqACN1U9S1B0SaD4V/wps0bTOWPXlP6oNZdG6fT8/Pnyt/Bw==";
    const REDIRECT_SIGNATURE: &str = "LAre0pDAbJPSP1swdYTIDuTltnQGyfDtmJBnXyCr6Hij/EWvAhtS7g3SuDx3GYaUc2gv/NE1JFIXMEewziF80n2GcP9Xfog8ToxEqKcjT2VUTvAZGnY66u9jRcoqVhnbG15Q11HmQiGFVD0MoPVebOD8LtDOD1l6+IzuIYk+uHsiqHNM98UM+VDIZ0YlHGoO/bu9cJIpGStr+xQEA/VJcrpD+qB6a2QB7Tn2D+CIK5cf+7uROm44loJeI7vs9bwSvNQM7xvJPewXhWtqWCqg/mFsaV/FgYoHfP8zsBAi2RNJLf454Klih47he7wps8VN4FvtW4DP4ZE8J9HXXaYO/Q==";

    fn cert(pem: &str) -> Vec<Certificate> {
        vec![Certificate::from_pem(pem).unwrap()]
    }

    fn redirect_signature(relay_state: &str) -> DetachedSignature {
        DetachedSignature {
            message_type: SamlMessageType::Request,
            raw_message: urlencoding::encode(REDIRECT_REQUEST).into_owned(),
            raw_relay_state: Some(urlencoding::encode(relay_state).into_owned()),
            raw_sig_alg: urlencoding::encode("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256")
                .into_owned(),
            signature: REDIRECT_SIGNATURE.to_string(),
        }
    }

    #[test]
    fn embedded_signature_verifies_with_signer_certificate() {
        let certs = cert(SP_CERT_PEM);
        XmlSignatureValidator::new(&certs)
            .validate_document(SIGNED_REQUEST, ParseLimits::default())
            .unwrap();
    }

    #[test]
    fn embedded_signature_fails_with_other_certificate() {
        let certs = cert(OTHER_CERT_PEM);
        assert!(matches!(
            XmlSignatureValidator::new(&certs)
                .validate_document(SIGNED_REQUEST, ParseLimits::default()),
            Err(SignatureFailure::NoMatchingCertificate)
        ));
    }

    #[test]
    fn any_trusted_certificate_is_enough() {
        let certs = vec![
            Certificate::from_pem(OTHER_CERT_PEM).unwrap(),
            Certificate::from_pem(SP_CERT_PEM).unwrap(),
        ];
        XmlSignatureValidator::new(&certs)
            .validate_document(SIGNED_REQUEST, ParseLimits::default())
            .unwrap();
    }

    #[test]
    fn tampered_content_fails_digest() {
        let tampered = SIGNED_REQUEST.replace("test@example.com", "evil@example.com");
        let certs = cert(SP_CERT_PEM);
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_document(&tampered, ParseLimits::default()),
            Err(SignatureFailure::DigestMismatch)
        ));
    }

    #[test]
    fn no_certificates_configured() {
        assert!(matches!(
            XmlSignatureValidator::new(&[]).validate_document(SIGNED_REQUEST, ParseLimits::default()),
            Err(SignatureFailure::NoCertificates)
        ));
        assert!(matches!(
            XmlSignatureValidator::new(&[]).validate_detached(&redirect_signature("indigo")),
            Err(SignatureFailure::NoCertificates)
        ));
    }

    #[test]
    fn unsigned_document_is_rejected() {
        let certs = cert(SP_CERT_PEM);
        let unsigned = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="id1"/>"#;
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_document(unsigned, ParseLimits::default()),
            Err(SignatureFailure::MissingSignature)
        ));
    }

    #[test]
    fn detached_signature_verifies_with_signer_certificate() {
        let certs = cert(SP_CERT_PEM);
        XmlSignatureValidator::new(&certs)
            .validate_detached(&redirect_signature("indigo"))
            .unwrap();
    }

    #[test]
    fn detached_signature_fails_with_other_certificate_or_relay_state() {
        let other = cert(OTHER_CERT_PEM);
        assert!(matches!(
            XmlSignatureValidator::new(&other).validate_detached(&redirect_signature("indigo")),
            Err(SignatureFailure::NoMatchingCertificate)
        ));
        let certs = cert(SP_CERT_PEM);
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_detached(&redirect_signature("violet")),
            Err(SignatureFailure::NoMatchingCertificate)
        ));
    }

    #[test]
    fn detached_signature_rejects_unknown_algorithm() {
        let certs = cert(SP_CERT_PEM);
        let mut detached = redirect_signature("indigo");
        detached.raw_sig_alg = urlencoding::encode("urn:example:none").into_owned();
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_detached(&detached),
            Err(SignatureFailure::UnsupportedAlgorithm(uri)) if uri == "urn:example:none"
        ));
    }

    fn signed_sample() -> Element {
        let signer = XmlSigner::from_pem(IDP_KEY_PEM, IDP_CERT_PEM).unwrap();
        let mut element = Element::ns("saml", "Assertion", SAML_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", "_abc")
            .with_child(Element::ns("saml", "Issuer", SAML_NS).with_text("urn:idp"))
            .with_child(Element::ns("saml", "Subject", SAML_NS).with_text("alice & bob"));
        signer.sign_enveloped(&mut element).unwrap();
        element
    }

    #[test]
    fn own_signatures_verify_after_serialization() {
        let certs = cert(IDP_CERT_PEM);
        let element = signed_sample();
        let validator = XmlSignatureValidator::new(&certs);
        validator.validate_element(&element).unwrap();
        validator
            .validate_document(&element.to_xml().unwrap(), ParseLimits::default())
            .unwrap();
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let certs = cert(IDP_CERT_PEM);
        let mut element = signed_sample();
        element
            .children
            .push(Node::Element(Element::local("Extra").with_attribute("ID", "_abc")));
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_element(&element),
            Err(SignatureFailure::DuplicateId)
        ));
    }

    #[test]
    fn reference_must_point_at_root() {
        let certs = cert(IDP_CERT_PEM);
        let mut element = signed_sample();
        element.set_attribute("ID", "_other");
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_element(&element),
            Err(SignatureFailure::ReferenceMismatch)
        ));
    }

    #[test]
    fn multiple_signatures_are_rejected() {
        let certs = cert(IDP_CERT_PEM);
        let mut element = signed_sample();
        let extra = element
            .child(XMLDSIG_NS, "Signature")
            .unwrap()
            .clone();
        element.children.push(Node::Element(extra));
        assert!(matches!(
            XmlSignatureValidator::new(&certs).validate_element(&element),
            Err(SignatureFailure::MultipleSignatures)
        ));
    }
}
