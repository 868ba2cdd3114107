//! RSA signing keys and X.509 certificates.
//!
//! Key material is injected by the host as PEM or DER. Nothing here
//! generates keys.

use std::fmt;

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, RsaKeyPair},
};
use base64::Engine;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::algorithm::RsaAlgorithm;
use crate::signature::{rsa_verify, SignatureError};

/// RSA private key used for PKCS#1 v1.5 signatures.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
}

impl RsaSigningKey {
    /// Loads a key from DER, accepting PKCS#1 `RSAPrivateKey` or PKCS#8.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an RSA private key.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_der(der)
            .or_else(|_| RsaKeyPair::from_pkcs8(der))
            .map_err(|e| SignatureError::InvalidKey(format!("invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Loads a key from a `PRIVATE KEY` or `RSA PRIVATE KEY` PEM block.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or carries another label.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        let (_, block) = parse_x509_pem(pem.as_bytes())
            .map_err(|e| SignatureError::InvalidKey(format!("invalid PEM: {e}")))?;
        match block.label.as_str() {
            "PRIVATE KEY" | "RSA PRIVATE KEY" => Self::from_der(&block.contents),
            other => Err(SignatureError::InvalidKey(format!(
                "unexpected PEM label: {other}"
            ))),
        }
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.key_pair.public_modulus_len() * 8
    }

    /// Signs `data`.
    ///
    /// # Errors
    ///
    /// Returns an error for SHA-1 or if the underlying signer fails.
    pub fn sign(&self, algorithm: RsaAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let padding: &'static dyn signature::RsaEncoding = match algorithm {
            RsaAlgorithm::Rs256 => &signature::RSA_PKCS1_SHA256,
            RsaAlgorithm::Rs384 => &signature::RSA_PKCS1_SHA384,
            RsaAlgorithm::Rs512 => &signature::RSA_PKCS1_SHA512,
            RsaAlgorithm::Rs1 => {
                return Err(SignatureError::UnsupportedAlgorithm(
                    "RS1 is accepted for verification only".to_string(),
                ));
            }
        };

        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;
        Ok(sig)
    }
}

impl fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("modulus_bits", &self.modulus_bits())
            .finish_non_exhaustive()
    }
}

/// A parsed X.509 certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: Vec<u8>,
    subject: String,
}

impl Certificate {
    /// Parses a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid X.509 certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self, SignatureError> {
        let (public_key, subject) = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| SignatureError::InvalidCertificate(e.to_string()))?;
            (
                cert.public_key().subject_public_key.data.to_vec(),
                cert.subject().to_string(),
            )
        };
        Ok(Self {
            der,
            public_key,
            subject,
        })
    }

    /// Parses a `CERTIFICATE` PEM block. Leading blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or not a certificate.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        let (_, block) = parse_x509_pem(pem.as_bytes())
            .map_err(|e| SignatureError::InvalidCertificate(format!("invalid PEM: {e}")))?;
        if block.label != "CERTIFICATE" {
            return Err(SignatureError::InvalidCertificate(format!(
                "unexpected PEM label: {}",
                block.label
            )));
        }
        Self::from_der(block.contents)
    }

    /// Parses the base64 body of an `X509Certificate` element.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not base64 or not a certificate.
    pub fn from_base64(b64: &str) -> Result<Self, SignatureError> {
        let compact: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SignatureError::InvalidCertificate(format!("invalid base64: {e}")))?;
        Self::from_der(der)
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER encoding as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns the subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Verifies a signature made by the holder of this certificate's key.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Verification`] if the signature does not match.
    pub fn verify(
        &self,
        algorithm: RsaAlgorithm,
        data: &[u8],
        sig: &[u8],
    ) -> Result<(), SignatureError> {
        rsa_verify(&self.public_key, data, sig, algorithm)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
