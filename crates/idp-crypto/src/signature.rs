//! RSA signature verification.

use aws_lc_rs::signature::{
    self, UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
    RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512,
};
use thiserror::Error;

use crate::algorithm::RsaAlgorithm;

/// Error type for key handling and signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signature did not verify.
    #[error("signature verification failed")]
    Verification,

    /// Invalid private key material.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid certificate material.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Algorithm not supported for the requested operation.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

/// Verifies an RSA PKCS#1 v1.5 signature.
///
/// `public_key_der` is the DER `RSAPublicKey` taken from a certificate's
/// subject public key info.
///
/// # Errors
///
/// Returns [`SignatureError::Verification`] if the signature does not match.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaAlgorithm,
) -> Result<(), SignatureError> {
    let verification_alg: &'static dyn signature::VerificationAlgorithm = match algorithm {
        RsaAlgorithm::Rs1 => &RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
        RsaAlgorithm::Rs256 => &RSA_PKCS1_2048_8192_SHA256,
        RsaAlgorithm::Rs384 => &RSA_PKCS1_2048_8192_SHA384,
        RsaAlgorithm::Rs512 => &RSA_PKCS1_2048_8192_SHA512,
    };

    UnparsedPublicKey::new(verification_alg, public_key_der)
        .verify(data, sig)
        .map_err(|_| SignatureError::Verification)
}
