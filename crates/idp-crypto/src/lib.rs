//! # idp-crypto
//!
//! Cryptographic primitives for the SAML identity provider, built on aws-lc-rs.
//!
//! - [`random`] - the `SecureRandom` capability used for protocol identifiers
//! - [`hash`] - message digests used by XML signature references
//! - [`keys`] - RSA signing keys and X.509 certificates loaded from PEM/DER
//! - [`signature`] - RSA PKCS#1 v1.5 verification and the crate error type
//!
//! ## Legacy algorithms
//!
//! SAML deployments still carry SHA-1 digests and RSA-SHA1 signatures. They are
//! accepted for verification only; nothing in this crate signs with SHA-1.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use algorithm::{HashAlgorithm, RsaAlgorithm};
pub use hash::{digest, sha1, sha256, sha384, sha512};
pub use keys::{Certificate, RsaSigningKey};
pub use random::{SecureRandom, SeededRandom, SystemRandom};
pub use signature::{rsa_verify, SignatureError};
