//! Protocol message identifiers.

use idp_crypto::SecureRandom;

/// Number of random alphanumeric characters in a generated identifier.
pub const ID_RANDOM_LEN: usize = 32;

/// Generates `{prefix}_` followed by random alphanumerics.
///
/// With a prefix that starts with a letter the result is a valid `xs:ID`
/// (an NCName), which SAML requires for `ID` attributes.
#[must_use]
pub fn generate_id(rng: &dyn SecureRandom, prefix: &str) -> String {
    format!("{prefix}_{}", rng.alphanumeric(ID_RANDOM_LEN))
}

/// Returns true if `value` is an NCName restricted to ASCII.
#[must_use]
pub fn is_ncname(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
