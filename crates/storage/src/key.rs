//! Blob key validation.
//!
//! Every key this service writes is generated internally (`<work_id>_<sha1>`
//! for work versions, `obj_<sha1>` for supporting objects), so validation is
//! deliberately strict: a key that fails here is a bug upstream, not user
//! error we need to be lenient about.

use crate::error::{ErrorKind, Result};

/// S3 allows up to 1024 bytes, but our generated keys never get anywhere
/// near that. Anything longer than this escaped from somewhere it shouldn't.
const MAX_KEY_LENGTH: usize = 255;

/// Validate a blob key for use with any backend.
///
/// Accepts ASCII alphanumerics plus `_`, `-` and `.`. Returns
/// [`ErrorKind::InvalidKey`] for anything else, the empty string, or keys
/// longer than 255 bytes.
///
/// # Examples
///
/// ```
/// use hoard_storage::validate_key;
///
/// assert!(validate_key("12345_da39a3ee5e6b4b0d3255bfef95601890afd80709").is_ok());
/// assert!(validate_key("obj_da39a3ee5e6b4b0d3255bfef95601890afd80709").is_ok());
/// assert!(validate_key("../escape").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    // ".." is technically covered by the character set below ('.' is allowed,
    // '/' is not, so there's no traversal to speak of), but a key of only
    // dots is suspicious enough to reject outright.
    if key.bytes().all(|b| b == b'.') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    if !key.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')) {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12345_da39a3ee5e6b4b0d3255bfef95601890afd80709")]
    #[case("obj_da39a3ee5e6b4b0d3255bfef95601890afd80709")]
    #[case("a")]
    #[case("some-key.bin")]
    fn test_valid_keys(#[case] key: &str) {
        assert!(validate(key).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("a/b")]
    #[case("key with spaces")]
    #[case("key\n")]
    #[case("schlüssel")]
    fn test_invalid_keys(#[case] key: &str) {
        let err = validate(key).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_overlong_key_rejected() {
        let key = "a".repeat(256);
        assert!(validate(&key).is_err());
        let key = "a".repeat(255);
        assert!(validate(&key).is_ok());
    }
}
