//! Binary delta computation and application.
//!
//! Thin wrappers over `qbsdiff` with the argument order this crate cares
//! about: `diff(new, old)` produces a patch such that `patch(new, …)` yields
//! `old`. History is stored as *reverse* deltas hanging off the full HEAD.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use qbsdiff::{Bsdiff, Bspatch};

/// Compute a binary delta transforming `source` into `target`.
pub fn diff(source: &[u8], target: &[u8]) -> Result<Vec<u8>> {
    let mut delta = Vec::new();
    Bsdiff::new(source, target).compare(&mut delta).or_raise(|| ErrorKind::Delta)?;
    Ok(delta)
}

/// Apply a binary delta produced by [`diff`] to `source`.
pub fn patch(source: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let patcher = Bspatch::new(delta).or_raise(|| ErrorKind::Delta)?;
    let mut output = Vec::with_capacity(patcher.hint_target_size() as usize);
    patcher.apply(source, &mut output).or_raise(|| ErrorKind::Delta)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"first version of a work".to_vec(), b"second version of a work".to_vec())]
    #[case(b"".to_vec(), b"went from empty to something".to_vec())]
    #[case(b"went from something to empty".to_vec(), b"".to_vec())]
    #[case(vec![0u8; 4096], vec![7u8; 2048])]
    fn test_diff_patch_roundtrip(#[case] old: Vec<u8>, #[case] new: Vec<u8>) {
        let delta = diff(&new, &old).unwrap();
        let restored = patch(&new, &delta).unwrap();
        assert_eq!(restored, old);
    }

    #[test]
    fn test_identical_inputs() {
        let data = b"no change between versions";
        let delta = diff(data, data).unwrap();
        assert_eq!(patch(data, &delta).unwrap(), data);
    }

    #[test]
    fn test_reverse_chain_of_three() {
        // v3 is HEAD (full); deltas lead back through v2 to v1, the same
        // shape the engine stores.
        let v1 = b"chapter one".to_vec();
        let v2 = b"chapter one\nchapter two".to_vec();
        let v3 = b"chapter one\nchapter two\nchapter three".to_vec();
        let d_v2 = diff(&v3, &v2).unwrap();
        let d_v1 = diff(&v2, &v1).unwrap();
        let master = patch(&v3, &d_v2).unwrap();
        assert_eq!(master, v2);
        let master = patch(&master, &d_v1).unwrap();
        assert_eq!(master, v1);
    }

    #[test]
    fn test_corrupt_delta_rejected() {
        let err = patch(b"source", b"definitely not a bsdiff patch").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Delta));
    }
}
