#[cfg(feature = "sha256")]
use sha2::Digest;

use crate::{Result, VerifyError};

/// Incremental digest over a byte stream.
pub trait Hasher: Send {
    /// Length in bytes of the finalized digest.
    const OUTPUT_LEN: usize;

    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

#[cfg(feature = "sha256")]
pub struct Sha256Hasher(sha2::Sha256);

#[cfg(feature = "sha256")]
impl Hasher for Sha256Hasher {
    const OUTPUT_LEN: usize = 32;

    fn update(&mut self, data: &[u8]) { self.0.update(data); }
    fn finalize(self) -> Vec<u8> { self.0.finalize().to_vec() }
}

#[cfg(feature = "sha256")]
impl Default for Sha256Hasher {
    fn default() -> Self { Self::new() }
}

#[cfg(feature = "sha256")]
impl Sha256Hasher {
    pub fn new() -> Self { Self(sha2::Sha256::new()) }

    pub fn digest(data: &[u8]) -> Vec<u8> { sha2::Sha256::digest(data).to_vec() }
}

/// Hash `data` with `H` and compare against `expected`.
pub fn verify_digest<H: Hasher + Default>(expected: &[u8], data: &[u8]) -> Result<()> {
    if expected.len() != H::OUTPUT_LEN {
        return Err(VerifyError::Length {
            expected: H::OUTPUT_LEN,
            actual:   expected.len(),
        });
    }
    let mut hasher = H::default();
    hasher.update(data);
    let actual = hasher.finalize();
    if actual == expected {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            expected: expected.to_vec(),
            actual,
        })
    }
}

#[cfg(all(test, feature = "sha256"))]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hasher() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        let hash = hasher.finalize();

        let expected =
            hex::decode("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
                .unwrap();
        assert_eq!(hash, expected);
        assert_eq!(Sha256Hasher::digest(b"hello world"), expected);
    }

    #[test]
    fn test_verify_digest_success() {
        let data = b"chunk at offset zero";
        let expected = Sha256Hasher::digest(data);
        verify_digest::<Sha256Hasher>(&expected, data).unwrap();
    }

    #[test]
    fn test_verify_digest_mismatch() {
        let result = verify_digest::<Sha256Hasher>(&[0; 32], b"test data");
        match result {
            Err(VerifyError::Mismatch { expected, actual }) => {
                assert_eq!(expected, vec![0; 32]);
                assert_ne!(actual, vec![0; 32]);
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_digest_wrong_length() {
        let result = verify_digest::<Sha256Hasher>(&[1, 2, 3], b"test data");
        assert!(matches!(
            result,
            Err(VerifyError::Length {
                expected: 32,
                actual:   3,
            })
        ));
    }
}
