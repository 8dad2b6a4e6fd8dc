#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("digest mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    Mismatch {
        expected: Vec<u8>,
        actual:   Vec<u8>,
    },

    #[error("digest has wrong length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, VerifyError>;
