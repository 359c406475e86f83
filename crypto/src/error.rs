use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid length: expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("ciphertext too short: need at least {minimum} bytes, found {actual}")]
    Truncated { minimum: usize, actual: usize },

    #[error("verification failed")]
    VerificationFailed,

    #[error("encapsulation failed")]
    EncapsulationFailed,

    #[error("decapsulation failed")]
    DecapsulationFailed,

    #[error("invalid key")]
    InvalidKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("context string of {0} bytes exceeds 255")]
    InvalidContext(usize),

    #[error("signing failed")]
    SigningFailed,

    #[error("message authentication failed")]
    AuthenticationFailed,
}
