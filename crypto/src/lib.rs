//! Cryptographic primitives used by the microtunnel handshake and channel.
//!
//! - [`ml_dsa`]: ML-DSA-65 detached signatures with context strings
//! - [`ml_kem`]: ML-KEM-1024 key encapsulation
//! - [`sym`]: encrypt-then-MAC sealing (AES-256-CTR + HMAC-SHA-512)
//! - [`random`]: OS randomness helpers

pub mod error;
pub mod ml_dsa;
pub mod ml_kem;
pub mod random;
pub mod sym;
pub mod traits;

pub use error::CryptoError;
pub use sym::SymCryptor;
