//! ML-DSA-65 (FIPS 204) detached signatures.
//!
//! Wraps the `ml-dsa` crate. Every signature in the handshake carries a
//! context string (FIPS 204 `ctx`, at most 255 bytes): the endpoint binds its
//! agent context into the nonce signature, the client binds its freshly drawn
//! confirmation key into the challenge signature.

use crate::error::CryptoError;
use crate::random::random_array;
use crate::traits::{Signature as SigTrait, SigningKey as SigningKeyTrait, VerifyKey};

use ml_dsa::{MlDsa65, B32};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// ML-DSA-65 parameter sizes (FIPS 204)
pub const ML_DSA_PUBLIC_KEY_LEN: usize = 1952;
pub const ML_DSA_SECRET_KEY_LEN: usize = 4032;
pub const ML_DSA_SIGNATURE_LEN: usize = 3309;

/// Longest context string FIPS 204 accepts.
pub const ML_DSA_MAX_CONTEXT_LEN: usize = 255;

fn check_context(context: &[u8]) -> Result<(), CryptoError> {
    if context.len() > ML_DSA_MAX_CONTEXT_LEN {
        return Err(CryptoError::InvalidContext(context.len()));
    }
    Ok(())
}

/// ML-DSA-65 Signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlDsaSignature {
    bytes: Vec<u8>,
}

impl MlDsaSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ML_DSA_SIGNATURE_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ML_DSA_SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

impl SigTrait for MlDsaSignature {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// ML-DSA-65 Public Key (verification key)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlDsaPublicKey {
    bytes: [u8; ML_DSA_PUBLIC_KEY_LEN],
}

impl MlDsaPublicKey {
    fn to_inner(&self) -> ml_dsa::VerifyingKey<MlDsa65> {
        ml_dsa::VerifyingKey::<MlDsa65>::decode(&self.bytes.into())
    }
}

impl VerifyKey for MlDsaPublicKey {
    type Signature = MlDsaSignature;

    fn verify_with_context(
        &self,
        message: &[u8],
        context: &[u8],
        signature: &Self::Signature,
    ) -> Result<(), CryptoError> {
        check_context(context)?;
        let vk = self.to_inner();

        let sig_bytes: [u8; ML_DSA_SIGNATURE_LEN] = signature
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        let sig = ml_dsa::Signature::<MlDsa65>::decode(&sig_bytes.into())
            .ok_or(CryptoError::InvalidSignature)?;

        if vk.verify_with_context(message, context, &sig) {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ML_DSA_PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ML_DSA_PUBLIC_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes: arr })
    }
}

/// ML-DSA-65 Secret Key (signing key)
#[derive(Clone, PartialEq, Eq)]
pub struct MlDsaSecretKey {
    bytes: [u8; ML_DSA_SECRET_KEY_LEN],
}

impl MlDsaSecretKey {
    fn to_inner(&self) -> ml_dsa::SigningKey<MlDsa65> {
        ml_dsa::SigningKey::<MlDsa65>::decode(&self.bytes.into())
    }

    /// Generates a fresh key pair from a 32-byte OS-random seed.
    pub fn generate() -> Self {
        let mut seed: [u8; 32] = random_array();
        let key = Self::generate_deterministic(&seed);
        seed.zeroize();
        key
    }
}

impl Drop for MlDsaSecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl core::fmt::Debug for MlDsaSecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MlDsaSecretKey").finish_non_exhaustive()
    }
}

impl SigningKeyTrait for MlDsaSecretKey {
    type VerifyKey = MlDsaPublicKey;
    type Signature = MlDsaSignature;

    fn generate_deterministic(seed: &[u8]) -> Self {
        let mut xi = [0u8; 32];
        let mut hasher = Sha256::new();
        hasher.update(b"microtunnel-ml-dsa-65-xi");
        hasher.update(seed);
        xi.copy_from_slice(&hasher.finalize());

        let seed_b32: B32 = xi.into();
        xi.zeroize();

        let sk = ml_dsa::SigningKey::<MlDsa65>::from_seed(&seed_b32);
        let sk_bytes = sk.encode();

        let mut bytes = [0u8; ML_DSA_SECRET_KEY_LEN];
        bytes.copy_from_slice(sk_bytes.as_ref());

        Self { bytes }
    }

    fn sign_with_context(
        &self,
        message: &[u8],
        context: &[u8],
    ) -> Result<Self::Signature, CryptoError> {
        check_context(context)?;
        let sk = self.to_inner();
        let sig = sk
            .sign_deterministic(message, context)
            .map_err(|_| CryptoError::SigningFailed)?;
        Ok(MlDsaSignature {
            bytes: sig.encode().to_vec(),
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ML_DSA_SECRET_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ML_DSA_SECRET_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes: arr })
    }

    fn verify_key(&self) -> Self::VerifyKey {
        let vk = self.to_inner().verifying_key();
        let vk_bytes = vk.encode();

        let mut bytes = [0u8; ML_DSA_PUBLIC_KEY_LEN];
        bytes.copy_from_slice(vk_bytes.as_ref());

        MlDsaPublicKey { bytes }
    }
}
