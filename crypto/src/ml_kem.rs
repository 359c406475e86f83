//! ML-KEM-1024 (FIPS 203) key encapsulation.
//!
//! Endpoints publish a fresh ephemeral encapsulation key in every phase-1
//! response; the client encapsulates against it and keeps the shared secret
//! as the session key.

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{EncodedSizeUser, KemCore, MlKem1024};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::traits::{KemKeyPair, KemPublicKey};

type EK = <MlKem1024 as KemCore>::EncapsulationKey;
type DK = <MlKem1024 as KemCore>::DecapsulationKey;

pub const ML_KEM_PUBLIC_KEY_LEN: usize = 1568;
pub const ML_KEM_CIPHERTEXT_LEN: usize = 1568;
pub const ML_KEM_SHARED_SECRET_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlKemCiphertext {
    bytes: [u8; ML_KEM_CIPHERTEXT_LEN],
}

impl MlKemCiphertext {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ML_KEM_CIPHERTEXT_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ML_KEM_CIPHERTEXT_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Shared secret produced by encapsulation; wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MlKemSharedSecret {
    bytes: [u8; ML_KEM_SHARED_SECRET_LEN],
}

impl MlKemSharedSecret {
    fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ML_KEM_SHARED_SECRET_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ML_KEM_SHARED_SECRET_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl core::fmt::Debug for MlKemSharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MlKemSharedSecret").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlKemPublicKey {
    bytes: [u8; ML_KEM_PUBLIC_KEY_LEN],
}

impl MlKemPublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl KemPublicKey for MlKemPublicKey {
    type Ciphertext = MlKemCiphertext;
    type SharedSecret = MlKemSharedSecret;

    fn encapsulate(&self) -> Result<(Self::Ciphertext, Self::SharedSecret), CryptoError> {
        let encoded: ml_kem::Encoded<EK> = self
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey)?;
        let ek = EK::from_bytes(&encoded);

        let (ct, ss) = ek
            .encapsulate(&mut OsRng)
            .map_err(|_| CryptoError::EncapsulationFailed)?;

        let ciphertext = MlKemCiphertext::from_bytes(ct.as_ref())?;
        let shared_secret = MlKemSharedSecret::from_slice(ss.as_ref())?;
        Ok((ciphertext, shared_secret))
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ML_KEM_PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ML_KEM_PUBLIC_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes: arr })
    }
}

/// Ephemeral decapsulation key pair, held by the responding endpoint.
pub struct MlKemKeyPair {
    secret: DK,
    public: MlKemPublicKey,
}

impl core::fmt::Debug for MlKemKeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MlKemKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl KemKeyPair for MlKemKeyPair {
    type PublicKey = MlKemPublicKey;
    type Ciphertext = MlKemCiphertext;
    type SharedSecret = MlKemSharedSecret;

    fn generate() -> Self {
        let (dk, ek) = MlKem1024::generate(&mut OsRng);
        let mut bytes = [0u8; ML_KEM_PUBLIC_KEY_LEN];
        bytes.copy_from_slice(ek.as_bytes().as_ref());
        Self {
            secret: dk,
            public: MlKemPublicKey { bytes },
        }
    }

    fn decapsulate(
        &self,
        ciphertext: &Self::Ciphertext,
    ) -> Result<Self::SharedSecret, CryptoError> {
        let ct: ml_kem::Ciphertext<MlKem1024> = ciphertext
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::DecapsulationFailed)?;
        let ss = self
            .secret
            .decapsulate(&ct)
            .map_err(|_| CryptoError::DecapsulationFailed)?;
        MlKemSharedSecret::from_slice(ss.as_ref())
    }

    fn public_key(&self) -> Self::PublicKey {
        self.public.clone()
    }
}
