use crate::error::CryptoError;

pub trait Signature: Sized + Clone {
    fn as_bytes(&self) -> &[u8];
    fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

pub trait SigningKey: Sized {
    type VerifyKey: VerifyKey<Signature = Self::Signature>;
    type Signature: Signature;

    fn generate_deterministic(seed: &[u8]) -> Self;
    /// Signs `message` with `context` bound into the signature as domain separation.
    fn sign_with_context(
        &self,
        message: &[u8],
        context: &[u8],
    ) -> Result<Self::Signature, CryptoError>;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
    fn verify_key(&self) -> Self::VerifyKey;
}

pub trait VerifyKey: Sized + Clone {
    type Signature: Signature;

    fn verify_with_context(
        &self,
        message: &[u8],
        context: &[u8],
        signature: &Self::Signature,
    ) -> Result<(), CryptoError>;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
}

pub trait KemPublicKey: Sized + Clone {
    type Ciphertext: Sized + Clone;
    type SharedSecret: Sized;

    /// Encapsulates a fresh shared secret to this key using OS randomness.
    fn encapsulate(&self) -> Result<(Self::Ciphertext, Self::SharedSecret), CryptoError>;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
}

pub trait KemKeyPair: Sized {
    type PublicKey: KemPublicKey<Ciphertext = Self::Ciphertext, SharedSecret = Self::SharedSecret>;
    type Ciphertext: Sized + Clone;
    type SharedSecret: Sized;

    fn generate() -> Self;
    fn decapsulate(&self, ciphertext: &Self::Ciphertext)
        -> Result<Self::SharedSecret, CryptoError>;
    fn public_key(&self) -> Self::PublicKey;
}
