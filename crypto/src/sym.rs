//! Encrypt-then-MAC symmetric cryptor.
//!
//! Layout of a sealed message:
//!
//! ```text
//! iv (16) ‖ AES-256-CTR ciphertext (len(plaintext)) ‖ HMAC-SHA-512 tag (64)
//! ```
//!
//! The tag covers `iv ‖ ciphertext ‖ be64(len(aad)) ‖ aad`. The secondary key,
//! when given, is the MAC key; otherwise the MAC key is expanded from the
//! cipher key with HKDF-SHA-256.

use aes::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::random_array;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha512 = Hmac<Sha512>;

pub const SYM_KEY_LEN: usize = 32;
pub const SYM_IV_LEN: usize = 16;
pub const SYM_TAG_LEN: usize = 64;

const MAC_KEY_INFO: &[u8] = b"microtunnel-sym-mac-key";

/// Stateless AES-256-CTR + HMAC-SHA-512 cryptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymCryptor;

impl SymCryptor {
    pub fn new() -> Self {
        Self
    }

    /// Size of the sealed form of a `plaintext_len`-byte message.
    pub const fn sealed_len(plaintext_len: usize) -> usize {
        SYM_IV_LEN + plaintext_len + SYM_TAG_LEN
    }

    pub fn random_bytes(&self, len: usize) -> Vec<u8> {
        crate::random::random_bytes(len)
    }

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        secondary: Option<&[u8]>,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let key = check_key(key)?;
        let iv: [u8; SYM_IV_LEN] = random_array();

        let mut out = Vec::with_capacity(Self::sealed_len(plaintext.len()));
        out.extend_from_slice(&iv);
        out.extend_from_slice(plaintext);

        let mut cipher =
            Aes256Ctr::new_from_slices(key, &iv).map_err(|_| CryptoError::InvalidKey)?;
        cipher.apply_keystream(&mut out[SYM_IV_LEN..]);

        let mut mac = mac_for(key, secondary)?;
        mac.update(&out);
        feed_aad(&mut mac, aad);
        out.extend_from_slice(&mac.finalize().into_bytes());

        Ok(out)
    }

    pub fn decrypt(
        &self,
        sealed: &[u8],
        key: &[u8],
        secondary: Option<&[u8]>,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let key = check_key(key)?;
        let minimum = Self::sealed_len(0);
        if sealed.len() < minimum {
            return Err(CryptoError::Truncated {
                minimum,
                actual: sealed.len(),
            });
        }

        let (body, tag) = sealed.split_at(sealed.len() - SYM_TAG_LEN);
        let mut mac = mac_for(key, secondary)?;
        mac.update(body);
        feed_aad(&mut mac, aad);
        // verify_slice compares in constant time
        mac.verify_slice(tag)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        let (iv, ciphertext) = body.split_at(SYM_IV_LEN);
        let mut plaintext = ciphertext.to_vec();
        let mut cipher =
            Aes256Ctr::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKey)?;
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}

fn check_key(key: &[u8]) -> Result<&[u8], CryptoError> {
    if key.len() != SYM_KEY_LEN {
        return Err(CryptoError::InvalidLength {
            expected: SYM_KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(key)
}

fn mac_for(key: &[u8], secondary: Option<&[u8]>) -> Result<HmacSha512, CryptoError> {
    match secondary {
        Some(mac_key) if !mac_key.is_empty() => {
            HmacSha512::new_from_slice(mac_key).map_err(|_| CryptoError::InvalidKey)
        }
        Some(_) => Err(CryptoError::InvalidKey),
        None => {
            let mut derived = Zeroizing::new([0u8; SYM_TAG_LEN]);
            Hkdf::<Sha256>::new(None, key)
                .expand(MAC_KEY_INFO, &mut derived[..])
                .map_err(|_| CryptoError::InvalidKey)?;
            HmacSha512::new_from_slice(&derived[..]).map_err(|_| CryptoError::InvalidKey)
        }
    }
}

fn feed_aad(mac: &mut HmacSha512, aad: Option<&[u8]>) {
    let aad = aad.unwrap_or_default();
    mac.update(&(aad.len() as u64).to_be_bytes());
    mac.update(aad);
}
