//! Byte layouts of the handshake messages and endpoint addressing.
//!
//! ```text
//! auth1 request   nonce (64)
//! auth1 response  kem public key ‖ signature(nonce) ‖ challenge (64)
//! auth2 request   kem ciphertext ‖ seal(confirmation key) ‖ seal(signature(challenge))
//! auth2 response  seal("true")
//! ```
//!
//! No delimiters are sent; every length is fixed by the primitives in use.

use crypto::ml_dsa::ML_DSA_SIGNATURE_LEN;
use crypto::ml_kem::{ML_KEM_CIPHERTEXT_LEN, ML_KEM_PUBLIC_KEY_LEN};
use crypto::SymCryptor;

use crate::error::HandshakeError;

pub const NONCE_LEN: usize = 64;
pub const CHALLENGE_LEN: usize = 64;
pub const CONFIRMATION_KEY_LEN: usize = 32;

pub const CONFIRMATION_PAYLOAD: &[u8] = b"true";
pub const CONFIRMATION_LEN: usize = SymCryptor::sealed_len(CONFIRMATION_PAYLOAD.len());

pub const AUTH1_PATH: &str = "/auth1";
pub const AUTH2_PATH: &str = "/auth2";

/// Split points of the phase-1 response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Phase1Layout {
    pub kem_public_key_len: usize,
    pub signature_len: usize,
    pub challenge_len: usize,
}

/// Phase-1 response borrowed out of the received body.
#[derive(Debug)]
pub struct Phase1<'a> {
    pub kem_public_key: &'a [u8],
    pub signature: &'a [u8],
    pub challenge: &'a [u8],
}

impl Phase1Layout {
    /// Layout deployed with Kyber-1024 and SuperSPHINCS signatures.
    pub const REFERENCE: Phase1Layout = Phase1Layout {
        kem_public_key_len: 1568,
        signature_len: 29858,
        challenge_len: CHALLENGE_LEN,
    };

    /// Layout for the ML-KEM-1024 / ML-DSA-65 pair this crate links.
    pub const fn current() -> Self {
        Self {
            kem_public_key_len: ML_KEM_PUBLIC_KEY_LEN,
            signature_len: ML_DSA_SIGNATURE_LEN,
            challenge_len: CHALLENGE_LEN,
        }
    }

    pub const fn total_len(&self) -> usize {
        self.kem_public_key_len + self.signature_len + self.challenge_len
    }

    pub fn split<'a>(&self, body: &'a [u8]) -> Result<Phase1<'a>, HandshakeError> {
        if body.len() != self.total_len() {
            return Err(HandshakeError::ProtocolViolation {
                phase: "auth1",
                expected: self.total_len(),
                actual: body.len(),
            });
        }
        let (kem_public_key, rest) = body.split_at(self.kem_public_key_len);
        let (signature, challenge) = rest.split_at(rest.len() - self.challenge_len);
        Ok(Phase1 {
            kem_public_key,
            signature,
            challenge,
        })
    }

    pub fn encode(&self, kem_public_key: &[u8], signature: &[u8], challenge: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(kem_public_key);
        out.extend_from_slice(signature);
        out.extend_from_slice(challenge);
        out
    }
}

impl Default for Phase1Layout {
    fn default() -> Self {
        Self::current()
    }
}

/// Split points of the phase-2 request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Phase2Layout {
    pub ciphertext_len: usize,
    pub sealed_confirmation_key_len: usize,
    pub sealed_signature_len: usize,
}

#[derive(Debug)]
pub struct Phase2<'a> {
    pub ciphertext: &'a [u8],
    pub sealed_confirmation_key: &'a [u8],
    pub sealed_signature: &'a [u8],
}

impl Phase2Layout {
    pub const fn current() -> Self {
        Self {
            ciphertext_len: ML_KEM_CIPHERTEXT_LEN,
            sealed_confirmation_key_len: SymCryptor::sealed_len(CONFIRMATION_KEY_LEN),
            sealed_signature_len: SymCryptor::sealed_len(ML_DSA_SIGNATURE_LEN),
        }
    }

    pub const fn total_len(&self) -> usize {
        self.ciphertext_len + self.sealed_confirmation_key_len + self.sealed_signature_len
    }

    pub fn encode(
        &self,
        ciphertext: &[u8],
        sealed_confirmation_key: &[u8],
        sealed_signature: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(ciphertext);
        out.extend_from_slice(sealed_confirmation_key);
        out.extend_from_slice(sealed_signature);
        out
    }

    pub fn split<'a>(&self, body: &'a [u8]) -> Result<Phase2<'a>, HandshakeError> {
        if body.len() != self.total_len() {
            return Err(HandshakeError::ProtocolViolation {
                phase: "auth2",
                expected: self.total_len(),
                actual: body.len(),
            });
        }
        let (ciphertext, rest) = body.split_at(self.ciphertext_len);
        let (sealed_confirmation_key, sealed_signature) =
            rest.split_at(self.sealed_confirmation_key_len);
        Ok(Phase2 {
            ciphertext,
            sealed_confirmation_key,
            sealed_signature,
        })
    }
}

impl Default for Phase2Layout {
    fn default() -> Self {
        Self::current()
    }
}

/// Joins an endpoint base URL, the API prefix and a request path.
///
/// An empty path is treated as `/`.
pub fn endpoint_url(base: &str, prefix: &str, path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    let mut url = String::with_capacity(base.len() + prefix.len() + path.len() + 1);
    url.push_str(base.trim_end_matches('/'));
    url.push_str(prefix.trim_end_matches('/'));
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_layout_length() {
        assert_eq!(Phase1Layout::REFERENCE.total_len(), 31490);
        assert_eq!(CONFIRMATION_LEN, 84);
    }

    #[test]
    fn test_current_layout_from_primitive_sizes() {
        let layout = Phase1Layout::current();
        assert_eq!(layout.total_len(), 1568 + 3309 + 64);
        assert_eq!(Phase2Layout::current().total_len(), 1568 + 112 + 3389);
    }

    #[test]
    fn test_split_phase1() {
        let layout = Phase1Layout {
            kem_public_key_len: 3,
            signature_len: 5,
            challenge_len: 2,
        };
        let body = layout.encode(&[1, 1, 1], &[2; 5], &[3, 3]);
        let parts = layout.split(&body).unwrap();
        assert_eq!(parts.kem_public_key, &[1, 1, 1]);
        assert_eq!(parts.signature, &[2; 5]);
        assert_eq!(parts.challenge, &[3, 3]);

        match layout.split(&body[..9]) {
            Err(HandshakeError::ProtocolViolation {
                phase: "auth1",
                expected: 10,
                actual: 9,
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_split_phase2_rejects_wrong_length() {
        let layout = Phase2Layout::current();
        assert!(layout.split(&vec![0u8; layout.total_len() + 1]).is_err());
        let body = vec![7u8; layout.total_len()];
        let parts = layout.split(&body).unwrap();
        assert_eq!(parts.ciphertext.len(), ML_KEM_CIPHERTEXT_LEN);
        assert_eq!(parts.sealed_confirmation_key.len(), 112);
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://a.example", "/microtunnel", "/auth1"),
            "https://a.example/microtunnel/auth1"
        );
        assert_eq!(
            endpoint_url("https://a.example/", "/microtunnel/", ""),
            "https://a.example/microtunnel/"
        );
        assert_eq!(endpoint_url("http://h:8080", "/api", "users"), "http://h:8080/api/users");
    }
}
