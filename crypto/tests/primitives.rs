use hex::encode;
use microtunnel_crypto::ml_dsa::{MlDsaSecretKey, ML_DSA_PUBLIC_KEY_LEN, ML_DSA_SIGNATURE_LEN};
use microtunnel_crypto::ml_kem::{
    MlKemKeyPair, ML_KEM_CIPHERTEXT_LEN, ML_KEM_PUBLIC_KEY_LEN, ML_KEM_SHARED_SECRET_LEN,
};
use microtunnel_crypto::sym::{SymCryptor, SYM_IV_LEN, SYM_TAG_LEN};
use microtunnel_crypto::traits::{KemKeyPair, KemPublicKey, Signature, SigningKey, VerifyKey};
use microtunnel_crypto::CryptoError;
use proptest::prelude::*;

#[test]
fn ml_dsa_deterministic_keys_are_stable() {
    let a = MlDsaSecretKey::generate_deterministic(b"provisioned-seed");
    let b = MlDsaSecretKey::generate_deterministic(b"provisioned-seed");
    let c = MlDsaSecretKey::generate_deterministic(b"other-seed");

    assert_eq!(encode(a.verify_key().to_bytes()), encode(b.verify_key().to_bytes()));
    assert_ne!(encode(a.verify_key().to_bytes()), encode(c.verify_key().to_bytes()));
    assert_eq!(a.verify_key().to_bytes().len(), ML_DSA_PUBLIC_KEY_LEN);
}

/// Walks the primitive calls of one handshake from both sides.
#[test]
fn handshake_shaped_exchange() {
    let endpoint_sk = MlDsaSecretKey::generate_deterministic(b"endpoint");
    let client_sk = MlDsaSecretKey::generate_deterministic(b"client");
    let cryptor = SymCryptor::new();

    // phase 1: endpoint signs the client nonce under its agent context
    let nonce = cryptor.random_bytes(64);
    let ephemeral = MlKemKeyPair::generate();
    let nonce_sig = endpoint_sk
        .sign_with_context(&nonce, b"endpoint-agent")
        .unwrap();
    assert_eq!(nonce_sig.as_bytes().len(), ML_DSA_SIGNATURE_LEN);
    endpoint_sk
        .verify_key()
        .verify_with_context(&nonce, b"endpoint-agent", &nonce_sig)
        .unwrap();

    // phase 2: client encapsulates and signs the challenge bound to its confirmation key
    let (ct, session_key) = ephemeral.public_key().encapsulate().unwrap();
    assert_eq!(ct.as_bytes().len(), ML_KEM_CIPHERTEXT_LEN);
    assert_eq!(session_key.as_bytes().len(), ML_KEM_SHARED_SECRET_LEN);
    assert_eq!(ephemeral.public_key().to_bytes().len(), ML_KEM_PUBLIC_KEY_LEN);

    let challenge = cryptor.random_bytes(64);
    let confirmation_key = cryptor.random_bytes(32);
    let challenge_sig = client_sk
        .sign_with_context(&challenge, &confirmation_key)
        .unwrap();
    let sealed_ck = cryptor
        .encrypt(&confirmation_key, session_key.as_bytes(), None, None)
        .unwrap();
    let sealed_sig = cryptor
        .encrypt(
            challenge_sig.as_bytes(),
            session_key.as_bytes(),
            Some(&confirmation_key),
            Some(b"client-agent"),
        )
        .unwrap();

    // endpoint side
    let endpoint_key = ephemeral.decapsulate(&ct).unwrap();
    let ck = cryptor
        .decrypt(&sealed_ck, endpoint_key.as_bytes(), None, None)
        .unwrap();
    assert_eq!(ck, confirmation_key);
    let sig_bytes = cryptor
        .decrypt(&sealed_sig, endpoint_key.as_bytes(), Some(&ck), Some(b"client-agent"))
        .unwrap();
    let sig = microtunnel_crypto::ml_dsa::MlDsaSignature::from_bytes(&sig_bytes).unwrap();
    client_sk
        .verify_key()
        .verify_with_context(&challenge, &ck, &sig)
        .unwrap();

    let confirmation = cryptor
        .encrypt(b"true", endpoint_key.as_bytes(), Some(&ck), Some(b"endpoint-agent"))
        .unwrap();
    assert_eq!(confirmation.len(), 84);
    assert_eq!(
        cryptor
            .decrypt(
                &confirmation,
                session_key.as_bytes(),
                Some(&confirmation_key),
                Some(b"endpoint-agent")
            )
            .unwrap(),
        b"true"
    );
}

#[test]
fn signature_bound_to_confirmation_key() {
    let sk = MlDsaSecretKey::generate_deterministic(b"binding");
    let sig = sk.sign_with_context(b"challenge", &[1u8; 32]).unwrap();
    assert_eq!(
        sk.verify_key()
            .verify_with_context(b"challenge", &[2u8; 32], &sig),
        Err(CryptoError::VerificationFailed)
    );
}

proptest! {
    #[test]
    fn sealed_size_matches_layout(plaintext in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let sealed = SymCryptor::new()
            .encrypt(&plaintext, &[9u8; 32], None, Some(b"aad"))
            .unwrap();
        prop_assert_eq!(sealed.len(), SYM_IV_LEN + plaintext.len() + SYM_TAG_LEN);
        prop_assert_eq!(sealed.len(), SymCryptor::sealed_len(plaintext.len()));
    }
}
