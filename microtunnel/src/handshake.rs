//! Two round-trip authenticated key exchange with one endpoint.
//!
//! ```text
//! client                                              endpoint
//!   │ auth1: nonce                                       │
//!   │ ─────────────────────────────────────────────────► │
//!   │      kem_pk ‖ Sign_ep(nonce, ctx=ep agent) ‖ chal   │
//!   │ ◄───────────────────────────────────────────────── │
//!   │ verify, encapsulate(kem_pk) -> (ct, session key)   │
//!   │ draw confirmation key ck                           │
//!   │ auth2: ct ‖ Seal_sk(ck) ‖ Seal_sk,ck,agent(Sign_cl(chal, ctx=ck))
//!   │ ─────────────────────────────────────────────────► │
//!   │      Seal_sk,ck,ep agent("true")                    │
//!   │ ◄───────────────────────────────────────────────── │
//! ```

use std::sync::Arc;

use crypto::ml_dsa::MlDsaSignature;
use crypto::ml_kem::MlKemPublicKey;
use crypto::traits::{KemPublicKey, Signature, VerifyKey};
use crypto::SymCryptor;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::credential::Credential;
use crate::error::HandshakeError;
use crate::session::{SecretBytes, Session, SessionKeys};
use crate::transport::Transport;
use crate::wire::{
    endpoint_url, Phase1Layout, Phase2Layout, AUTH1_PATH, AUTH2_PATH, CONFIRMATION_KEY_LEN,
    CONFIRMATION_LEN, CONFIRMATION_PAYLOAD, NONCE_LEN,
};

/// Drives handshakes for every session of a client.
pub struct HandshakeEngine {
    credential: Arc<Credential>,
    transport: Arc<dyn Transport>,
    cryptor: SymCryptor,
    api_prefix: String,
    phase1: Phase1Layout,
    phase2: Phase2Layout,
    verbose_logging: bool,
}

impl HandshakeEngine {
    pub fn new(
        credential: Arc<Credential>,
        transport: Arc<dyn Transport>,
        api_prefix: impl Into<String>,
        verbose_logging: bool,
    ) -> Self {
        Self {
            credential,
            transport,
            cryptor: SymCryptor::new(),
            api_prefix: api_prefix.into(),
            phase1: Phase1Layout::current(),
            phase2: Phase2Layout::current(),
            verbose_logging,
        }
    }

    /// Runs the handshake and activates `session`.
    ///
    /// Fails with [`HandshakeError::InvalidState`] unless the session is idle.
    /// On failure the session is left `Idle` without keys and its cool-down
    /// starts. A future dropped mid-handshake also leaves it `Idle`, without
    /// a cool-down.
    pub async fn activate(&self, session: &Session) -> Result<Arc<SessionKeys>, HandshakeError> {
        let guard = session
            .begin_connect()
            .ok_or(HandshakeError::InvalidState)?;

        let keys = match self.exchange(session).await {
            Ok(keys) => guard.complete(keys),
            Err(e) => {
                guard.fail(Instant::now());
                return Err(e);
            }
        };

        info!(
            server = %session.name(),
            endpoint = session.index(),
            url = %session.url(),
            "session established"
        );
        Ok(keys)
    }

    async fn exchange(&self, session: &Session) -> Result<SessionKeys, HandshakeError> {
        let endpoint = session.endpoint();

        // Phase 1: endpoint proves its identity over our nonce
        let nonce = self.cryptor.random_bytes(NONCE_LEN);
        let auth1_url = endpoint_url(endpoint.url(), &self.api_prefix, AUTH1_PATH);
        let body = self.transport.post(&auth1_url, nonce.clone()).await?;

        let phase1 = self.phase1.split(&body)?;
        let signature = MlDsaSignature::from_bytes(phase1.signature)?;
        endpoint
            .verification_key()
            .verify_with_context(&nonce, endpoint.agent_context(), &signature)
            .map_err(|_| HandshakeError::InvalidSignature)?;

        if self.verbose_logging {
            debug!(
                server = %session.name(),
                endpoint = session.index(),
                "auth1 verified"
            );
        }

        // Phase 2: encapsulate, then prove our identity over the challenge
        let kem_public_key = MlKemPublicKey::from_bytes(phase1.kem_public_key)?;
        let (ciphertext, shared_secret) = kem_public_key.encapsulate()?;
        let session_key = SecretBytes::from(shared_secret.as_bytes());
        let confirmation_key = SecretBytes::new(self.cryptor.random_bytes(CONFIRMATION_KEY_LEN));

        let challenge_signature = self
            .credential
            .sign_challenge(phase1.challenge, confirmation_key.as_bytes())?;

        let sealed_confirmation_key =
            self.cryptor
                .encrypt(confirmation_key.as_bytes(), session_key.as_bytes(), None, None)?;
        let sealed_signature = self.cryptor.encrypt(
            challenge_signature.as_bytes(),
            session_key.as_bytes(),
            Some(confirmation_key.as_bytes()),
            Some(self.credential.agent_context()),
        )?;
        let request = self.phase2.encode(
            ciphertext.as_bytes(),
            &sealed_confirmation_key,
            &sealed_signature,
        );

        if self.verbose_logging {
            debug!(
                server = %session.name(),
                endpoint = session.index(),
                bytes = request.len(),
                "sending auth2"
            );
        }

        let auth2_url = endpoint_url(endpoint.url(), &self.api_prefix, AUTH2_PATH);
        let confirmation = self.transport.post(&auth2_url, request).await?;
        if confirmation.len() != CONFIRMATION_LEN {
            return Err(HandshakeError::ProtocolViolation {
                phase: "auth2",
                expected: CONFIRMATION_LEN,
                actual: confirmation.len(),
            });
        }

        let payload = self.cryptor.decrypt(
            &confirmation,
            session_key.as_bytes(),
            Some(confirmation_key.as_bytes()),
            Some(endpoint.agent_context()),
        )?;
        if payload != CONFIRMATION_PAYLOAD {
            return Err(HandshakeError::Rejected);
        }

        Ok(SessionKeys::new(session_key, confirmation_key))
    }
}

impl std::fmt::Debug for HandshakeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeEngine")
            .field("api_prefix", &self.api_prefix)
            .field("phase1", &self.phase1)
            .field("verbose_logging", &self.verbose_logging)
            .finish_non_exhaustive()
    }
}
