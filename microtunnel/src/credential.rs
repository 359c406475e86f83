//! Application credential: long-term ML-DSA key pair plus agent string.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crypto::ml_dsa::{MlDsaPublicKey, MlDsaSecretKey, MlDsaSignature};
use crypto::random::random_bytes;
use crypto::traits::{SigningKey, VerifyKey};
use crypto::CryptoError;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};

/// Bytes of randomness behind a generated agent string.
pub const GENERATED_AGENT_LEN: usize = 24;

/// On-disk JSON form of a credential.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(alias = "verificationPublicKey")]
    pub public_key: String,
    #[serde(alias = "signingPrivateKey")]
    pub private_key: String,
    #[serde(alias = "agentContext")]
    pub agent: String,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("public_key", &self.public_key)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

/// Loaded application credential.
///
/// The agent string is sent as the HTTP `User-Agent` and its UTF-8 bytes
/// are the agent context bound into the client's sealed handshake data and
/// every request body.
#[derive(Clone)]
pub struct Credential {
    verify_key: MlDsaPublicKey,
    signing_key: MlDsaSecretKey,
    agent: String,
}

impl Credential {
    pub fn new(signing_key: MlDsaSecretKey, agent: impl Into<String>) -> Self {
        Self {
            verify_key: signing_key.verify_key(),
            signing_key,
            agent: agent.into(),
        }
    }

    /// Fresh key pair and a random base64 agent string.
    pub fn generate() -> Self {
        let agent = BASE64.encode(random_bytes(GENERATED_AGENT_LEN));
        Self::new(MlDsaSecretKey::generate(), agent)
    }

    pub fn from_record(record: &CredentialRecord) -> Result<Self> {
        let public = decode_b64("publicKey", &record.public_key)?;
        let private = decode_b64("privateKey", &record.private_key)?;

        let verify_key = MlDsaPublicKey::from_bytes(&public)
            .map_err(|e| TunnelError::InvalidConfig(format!("credential publicKey: {e}")))?;
        let signing_key = MlDsaSecretKey::from_bytes(&private)
            .map_err(|e| TunnelError::InvalidConfig(format!("credential privateKey: {e}")))?;

        if signing_key.verify_key() != verify_key {
            return Err(TunnelError::InvalidConfig(
                "credential publicKey does not match privateKey".into(),
            ));
        }
        if record.agent.is_empty() {
            return Err(TunnelError::InvalidConfig("credential agent is empty".into()));
        }

        Ok(Self {
            verify_key,
            signing_key,
            agent: record.agent.clone(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let record: CredentialRecord = serde_json::from_str(json)?;
        Self::from_record(&record)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            public_key: BASE64.encode(self.verify_key.to_bytes()),
            private_key: BASE64.encode(self.signing_key.to_bytes()),
            agent: self.agent.clone(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn agent_context(&self) -> &[u8] {
        self.agent.as_bytes()
    }

    pub fn verify_key(&self) -> &MlDsaPublicKey {
        &self.verify_key
    }

    /// Signs an endpoint challenge, bound to the session's confirmation key.
    pub fn sign_challenge(
        &self,
        challenge: &[u8],
        confirmation_key: &[u8],
    ) -> std::result::Result<MlDsaSignature, CryptoError> {
        self.signing_key.sign_with_context(challenge, confirmation_key)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

pub(crate) fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value.trim())
        .map_err(|e| TunnelError::InvalidConfig(format!("{field} is not valid base64: {e}")))
}
