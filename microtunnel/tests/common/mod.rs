//! Simulated endpoints speaking the server side of the protocol.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use crypto::ml_dsa::{MlDsaPublicKey, MlDsaSecretKey, MlDsaSignature};
use crypto::ml_kem::{MlKemCiphertext, MlKemKeyPair};
use crypto::traits::{KemKeyPair, KemPublicKey, Signature, SigningKey, VerifyKey};
use crypto::SymCryptor;
use microtunnel::wire::{Phase1Layout, Phase2Layout, CHALLENGE_LEN, CONFIRMATION_PAYLOAD};
use microtunnel::{
    Credential, EndpointConfig, Registry, TransportError, Transport, TunnelClient, TunnelConfig,
};
use parking_lot::Mutex;

pub const PREFIX: &str = "/microtunnel";

/// Switches for misbehaving endpoints.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// auth1 answers with a transport error
    pub fail_auth1: bool,
    /// nonce signature is corrupted
    pub forge_signature: bool,
    /// phase-1 response is one byte short
    pub truncate_phase1: bool,
    /// confirmation seals "false"
    pub reject_confirmation: bool,
    /// confirmation is one byte short
    pub truncate_confirmation: bool,
    /// number of upcoming application requests to drop
    pub fail_requests: usize,
    /// application responses are garbage
    pub corrupt_responses: bool,
    /// auth1 sleeps before answering
    pub auth1_delay: Option<Duration>,
}

struct Pending {
    kem: MlKemKeyPair,
    challenge: Vec<u8>,
}

struct Keys {
    session_key: Vec<u8>,
    confirmation_key: Vec<u8>,
}

pub struct SimEndpoint {
    pub url: String,
    pub agent: String,
    signing_key: MlDsaSecretKey,
    client_key: MlDsaPublicKey,
    client_agent: String,
    pub faults: Mutex<Faults>,
    pub auth1_calls: AtomicUsize,
    pub auth2_calls: AtomicUsize,
    pub app_calls: AtomicUsize,
    pending: Mutex<Option<Pending>>,
    keys: Mutex<Option<Keys>>,
    store: Mutex<HashMap<String, Vec<u8>>>,
    cryptor: SymCryptor,
}

fn transport_err(msg: &str) -> TransportError {
    TransportError::Request(msg.to_string())
}

impl SimEndpoint {
    fn new(index: usize, client: &Credential) -> Self {
        Self {
            url: format!("http://ep{index}.test"),
            agent: format!("endpoint-{index}"),
            signing_key: MlDsaSecretKey::generate_deterministic(format!("ep-{index}").as_bytes()),
            client_key: client.verify_key().clone(),
            client_agent: client.agent().to_string(),
            faults: Mutex::new(Faults::default()),
            auth1_calls: AtomicUsize::new(0),
            auth2_calls: AtomicUsize::new(0),
            app_calls: AtomicUsize::new(0),
            pending: Mutex::new(None),
            keys: Mutex::new(None),
            store: Mutex::new(HashMap::new()),
            cryptor: SymCryptor::new(),
        }
    }

    pub fn config(&self) -> EndpointConfig {
        EndpointConfig::new(&self.url, self.signing_key.verify_key(), self.agent.clone()).unwrap()
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock() = faults;
    }

    pub fn auth1_count(&self) -> usize {
        self.auth1_calls.load(Ordering::SeqCst)
    }

    pub fn app_count(&self) -> usize {
        self.app_calls.load(Ordering::SeqCst)
    }

    async fn auth1(&self, nonce: &[u8]) -> Result<Bytes, TransportError> {
        self.auth1_calls.fetch_add(1, Ordering::SeqCst);
        let faults = self.faults.lock().clone();
        if let Some(delay) = faults.auth1_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_auth1 {
            return Err(TransportError::Status {
                status: 502,
                url: self.url.clone(),
            });
        }

        let kem = MlKemKeyPair::generate();
        let mut signature = self
            .signing_key
            .sign_with_context(nonce, self.agent.as_bytes())
            .unwrap()
            .to_vec();
        if faults.forge_signature {
            signature[10] ^= 0xff;
        }
        let challenge = self.cryptor.random_bytes(CHALLENGE_LEN);

        let mut body = Phase1Layout::current().encode(
            &kem.public_key().to_bytes(),
            &signature,
            &challenge,
        );
        if faults.truncate_phase1 {
            body.pop();
        }
        *self.pending.lock() = Some(Pending { kem, challenge });
        Ok(Bytes::from(body))
    }

    fn auth2(&self, body: &[u8]) -> Result<Bytes, TransportError> {
        self.auth2_calls.fetch_add(1, Ordering::SeqCst);
        let faults = self.faults.lock().clone();
        let pending = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| transport_err("auth2 without auth1"))?;

        let parts = Phase2Layout::current()
            .split(body)
            .map_err(|e| transport_err(&e.to_string()))?;
        let ciphertext = MlKemCiphertext::from_bytes(parts.ciphertext).unwrap();
        let shared = pending.kem.decapsulate(&ciphertext).unwrap();
        let session_key = shared.as_bytes().to_vec();

        let confirmation_key = self
            .cryptor
            .decrypt(parts.sealed_confirmation_key, &session_key, None, None)
            .map_err(|_| transport_err("bad confirmation key"))?;
        let signature = self
            .cryptor
            .decrypt(
                parts.sealed_signature,
                &session_key,
                Some(&confirmation_key),
                Some(self.client_agent.as_bytes()),
            )
            .map_err(|_| transport_err("bad sealed signature"))?;
        let signature = MlDsaSignature::from_bytes(&signature).unwrap();
        self.client_key
            .verify_with_context(&pending.challenge, &confirmation_key, &signature)
            .map_err(|_| transport_err("client signature rejected"))?;

        let payload: &[u8] = if faults.reject_confirmation {
            b"false"
        } else {
            CONFIRMATION_PAYLOAD
        };
        let mut sealed = self
            .cryptor
            .encrypt(
                payload,
                &session_key,
                Some(&confirmation_key),
                Some(self.agent.as_bytes()),
            )
            .unwrap();
        if faults.truncate_confirmation {
            sealed.pop();
        }

        *self.keys.lock() = Some(Keys {
            session_key,
            confirmation_key,
        });
        Ok(Bytes::from(sealed))
    }

    /// Echo store: POST keeps the request plaintext under its path and returns
    /// it; GET returns what was last stored.
    fn app(&self, path: &str, body: Option<&[u8]>) -> Result<Bytes, TransportError> {
        self.app_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.lock();
            if faults.fail_requests > 0 {
                faults.fail_requests -= 1;
                return Err(transport_err("connection reset"));
            }
            if faults.corrupt_responses {
                return Ok(Bytes::from(vec![0u8; 128]));
            }
        }

        let keys = self.keys.lock();
        let keys = keys
            .as_ref()
            .ok_or_else(|| transport_err("no session"))?;

        let plaintext = match body {
            Some(sealed) => {
                let plaintext = self
                    .cryptor
                    .decrypt(
                        sealed,
                        &keys.session_key,
                        Some(&keys.confirmation_key),
                        Some(self.client_agent.as_bytes()),
                    )
                    .map_err(|_| transport_err("request failed authentication"))?;
                self.store.lock().insert(path.to_string(), plaintext.clone());
                plaintext
            }
            None => self
                .store
                .lock()
                .get(path)
                .cloned()
                .ok_or(TransportError::Status {
                    status: 404,
                    url: path.to_string(),
                })?,
        };

        let sealed = self
            .cryptor
            .encrypt(
                &plaintext,
                &keys.session_key,
                Some(&keys.confirmation_key),
                Some(self.agent.as_bytes()),
            )
            .unwrap();
        Ok(Bytes::from(sealed))
    }

    fn route<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&self.url)?.strip_prefix(PREFIX)
    }
}

/// In-memory network of simulated endpoints.
pub struct SimNetwork {
    pub endpoints: Vec<Arc<SimEndpoint>>,
}

impl SimNetwork {
    fn find(&self, url: &str) -> Result<(&SimEndpoint, String), TransportError> {
        self.endpoints
            .iter()
            .find_map(|ep| ep.route(url).map(|path| (ep.as_ref(), path.to_string())))
            .ok_or_else(|| transport_err("unknown host"))
    }
}

#[async_trait]
impl Transport for SimNetwork {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Bytes, TransportError> {
        let (endpoint, path) = self.find(url)?;
        match path.as_str() {
            "/auth1" => endpoint.auth1(&body).await,
            "/auth2" => endpoint.auth2(&body),
            _ => endpoint.app(&path, Some(&body)),
        }
    }

    async fn get(&self, url: &str) -> Result<Bytes, TransportError> {
        let (endpoint, path) = self.find(url)?;
        endpoint.app(&path, None)
    }
}

pub struct Harness {
    pub client: TunnelClient,
    pub network: Arc<SimNetwork>,
}

impl Harness {
    pub fn endpoint(&self, index: usize) -> &SimEndpoint {
        &self.network.endpoints[index]
    }

    pub fn total_auth1(&self) -> usize {
        self.network.endpoints.iter().map(|e| e.auth1_count()).sum()
    }
}

/// One logical server `svc` backed by `n` simulated endpoints.
pub fn harness(n: usize) -> Harness {
    harness_with(n, |config| config)
}

pub fn harness_with(n: usize, tweak: impl FnOnce(TunnelConfig) -> TunnelConfig) -> Harness {
    let credential = Credential::generate();
    let endpoints: Vec<_> = (0..n)
        .map(|i| Arc::new(SimEndpoint::new(i, &credential)))
        .collect();

    let mut registry = Registry::new();
    registry
        .insert("svc", endpoints.iter().map(|e| e.config()).collect())
        .unwrap();

    let network = Arc::new(SimNetwork { endpoints });
    let config = tweak(TunnelConfig::new(credential, registry));
    let client = TunnelClient::with_transport(config, network.clone()).unwrap();
    Harness { client, network }
}
