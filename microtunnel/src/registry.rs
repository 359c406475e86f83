//! Endpoint registry: logical server name to physical endpoints.
//!
//! JSON form, one record or a list per server:
//!
//! ```json
//! {
//!   "auth":  { "url": "https://auth.internal", "publicKey": "<b64>", "agent": "auth-1" },
//!   "store": [
//!     { "url": "https://store-a.internal", "verificationKey": "<b64>", "agent": "a" },
//!     { "url": "https://store-b.internal", "verificationKey": "<b64>", "agent": "b" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crypto::ml_dsa::{MlDsaPublicKey, ML_DSA_MAX_CONTEXT_LEN};
use crypto::traits::VerifyKey;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credential::decode_b64;
use crate::error::{Result, TunnelError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    pub url: String,
    #[serde(alias = "publicKey")]
    pub verification_key: String,
    #[serde(alias = "agentContext")]
    pub agent: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(EndpointRecord),
    Many(Vec<EndpointRecord>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<EndpointRecord> {
        match self {
            OneOrMany::One(record) => vec![record],
            OneOrMany::Many(records) => records,
        }
    }
}

/// One physical endpoint of a logical server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    url: String,
    verification_key: MlDsaPublicKey,
    agent: String,
}

impl EndpointConfig {
    /// Validates `url` as an absolute http(s) URL. Trailing slashes are dropped
    /// so the API prefix can be appended directly.
    ///
    /// The agent is the context string of the endpoint's signatures and may
    /// not exceed [`ML_DSA_MAX_CONTEXT_LEN`] bytes.
    pub fn new(
        url: &str,
        verification_key: MlDsaPublicKey,
        agent: impl Into<String>,
    ) -> Result<Self> {
        let agent = agent.into();
        if agent.len() > ML_DSA_MAX_CONTEXT_LEN {
            return Err(TunnelError::InvalidConfig(format!(
                "endpoint {url:?}: agent is {} bytes, limit is {ML_DSA_MAX_CONTEXT_LEN}",
                agent.len()
            )));
        }
        let parsed = Url::parse(url)
            .map_err(|e| TunnelError::InvalidConfig(format!("endpoint url {url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TunnelError::InvalidConfig(format!(
                "endpoint url {url:?}: unsupported scheme {}",
                parsed.scheme()
            )));
        }
        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
            verification_key,
            agent,
        })
    }

    pub fn from_record(record: &EndpointRecord) -> Result<Self> {
        let key_bytes = decode_b64("verificationKey", &record.verification_key)?;
        let verification_key = MlDsaPublicKey::from_bytes(&key_bytes).map_err(|e| {
            TunnelError::InvalidConfig(format!("verification key for {}: {e}", record.url))
        })?;
        Self::new(&record.url, verification_key, record.agent.clone())
    }

    pub fn to_record(&self) -> EndpointRecord {
        EndpointRecord {
            url: self.url.clone(),
            verification_key: BASE64.encode(self.verification_key.to_bytes()),
            agent: self.agent.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn verification_key(&self) -> &MlDsaPublicKey {
        &self.verification_key
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn agent_context(&self) -> &[u8] {
        self.agent.as_bytes()
    }
}

/// Resolved registry, ordered by server name.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    servers: BTreeMap<String, Vec<EndpointConfig>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, OneOrMany> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for (name, entry) in raw {
            let endpoints = entry
                .into_vec()
                .iter()
                .map(EndpointConfig::from_record)
                .collect::<Result<Vec<_>>>()?;
            registry.insert(name, endpoints)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Adds a logical server. Endpoint order fixes each endpoint's index.
    pub fn insert(&mut self, name: impl Into<String>, endpoints: Vec<EndpointConfig>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(TunnelError::InvalidConfig("empty server name".into()));
        }
        if endpoints.is_empty() {
            return Err(TunnelError::InvalidConfig(format!(
                "server {name} has no endpoints"
            )));
        }
        if self.servers.contains_key(&name) {
            return Err(TunnelError::InvalidConfig(format!(
                "server {name} defined twice"
            )));
        }
        self.servers.insert(name, endpoints);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(TunnelError::InvalidConfig("registry is empty".into()));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[EndpointConfig]> {
        self.servers.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EndpointConfig])> {
        self.servers
            .iter()
            .map(|(name, endpoints)| (name.as_str(), endpoints.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn to_records(&self) -> BTreeMap<String, Vec<EndpointRecord>> {
        self.servers
            .iter()
            .map(|(name, endpoints)| {
                (
                    name.clone(),
                    endpoints.iter().map(EndpointConfig::to_record).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::ml_dsa::MlDsaSecretKey;
    use crypto::traits::SigningKey;

    fn key_b64(seed: &[u8]) -> String {
        BASE64.encode(
            MlDsaSecretKey::generate_deterministic(seed)
                .verify_key()
                .to_bytes(),
        )
    }

    #[test]
    fn test_single_and_multiple_endpoints() {
        let json = serde_json::json!({
            "auth": { "url": "https://auth.test/", "publicKey": key_b64(b"auth"), "agent": "auth-agent" },
            "store": [
                { "url": "http://a.test:8080", "verificationKey": key_b64(b"a"), "agent": "a" },
                { "url": "http://b.test:8080", "verificationKey": key_b64(b"b"), "agentContext": "b" }
            ]
        });
        let registry = Registry::from_json(&json.to_string()).unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["auth", "store"]);
        let auth = registry.get("auth").unwrap();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].url(), "https://auth.test");
        assert_eq!(auth[0].agent_context(), b"auth-agent");

        let store = registry.get("store").unwrap();
        assert_eq!(store[1].url(), "http://b.test:8080");
        assert_eq!(store[1].agent(), "b");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let empty_list = serde_json::json!({ "auth": [] });
        assert!(matches!(
            Registry::from_json(&empty_list.to_string()),
            Err(TunnelError::InvalidConfig(_))
        ));

        assert!(matches!(
            Registry::from_json("{}"),
            Err(TunnelError::InvalidConfig(_))
        ));

        let bad_url = serde_json::json!({
            "auth": { "url": "not a url", "publicKey": key_b64(b"x"), "agent": "a" }
        });
        assert!(matches!(
            Registry::from_json(&bad_url.to_string()),
            Err(TunnelError::InvalidConfig(_))
        ));

        let short_key = serde_json::json!({
            "auth": { "url": "https://a.test", "publicKey": BASE64.encode([0u8; 10]), "agent": "a" }
        });
        assert!(matches!(
            Registry::from_json(&short_key.to_string()),
            Err(TunnelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_agent_longer_than_signature_context_rejected() {
        let at_limit = "a".repeat(ML_DSA_MAX_CONTEXT_LEN);
        let json = serde_json::json!({
            "auth": { "url": "https://a.test", "publicKey": key_b64(b"x"), "agent": at_limit }
        });
        assert!(Registry::from_json(&json.to_string()).is_ok());

        let too_long = "a".repeat(ML_DSA_MAX_CONTEXT_LEN + 1);
        let json = serde_json::json!({
            "auth": { "url": "https://a.test", "publicKey": key_b64(b"x"), "agent": too_long }
        });
        match Registry::from_json(&json.to_string()) {
            Err(TunnelError::InvalidConfig(msg)) => assert!(msg.contains("agent")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_records_roundtrip() {
        let json = serde_json::json!({
            "auth": { "url": "https://auth.test", "publicKey": key_b64(b"auth"), "agent": "x" }
        });
        let registry = Registry::from_json(&json.to_string()).unwrap();
        let again =
            Registry::from_json(&serde_json::to_string(&registry.to_records()).unwrap()).unwrap();
        assert_eq!(registry.get("auth"), again.get("auth"));
    }
}
