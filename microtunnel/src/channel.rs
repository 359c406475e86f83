//! Encrypted application requests over established sessions.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use crypto::SymCryptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec;
use crate::config::{normalize_prefix, TunnelConfig};
use crate::credential::Credential;
use crate::error::{ChannelFailure, Result, TransportError, TunnelError};
use crate::handshake::HandshakeEngine;
use crate::registry::Registry;
use crate::selector::LogicalServer;
use crate::session::{Session, SessionInfo, SessionKeys};
use crate::transport::{HttpTransport, Transport};
use crate::wire::endpoint_url;

/// Client for every logical server in the registry.
///
/// Requests pick an endpoint round robin, handshake with it on first use and
/// reuse the session until a failure invalidates it. A transport failure is
/// retried once over a fresh session; decryption and decoding failures are
/// not retried.
pub struct TunnelClient {
    config: TunnelConfig,
    credential: Arc<Credential>,
    transport: Arc<dyn Transport>,
    engine: HandshakeEngine,
    servers: BTreeMap<String, LogicalServer>,
    cryptor: SymCryptor,
}

impl TunnelClient {
    /// Client over HTTP with the configured timeout and the credential's
    /// agent as `User-Agent`.
    pub fn new(config: TunnelConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.credential.agent(), config.request_timeout)
            .map_err(|e| TunnelError::InvalidConfig(e.to_string()))?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        mut config: TunnelConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.registry.validate()?;
        // `api_prefix` is a public field and may bypass `with_api_prefix`
        config.api_prefix = normalize_prefix(&config.api_prefix);

        let credential = Arc::new(config.credential.clone());
        let engine = HandshakeEngine::new(
            credential.clone(),
            transport.clone(),
            config.api_prefix.clone(),
            config.verbose_logging,
        );
        let servers = config
            .registry
            .iter()
            .map(|(name, endpoints)| (name.to_string(), LogicalServer::new(name, endpoints)))
            .collect();

        Ok(Self {
            config,
            credential,
            transport,
            engine,
            servers,
            cryptor: SymCryptor::new(),
        })
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Resolved endpoint registry
    pub fn registry(&self) -> &Registry {
        &self.config.registry
    }

    /// The symmetric cryptor used for every sealed payload
    pub fn sym_cryptor(&self) -> &SymCryptor {
        &self.cryptor
    }

    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    /// `GET {prefix}{path}` and decode the sealed response.
    ///
    /// A transport failure is retried once over a fresh session. If that
    /// retry fails, or no session can be re-established for it, the result is
    /// [`TunnelError::Channel`] with a [`ChannelFailure::Transport`] cause.
    pub async fn get<T: DeserializeOwned>(&self, server: &str, path: &str) -> Result<T> {
        self.request(server, path, None).await
    }

    /// `POST {prefix}{path}` with `value` encoded and sealed. Retries as
    /// [`get`](Self::get) does.
    pub async fn post<B, T>(&self, server: &str, path: &str, value: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let plaintext = codec::encode(value).map_err(|e| TunnelError::Channel {
            server: server.to_string(),
            source: ChannelFailure::Encode(e),
        })?;
        self.request(server, path, Some(plaintext.as_slice())).await
    }

    /// Makes sure an endpoint of `server` has an active session.
    pub async fn connect(&self, server: &str) -> Result<SessionInfo> {
        let logical = self.server(server)?;
        let (session, _keys) = logical
            .acquire_active(&self.engine, self.config.cooldown)
            .await?;
        Ok(session.info(tokio::time::Instant::now(), self.config.cooldown))
    }

    /// Handshakes with endpoint `index` of `server` directly.
    ///
    /// Any handshake failure is reported as
    /// [`TunnelError::AuthenticationFailed`] and starts the endpoint's cool-down.
    pub async fn activate(&self, server: &str, index: usize) -> Result<()> {
        self.server(server)?.activate(&self.engine, index).await?;
        Ok(())
    }

    /// Drops every session of `server`. Cool-downs are left running.
    pub fn reset(&self, server: &str) -> Result<()> {
        let dropped = self.server(server)?.reset();
        debug!(server = %server, sessions = dropped, "sessions reset");
        Ok(())
    }

    pub fn sessions(&self, server: &str) -> Result<Vec<SessionInfo>> {
        Ok(self.server(server)?.info(self.config.cooldown))
    }

    fn server(&self, name: &str) -> Result<&LogicalServer> {
        self.servers
            .get(name)
            .ok_or_else(|| TunnelError::UnknownServer(name.to_string()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        server: &str,
        path: &str,
        plaintext: Option<&[u8]>,
    ) -> Result<T> {
        let logical = self.server(server)?;
        // transport failure of the first attempt, set once a retry is under way
        let mut first_failure: Option<TransportError> = None;

        loop {
            let (session, keys) = match logical
                .acquire_active(&self.engine, self.config.cooldown)
                .await
            {
                Ok(active) => active,
                Err(e) => match &first_failure {
                    Some(failure) => {
                        warn!(server = %server, error = %e, "reconnect for retry failed");
                        return Err(channel_error(
                            server,
                            ChannelFailure::Transport(failure.clone()),
                        ));
                    }
                    None => return Err(e),
                },
            };
            let url = endpoint_url(session.url(), &self.config.api_prefix, path);

            let sent = match plaintext {
                Some(plaintext) => {
                    let body = self
                        .cryptor
                        .encrypt(
                            plaintext,
                            keys.session_key(),
                            Some(keys.confirmation_key()),
                            Some(self.credential.agent_context()),
                        )
                        .map_err(|e| channel_error(server, ChannelFailure::Encrypt(e)))?;
                    self.transport.post(&url, body).await
                }
                None => self.transport.get(&url).await,
            };

            match sent {
                Ok(body) => return self.open(server, &session, &keys, body),
                Err(e) => {
                    session.invalidate_keys(&keys);
                    if first_failure.is_some() {
                        warn!(
                            server = %server,
                            endpoint = session.index(),
                            error = %e,
                            "request failed after retry"
                        );
                        return Err(channel_error(server, ChannelFailure::Transport(e)));
                    }
                    warn!(
                        server = %server,
                        endpoint = session.index(),
                        error = %e,
                        "request failed, reconnecting"
                    );
                    first_failure = Some(e);
                }
            }
        }
    }

    fn open<T: DeserializeOwned>(
        &self,
        server: &str,
        session: &Session,
        keys: &Arc<SessionKeys>,
        body: Bytes,
    ) -> Result<T> {
        let plaintext = match self.cryptor.decrypt(
            &body,
            keys.session_key(),
            Some(keys.confirmation_key()),
            Some(session.endpoint().agent_context()),
        ) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                session.invalidate_keys(keys);
                warn!(
                    server = %server,
                    endpoint = session.index(),
                    "response failed authentication"
                );
                return Err(channel_error(server, ChannelFailure::Decrypt(e)));
            }
        };

        codec::decode(&plaintext).map_err(|e| {
            session.invalidate_keys(keys);
            warn!(
                server = %server,
                endpoint = session.index(),
                error = %e,
                "response failed to decode"
            );
            channel_error(server, ChannelFailure::Decode(e))
        })
    }
}

fn channel_error(server: &str, source: ChannelFailure) -> TunnelError {
    TunnelError::Channel {
        server: server.to_string(),
        source,
    }
}

impl std::fmt::Debug for TunnelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelClient")
            .field("servers", &self.servers)
            .field("api_prefix", &self.config.api_prefix)
            .finish_non_exhaustive()
    }
}
