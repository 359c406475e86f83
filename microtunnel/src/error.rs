//! Error types for microtunnel

use thiserror::Error;

/// Errors surfaced to callers of the tunnel client.
///
/// Every request-path variant names the logical server it concerns.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Handshake with an endpoint failed. The specific cause is only logged.
    #[error("authentication failed with server {server}")]
    AuthenticationFailed { server: String },

    /// Every endpoint is cooling down or failed within one round-robin cycle.
    #[error("no endpoint available for server {server}")]
    NoEndpointAvailable { server: String },

    /// Request failed after a successful handshake.
    #[error("channel error with server {server}: {source}")]
    Channel {
        server: String,
        #[source]
        source: ChannelFailure,
    },

    /// Name not present in the endpoint registry
    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TunnelError {
    /// Logical server the error concerns, if any.
    pub fn server(&self) -> Option<&str> {
        match self {
            TunnelError::AuthenticationFailed { server }
            | TunnelError::NoEndpointAvailable { server }
            | TunnelError::Channel { server, .. } => Some(server),
            TunnelError::UnknownServer(server) => Some(server),
            _ => None,
        }
    }
}

/// Detailed handshake failure cause.
///
/// Collapsed into [`TunnelError::AuthenticationFailed`] before it reaches a
/// caller; the cause itself is emitted at `debug` level.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Response had the wrong length or shape
    #[error("protocol violation in {phase}: expected {expected} bytes, got {actual}")]
    ProtocolViolation {
        phase: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Endpoint signature over our nonce did not verify
    #[error("invalid endpoint signature")]
    InvalidSignature,

    /// Confirmation decrypted but was not affirmative
    #[error("endpoint rejected the handshake")]
    Rejected,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    /// Session was not idle when the handshake was requested
    #[error("invalid handshake state")]
    InvalidState,
}

/// Why a request over an established session failed.
#[derive(Debug, Error)]
pub enum ChannelFailure {
    #[error("transport: {0}")]
    Transport(#[source] TransportError),

    #[error("request encryption failed: {0}")]
    Encrypt(#[source] crypto::CryptoError),

    #[error("response decryption failed: {0}")]
    Decrypt(#[source] crypto::CryptoError),

    #[error("payload encoding failed: {0}")]
    Encode(#[source] bincode::Error),

    #[error("response decoding failed: {0}")]
    Decode(#[source] bincode::Error),
}

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("http client setup failed: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request(err.to_string())
    }
}

/// Result type for tunnel operations
pub type Result<T> = std::result::Result<T, TunnelError>;
