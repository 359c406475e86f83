//! Mutually authenticated, forward-secret sessions with redundant endpoints.
//!
//! A logical server is a name backed by one or more physical endpoints. The
//! client authenticates each endpoint with a two round-trip handshake
//! (ML-DSA-65 signatures, ML-KEM-1024 encapsulation), then carries encoded
//! application values sealed under the negotiated keys.
//!
//! # Components
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ TunnelClient      get / post, retry once on transport error  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ LogicalServer     round robin, cool-down, one-cycle bound    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ HandshakeEngine   auth1 / auth2 key exchange                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Session           Idle → Connecting → Active, keys, stamps   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Credential, Registry, Transport, codec                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use microtunnel::{TunnelClient, TunnelConfig};
//!
//! let config = TunnelConfig::builder()
//!     .credential_file("cred.json")
//!     .registry_file("servers.json")
//!     .build()?;
//! let client = TunnelClient::new(config)?;
//!
//! let user: User = client.get("accounts", "/users/42").await?;
//! let saved: Ack = client.post("accounts", "/users", &user).await?;
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod credential;
pub mod error;
pub mod handshake;
pub mod registry;
pub mod selector;
pub mod session;
pub mod transport;
pub mod wire;

pub use channel::TunnelClient;
pub use config::{TunnelConfig, TunnelConfigBuilder};
pub use credential::{Credential, CredentialRecord};
pub use error::{ChannelFailure, HandshakeError, Result, TransportError, TunnelError};
pub use handshake::HandshakeEngine;
pub use registry::{EndpointConfig, EndpointRecord, Registry};
pub use selector::LogicalServer;
pub use session::{Session, SessionInfo, SessionKeys, SessionStatus};
pub use transport::{HttpTransport, Transport};
