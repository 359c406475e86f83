//! Configuration for the tunnel client

use std::path::PathBuf;
use std::time::Duration;

use crate::credential::Credential;
use crate::error::{Result, TunnelError};
use crate::registry::Registry;

pub const DEFAULT_API_PREFIX: &str = "/microtunnel";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Configuration for a [`TunnelClient`](crate::TunnelClient)
#[derive(Clone, Debug)]
pub struct TunnelConfig {
    /// Path prefix of every endpoint route
    pub api_prefix: String,

    /// Per-request transport timeout
    pub request_timeout: Duration,

    /// How long an endpoint is skipped after a failed handshake
    pub cooldown: Duration,

    /// Whether to log each handshake phase
    pub verbose_logging: bool,

    /// Local long-term identity
    pub credential: Credential,

    /// Logical servers and their endpoints
    pub registry: Registry,
}

impl TunnelConfig {
    /// Create a configuration with default prefix, timeout and cool-down
    pub fn new(credential: Credential, registry: Registry) -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
            verbose_logging: false,
            credential,
            registry,
        }
    }

    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::new()
    }

    /// Set the API prefix. Leading and trailing slashes are normalized.
    pub fn with_api_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.api_prefix = normalize_prefix(prefix.as_ref());
        self
    }

    /// Set the cool-down duration
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Enable verbose logging
    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }
}

enum Source<T> {
    Value(T),
    File(PathBuf),
}

/// Builder for TunnelConfig
pub struct TunnelConfigBuilder {
    api_prefix: String,
    request_timeout: Duration,
    cooldown: Duration,
    verbose_logging: bool,
    credential: Option<Source<Credential>>,
    registry: Option<Source<Registry>>,
}

impl Default for TunnelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelConfigBuilder {
    pub fn new() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
            verbose_logging: false,
            credential: None,
            registry: None,
        }
    }

    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose_logging = true;
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(Source::Value(credential));
        self
    }

    /// Read the credential JSON from `path` at build time
    pub fn credential_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential = Some(Source::File(path.into()));
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(Source::Value(registry));
        self
    }

    /// Read the registry JSON from `path` at build time
    pub fn registry_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry = Some(Source::File(path.into()));
        self
    }

    /// Build the configuration, loading any file sources
    pub fn build(self) -> Result<TunnelConfig> {
        let credential = match self.credential {
            Some(Source::Value(credential)) => credential,
            Some(Source::File(path)) => Credential::load(&path).map_err(|e| {
                TunnelError::InvalidConfig(format!("credential {}: {e}", path.display()))
            })?,
            None => return Err(TunnelError::InvalidConfig("credential is required".into())),
        };
        let registry = match self.registry {
            Some(Source::Value(registry)) => registry,
            Some(Source::File(path)) => Registry::load(&path).map_err(|e| {
                TunnelError::InvalidConfig(format!("registry {}: {e}", path.display()))
            })?,
            None => return Err(TunnelError::InvalidConfig("registry is required".into())),
        };
        registry.validate()?;

        let api_prefix = normalize_prefix(&self.api_prefix);
        if self.request_timeout.is_zero() {
            return Err(TunnelError::InvalidConfig(
                "request timeout must be non-zero".into(),
            ));
        }

        Ok(TunnelConfig {
            api_prefix,
            request_timeout: self.request_timeout,
            cooldown: self.cooldown,
            verbose_logging: self.verbose_logging,
            credential,
            registry,
        })
    }
}

/// `"api/"` becomes `"/api"`; an empty prefix stays empty.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
