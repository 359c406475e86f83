//! Per-endpoint session state.
//!
//! A session moves `Idle -> Connecting -> Active` and back to `Idle` on
//! failure or invalidation. It is never destroyed. Both keys are present
//! exactly when the session is `Active`, and are dropped (and zeroed)
//! together.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::registry::EndpointConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
}

/// Owned secret buffer, zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED; {}])", self.0.len())
    }
}

/// Keys negotiated by one successful handshake.
#[derive(Debug)]
pub struct SessionKeys {
    session_key: SecretBytes,
    confirmation_key: SecretBytes,
}

impl SessionKeys {
    pub fn new(session_key: SecretBytes, confirmation_key: SecretBytes) -> Self {
        Self {
            session_key,
            confirmation_key,
        }
    }

    /// KEM shared secret
    pub fn session_key(&self) -> &[u8] {
        self.session_key.as_bytes()
    }

    /// Locally drawn secondary key
    pub fn confirmation_key(&self) -> &[u8] {
        self.confirmation_key.as_bytes()
    }
}

/// Secret-free view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub name: String,
    pub index: usize,
    pub url: String,
    pub status: SessionStatus,
    pub cooling_down: bool,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    keys: Option<Arc<SessionKeys>>,
    last_error: Option<Instant>,
}

pub struct Session {
    name: String,
    index: usize,
    endpoint: EndpointConfig,
    state: Mutex<SessionState>,
    handshake_done: Notify,
}

impl Session {
    pub fn new(name: impl Into<String>, index: usize, endpoint: EndpointConfig) -> Self {
        Self {
            name: name.into(),
            index,
            endpoint,
            state: Mutex::new(SessionState {
                status: SessionStatus::Idle,
                keys: None,
                last_error: None,
            }),
            handshake_done: Notify::new(),
        }
    }

    /// Logical server name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn url(&self) -> &str {
        self.endpoint.url()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Keys of the active session, if any.
    pub fn keys(&self) -> Option<Arc<SessionKeys>> {
        self.state.lock().keys.clone()
    }

    /// Claims the session for a handshake.
    ///
    /// Returns `None` unless the session is `Idle`. The check and the move to
    /// `Connecting` happen under one lock.
    pub fn begin_connect(&self) -> Option<ConnectGuard<'_>> {
        let mut state = self.state.lock();
        if state.status != SessionStatus::Idle {
            return None;
        }
        state.status = SessionStatus::Connecting;
        state.keys = None;
        Some(ConnectGuard {
            session: self,
            finished: false,
        })
    }

    /// Drops the keys and returns the session to `Idle`.
    ///
    /// A handshake in flight is left alone. Returns whether an active session
    /// was torn down.
    pub fn invalidate(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != SessionStatus::Active {
            return false;
        }
        state.status = SessionStatus::Idle;
        state.keys = None;
        true
    }

    /// Like [`invalidate`](Self::invalidate), but only if `keys` are still the
    /// current keys. A session re-established by another caller survives.
    pub fn invalidate_keys(&self, keys: &Arc<SessionKeys>) -> bool {
        let mut state = self.state.lock();
        match &state.keys {
            Some(current) if Arc::ptr_eq(current, keys) => {
                state.status = SessionStatus::Idle;
                state.keys = None;
                true
            }
            _ => false,
        }
    }

    /// Records a handshake failure at `now`.
    pub fn mark_failed(&self, now: Instant) {
        self.state.lock().last_error = Some(now);
    }

    pub fn last_error(&self) -> Option<Instant> {
        self.state.lock().last_error
    }

    /// Selection check: false while cooling down, otherwise clears any stale
    /// failure stamp and returns true.
    pub fn take_if_eligible(&self, now: Instant, cooldown: Duration) -> bool {
        let mut state = self.state.lock();
        if let Some(at) = state.last_error {
            if now.saturating_duration_since(at) < cooldown {
                return false;
            }
            state.last_error = None;
        }
        true
    }

    /// Waits until no handshake is in flight and returns the resulting status.
    pub async fn wait_for_handshake(&self) -> SessionStatus {
        loop {
            let notified = self.handshake_done.notified();
            tokio::pin!(notified);
            // register before checking so a completion in between is not lost
            notified.as_mut().enable();

            let status = self.status();
            if status != SessionStatus::Connecting {
                return status;
            }
            notified.await;
        }
    }

    pub fn info(&self, now: Instant, cooldown: Duration) -> SessionInfo {
        let state = self.state.lock();
        let cooling_down = state
            .last_error
            .is_some_and(|at| now.saturating_duration_since(at) < cooldown);
        SessionInfo {
            name: self.name.clone(),
            index: self.index,
            url: self.endpoint.url().to_string(),
            status: state.status,
            cooling_down,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("url", &self.endpoint.url())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Exclusive right to run the handshake of one session.
///
/// Dropping the guard without [`complete`](Self::complete), whether from an
/// error or a cancelled future, returns the session to `Idle` and wakes
/// waiters.
pub struct ConnectGuard<'a> {
    session: &'a Session,
    finished: bool,
}

impl ConnectGuard<'_> {
    /// Installs the keys, marks the session `Active` and wakes waiters.
    pub fn complete(mut self, keys: SessionKeys) -> Arc<SessionKeys> {
        let keys = Arc::new(keys);
        {
            let mut state = self.session.state.lock();
            state.status = SessionStatus::Active;
            state.keys = Some(keys.clone());
            state.last_error = None;
        }
        self.finished = true;
        self.session.handshake_done.notify_waiters();
        keys
    }

    /// Returns the session to `Idle`, stamps the failure at `now` and wakes
    /// waiters. The stamp lands before any waiter can observe `Idle`.
    pub fn fail(mut self, now: Instant) {
        {
            let mut state = self.session.state.lock();
            state.status = SessionStatus::Idle;
            state.keys = None;
            state.last_error = Some(now);
        }
        self.finished = true;
        self.session.handshake_done.notify_waiters();
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        {
            let mut state = self.session.state.lock();
            state.status = SessionStatus::Idle;
            state.keys = None;
        }
        self.session.handshake_done.notify_waiters();
    }
}
