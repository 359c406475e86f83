//! Round-robin endpoint selection with failure cool-down.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{HandshakeError, Result, TunnelError};
use crate::handshake::HandshakeEngine;
use crate::registry::EndpointConfig;
use crate::session::{Session, SessionInfo, SessionKeys, SessionStatus};

/// A named service and the sessions of its endpoints.
pub struct LogicalServer {
    name: String,
    sessions: Vec<Arc<Session>>,
    cursor: AtomicUsize,
}

impl LogicalServer {
    pub fn new(name: impl Into<String>, endpoints: &[EndpointConfig]) -> Self {
        let name = name.into();
        let sessions = endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| Arc::new(Session::new(name.clone(), index, endpoint.clone())))
            .collect();
        Self {
            name,
            sessions,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sessions(&self) -> &[Arc<Session>] {
        &self.sessions
    }

    pub fn session(&self, index: usize) -> Option<&Arc<Session>> {
        self.sessions.get(index)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the cursor position and advances it, wrapping at the endpoint count.
    fn advance_cursor(&self) -> usize {
        let n = self.sessions.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % n))
        {
            Ok(previous) | Err(previous) => previous % n,
        }
    }

    /// Picks the next endpoint not in cool-down.
    ///
    /// The cursor advances on every candidate examined. The scan ends when it
    /// comes back to the first index it examined, so at most one full cycle
    /// is inspected.
    pub fn select(&self, cooldown: Duration) -> Result<Arc<Session>> {
        if self.sessions.is_empty() {
            return Err(self.exhausted());
        }
        let now = Instant::now();
        let mut first = None;

        for _ in 0..self.sessions.len() {
            let index = self.advance_cursor();
            match first {
                None => first = Some(index),
                Some(start) if start == index => break,
                Some(_) => {}
            }
            let session = &self.sessions[index];
            if session.take_if_eligible(now, cooldown) {
                return Ok(session.clone());
            }
            debug!(server = %self.name, endpoint = index, "endpoint cooling down");
        }

        Err(self.exhausted())
    }

    /// Returns an active session and its keys, running a handshake if needed.
    ///
    /// A failed handshake stamps the endpoint and selection moves on. Coming
    /// back to the first endpoint chosen without an active session ends the
    /// call with [`TunnelError::NoEndpointAvailable`].
    pub async fn acquire_active(
        &self,
        engine: &HandshakeEngine,
        cooldown: Duration,
    ) -> Result<(Arc<Session>, Arc<SessionKeys>)> {
        let mut first = None;

        loop {
            let session = self.select(cooldown)?;

            if session.status() == SessionStatus::Active {
                if let Some(keys) = session.keys() {
                    return Ok((session, keys));
                }
            }

            match first {
                None => first = Some(session.index()),
                Some(start) if start == session.index() => return Err(self.exhausted()),
                Some(_) => {}
            }

            if let Some(active) = self.activate_or_join(engine, &session).await {
                return Ok(active);
            }
        }
    }

    /// Brings one session up, or waits for the handshake another caller is
    /// already running on it. `None` means it did not become active.
    async fn activate_or_join(
        &self,
        engine: &HandshakeEngine,
        session: &Arc<Session>,
    ) -> Option<(Arc<Session>, Arc<SessionKeys>)> {
        loop {
            match session.status() {
                SessionStatus::Active => {
                    return session.keys().map(|keys| (session.clone(), keys));
                }
                SessionStatus::Connecting => {
                    if session.wait_for_handshake().await != SessionStatus::Active {
                        return None;
                    }
                }
                SessionStatus::Idle => match engine.activate(session).await {
                    Ok(keys) => return Some((session.clone(), keys)),
                    // lost the race to another caller; join its handshake
                    Err(HandshakeError::InvalidState) => continue,
                    Err(cause) => {
                        self.record_failure(session, &cause);
                        return None;
                    }
                },
            }
        }
    }

    /// Handshake with one specific endpoint, collapsing failures.
    pub async fn activate(
        &self,
        engine: &HandshakeEngine,
        index: usize,
    ) -> Result<Arc<SessionKeys>> {
        let session = self.session(index).ok_or_else(|| {
            TunnelError::InvalidConfig(format!("server {} has no endpoint {index}", self.name))
        })?;
        loop {
            if let Some(keys) = session.keys() {
                return Ok(keys);
            }
            match engine.activate(session).await {
                Ok(keys) => return Ok(keys),
                Err(HandshakeError::InvalidState) => {
                    session.wait_for_handshake().await;
                }
                Err(cause) => {
                    self.record_failure(session, &cause);
                    return Err(TunnelError::AuthenticationFailed {
                        server: self.name.clone(),
                    });
                }
            }
        }
    }

    /// Invalidates every session. Cool-down stamps are kept.
    pub fn reset(&self) -> usize {
        self.sessions.iter().filter(|s| s.invalidate()).count()
    }

    pub fn info(&self, cooldown: Duration) -> Vec<SessionInfo> {
        let now = Instant::now();
        self.sessions.iter().map(|s| s.info(now, cooldown)).collect()
    }

    /// Callers only ever see `AuthenticationFailed`; the cause goes to the
    /// debug log.
    fn record_failure(&self, session: &Session, cause: &HandshakeError) {
        warn!(
            server = %self.name,
            endpoint = session.index(),
            url = %session.url(),
            "handshake failed, endpoint cooling down"
        );
        debug!(
            server = %self.name,
            endpoint = session.index(),
            error = %cause,
            "handshake failure cause"
        );
    }

    fn exhausted(&self) -> TunnelError {
        TunnelError::NoEndpointAvailable {
            server: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for LogicalServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalServer")
            .field("name", &self.name)
            .field("endpoints", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
