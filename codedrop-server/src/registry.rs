//! Session registry.
//!
//! Process-wide table from session code to upload state. All access goes
//! through the registry's operations.
//!
//! # Locking
//!
//! The table is a `DashMap` of `Arc<SessionSlot>`. Operations clone the slot
//! out and drop the map guard before taking the per-session mutex, so work on
//! one session never blocks lookups of another. The map is never locked while
//! a session mutex is held.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use codedrop_core::{
    accept_chunk, Chunk, ProtocolError, ReassembledFile, Session, SessionCode, SessionState,
};

use crate::config::{FetchPolicy, RelayConfig};

struct SessionSlot {
    created_at: Instant,
    session: Mutex<Session>,
}

impl SessionSlot {
    fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.created_at) > ttl
    }
}

/// Live sessions, keyed by code.
pub struct Registry {
    sessions: DashMap<SessionCode, Arc<SessionSlot>>,
    ttl: Duration,
    fetch_policy: FetchPolicy,
}

impl Registry {
    /// Empty registry with the given TTL and fetch policy.
    pub fn new(ttl: Duration, fetch_policy: FetchPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            fetch_policy,
        }
    }

    /// Empty registry configured from relay settings.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.session_ttl, config.fetch_policy)
    }

    /// Mint a code no live session holds and register a new session.
    pub fn create_session(&self) -> SessionCode {
        self.create_session_with(&mut rand::thread_rng())
    }

    /// [`Registry::create_session`] with an explicit random source.
    pub fn create_session_with<R: Rng + ?Sized>(&self, rng: &mut R) -> SessionCode {
        loop {
            let code = SessionCode::generate(rng);
            match self.sessions.entry(code.clone()) {
                Entry::Occupied(_) => {
                    debug!(session = %code.log_id(), "code collision, drawing again");
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(SessionSlot {
                        created_at: Instant::now(),
                        session: Mutex::new(Session::new(code.clone())),
                    }));
                    info!(session = %code.log_id(), "session created");
                    return code;
                }
            }
        }
    }

    /// Route a chunk to its session's reassembler.
    ///
    /// Returns the session state after the chunk was applied. A fatal error
    /// discards the session before returning.
    pub fn record_chunk(&self, chunk: Chunk) -> Result<SessionState, ProtocolError> {
        let code = chunk.session_code.clone();
        let slot = self.lookup(&code)?;
        let mut session = slot.session.lock();

        if session.state() == SessionState::Expired {
            return Err(ProtocolError::UnknownSession);
        }

        let (file_index, chunk_index) = (chunk.file_index, chunk.chunk_index);
        match accept_chunk(&mut session, chunk) {
            Ok(outcome) => {
                debug!(
                    session = %code.log_id(),
                    file_index,
                    chunk_index,
                    file_complete = outcome.file_complete,
                    "chunk accepted"
                );
                if outcome.session_complete {
                    info!(
                        session = %code.log_id(),
                        files = session.file_count(),
                        "upload complete"
                    );
                }
                Ok(session.state())
            }
            Err(err) => {
                if err.is_session_fatal() {
                    session.expire();
                    drop(session);
                    self.remove_slot(&code, &slot);
                    warn!(session = %code.log_id(), error = %err, "session discarded");
                }
                Err(err)
            }
        }
    }

    /// Hand out the finished files of a complete session.
    ///
    /// Never returns partial data. Under [`FetchPolicy::SingleUse`] the
    /// session is consumed and the code stops resolving.
    pub fn fetch(&self, code: &SessionCode) -> Result<Vec<ReassembledFile>, ProtocolError> {
        let slot = self.lookup(code)?;
        let mut session = slot.session.lock();

        match session.state() {
            SessionState::Expired => return Err(ProtocolError::UnknownSession),
            SessionState::Created | SessionState::Uploading => {
                return Err(ProtocolError::NotReady)
            }
            SessionState::Complete | SessionState::Fetched => {}
        }

        let files = match self.fetch_policy {
            FetchPolicy::SingleUse => {
                let files = session.take_files().ok_or(ProtocolError::NotReady)?;
                session.expire();
                drop(session);
                self.remove_slot(code, &slot);
                files
            }
            FetchPolicy::Repeatable => {
                let files = session
                    .reassembled_files()
                    .ok_or(ProtocolError::NotReady)?;
                session.mark_fetched();
                files
            }
        };

        info!(session = %code.log_id(), files = files.len(), "session fetched");
        Ok(files)
    }

    /// Current state of a live session.
    pub fn state(&self, code: &SessionCode) -> Option<SessionState> {
        let slot = self.sessions.get(code).map(|s| Arc::clone(s.value()))?;
        let state = slot.session.lock().state();
        Some(state)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session older than the TTL, whatever its state.
    ///
    /// Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<SessionCode> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_stale(now, self.ttl))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for code in stale {
            if let Some((_, slot)) = self
                .sessions
                .remove_if(&code, |_, slot| slot.is_stale(now, self.ttl))
            {
                // Waits for any in-flight append on this session.
                slot.session.lock().expire();
                removed += 1;
                info!(session = %code.log_id(), "session expired");
            }
        }
        removed
    }

    /// Run [`Registry::sweep_expired`] every `interval` on a background task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.sweep_expired();
                if removed > 0 {
                    debug!(removed, live = registry.len(), "expiry sweep");
                }
            }
        })
    }

    /// Clone the slot for `code` out of the map, treating sessions past their
    /// TTL as already gone.
    fn lookup(&self, code: &SessionCode) -> Result<Arc<SessionSlot>, ProtocolError> {
        let slot = self
            .sessions
            .get(code)
            .map(|s| Arc::clone(s.value()))
            .ok_or(ProtocolError::UnknownSession)?;

        if slot.is_stale(Instant::now(), self.ttl) {
            slot.session.lock().expire();
            self.remove_slot(code, &slot);
            info!(session = %code.log_id(), "session expired");
            return Err(ProtocolError::UnknownSession);
        }
        Ok(slot)
    }

    fn remove_slot(&self, code: &SessionCode, slot: &Arc<SessionSlot>) {
        self.sessions
            .remove_if(code, |_, current| Arc::ptr_eq(current, slot));
    }
}
