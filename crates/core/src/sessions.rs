//! In-memory session store.
//!
//! A session binds an opaque token to one doctor until a fixed expiry (`created + timeout`,
//! no sliding window). Sessions live in a sharded concurrent map, so operations on different
//! tokens do not contend and operations on one token are serialised by its shard.
//!
//! Tokens are UUID v4 in simple form (32 lowercase hex characters). Any supplied token that is
//! not in that form is treated as unknown.

use crate::error::{TriageError, TriageResult};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use triage_types::DoctorId;
use uuid::Uuid;

/// Opaque session token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a caller-supplied token. Returns `None` unless it is in canonical form.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let canonical = input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        canonical.then(|| Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub doctor_id: DoctorId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Valid iff `now <= expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Process-wide session registry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn create_session(&self, doctor_id: &DoctorId) -> Session {
        self.create_session_at(doctor_id, Utc::now())
    }

    /// Issue a fresh session for `doctor_id` expiring at `now + timeout`.
    ///
    /// Existing sessions of the same doctor are left untouched.
    pub fn create_session_at(&self, doctor_id: &DoctorId, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: SessionId::generate(),
            doctor_id: doctor_id.clone(),
            expires_at: now + self.timeout,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        tracing::info!(expires_at = %session.expires_at, "session issued");
        session
    }

    pub fn validate_session(&self, session_id: &str) -> Option<Session> {
        self.validate_session_at(session_id, Utc::now())
    }

    /// Look up an unexpired session. An expired entry is removed as a side effect.
    pub fn validate_session_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<Session> {
        self.lookup(session_id, now).ok()
    }

    /// Resolve a supplied token for `doctor_id`.
    ///
    /// # Errors
    ///
    /// - `TriageError::SessionNotFound` for unknown or malformed tokens
    /// - `TriageError::SessionExpired` if the session timed out (it is removed)
    /// - `TriageError::SessionDoctorMismatch` if it belongs to another doctor
    pub fn require_session_at(
        &self,
        session_id: &str,
        doctor_id: &DoctorId,
        now: DateTime<Utc>,
    ) -> TriageResult<Session> {
        let session = self.lookup(session_id, now)?;
        if &session.doctor_id != doctor_id {
            return Err(TriageError::SessionDoctorMismatch);
        }
        Ok(session)
    }

    fn lookup(&self, session_id: &str, now: DateTime<Utc>) -> TriageResult<Session> {
        let id = SessionId::parse(session_id).ok_or(TriageError::SessionNotFound)?;

        match self.sessions.entry(id) {
            Entry::Occupied(entry) if entry.get().is_valid_at(now) => Ok(entry.get().clone()),
            Entry::Occupied(entry) => {
                entry.remove();
                Err(TriageError::SessionExpired)
            }
            Entry::Vacant(_) => Err(TriageError::SessionNotFound),
        }
    }

    /// Remove a session. Unknown tokens are ignored.
    pub fn expire_session(&self, session_id: &str) {
        if let Some(id) = SessionId::parse(session_id) {
            if self.sessions.remove(&id).is_some() {
                tracing::info!("session expired on request");
            }
        }
    }

    /// Drop every session that has timed out by `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.is_valid_at(now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, "purged expired sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
