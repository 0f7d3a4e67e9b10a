//! Per-doctor audit trails.
//!
//! Every message handled on behalf of a doctor leaves two entries in that doctor's trail: one
//! on receipt and one once the message has been encrypted. Receipt details describe the message
//! (length, session) but never contain its text.
//!
//! ```text
//! activity/<s1>/<s2>/<doctor_id>/
//! └── activity.yaml
//! ```

use crate::config::CoreConfig;
use crate::constants::ACTIVITY_FILENAME;
use crate::error::TriageResult;
use crate::locks::KeyedLocks;
use crate::repositories::shared::sharded_dir;
use crate::versioned_files::{append_document, read_documents, CommitDomain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use triage_types::DoctorId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    MessageReceived,
    MessageEncrypted,
}

impl ActivityAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::MessageEncrypted => "message_encrypted",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form key/value details attached to an audit entry.
pub type ActivityDetails = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub doctor_id: DoctorId,
    pub action: ActivityAction,
    pub details: ActivityDetails,
    pub timestamp: DateTime<Utc>,
}

/// Service for appending to and reading doctor audit trails.
#[derive(Debug)]
pub struct ActivityLog {
    cfg: Arc<CoreConfig>,
    locks: KeyedLocks,
}

impl ActivityLog {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            locks: KeyedLocks::new(),
        }
    }

    fn doctor_dir(&self, doctor_id: &DoctorId) -> PathBuf {
        sharded_dir(&self.cfg.activity_dir(), doctor_id.as_str())
    }

    pub fn record(
        &self,
        doctor_id: &DoctorId,
        action: ActivityAction,
        details: ActivityDetails,
    ) -> TriageResult<ActivityEntry> {
        self.record_at(doctor_id, action, details, Utc::now())
    }

    /// Append an audit entry, creating the doctor's trail if absent.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the entry cannot be written or committed; the trail is
    /// left as it was.
    pub fn record_at(
        &self,
        doctor_id: &DoctorId,
        action: ActivityAction,
        details: ActivityDetails,
        timestamp: DateTime<Utc>,
    ) -> TriageResult<ActivityEntry> {
        let entry = ActivityEntry {
            doctor_id: doctor_id.clone(),
            action,
            details,
            timestamp,
        };

        let dir = self.doctor_dir(doctor_id);
        self.locks.with_lock(doctor_id.as_str(), || {
            append_document(&dir, ACTIVITY_FILENAME, &entry, CommitDomain::Activity)
        })?;
        tracing::info!(action = %action, "audit entry committed");
        Ok(entry)
    }

    /// The doctor's trail in insertion order; empty if the doctor has no activity.
    pub fn entries(&self, doctor_id: &DoctorId) -> TriageResult<Vec<ActivityEntry>> {
        let dir = self.doctor_dir(doctor_id);
        self.locks
            .with_lock(doctor_id.as_str(), || read_documents(&dir, ACTIVITY_FILENAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioned_files::VersionedFileService;
    use chrono::Duration;
    use tempfile::TempDir;

    fn log(tmp: &TempDir) -> ActivityLog {
        let cfg = CoreConfig::new(tmp.path().to_path_buf(), Duration::hours(1)).unwrap();
        ActivityLog::new(Arc::new(cfg))
    }

    fn doctor(id: &str) -> DoctorId {
        DoctorId::parse(id).unwrap()
    }

    #[test]
    fn entries_are_returned_in_order() {
        let tmp = TempDir::new().unwrap();
        let log = log(&tmp);
        let dr = doctor("dr.house");

        log.record(
            &dr,
            ActivityAction::MessageReceived,
            BTreeMap::from([("message_chars".into(), "12".into())]),
        )
        .unwrap();
        log.record(
            &dr,
            ActivityAction::MessageEncrypted,
            BTreeMap::from([("encrypted_message".into(), "b64blob".into())]),
        )
        .unwrap();

        let entries = log.entries(&dr).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ActivityAction::MessageReceived);
        assert_eq!(entries[1].action, ActivityAction::MessageEncrypted);
        assert_eq!(entries[1].details["encrypted_message"], "b64blob");
        assert!(entries.iter().all(|e| e.doctor_id == dr));
    }

    #[test]
    fn unknown_doctor_has_empty_trail() {
        let tmp = TempDir::new().unwrap();
        assert!(log(&tmp).entries(&doctor("nobody")).unwrap().is_empty());
    }

    #[test]
    fn each_entry_is_one_commit() {
        let tmp = TempDir::new().unwrap();
        let log = log(&tmp);
        let dr = doctor("dr1");
        for _ in 0..3 {
            log.record(&dr, ActivityAction::MessageReceived, ActivityDetails::new())
                .unwrap();
        }

        let dir = sharded_dir(&tmp.path().join("activity"), "dr1");
        let service = VersionedFileService::open(&dir).unwrap();
        assert_eq!(service.commit_count(), 3);
        assert_eq!(
            service.head_message().as_deref(),
            Some("activity:append: Appended audit entry")
        );
    }

    #[test]
    fn timestamps_are_preserved() {
        let tmp = TempDir::new().unwrap();
        let log = log(&tmp);
        let dr = doctor("dr1");
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        log.record_at(&dr, ActivityAction::MessageReceived, ActivityDetails::new(), at)
            .unwrap();
        assert_eq!(log.entries(&dr).unwrap()[0].timestamp, at);
    }

    #[test]
    fn action_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&ActivityAction::MessageEncrypted).unwrap(),
            "\"message_encrypted\""
        );
        assert_eq!(ActivityAction::MessageReceived.to_string(), "message_received");
    }
}
