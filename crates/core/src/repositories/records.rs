//! Patient clinical histories.
//!
//! Each patient has an append-only history stored as multi-document YAML in its own Git
//! repository:
//!
//! ```text
//! records/<s1>/<s2>/<patient_id>/
//! └── history.yaml
//! ```
//!
//! Entries are never reordered, deduplicated, edited or removed.

use crate::config::CoreConfig;
use crate::constants::HISTORY_FILENAME;
use crate::error::TriageResult;
use crate::extraction::ClinicalData;
use crate::locks::KeyedLocks;
use crate::repositories::shared::sharded_dir;
use crate::rules::DiagnosticResult;
use crate::versioned_files::{append_document, read_documents, CommitDomain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use triage_types::PatientId;

/// One timestamped diagnosis in a patient's history.
///
/// The extracted clinical data is the diagnosis' `source`, stored once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecordEntry {
    pub recorded_at: DateTime<Utc>,
    pub diagnosis: DiagnosticResult,
}

impl PatientRecordEntry {
    pub fn new(diagnosis: DiagnosticResult, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            diagnosis,
        }
    }

    pub fn clinical_data(&self) -> &ClinicalData {
        &self.diagnosis.source
    }
}

/// Service for appending to and reading patient histories.
#[derive(Debug)]
pub struct RecordStore {
    cfg: Arc<CoreConfig>,
    locks: KeyedLocks,
}

impl RecordStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            locks: KeyedLocks::new(),
        }
    }

    fn patient_dir(&self, patient_id: &PatientId) -> PathBuf {
        sharded_dir(&self.cfg.records_dir(), patient_id.as_str())
    }

    /// Append `entry` to the patient's history, creating the history if absent.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the entry cannot be written or committed. A failed
    /// append leaves the history exactly as it was.
    pub fn add_record(&self, patient_id: &PatientId, entry: &PatientRecordEntry) -> TriageResult<()> {
        let dir = self.patient_dir(patient_id);
        self.locks.with_lock(patient_id.as_str(), || {
            append_document(&dir, HISTORY_FILENAME, entry, CommitDomain::Records)
        })?;
        tracing::info!("clinical record committed");
        Ok(())
    }

    /// All entries for `patient_id` in insertion order. Unknown patients have no entries.
    pub fn get_records(&self, patient_id: &PatientId) -> TriageResult<Vec<PatientRecordEntry>> {
        let dir = self.patient_dir(patient_id);
        self.locks
            .with_lock(patient_id.as_str(), || read_documents(&dir, HISTORY_FILENAME))
    }
}
