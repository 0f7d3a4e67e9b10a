//! # Triage Core
//!
//! Core business logic for the clinical message triage service.
//!
//! A physician sends a free-text message; the [`MessagePipeline`] resolves a session, audits the
//! receipt, extracts vitals and symptoms, evaluates them against threshold rules, appends a
//! diagnosis to the named patient's history, encrypts the raw message and audits the encrypted
//! form.
//!
//! Histories and audit trails are stored on disk as sharded, per-key Git repositories under the
//! configured data directory (see [`CoreConfig`]).
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and `cli`.

pub mod cipher;
pub mod config;
pub mod constants;
pub mod error;
pub mod extraction;
mod locks;
pub mod pipeline;
pub mod repositories;
pub mod rules;
pub mod sessions;
mod versioned_files;

pub use cipher::MessageCipher;
pub use config::{CoreConfig, EncryptionPassphrase};
pub use error::{CryptoError, ErrorKind, TriageError, TriageResult};
pub use extraction::{extract_clinical_data, extract_patient_id, BloodPressure, ClinicalData, Symptom};
pub use pipeline::{MessagePipeline, PipelineResult};
pub use repositories::activity::{ActivityAction, ActivityDetails, ActivityEntry, ActivityLog};
pub use repositories::records::{PatientRecordEntry, RecordStore};
pub use rules::{DiagnosticResult, RuleEngine, Severity, TriageRule};
pub use sessions::{Session, SessionId, SessionStore};
pub use triage_types::{DoctorId, PatientId, TextError};
