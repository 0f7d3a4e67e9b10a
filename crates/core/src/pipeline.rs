//! Message handling pipeline.
//!
//! [`MessagePipeline::handle_message`] is the single entry point. Each call runs a strict serial
//! sequence of stages:
//!
//! ```text
//! START → SESSION_RESOLVED → LOGGED_RECEIPT → EXTRACTED → (DIAGNOSED)? → (RECORDED)?
//!       → ENCRYPTED → LOGGED_ENCRYPTION → DONE
//! ```
//!
//! DIAGNOSED happens iff any clinical field was extracted; RECORDED iff the message was
//! diagnosed and named a patient. Extraction and rule evaluation cannot fail. A persistence or
//! crypto failure aborts the remaining stages and is returned to the caller; effects already
//! committed by earlier stages are kept.

use crate::cipher::MessageCipher;
use crate::config::CoreConfig;
use crate::error::{TriageError, TriageResult};
use crate::extraction::{extract_clinical_data, extract_patient_id};
use crate::repositories::activity::{ActivityAction, ActivityDetails, ActivityLog};
use crate::repositories::records::{PatientRecordEntry, RecordStore};
use crate::rules::{DiagnosticResult, RuleEngine};
use crate::sessions::{Session, SessionStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use triage_types::{DoctorId, PatientId};

pub const CRITICAL_ALERT_LINE: &str = "CRITICAL ALERT: immediate medical attention required.";
pub const NO_CLINICAL_DATA_LINE: &str = "No clinical data detected in message.";

/// Everything the caller gets back from one handled message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineResult {
    pub response_text: String,
    pub session_id: String,
    pub diagnostic_result: Option<DiagnosticResult>,
    pub encrypted_message: String,
    /// Patient whose history received a new entry, if any.
    pub record_updated: Option<PatientId>,
}

/// Orchestrates sessions, extraction, rules, records, encryption and auditing.
#[derive(Debug)]
pub struct MessagePipeline {
    sessions: Arc<SessionStore>,
    records: Arc<RecordStore>,
    activity: Arc<ActivityLog>,
    rules: Arc<RuleEngine>,
    cipher: Arc<MessageCipher>,
}

impl MessagePipeline {
    pub fn new(
        sessions: Arc<SessionStore>,
        records: Arc<RecordStore>,
        activity: Arc<ActivityLog>,
        rules: Arc<RuleEngine>,
        cipher: Arc<MessageCipher>,
    ) -> Self {
        Self {
            sessions,
            records,
            activity,
            rules,
            cipher,
        }
    }

    /// Build a pipeline with fresh stores rooted at the configured data directory.
    pub fn from_config(cfg: Arc<CoreConfig>, rules: RuleEngine, cipher: MessageCipher) -> Self {
        Self::new(
            Arc::new(SessionStore::new(cfg.session_timeout())),
            Arc::new(RecordStore::new(Arc::clone(&cfg))),
            Arc::new(ActivityLog::new(cfg)),
            Arc::new(rules),
            Arc::new(cipher),
        )
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn cipher(&self) -> &MessageCipher {
        &self.cipher
    }

    pub fn handle_message(
        &self,
        doctor_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> TriageResult<PipelineResult> {
        self.handle_message_at(doctor_id, message, session_id, Utc::now())
    }

    /// Handle one physician message.
    ///
    /// An absent, unknown, expired or foreign session token is replaced by a new session; the
    /// returned `session_id` is always the one actually used.
    ///
    /// # Errors
    ///
    /// - `TriageError::InvalidIdentifier` if `doctor_id` is not a valid identifier (checked
    ///   before any side effect)
    /// - a persistence error if a record or audit entry cannot be committed
    /// - `TriageError::Crypto` if the message cannot be encrypted
    pub fn handle_message_at(
        &self,
        doctor_id: &str,
        message: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> TriageResult<PipelineResult> {
        let doctor_id = DoctorId::parse(doctor_id)?;

        let span = tracing::info_span!("handle_message", doctor = %doctor_id);
        let _enter = span.enter();

        let (session, session_created) = self.resolve_session(&doctor_id, session_id, now);
        tracing::debug!(created = session_created, "session resolved");

        let receipt = ActivityDetails::from([
            ("session_id".to_string(), session.id.to_string()),
            (
                "message_chars".to_string(),
                message.chars().count().to_string(),
            ),
            (
                "session".to_string(),
                if session_created { "created" } else { "reused" }.to_string(),
            ),
        ]);
        self.activity
            .record_at(&doctor_id, ActivityAction::MessageReceived, receipt, now)?;
        tracing::debug!("receipt logged");

        let data = extract_clinical_data(message);
        let patient_id = extract_patient_id(message);
        tracing::debug!(
            has_clinical_data = !data.is_empty(),
            has_patient = patient_id.is_some(),
            "clinical data extracted"
        );

        let diagnostic_result = if data.is_empty() {
            None
        } else {
            let result = self.rules.evaluate(&data);
            tracing::debug!(
                critical = result.critical,
                suggestions = result.suggestions.len(),
                "diagnosed"
            );
            Some(result)
        };

        let record_updated = match (&diagnostic_result, patient_id) {
            (Some(result), Some(patient_id)) => {
                let entry = PatientRecordEntry::new(result.clone(), now);
                self.records.add_record(&patient_id, &entry)?;
                tracing::debug!("record stored");
                Some(patient_id)
            }
            _ => None,
        };

        let encrypted_message = self.cipher.encrypt(message)?;
        tracing::debug!("message encrypted");

        let encryption = ActivityDetails::from([
            ("session_id".to_string(), session.id.to_string()),
            ("encrypted_message".to_string(), encrypted_message.clone()),
        ]);
        self.activity
            .record_at(&doctor_id, ActivityAction::MessageEncrypted, encryption, now)?;
        tracing::debug!("encryption logged");

        let response_text = render_response(
            &doctor_id,
            &session,
            diagnostic_result.as_ref(),
            record_updated.as_ref(),
        );

        Ok(PipelineResult {
            response_text,
            session_id: session.id.to_string(),
            diagnostic_result,
            encrypted_message,
            record_updated,
        })
    }

    /// Reuse the supplied session if it is valid for this doctor, otherwise issue a new one.
    fn resolve_session(
        &self,
        doctor_id: &DoctorId,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> (Session, bool) {
        if let Some(token) = session_id {
            match self.sessions.require_session_at(token, doctor_id, now) {
                Ok(session) => return (session, false),
                Err(err @ TriageError::SessionExpired)
                | Err(err @ TriageError::SessionDoctorMismatch) => {
                    tracing::warn!(reason = %err, "session rejected, issuing a new one");
                }
                Err(err) => {
                    tracing::debug!(reason = %err, "session token unknown, issuing a new one");
                }
            }
        }
        (self.sessions.create_session_at(doctor_id, now), true)
    }
}

fn render_response(
    doctor_id: &DoctorId,
    session: &Session,
    diagnostic_result: Option<&DiagnosticResult>,
    record_updated: Option<&PatientId>,
) -> String {
    let mut lines = vec![format!("Hello Dr. {}. Session: {}.", doctor_id, session.id)];

    match diagnostic_result {
        Some(result) => {
            lines.push("Suggestions:".to_string());
            lines.extend(result.suggestions.iter().map(|s| format!("- {}", s)));
        }
        None => lines.push(NO_CLINICAL_DATA_LINE.to_string()),
    }

    if let Some(patient_id) = record_updated {
        lines.push(format!("Patient record {} updated.", patient_id));
    }

    if diagnostic_result.is_some_and(|r| r.critical) {
        lines.push(CRITICAL_ALERT_LINE.to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::test_support::shared_cipher;
    use crate::error::ErrorKind;
    use crate::rules::{FEVER_SUGGESTION, HYPERTENSION_SUGGESTION, NORMAL_RANGE_SUGGESTION};
    use crate::versioned_files::force_commit_error_for_current_thread_once;
    use chrono::Duration;
    use tempfile::TempDir;

    fn pipeline(tmp: &TempDir) -> MessagePipeline {
        let cfg =
            Arc::new(CoreConfig::new(tmp.path().to_path_buf(), Duration::hours(1)).unwrap());
        MessagePipeline::new(
            Arc::new(SessionStore::new(cfg.session_timeout())),
            Arc::new(RecordStore::new(Arc::clone(&cfg))),
            Arc::new(ActivityLog::new(Arc::clone(&cfg))),
            Arc::new(RuleEngine::default()),
            shared_cipher(),
        )
    }

    fn doctor(id: &str) -> DoctorId {
        DoctorId::parse(id).unwrap()
    }

    fn patient(id: &str) -> PatientId {
        PatientId::parse(id).unwrap()
    }

    #[test]
    fn critical_message_is_diagnosed_recorded_and_alerted() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);
        let message = "temp:39.5 bp:185/90 patientid:P42";

        let result = pipeline.handle_message("dr1", message, None).unwrap();

        let diagnosis = result.diagnostic_result.as_ref().unwrap();
        assert!(diagnosis.critical);
        assert_eq!(diagnosis.source.temperature, Some(39.5));
        assert_eq!(
            diagnosis.suggestions,
            vec![
                FEVER_SUGGESTION.to_string(),
                HYPERTENSION_SUGGESTION.to_string()
            ]
        );
        assert_eq!(result.record_updated, Some(patient("P42")));

        assert!(result
            .response_text
            .contains(&format!("- {}", FEVER_SUGGESTION)));
        assert!(result
            .response_text
            .contains(&format!("- {}", HYPERTENSION_SUGGESTION)));
        assert!(result.response_text.contains("Patient record P42 updated."));
        assert!(result.response_text.ends_with(CRITICAL_ALERT_LINE));

        let records = pipeline.records().get_records(&patient("P42")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].diagnosis, *diagnosis);

        assert_eq!(
            pipeline.cipher().decrypt(&result.encrypted_message).unwrap(),
            message
        );
    }

    #[test]
    fn message_without_markers_gets_greeting_and_no_data_line() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        let result = pipeline
            .handle_message("dr1", "Patient P1 feels better today", None)
            .unwrap();

        assert!(result.diagnostic_result.is_none());
        assert!(result.record_updated.is_none());
        assert_eq!(
            result.response_text,
            format!(
                "Hello Dr. dr1. Session: {}.\n{}",
                result.session_id, NO_CLINICAL_DATA_LINE
            )
        );
        assert!(!tmp.path().join("records").exists());
    }

    #[test]
    fn diagnosis_without_patient_is_not_recorded() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        let result = pipeline.handle_message("dr1", "temp:37.0", None).unwrap();

        let diagnosis = result.diagnostic_result.unwrap();
        assert!(!diagnosis.critical);
        assert_eq!(diagnosis.suggestions, vec![NORMAL_RANGE_SUGGESTION.to_string()]);
        assert!(result.record_updated.is_none());
        assert!(!result.response_text.contains("CRITICAL"));
        assert!(!tmp.path().join("records").exists());
    }

    #[test]
    fn prose_resembling_a_marker_does_not_create_a_record() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        let result = pipeline
            .handle_message("dr1", "New patient identified with fever, temp 39.5", None)
            .unwrap();

        assert!(result.diagnostic_result.unwrap().critical);
        assert!(result.record_updated.is_none());
        assert!(!result.response_text.contains("Patient record"));
        assert!(!tmp.path().join("records").exists());
    }

    #[test]
    fn valid_session_is_reused() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        let first = pipeline.handle_message("dr1", "hello", None).unwrap();
        let second = pipeline
            .handle_message("dr1", "again", Some(&first.session_id))
            .unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[test]
    fn invalid_or_expired_session_gets_a_new_one() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);
        let t0 = Utc::now();

        let bogus = pipeline
            .handle_message_at("dr1", "hello", Some("bogus"), t0)
            .unwrap();
        assert_ne!(bogus.session_id, "bogus");

        let later = t0 + Duration::hours(1) + Duration::seconds(1);
        let renewed = pipeline
            .handle_message_at("dr1", "hello", Some(&bogus.session_id), later)
            .unwrap();
        assert_ne!(renewed.session_id, bogus.session_id);
    }

    #[test]
    fn session_of_another_doctor_is_not_reused() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        let theirs = pipeline.handle_message("dr1", "hello", None).unwrap();
        let mine = pipeline
            .handle_message("dr2", "hello", Some(&theirs.session_id))
            .unwrap();
        assert_ne!(mine.session_id, theirs.session_id);
    }

    #[test]
    fn audit_trail_has_receipt_then_encryption_without_plaintext() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);
        let message = "temp:39.5 patientid:P42 secret words";

        let result = pipeline.handle_message("dr1", message, None).unwrap();

        let entries = pipeline.activity().entries(&doctor("dr1")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ActivityAction::MessageReceived);
        assert_eq!(entries[0].details["session_id"], result.session_id);
        assert_eq!(
            entries[0].details["message_chars"],
            message.chars().count().to_string()
        );
        assert_eq!(entries[0].details["session"], "created");
        assert!(entries[0].details.values().all(|v| !v.contains("secret")));

        assert_eq!(entries[1].action, ActivityAction::MessageEncrypted);
        assert_eq!(
            entries[1].details["encrypted_message"],
            result.encrypted_message
        );
    }

    #[test]
    fn invalid_doctor_id_is_rejected_before_side_effects() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        let err = pipeline
            .handle_message("../etc", "temp:40 patientid:P1", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(pipeline.sessions().is_empty());
        assert!(!tmp.path().join("activity").exists());
        assert!(!tmp.path().join("records").exists());
    }

    #[test]
    fn persistence_failure_aborts_and_keeps_committed_effects() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);

        // First commit on this thread is the receipt log.
        force_commit_error_for_current_thread_once();
        let err = pipeline
            .handle_message("dr1", "temp:40 patientid:P1", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);

        // The session was created before the failure and survives it.
        assert_eq!(pipeline.sessions().len(), 1);
        assert!(pipeline.activity().entries(&doctor("dr1")).unwrap().is_empty());
        assert!(pipeline.records().get_records(&patient("P1")).unwrap().is_empty());
    }

    #[test]
    fn concurrent_messages_for_one_patient_all_land() {
        let tmp = TempDir::new().unwrap();
        let pipeline = Arc::new(pipeline(&tmp));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                std::thread::spawn(move || {
                    pipeline
                        .handle_message(&format!("dr{}", i % 2), "temp:39.9 pid:P5", None)
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pipeline.records().get_records(&patient("P5")).unwrap().len(), 6);
        assert_eq!(pipeline.activity().entries(&doctor("dr0")).unwrap().len(), 6);
        assert_eq!(pipeline.activity().entries(&doctor("dr1")).unwrap().len(), 6);
    }
}
