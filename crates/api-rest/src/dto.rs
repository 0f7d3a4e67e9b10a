//! Request and response bodies of the REST API.
//!
//! These mirror the core types in a flat, JSON-friendly shape and carry the OpenAPI schemas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use triage_core::{ActivityEntry, DiagnosticResult, PatientRecordEntry, PipelineResult};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// One of `validation`, `session_expired`, `persistence`, `crypto`, `configuration`.
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendMessageReq {
    pub doctor_id: String,
    pub message: String,
    /// Session token from a previous response; omitted or stale tokens start a new session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiagnosisDto {
    pub critical: bool,
    pub suggestions: Vec<String>,
    pub temperature: Option<f64>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub symptoms: Vec<String>,
}

impl From<&DiagnosticResult> for DiagnosisDto {
    fn from(result: &DiagnosticResult) -> Self {
        let source = &result.source;
        Self {
            critical: result.critical,
            suggestions: result.suggestions.clone(),
            temperature: source.temperature,
            systolic: source.blood_pressure.map(|bp| bp.systolic),
            diastolic: source.blood_pressure.map(|bp| bp.diastolic),
            symptoms: source.symptoms.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendMessageRes {
    pub response_text: String,
    pub session_id: String,
    pub diagnostic_result: Option<DiagnosisDto>,
    pub encrypted_message: String,
    pub record_updated: Option<String>,
}

impl From<PipelineResult> for SendMessageRes {
    fn from(result: PipelineResult) -> Self {
        Self {
            diagnostic_result: result.diagnostic_result.as_ref().map(DiagnosisDto::from),
            record_updated: result.record_updated.map(|p| p.to_string()),
            response_text: result.response_text,
            session_id: result.session_id,
            encrypted_message: result.encrypted_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordDto {
    /// RFC 3339 timestamp.
    pub recorded_at: String,
    pub diagnosis: DiagnosisDto,
}

impl From<&PatientRecordEntry> for RecordDto {
    fn from(entry: &PatientRecordEntry) -> Self {
        Self {
            recorded_at: entry.recorded_at.to_rfc3339(),
            diagnosis: DiagnosisDto::from(&entry.diagnosis),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordsRes {
    pub patient_id: String,
    pub records: Vec<RecordDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityDto {
    pub action: String,
    pub details: BTreeMap<String, String>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl From<&ActivityEntry> for ActivityDto {
    fn from(entry: &ActivityEntry) -> Self {
        Self {
            action: entry.action.to_string(),
            details: entry.details.clone(),
            timestamp: entry.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityRes {
    pub doctor_id: String,
    pub entries: Vec<ActivityDto>,
}
