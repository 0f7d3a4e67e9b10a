//! Free-text clinical extraction.
//!
//! Physician messages are scanned against a declarative pattern table: each entry names a
//! marker (with its locale synonyms), the [`ClinicalData`] field it fills and how the captured
//! text is parsed. Supported locales are English, French and Spanish.
//!
//! Extraction never fails. A marker that is not found, or whose value does not parse, leaves
//! the field absent; absent is never defaulted to zero.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use triage_types::PatientId;

/// Arterial blood pressure reading in mmHg.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

/// Symptom flags recognised in free text.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    Cough,
    Headache,
    Nausea,
    Dizziness,
    ChestPain,
    ShortnessOfBreath,
}

impl Symptom {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cough => "cough",
            Self::Headache => "headache",
            Self::Nausea => "nausea",
            Self::Dizziness => "dizziness",
            Self::ChestPain => "chest_pain",
            Self::ShortnessOfBreath => "shortness_of_breath",
        }
    }
}

impl fmt::Display for Symptom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured vitals and symptoms extracted from one message.
///
/// A field is present only if its marker was found in the text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub symptoms: BTreeSet<Symptom>,
}

impl ClinicalData {
    /// True when no field was extracted.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.blood_pressure.is_none() && self.symptoms.is_empty()
    }

    pub fn has_symptom(&self, symptom: Symptom) -> bool {
        self.symptoms.contains(&symptom)
    }
}

// ============================================================================
// PATTERN TABLE
// ============================================================================

/// Optional connective between a marker and its value (`temp: 39`, `temp=39`, `tension de 140/90`).
const VALUE_SEPARATOR: &str = r"\s*(?:[:=]|\bis\b|\bof\b|\bde\b)?\s*";

/// Synonyms introducing a temperature reading, longest first.
const TEMPERATURE_MARKERS: &[&str] = &[
    "temperature",
    "température",
    "temperatura",
    "temp",
];

/// Synonyms introducing a `systolic/diastolic` reading.
const BLOOD_PRESSURE_MARKERS: &[&str] = &[
    "blood pressure",
    "tension artérielle",
    "tension arterielle",
    "tension",
    "presión arterial",
    "presion arterial",
    "bp",
    "ta",
];

/// Synonyms introducing a patient identifier.
const PATIENT_ID_MARKERS: &[&str] = &[
    "patient id",
    "patient_id",
    "patient-id",
    "patientid",
    "id patient",
    "id paciente",
    "pid",
];

/// Symptom vocabulary: at least one synonym per locale (en, fr, es).
const SYMPTOM_VOCABULARY: &[(Symptom, &[&str])] = &[
    (Symptom::Cough, &["cough", "coughing", "toux", "tos"]),
    (
        Symptom::Headache,
        &[
            "headache",
            "migraine",
            "mal de tête",
            "mal de tete",
            "céphalée",
            "cephalee",
            "dolor de cabeza",
            "cefalea",
        ],
    ),
    (
        Symptom::Nausea,
        &["nausea", "nauseous", "nausée", "nausee", "náusea", "náuseas"],
    ),
    (
        Symptom::Dizziness,
        &["dizziness", "dizzy", "vertigo", "vertige", "étourdissement", "mareo"],
    ),
    (
        Symptom::ChestPain,
        &[
            "chest pain",
            "douleur thoracique",
            "dolor torácico",
            "dolor toracico",
        ],
    ),
    (
        Symptom::ShortnessOfBreath,
        &[
            "shortness of breath",
            "dyspnea",
            "dyspnoea",
            "dyspnée",
            "essoufflement",
            "disnea",
        ],
    ),
];

/// Build `(?:m1|m2|...)` from literal synonyms; interior spaces match any whitespace run.
fn alternation(markers: &[&str]) -> String {
    let parts: Vec<String> = markers
        .iter()
        .map(|m| {
            m.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    format!("(?:{})", parts.join("|"))
}

static TEMPERATURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{}\b{}(\d{{1,3}}(?:[.,]\d+)?)\b",
        alternation(TEMPERATURE_MARKERS),
        VALUE_SEPARATOR
    ))
    .unwrap()
});

static BLOOD_PRESSURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{}\b{}(\d{{2,3}})\s*/\s*(\d{{2,3}})\b",
        alternation(BLOOD_PRESSURE_MARKERS),
        VALUE_SEPARATOR
    ))
    .unwrap()
});

static PATIENT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{}\b\s*[:=#]?\s*([A-Za-z0-9]{{1,64}})\b",
        alternation(PATIENT_ID_MARKERS)
    ))
    .unwrap()
});

static SYMPTOM_PATTERNS: LazyLock<Vec<(Symptom, Regex)>> = LazyLock::new(|| {
    SYMPTOM_VOCABULARY
        .iter()
        .map(|(symptom, synonyms)| {
            let regex = Regex::new(&format!(r"(?i)\b{}\b", alternation(synonyms))).unwrap();
            (*symptom, regex)
        })
        .collect()
});

// ============================================================================
// EXTRACTION
// ============================================================================

/// Parse a decimal that may use `,` as the separator.
fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Extract vitals and symptom flags from free text.
///
/// The first occurrence of each measurement marker wins.
pub fn extract_clinical_data(text: &str) -> ClinicalData {
    let temperature = TEMPERATURE_PATTERN
        .captures(text)
        .and_then(|caps| parse_decimal(&caps[1]));

    let blood_pressure = BLOOD_PRESSURE_PATTERN.captures(text).and_then(|caps| {
        let systolic = parse_decimal(&caps[1])?;
        let diastolic = parse_decimal(&caps[2])?;
        Some(BloodPressure {
            systolic,
            diastolic,
        })
    });

    let symptoms = SYMPTOM_PATTERNS
        .iter()
        .filter(|(_, regex)| regex.is_match(text))
        .map(|(symptom, _)| *symptom)
        .collect();

    ClinicalData {
        temperature,
        blood_pressure,
        symptoms,
    }
}

/// Extract the patient identifier following a patient-id marker, if any.
pub fn extract_patient_id(text: &str) -> Option<PatientId> {
    PATIENT_ID_PATTERN
        .captures(text)
        .and_then(|caps| PatientId::parse(&caps[1]).ok())
}
