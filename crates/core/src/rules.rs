//! Threshold-based triage rules.
//!
//! A [`RuleEngine`] holds an ordered table of [`TriageRule`]s. Each rule is evaluated on its own
//! against the extracted [`ClinicalData`]; every rule that fires contributes its suggestion, in
//! table order. Rules only compare measurements that are present: an absent reading never fires
//! a rule.
//!
//! The built-in table flags fever and hypertensive crisis. An alternative table can be loaded
//! from YAML:
//!
//! ```yaml
//! - name: fever
//!   any_above:
//!     - { measurement: temperature, above: 39.0 }
//!   suggestion: "Fever detected: consider antipyretics and monitor temperature."
//!   severity: critical
//! ```

use crate::error::{TriageError, TriageResult};
use crate::extraction::ClinicalData;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const FEVER_SUGGESTION: &str =
    "Fever detected: consider antipyretics and monitor temperature.";
pub const HYPERTENSION_SUGGESTION: &str =
    "Hypertensive crisis suspected: urgent blood pressure management required.";
pub const NORMAL_RANGE_SUGGESTION: &str = "Vital signs within normal range.";

/// A single measurement a threshold can compare.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Temperature,
    Systolic,
    Diastolic,
}

impl Measurement {
    fn read(self, data: &ClinicalData) -> Option<f64> {
        match self {
            Self::Temperature => data.temperature,
            Self::Systolic => data.blood_pressure.map(|bp| bp.systolic),
            Self::Diastolic => data.blood_pressure.map(|bp| bp.diastolic),
        }
    }
}

/// Strict upper bound on one measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub measurement: Measurement,
    pub above: f64,
}

impl Threshold {
    fn exceeded_by(&self, data: &ClinicalData) -> bool {
        self.measurement
            .read(data)
            .is_some_and(|value| value > self.above)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Advisory,
    Critical,
}

/// One row of the rule table: fires when any of its thresholds is exceeded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriageRule {
    pub name: String,
    pub any_above: Vec<Threshold>,
    pub suggestion: String,
    #[serde(default)]
    pub severity: Severity,
}

impl TriageRule {
    pub fn fires(&self, data: &ClinicalData) -> bool {
        self.any_above.iter().any(|t| t.exceeded_by(data))
    }
}

/// Outcome of evaluating a [`ClinicalData`] against the rule table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub critical: bool,
    pub suggestions: Vec<String>,
    pub source: ClinicalData,
}

/// Ordered, table-driven rule evaluation.
#[derive(Clone, Debug)]
pub struct RuleEngine {
    rules: Vec<TriageRule>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RuleEngine {
    pub fn new(rules: Vec<TriageRule>) -> Self {
        Self { rules }
    }

    /// Load a rule table from a YAML file.
    ///
    /// # Errors
    ///
    /// - `TriageError::Configuration` if the file cannot be read, does not parse, or a rule has
    ///   no thresholds or an empty suggestion
    pub fn from_yaml_file(path: &Path) -> TriageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TriageError::Configuration(format!(
                "cannot read rules file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> TriageResult<Self> {
        let rules: Vec<TriageRule> = serde_yaml::from_str(content)
            .map_err(|e| TriageError::Configuration(format!("invalid rules file: {}", e)))?;

        for rule in &rules {
            if rule.any_above.is_empty() {
                return Err(TriageError::Configuration(format!(
                    "rule '{}' has no thresholds",
                    rule.name
                )));
            }
            if rule.suggestion.trim().is_empty() {
                return Err(TriageError::Configuration(format!(
                    "rule '{}' has an empty suggestion",
                    rule.name
                )));
            }
        }

        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[TriageRule] {
        &self.rules
    }

    /// Evaluate every rule in order.
    ///
    /// If no rule fires the result carries the single normal-range suggestion and is not
    /// critical.
    pub fn evaluate(&self, data: &ClinicalData) -> DiagnosticResult {
        let fired: Vec<&TriageRule> = self.rules.iter().filter(|r| r.fires(data)).collect();

        let critical = fired.iter().any(|r| r.severity == Severity::Critical);
        let suggestions = if fired.is_empty() {
            vec![NORMAL_RANGE_SUGGESTION.to_string()]
        } else {
            fired.iter().map(|r| r.suggestion.clone()).collect()
        };

        DiagnosticResult {
            critical,
            suggestions,
            source: data.clone(),
        }
    }
}

/// Built-in table: fever, then hypertensive crisis.
pub fn default_rules() -> Vec<TriageRule> {
    vec![
        TriageRule {
            name: "fever".into(),
            any_above: vec![Threshold {
                measurement: Measurement::Temperature,
                above: 39.0,
            }],
            suggestion: FEVER_SUGGESTION.into(),
            severity: Severity::Critical,
        },
        TriageRule {
            name: "hypertensive_crisis".into(),
            any_above: vec![
                Threshold {
                    measurement: Measurement::Systolic,
                    above: 180.0,
                },
                Threshold {
                    measurement: Measurement::Diastolic,
                    above: 120.0,
                },
            ],
            suggestion: HYPERTENSION_SUGGESTION.into(),
            severity: Severity::Critical,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{extract_clinical_data, BloodPressure};

    fn with_temperature(t: f64) -> ClinicalData {
        ClinicalData {
            temperature: Some(t),
            ..ClinicalData::default()
        }
    }

    fn with_bp(systolic: f64, diastolic: f64) -> ClinicalData {
        ClinicalData {
            blood_pressure: Some(BloodPressure {
                systolic,
                diastolic,
            }),
            ..ClinicalData::default()
        }
    }

    #[test]
    fn fever_above_threshold_is_critical() {
        let result = RuleEngine::default().evaluate(&with_temperature(39.1));
        assert!(result.critical);
        assert_eq!(result.suggestions, vec![FEVER_SUGGESTION.to_string()]);
    }

    #[test]
    fn threshold_is_strict() {
        let result = RuleEngine::default().evaluate(&with_temperature(39.0));
        assert!(!result.critical);
        assert_eq!(result.suggestions, vec![NORMAL_RANGE_SUGGESTION.to_string()]);
    }

    #[test]
    fn either_blood_pressure_bound_fires_hypertension() {
        let engine = RuleEngine::default();
        assert!(engine.evaluate(&with_bp(181.0, 80.0)).critical);
        assert!(engine.evaluate(&with_bp(120.0, 121.0)).critical);
        assert!(!engine.evaluate(&with_bp(180.0, 120.0)).critical);
    }

    #[test]
    fn suggestions_keep_table_order() {
        let data = extract_clinical_data("temp:39.5 bp:185/90 patientid:P42");
        let result = RuleEngine::default().evaluate(&data);
        assert!(result.critical);
        assert_eq!(
            result.suggestions,
            vec![
                FEVER_SUGGESTION.to_string(),
                HYPERTENSION_SUGGESTION.to_string()
            ]
        );
        assert_eq!(result.source, data);
    }

    #[test]
    fn absent_measurements_never_fire() {
        let result = RuleEngine::default().evaluate(&ClinicalData::default());
        assert!(!result.critical);
        assert_eq!(result.suggestions.len(), 1);
    }

    #[test]
    fn advisory_rules_do_not_raise_criticality() {
        let engine = RuleEngine::from_yaml_str(
            r#"
- name: low_grade_fever
  any_above:
    - { measurement: temperature, above: 37.5 }
  suggestion: "Low-grade fever: recheck in four hours."
"#,
        )
        .unwrap();

        let result = engine.evaluate(&with_temperature(38.0));
        assert!(!result.critical);
        assert_eq!(
            result.suggestions,
            vec!["Low-grade fever: recheck in four hours.".to_string()]
        );
    }

    #[test]
    fn yaml_table_without_thresholds_is_rejected() {
        let err = RuleEngine::from_yaml_str(
            "- name: broken\n  any_above: []\n  suggestion: x\n  severity: critical\n",
        )
        .unwrap_err();
        assert!(matches!(err, TriageError::Configuration(_)));
    }

    #[test]
    fn yaml_file_round_trips_default_table() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rules.yaml");
        std::fs::write(&path, serde_yaml::to_string(&default_rules()).unwrap()).unwrap();

        let engine = RuleEngine::from_yaml_file(&path).unwrap();
        assert_eq!(engine.rules(), default_rules().as_slice());
    }

    #[test]
    fn missing_rules_file_is_configuration_error() {
        let err = RuleEngine::from_yaml_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, TriageError::Configuration(_)));
    }
}
