//! Validated text and identifier types shared across the triage workspace.
//!
//! Identifiers supplied by callers end up as directory names under the data directory, so they
//! are checked once at the boundary and carried as newtypes afterwards. Once a [`DoctorId`] or
//! [`PatientId`] exists, it is safe to join onto a filesystem path.

use std::fmt;

/// Maximum length of a doctor or patient identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input exceeded [`MAX_IDENTIFIER_LEN`]
    #[error("{kind} exceeds maximum length of {max} characters")]
    TooLong { kind: &'static str, max: usize },

    /// The input contained characters outside `[A-Za-z0-9._-]` or started with `.`
    #[error("{kind} contains invalid characters (only alphanumeric, '.', '-', '_' allowed)")]
    InvalidCharacters { kind: &'static str },
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Checks that `input` is usable as a single path component.
///
/// Accepts 1..=[`MAX_IDENTIFIER_LEN`] ASCII characters from `[A-Za-z0-9._-]`, not starting with
/// `.` (which rules out `.` and `..`).
fn validate_identifier(kind: &'static str, input: &str) -> Result<String, TextError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TextError::Empty);
    }

    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(TextError::TooLong {
            kind,
            max: MAX_IDENTIFIER_LEN,
        });
    }

    let ok = !trimmed.starts_with('.')
        && trimmed
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));

    if !ok {
        return Err(TextError::InvalidCharacters { kind });
    }

    Ok(trimmed.to_owned())
}

/// Identifier of the physician sending messages.
///
/// Keys the doctor's audit trail and is bound into every session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DoctorId(String);

impl DoctorId {
    /// Validates a caller-supplied doctor identifier.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        validate_identifier("doctor id", input.as_ref()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of the patient a clinical record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatientId(String);

impl PatientId {
    /// Validates a patient identifier (extracted from text or supplied by an operator).
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        validate_identifier("patient id", input.as_ref()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DoctorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DoctorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PatientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for DoctorId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DoctorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DoctorId::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for PatientId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PatientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PatientId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  hello  ").unwrap();
        assert_eq!(text.as_str(), "hello");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   \t"), Err(TextError::Empty));
    }

    #[test]
    fn doctor_id_accepts_safe_characters() {
        let id = DoctorId::parse("dr.house_01-b").unwrap();
        assert_eq!(id.as_str(), "dr.house_01-b");
    }

    #[test]
    fn doctor_id_rejects_path_traversal() {
        assert!(matches!(
            DoctorId::parse("../etc"),
            Err(TextError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            DoctorId::parse(".."),
            Err(TextError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            DoctorId::parse("a/b"),
            Err(TextError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn patient_id_rejects_overlong_input() {
        let long = "P".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(matches!(
            PatientId::parse(&long),
            Err(TextError::TooLong { .. })
        ));
        assert!(PatientId::parse("P".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn patient_id_rejects_non_ascii() {
        assert!(PatientId::parse("Pé42").is_err());
    }

    #[test]
    fn identifiers_deserialize_with_validation() {
        let ok: PatientId = serde_json::from_str("\"P42\"").unwrap();
        assert_eq!(ok.as_str(), "P42");

        let bad: Result<DoctorId, _> = serde_json::from_str("\"a b\"");
        assert!(bad.is_err());
    }
}
