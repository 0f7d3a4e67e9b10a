//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. The
//! `*_from_env_value` helpers take the raw value of an environment variable as an `Option` so
//! that the binaries own the actual `std::env` reads and request handling never touches the
//! process environment.

use crate::constants::{
    ACTIVITY_DIR_NAME, DEFAULT_DATA_DIR, DEFAULT_SESSION_TIMEOUT_SECS, MIN_PASSPHRASE_LEN,
    RECORDS_DIR_NAME,
};
use crate::{TriageError, TriageResult};
use chrono::Duration;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    session_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `TriageError::Configuration` if `session_timeout` is not strictly positive.
    pub fn new(data_dir: PathBuf, session_timeout: Duration) -> TriageResult<Self> {
        if session_timeout <= Duration::zero() {
            return Err(TriageError::Configuration(
                "session timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            session_timeout,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join(RECORDS_DIR_NAME)
    }

    pub fn activity_dir(&self) -> PathBuf {
        self.data_dir.join(ACTIVITY_DIR_NAME)
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }
}

/// Passphrase the message key is derived from.
///
/// Zeroed on drop and redacted from `Debug` output.
#[derive(Clone)]
pub struct EncryptionPassphrase(Zeroizing<String>);

impl EncryptionPassphrase {
    /// Wrap a passphrase, rejecting values shorter than [`MIN_PASSPHRASE_LEN`].
    pub fn new(value: impl Into<String>) -> TriageResult<Self> {
        let value = Zeroizing::new(value.into());
        if value.trim().chars().count() < MIN_PASSPHRASE_LEN {
            return Err(TriageError::Configuration(format!(
                "encryption passphrase must be at least {} characters",
                MIN_PASSPHRASE_LEN
            )));
        }
        Ok(Self(value))
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for EncryptionPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionPassphrase(<redacted>)")
    }
}

/// Resolve the data directory, falling back to [`DEFAULT_DATA_DIR`].
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Parse the session timeout (whole seconds).
///
/// If `value` is `None` or empty/whitespace, returns one hour.
pub fn session_timeout_from_env_value(value: Option<String>) -> TriageResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let secs = match value {
        Some(v) => v.parse::<i64>().map_err(|_| {
            TriageError::Configuration(format!("session timeout is not a whole number: '{}'", v))
        })?,
        None => DEFAULT_SESSION_TIMEOUT_SECS,
    };

    if secs <= 0 {
        return Err(TriageError::Configuration(
            "session timeout must be greater than zero".into(),
        ));
    }

    Ok(Duration::seconds(secs))
}

/// Resolve the encryption passphrase. There is no default: a missing passphrase is an error
/// and the process must refuse to start.
pub fn passphrase_from_env_value(value: Option<String>) -> TriageResult<EncryptionPassphrase> {
    match value {
        Some(v) if !v.trim().is_empty() => EncryptionPassphrase::new(v),
        _ => Err(TriageError::Configuration(
            "TRIAGE_ENCRYPTION_PASSPHRASE is not set; refusing to start without an encryption key"
                .into(),
        )),
    }
}

/// Resolve an optional rule-table file path.
pub fn rules_file_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
