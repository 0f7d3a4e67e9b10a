//! Constants used throughout the triage core crate.
//!
//! Path names, filenames and cryptographic parameters live here so that the on-disk layout and
//! the key schedule are defined in exactly one place.

/// Directory name for per-patient clinical histories.
pub const RECORDS_DIR_NAME: &str = "records";

/// Directory name for per-doctor audit trails.
pub const ACTIVITY_DIR_NAME: &str = "activity";

/// Default data directory when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "triage_data";

/// Filename of a patient's clinical history inside its repository.
pub const HISTORY_FILENAME: &str = "history.yaml";

/// Filename of a doctor's audit trail inside its repository.
pub const ACTIVITY_FILENAME: &str = "activity.yaml";

/// Default session lifetime in seconds (one hour).
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3600;

/// PBKDF2-HMAC-SHA256 iteration count for the message key.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Lower bound enforced on any configured iteration count.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed key-derivation salt. Changing it invalidates every stored encrypted blob.
pub const KEY_DERIVATION_SALT: &[u8] = b"triage-core/message-cipher/v1";

/// Minimum accepted passphrase length, in characters.
pub const MIN_PASSPHRASE_LEN: usize = 12;

/// Git identity used for commits on record and audit repositories.
pub const COMMITTER_NAME: &str = "triage-core";

/// Email paired with [`COMMITTER_NAME`].
pub const COMMITTER_EMAIL: &str = "triage-core@localhost";
