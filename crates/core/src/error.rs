use serde::Serialize;

/// Failures of the message cipher.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed: wrong key or tampered ciphertext")]
    IntegrityCheckFailed,
    #[error("encrypted message is not valid base64: {0}")]
    InvalidEncoding(base64::DecodeError),
    #[error("encrypted message is too short ({0} bytes)")]
    Truncated(usize),
    #[error("decrypted message is not valid UTF-8")]
    InvalidUtf8,
    #[error("key derivation requires at least {min} iterations, got {got}")]
    WeakWorkFactor { min: u32, got: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] triage_types::TextError),
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session has expired")]
    SessionExpired,
    #[error("session not found")]
    SessionNotFound,
    #[error("session belongs to a different doctor")]
    SessionDoctorMismatch,

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error(
        "append failed and rollback also failed (path: {path}): append={append_error}; rollback={rollback_error}",
        path = path.display()
    )]
    RollbackFailed {
        path: std::path::PathBuf,
        #[source]
        append_error: Box<TriageError>,
        rollback_error: std::io::Error,
    },
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type TriageResult<T> = std::result::Result<T, TriageError>;

/// Coarse classification of a [`TriageError`], surfaced to callers alongside the message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    SessionExpired,
    Persistence,
    Crypto,
    Configuration,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::SessionExpired => "session_expired",
            Self::Persistence => "persistence",
            Self::Crypto => "crypto",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TriageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidIdentifier(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::SessionExpired | Self::SessionNotFound | Self::SessionDoctorMismatch => {
                ErrorKind::SessionExpired
            }
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::StorageDirCreation(_)
            | Self::FileWrite(_)
            | Self::FileRead(_)
            | Self::RollbackFailed { .. }
            | Self::YamlSerialization(_)
            | Self::YamlDeserialization(_)
            | Self::GitInit(_)
            | Self::GitOpen(_)
            | Self::GitIndex(_)
            | Self::GitAdd(_)
            | Self::GitWriteTree(_)
            | Self::GitFindTree(_)
            | Self::GitSignature(_)
            | Self::GitCommit(_)
            | Self::GitHead(_)
            | Self::GitSetHead(_)
            | Self::GitPeel(_) => ErrorKind::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_the_taxonomy() {
        assert_eq!(
            TriageError::InvalidInput("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(TriageError::SessionExpired.kind(), ErrorKind::SessionExpired);
        assert_eq!(
            TriageError::FileWrite(std::io::Error::other("disk full")).kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            TriageError::from(CryptoError::IntegrityCheckFailed).kind(),
            ErrorKind::Crypto
        );
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SessionExpired).unwrap();
        assert_eq!(json, "\"session_expired\"");
    }
}
