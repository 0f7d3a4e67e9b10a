//! Append-only versioned files backed by per-history Git repositories.
//!
//! Every patient history and every doctor audit trail lives in its own directory, which is a
//! local Git repository (`git2`/libgit2). Each append writes one YAML document to the end of the
//! history file and records it as exactly one commit, so the full sequence of writes is
//! preserved and any out-of-band edit shows up in `git log`/`git diff`.
//!
//! ## Failure semantics
//!
//! An append either fully succeeds (file written and committed) or leaves the history as it
//! was:
//!
//! - an existing file is restored to its previous content
//! - a file created by the failed append is removed
//! - a repository initialised by the failed append is removed entirely
//!
//! If the rollback itself fails, [`TriageError::RollbackFailed`] carries both errors.
//!
//! ## Commit messages
//!
//! Subjects follow `<domain>:<action>: <summary>`. Commit messages are labels only: they never
//! contain patient or doctor identifiers, clinical values or message text.

use crate::constants::{COMMITTER_EMAIL, COMMITTER_NAME};
use crate::error::{TriageError, TriageResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path};
use triage_types::NonEmptyText;

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::{LazyLock, Mutex};

const MAIN_REF: &str = "refs/heads/main";

/// YAML document separator written before every appended entry.
const DOCUMENT_SEPARATOR: &str = "---\n";

/// The store a commit belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CommitDomain {
    /// Patient clinical histories.
    Records,
    /// Doctor audit trails.
    Activity,
}

impl CommitDomain {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for CommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a commit did to the history.
///
/// Histories are append-only, so there is no update or delete action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CommitAction {
    /// First entry of a new history.
    Create,
    /// Entry appended to an existing history.
    Append,
}

impl CommitAction {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Append => "append",
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, single-line commit message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitMessage {
    domain: CommitDomain,
    action: CommitAction,
    summary: NonEmptyText,
}

impl CommitMessage {
    /// # Errors
    ///
    /// Returns `TriageError::InvalidInput` if `summary` is empty or spans several lines.
    pub(crate) fn new(
        domain: CommitDomain,
        action: CommitAction,
        summary: impl AsRef<str>,
    ) -> TriageResult<Self> {
        let summary_str = summary.as_ref().trim();
        if summary_str.contains(['\n', '\r']) {
            return Err(TriageError::InvalidInput(
                "commit summary must be single-line".into(),
            ));
        }
        let summary = NonEmptyText::new(summary_str)
            .map_err(|_| TriageError::InvalidInput("commit summary must be non-empty".into()))?;

        Ok(Self {
            domain,
            action,
            summary,
        })
    }

    pub(crate) fn render(&self) -> String {
        format!("{}:{}: {}", self.domain, self.action, self.summary.as_str())
    }
}

/// Git operations on one history repository rooted at `workdir`.
pub(crate) struct VersionedFileService {
    repo: git2::Repository,
}

impl VersionedFileService {
    /// Initialise a new repository at `workdir`.
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::GitInit`] if libgit2 cannot create the repository or it has no
    /// working directory.
    pub(crate) fn init(workdir: &Path) -> TriageResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(TriageError::GitInit)?;
        if repo.workdir().is_none() {
            return Err(TriageError::GitInit(git2::Error::from_str(
                "repository has no working directory",
            )));
        }
        Ok(Self { repo })
    }

    /// Open the repository at exactly `workdir` (parent directories are never searched).
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::GitOpen`] if no repository exists there or it cannot be opened.
    pub(crate) fn open(workdir: &Path) -> TriageResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(TriageError::GitOpen)?;
        if repo.workdir().is_none() {
            return Err(TriageError::GitOpen(git2::Error::from_str(
                "repository has no working directory",
            )));
        }
        Ok(Self { repo })
    }

    fn ensure_main_head(&self) -> TriageResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(TriageError::GitSetHead)?;
        Ok(())
    }

    /// Commit the given workdir-relative paths.
    ///
    /// Paths containing `..` are rejected.
    pub(crate) fn commit_paths(
        &self,
        message: &CommitMessage,
        relative_paths: &[&Path],
    ) -> TriageResult<git2::Oid> {
        #[cfg(test)]
        {
            if force_commit_error_for_current_thread() {
                return Err(TriageError::GitCommit(git2::Error::from_str(
                    "forced commit failure (test hook)",
                )));
            }
        }

        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(TriageError::GitIndex)?;

        for path in relative_paths {
            if path.is_absolute()
                || path
                    .components()
                    .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(TriageError::InvalidInput(
                    "path must be relative to the repository and must not contain '..'".into(),
                ));
            }
            index.add_path(path).map_err(TriageError::GitAdd)?;
        }
        index.write().map_err(TriageError::GitIndex)?;

        let tree_id = index.write_tree().map_err(TriageError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(TriageError::GitFindTree)?;

        let sig = git2::Signature::now(COMMITTER_NAME, COMMITTER_EMAIL)
            .map_err(TriageError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(
                Some("HEAD"),
                &sig,
                &sig,
                &message.render(),
                &tree,
                &parent_refs,
            )
            .map_err(TriageError::GitCommit)
    }

    /// Parent list for the next commit: the current `HEAD`, or none in an empty repository.
    fn resolve_head_parents(&self) -> TriageResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(TriageError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(TriageError::GitHead(e)),
        }
    }

    /// Number of commits reachable from `HEAD`.
    #[cfg(test)]
    pub(crate) fn commit_count(&self) -> usize {
        let Ok(mut walk) = self.repo.revwalk() else {
            return 0;
        };
        if walk.push_head().is_err() {
            return 0;
        }
        walk.count()
    }

    #[cfg(test)]
    pub(crate) fn head_message(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        let commit = head.peel_to_commit().ok()?;
        commit.message().map(str::to_owned)
    }
}

/// Append `entry` as a new YAML document to `file_name` inside the history at `repo_dir`, and
/// commit it.
///
/// The repository is created on first use. The caller must hold the history's lock.
///
/// # Errors
///
/// - `TriageError::YamlSerialization` if the entry cannot be serialised
/// - `TriageError::StorageDirCreation` if the history directory cannot be created
/// - `TriageError::FileRead`/`FileWrite` on I/O failure
/// - any Git error from opening or committing
/// - `TriageError::RollbackFailed` if the append failed and the history could not be restored
pub(crate) fn append_document<T: Serialize>(
    repo_dir: &Path,
    file_name: &str,
    entry: &T,
    domain: CommitDomain,
) -> TriageResult<()> {
    let document = serde_yaml::to_string(entry).map_err(TriageError::YamlSerialization)?;
    let relative_path = Path::new(file_name);
    let file_path = repo_dir.join(relative_path);

    let creating_repo = !repo_dir.join(".git").exists();
    // `None`: nothing written yet. `Some(old)`: file written, `old` is the prior content.
    let mut previous: Option<Option<String>> = None;

    let result: TriageResult<()> = (|| {
        let service = if creating_repo {
            fs::create_dir_all(repo_dir).map_err(TriageError::StorageDirCreation)?;
            VersionedFileService::init(repo_dir)?
        } else {
            VersionedFileService::open(repo_dir)?
        };

        let old_content = match fs::read_to_string(&file_path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(TriageError::FileRead(e)),
        };

        let action = if old_content.is_some() {
            CommitAction::Append
        } else {
            CommitAction::Create
        };

        let mut content = old_content.clone().unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(DOCUMENT_SEPARATOR);
        content.push_str(&document);

        previous = Some(old_content);
        fs::write(&file_path, content).map_err(TriageError::FileWrite)?;

        let summary = match (domain, action) {
            (CommitDomain::Records, CommitAction::Create) => "Created clinical history",
            (CommitDomain::Records, CommitAction::Append) => "Appended clinical entry",
            (CommitDomain::Activity, CommitAction::Create) => "Created audit trail",
            (CommitDomain::Activity, CommitAction::Append) => "Appended audit entry",
        };
        let message = CommitMessage::new(domain, action, summary)?;
        service.commit_paths(&message, &[relative_path])?;
        Ok(())
    })();

    let Err(append_error) = result else {
        return Ok(());
    };

    let rollback = if creating_repo {
        cleanup_repo_dir(repo_dir)
    } else {
        match previous {
            Some(Some(old)) => fs::write(&file_path, old),
            Some(None) => remove_if_exists(&file_path),
            None => Ok(()),
        }
    };

    match rollback {
        Ok(()) => Err(append_error),
        Err(rollback_error) => Err(TriageError::RollbackFailed {
            path: repo_dir.to_path_buf(),
            append_error: Box::new(append_error),
            rollback_error,
        }),
    }
}

/// Read every YAML document of `file_name` in the history at `repo_dir`, in append order.
///
/// A history that does not exist yet reads as empty.
pub(crate) fn read_documents<T: DeserializeOwned>(
    repo_dir: &Path,
    file_name: &str,
) -> TriageResult<Vec<T>> {
    let content = match fs::read_to_string(repo_dir.join(file_name)) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TriageError::FileRead(e)),
    };

    serde_yaml::Deserializer::from_str(&content)
        .map(|document| T::deserialize(document).map_err(TriageError::YamlDeserialization))
        .collect()
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
static FORCE_COMMIT_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

#[cfg(test)]
static FORCE_CLEANUP_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Make the next commit on the current thread fail.
#[cfg(test)]
pub(crate) fn force_commit_error_for_current_thread_once() {
    FORCE_COMMIT_ERROR_FOR_THREADS
        .lock()
        .expect("FORCE_COMMIT_ERROR_FOR_THREADS mutex poisoned")
        .insert(std::thread::current().id());
}

#[cfg(test)]
fn force_commit_error_for_current_thread() -> bool {
    FORCE_COMMIT_ERROR_FOR_THREADS
        .lock()
        .expect("FORCE_COMMIT_ERROR_FOR_THREADS mutex poisoned")
        .remove(&std::thread::current().id())
}

fn cleanup_repo_dir(repo_dir: &Path) -> io::Result<()> {
    #[cfg(test)]
    {
        let current_id = std::thread::current().id();
        let mut guard = FORCE_CLEANUP_ERROR_FOR_THREADS
            .lock()
            .expect("FORCE_CLEANUP_ERROR_FOR_THREADS mutex poisoned");

        if guard.remove(&current_id) {
            return Err(io::Error::other("forced cleanup failure (test hook)"));
        }
    }

    fs::remove_dir_all(repo_dir)
}
