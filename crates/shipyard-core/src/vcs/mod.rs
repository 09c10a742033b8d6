//! Version-control collaborator: ref lookup and source archives.

mod git;

use std::path::Path;

pub use git::GitRepository;

/// What the lifecycle core needs from version control.
pub trait Vcs: Send + Sync {
    /// Resolve a branch, tag, abbreviated id or `HEAD` to a full revision id.
    fn resolve_ref(&self, reference: &str) -> anyhow::Result<String>;

    /// Name of the checked-out branch, if HEAD is not detached.
    fn current_branch(&self) -> anyhow::Result<Option<String>>;

    /// Write a tar archive of `revision` to the local file `dest`.
    fn archive(&self, revision: &str, dest: &Path) -> anyhow::Result<()>;
}
