//! Git-backed [`Vcs`].

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use git2::Repository;

use super::Vcs;

/// A local git checkout of the project being deployed.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> anyhow::Result<Repository> {
        Repository::open(&self.path)
            .with_context(|| format!("Failed to open git repository: {}", self.path.display()))
    }
}

impl Vcs for GitRepository {
    fn resolve_ref(&self, reference: &str) -> anyhow::Result<String> {
        let repo = self.open()?;
        let obj = repo
            .revparse_single(reference)
            .with_context(|| format!("Unknown git reference: {}", reference))?;
        let commit = obj
            .peel_to_commit()
            .with_context(|| format!("Reference does not point at a commit: {}", reference))?;
        Ok(commit.id().to_string())
    }

    fn current_branch(&self) -> anyhow::Result<Option<String>> {
        let repo = self.open()?;
        if repo.head_detached()? {
            return Ok(None);
        }
        let head = repo.head().context("Failed to read HEAD")?;
        Ok(head.shorthand().map(str::to_string))
    }

    fn archive(&self, revision: &str, dest: &Path) -> anyhow::Result<()> {
        let dest_str = dest
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid archive path: {}", dest.display()))?;
        let output = Command::new("git")
            .args(["archive", "--format=tar", "--output", dest_str, revision])
            .current_dir(&self.path)
            .output()
            .with_context(|| format!("Failed to run git archive for {}", revision))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git archive {} failed: {}", revision, stderr.trim());
        }
        Ok(())
    }
}
