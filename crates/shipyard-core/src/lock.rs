//! Exclusive lock serializing deploys and rollbacks on one project root.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::ProjectLayout;
use crate::remote::{Executor, RemoteError};

/// Held while the pointer pair and instance set may change.
///
/// Backed by a directory created with an exclusive `mkdir`. Released on drop;
/// a process killed mid-deploy leaves it behind, see [`DeployLock::break_stale`].
pub struct DeployLock {
    executor: Arc<dyn Executor>,
    path: PathBuf,
}

impl DeployLock {
    pub fn acquire(executor: Arc<dyn Executor>, layout: &ProjectLayout) -> Result<Self> {
        let path = layout.lock_dir();
        match executor.create_dir(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "acquired deploy lock");
                Ok(Self { executor, path })
            }
            Err(RemoteError::AlreadyExists(_)) => Err(Error::Locked(path)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn is_held(executor: &dyn Executor, layout: &ProjectLayout) -> Result<bool> {
        Ok(executor.exists(&layout.lock_dir())?)
    }

    /// Remove a lock left behind by an interrupted run. Returns whether one
    /// was present.
    pub fn break_stale(executor: &dyn Executor, layout: &ProjectLayout) -> Result<bool> {
        let path = layout.lock_dir();
        if !executor.exists(&path)? {
            return Ok(false);
        }
        executor.remove(&path)?;
        tracing::warn!(path = %path.display(), "removed deploy lock");
        Ok(true)
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if let Err(err) = self.executor.remove(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release deploy lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalExecutor;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let temp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(temp.path());
        let executor: Arc<dyn Executor> = Arc::new(LocalExecutor::new());

        let lock = DeployLock::acquire(executor.clone(), &layout).unwrap();
        assert!(DeployLock::is_held(executor.as_ref(), &layout).unwrap());
        assert!(matches!(
            DeployLock::acquire(executor.clone(), &layout),
            Err(Error::Locked(_))
        ));

        drop(lock);
        assert!(!DeployLock::is_held(executor.as_ref(), &layout).unwrap());
        assert!(DeployLock::acquire(executor, &layout).is_ok());
    }

    #[test]
    fn break_stale_reports_presence() {
        let temp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(temp.path());
        let executor = LocalExecutor::new();

        assert!(!DeployLock::break_stale(&executor, &layout).unwrap());
        std::fs::create_dir(layout.lock_dir()).unwrap();
        assert!(DeployLock::break_stale(&executor, &layout).unwrap());
        assert!(!layout.lock_dir().exists());
    }
}
