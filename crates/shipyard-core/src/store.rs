//! Instance directories and the `current` / `previous` pointer pair.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::layout::{InstancePaths, ProjectLayout};
use crate::remote::{Executor, RemoteError};
use crate::stamp::Stamp;

/// One instance directory found in the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEntry {
    pub stamp: Stamp,
    pub created: DateTime<Utc>,
}

/// Owns the layout of one project root.
///
/// The presence of an instance directory is the only record that a stamp
/// was deployed; the two pointers are the only record of which instance is
/// live.
#[derive(Clone)]
pub struct InstanceStore {
    executor: Arc<dyn Executor>,
    layout: ProjectLayout,
}

impl InstanceStore {
    pub fn new(executor: Arc<dyn Executor>, layout: ProjectLayout) -> Self {
        Self { executor, layout }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Create the instance directory and its subfolders.
    ///
    /// The instance directory is created with an exclusive `mkdir`, so of
    /// two concurrent calls for one stamp exactly one succeeds. Pointers are
    /// not touched.
    pub fn create_layout(&self, stamp: &Stamp) -> Result<InstancePaths> {
        let paths = self.layout.instance(stamp);
        match self.executor.create_dir(&paths.root) {
            Ok(()) => {}
            Err(RemoteError::AlreadyExists(_)) => return Err(Error::AlreadyDeployed(stamp.clone())),
            Err(err) => return Err(err.into()),
        }
        for folder in paths.subfolders() {
            self.executor.create_dir(folder)?;
        }
        Ok(paths)
    }

    pub fn instance_exists(&self, stamp: &Stamp) -> Result<bool> {
        Ok(self.executor.exists(&self.layout.instance(stamp).root)?)
    }

    /// Make `stamp` current and demote the old current to previous.
    ///
    /// Each pointer is prepared under a scratch name and renamed into place,
    /// so `current` is replaced atomically and never goes missing once it
    /// exists. `current` is switched first, then `previous`: an interrupted
    /// activation leaves the new current next to the older previous, and the
    /// two pointers never name the same instance.
    pub fn activate(&self, stamp: &Stamp) -> Result<()> {
        let instance = self.layout.instance(stamp);
        if !self.executor.exists(&instance.root)? {
            return Err(Error::NothingToActivate(stamp.clone()));
        }

        let current_ptr = self.layout.current_pointer();
        let previous_ptr = self.layout.previous_pointer();
        let old_current = self.executor.read_link(&current_ptr)?;

        if let Some(ref target) = old_current
            && ProjectLayout::stamp_from_target(target).as_ref() == Some(stamp)
        {
            tracing::debug!(%stamp, "instance already current");
            return Ok(());
        }

        let staged_current = self.layout.staged_pointer(crate::layout::CURRENT_POINTER);
        self.stage_pointer(&instance.root, &staged_current)?;
        let staged_previous = match old_current {
            Some(ref target) => {
                let staged = self.layout.staged_pointer(crate::layout::PREVIOUS_POINTER);
                self.stage_pointer(target, &staged)?;
                Some(staged)
            }
            None => None,
        };

        // previous may already name the instance being promoted
        if let Some(target) = self.executor.read_link(&previous_ptr)?
            && ProjectLayout::stamp_from_target(&target).as_ref() == Some(stamp)
        {
            self.executor.remove(&previous_ptr)?;
        }

        self.executor.rename(&staged_current, &current_ptr)?;
        match staged_previous {
            Some(staged) => self.executor.rename(&staged, &previous_ptr)?,
            None => self.executor.remove(&previous_ptr)?,
        }
        tracing::info!(%stamp, "activated instance");
        Ok(())
    }

    fn stage_pointer(&self, target: &Path, staged: &Path) -> Result<()> {
        self.executor.remove(staged)?;
        self.executor.symlink(target, staged)?;
        Ok(())
    }

    /// Point `current` back at the previous instance and clear `previous`.
    ///
    /// A single rename moves `previous` over `current`. Returns the stamp
    /// that was current; its directory is now orphaned and the caller is
    /// responsible for deleting it.
    pub fn rollback(&self) -> Result<Option<Stamp>> {
        let previous_ptr = self.layout.previous_pointer();
        if self.executor.read_link(&previous_ptr)?.is_none() {
            return Err(Error::NoPreviousInstance);
        }
        let orphaned = self.current_stamp()?;
        self.executor
            .rename(&previous_ptr, &self.layout.current_pointer())?;
        Ok(orphaned)
    }

    pub fn current_stamp(&self) -> Result<Option<Stamp>> {
        self.pointer_stamp(&self.layout.current_pointer())
    }

    pub fn previous_stamp(&self) -> Result<Option<Stamp>> {
        self.pointer_stamp(&self.layout.previous_pointer())
    }

    fn pointer_stamp(&self, pointer: &Path) -> Result<Option<Stamp>> {
        Ok(self
            .executor
            .read_link(pointer)?
            .and_then(|target| ProjectLayout::stamp_from_target(&target)))
    }

    /// Instance directories, oldest first.
    pub fn instances(&self) -> Result<Vec<InstanceEntry>> {
        let mut entries: Vec<InstanceEntry> = self
            .executor
            .list_dirs(self.layout.root())?
            .into_iter()
            .filter(|entry| ProjectLayout::is_instance_name(&entry.name))
            .filter_map(|entry| {
                Stamp::new(entry.name).ok().map(|stamp| InstanceEntry {
                    stamp,
                    created: entry.modified,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.stamp.cmp(&b.stamp)));
        Ok(entries)
    }

    /// Delete instances outside the retention window.
    ///
    /// The window is the `retain_recent` most recently created instances.
    /// The current and previous instances are read before anything is
    /// listed and are never deleted, whether or not they fall inside the
    /// window. Returns the deleted stamps, oldest first.
    pub fn prune(&self, retain_recent: usize) -> Result<Vec<Stamp>> {
        let protected = [self.current_stamp()?, self.previous_stamp()?];
        let instances = self.instances()?;
        let window_start = instances.len().saturating_sub(retain_recent);

        let mut removed = Vec::new();
        for entry in &instances[..window_start] {
            if protected.iter().flatten().any(|p| p == &entry.stamp) {
                continue;
            }
            self.executor.remove(&self.layout.instance(&entry.stamp).root)?;
            removed.push(entry.stamp.clone());
        }
        if !removed.is_empty() {
            tracing::info!(removed = ?removed, "removed obsolete instances");
        }
        Ok(removed)
    }

    pub fn remove_instance(&self, stamp: &Stamp) -> Result<()> {
        Ok(self.executor.remove(&self.layout.instance(stamp).root)?)
    }
}
