//! Filesystem layout of one project root.
//!
//! ```text
//! project_root/
//!   <stamp>/            one per instance
//!     backup/           database snapshots
//!     source/           fetched revision content
//!     env/              runtime environment
//!     media -> project_root/media
//!   current  -> project_root/<stamp>
//!   previous -> project_root/<stamp>
//!   log/fabric.log
//! ```

use std::path::{Path, PathBuf};

use crate::stamp::Stamp;

pub const CURRENT_POINTER: &str = "current";
pub const PREVIOUS_POINTER: &str = "previous";
pub const LOG_DIR: &str = "log";
pub const AUDIT_LOG_FILE: &str = "fabric.log";
pub const MEDIA_DIR: &str = "media";
pub const LOCK_DIR: &str = ".shipyard.lock";

pub const PRE_DEPLOY_SNAPSHOT: &str = "db_backup_start.sql";
pub const POST_DEPLOY_SNAPSHOT: &str = "db_backup_end.sql";

/// Names in the project root that are never instance directories.
const RESERVED: &[&str] = &[
    CURRENT_POINTER,
    PREVIOUS_POINTER,
    LOG_DIR,
    MEDIA_DIR,
    "cache",
    "scripts",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_pointer(&self) -> PathBuf {
        self.root.join(CURRENT_POINTER)
    }

    pub fn previous_pointer(&self) -> PathBuf {
        self.root.join(PREVIOUS_POINTER)
    }

    /// Scratch name for a pointer being prepared before it is renamed into
    /// place. Dot-prefixed so it is never mistaken for an instance.
    pub fn staged_pointer(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{}.next", name))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    pub fn audit_log(&self) -> PathBuf {
        self.log_dir().join(AUDIT_LOG_FILE)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.root.join(LOCK_DIR)
    }

    /// A file shared by all instances, kept directly in the project root.
    pub fn shared_file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn instance(&self, stamp: &Stamp) -> InstancePaths {
        InstancePaths::new(self.root.join(stamp.as_str()))
    }

    /// Whether a directory name in the root may be an instance.
    pub fn is_instance_name(name: &str) -> bool {
        !RESERVED.contains(&name) && Stamp::is_valid(name)
    }

    /// Stamp of the instance a pointer target refers to.
    pub fn stamp_from_target(target: &Path) -> Option<Stamp> {
        let name = target.file_name()?.to_str()?;
        Stamp::new(name).ok()
    }
}

/// Paths inside one instance directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    pub root: PathBuf,
    pub backup: PathBuf,
    pub source: PathBuf,
    pub env: PathBuf,
    pub media_link: PathBuf,
}

impl InstancePaths {
    fn new(root: PathBuf) -> Self {
        Self {
            backup: root.join("backup"),
            source: root.join("source"),
            env: root.join("env"),
            media_link: root.join(MEDIA_DIR),
            root,
        }
    }

    /// Subfolders created with the instance, in creation order.
    pub fn subfolders(&self) -> [&Path; 3] {
        [&self.backup, &self.source, &self.env]
    }

    pub fn pre_deploy_snapshot(&self) -> PathBuf {
        self.backup.join(PRE_DEPLOY_SNAPSHOT)
    }

    pub fn post_deploy_snapshot(&self) -> PathBuf {
        self.backup.join(POST_DEPLOY_SNAPSHOT)
    }
}
