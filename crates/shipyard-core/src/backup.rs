//! Downloading database dumps and the shared media folder.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::audit::{AuditLog, Outcome};
use crate::deploy::Collaborators;
use crate::error::{Error, Result};
use crate::layout::MEDIA_DIR;
use crate::remote::quote_path;
use crate::stamp::Stamp;
use crate::store::InstanceStore;

pub const MEDIA_ARCHIVE: &str = "project_media.tar";

pub struct BackupManager {
    store: InstanceStore,
    collaborators: Collaborators,
    audit: AuditLog,
    database_name: String,
}

impl BackupManager {
    pub fn new(
        store: InstanceStore,
        collaborators: Collaborators,
        audit: AuditLog,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            collaborators,
            audit,
            database_name: database_name.into(),
        }
    }

    /// Dump the database through the active instance and download it to
    /// `local_dir` as `<database>_<yymmddHHMM>.sql`.
    pub fn dump_database(&self, local_dir: &Path) -> Result<PathBuf> {
        let active = self.store.current_stamp()?.ok_or(Error::NoActiveInstance)?;
        let file_name = format!(
            "{}_{}.sql",
            self.database_name,
            Local::now().format("%y%m%d%H%M")
        );
        let local = local_dir.join(&file_name);

        let result = self.dump_to(&active, &file_name, &local);
        self.audit
            .record("database", Outcome::from_success(result.is_ok()), Some(&active));
        result.map(|()| local)
    }

    fn dump_to(&self, active: &Stamp, file_name: &str, local: &Path) -> Result<()> {
        let executor = &self.collaborators.executor;
        let instance = self.store.layout().instance(active);
        let remote = instance.backup.join(file_name);

        tracing::info!(file = %remote.display(), "dumping database");
        self.collaborators
            .database
            .snapshot(&instance, &remote)
            .map_err(|source| Error::DatabaseOperationFailed {
                operation: "dump",
                source,
            })?;

        tracing::info!(to = %local.display(), "downloading database dump");
        let downloaded = executor.download(&remote, local);
        executor.remove(&remote)?;
        downloaded?;
        Ok(())
    }

    /// Tar the shared media folder on the host and download the archive to
    /// `local_dir`.
    pub fn archive_media(&self, local_dir: &Path) -> Result<PathBuf> {
        let local = local_dir.join(MEDIA_ARCHIVE);
        let current = self.store.current_stamp()?;

        let result = self.archive_to(&local);
        self.audit
            .record("media", Outcome::from_success(result.is_ok()), current.as_ref());
        result.map(|()| local)
    }

    fn archive_to(&self, local: &Path) -> Result<()> {
        let executor = &self.collaborators.executor;
        let root = self.store.layout().root();
        let remote = root.join(MEDIA_ARCHIVE);

        tracing::info!(archive = %remote.display(), "compressing media folder");
        executor.run_checked(&format!(
            "tar -cf {} -C {} {}",
            quote_path(&remote),
            quote_path(root),
            MEDIA_DIR
        ))?;

        tracing::info!(to = %local.display(), "downloading media archive");
        let downloaded = executor.download(&remote, local);
        executor.remove(&remote)?;
        downloaded?;
        Ok(())
    }
}
