//! Reverting the most recent activation.

use serde::Serialize;

use crate::audit::{AuditLog, Outcome};
use crate::deploy::Collaborators;
use crate::error::{Error, Result};
use crate::layout::InstancePaths;
use crate::lock::DeployLock;
use crate::stamp::Stamp;
use crate::store::InstanceStore;

const ROLLBACK_TASK: &str = "rollback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Instance that is current again.
    pub restored: Stamp,
    /// Instance that was current and has been deleted.
    pub removed: Stamp,
}

pub struct RollbackManager {
    store: InstanceStore,
    collaborators: Collaborators,
    audit: AuditLog,
}

impl RollbackManager {
    pub fn new(store: InstanceStore, collaborators: Collaborators, audit: AuditLog) -> Self {
        Self {
            store,
            collaborators,
            audit,
        }
    }

    /// Restore the database to the start of the active deploy, point
    /// `current` back at the previous instance and delete the active one.
    ///
    /// There is no fallback: a failure after the preconditions pass is
    /// recorded and returned as [`Error::RollbackFailed`].
    pub fn rollback(&self) -> Result<RollbackReport> {
        let (active, previous) = self.check_preconditions()?;
        let _lock = DeployLock::acquire(self.collaborators.executor.clone(), self.store.layout())?;

        tracing::info!(from = %active, to = %previous, "starting rollback");
        match self.run(&active) {
            Ok(()) => {
                self.audit.record(ROLLBACK_TASK, Outcome::Success, Some(&active));
                tracing::info!(current = %previous, "rollback finished");
                Ok(RollbackReport {
                    restored: previous,
                    removed: active,
                })
            }
            Err(err) => {
                tracing::error!(stamp = %active, error = %err, "rollback failed");
                self.audit.record(ROLLBACK_TASK, Outcome::Failed, Some(&active));
                Err(Error::RollbackFailed(Box::new(err)))
            }
        }
    }

    fn check_preconditions(&self) -> Result<(Stamp, Stamp)> {
        let Some(previous) = self.store.previous_stamp()? else {
            return Err(Error::RollbackImpossible(
                "no previous instance found to roll back to".to_string(),
            ));
        };
        let Some(active) = self.store.current_stamp()? else {
            return Err(Error::RollbackImpossible(
                "no active instance found".to_string(),
            ));
        };
        if active == previous {
            return Err(Error::RollbackImpossible(format!(
                "current and previous both point at {}",
                active
            )));
        }
        let snapshot = self.instance(&active).pre_deploy_snapshot();
        if !self.collaborators.executor.exists(&snapshot)? {
            return Err(Error::RollbackImpossible(format!(
                "database snapshot {} not found",
                snapshot.display()
            )));
        }
        Ok((active, previous))
    }

    fn run(&self, active: &Stamp) -> Result<()> {
        let instance = self.instance(active);

        tracing::info!(stamp = %active, "restoring database to start of instance");
        self.collaborators
            .database
            .restore(&instance, &instance.pre_deploy_snapshot())
            .map_err(|source| Error::DatabaseOperationFailed {
                operation: "restore",
                source,
            })?;

        tracing::info!("setting previous instance as current");
        self.store.rollback()?;

        tracing::info!("restarting website");
        self.collaborators.reload.notify().map_err(Error::ReloadFailed)?;

        tracing::info!(stamp = %active, "removing instance from filesystem");
        self.store.remove_instance(active)?;
        Ok(())
    }

    fn instance(&self, stamp: &Stamp) -> InstancePaths {
        self.store.layout().instance(stamp)
    }
}
