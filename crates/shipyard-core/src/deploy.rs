//! The phased deploy pipeline.
//!
//! ```text
//! guard -> lock -> materialize -> database -> activate -> prune -> audit
//! ```
//!
//! Materialize and database failures are compensated here and surface as
//! [`Error::DeploymentFailed`]. Activation and prune failures surface as
//! [`Error::Uncompensated`].

use std::sync::Arc;

use serde::Serialize;

use crate::audit::{AuditLog, Outcome};
use crate::database::Database;
use crate::error::{Compensation, Error, Precondition, Result};
use crate::layout::InstancePaths;
use crate::lock::DeployLock;
use crate::pipeline::{DeploymentAttempt, InstanceState, Phase, Step};
use crate::provision::Provisioner;
use crate::reload::ReloadSignal;
use crate::remote::Executor;
use crate::stamp::{Stamp, StampResolver};
use crate::store::InstanceStore;
use crate::vcs::Vcs;

pub const DEFAULT_KEEP_INSTANCES: usize = 5;

const DEPLOY_TASK: &str = "deploy";

/// External systems a deploy or rollback drives.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn Executor>,
    pub vcs: Arc<dyn Vcs>,
    pub provisioner: Arc<dyn Provisioner>,
    pub database: Arc<dyn Database>,
    pub reload: Arc<dyn ReloadSignal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Replace a never-activated instance directory left by an earlier run.
    pub force: bool,
    /// Size of the prune retention window.
    pub retain_recent: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            force: false,
            retain_recent: DEFAULT_KEEP_INSTANCES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub stamp: Stamp,
    /// Instance demoted to previous by this deploy.
    pub previous: Option<Stamp>,
    pub pruned: Vec<Stamp>,
}

pub struct Deployer {
    store: InstanceStore,
    resolver: StampResolver,
    collaborators: Collaborators,
    audit: AuditLog,
    shared_files: Vec<String>,
}

impl Deployer {
    pub fn new(
        store: InstanceStore,
        collaborators: Collaborators,
        audit: AuditLog,
        shared_files: Vec<String>,
    ) -> Self {
        Self {
            store,
            resolver: StampResolver::new(collaborators.vcs.clone()),
            collaborators,
            audit,
            shared_files,
        }
    }

    pub fn resolver(&self) -> &StampResolver {
        &self.resolver
    }

    /// Resolve `reference` and deploy the resulting stamp.
    pub fn deploy(&self, reference: Option<&str>, options: &DeployOptions) -> Result<DeployReport> {
        let stamp = self.resolver.resolve(reference)?;
        self.deploy_stamp(&stamp, options)
    }

    pub fn deploy_stamp(&self, stamp: &Stamp, options: &DeployOptions) -> Result<DeployReport> {
        let stale = self.check_preconditions(stamp, options.force)?;

        let _lock = DeployLock::acquire(self.collaborators.executor.clone(), self.store.layout())?;

        if stale {
            tracing::warn!(%stamp, "removing never-activated instance directory");
            self.store.remove_instance(stamp)?;
        }

        let previous = self.store.current_stamp()?;
        let mut attempt = DeploymentAttempt::new(stamp.clone());
        tracing::info!(%stamp, "starting deploy");

        let instance = match self.materialize(&mut attempt) {
            Ok(instance) => instance,
            Err(err) => return Err(self.compensate(&mut attempt, err)),
        };

        if let Err(err) = self.update_database(&mut attempt, &instance) {
            return Err(self.compensate(&mut attempt, err));
        }

        if let Err(err) = self.activate(&mut attempt) {
            return Err(self.uncompensated(&mut attempt, Phase::Activate, err));
        }
        attempt.state = InstanceState::Active;

        attempt.enter(Step::PruneInstances);
        let pruned = match self.store.prune(options.retain_recent) {
            Ok(pruned) => pruned,
            Err(err) => return Err(self.uncompensated(&mut attempt, Phase::Prune, err)),
        };

        self.audit.record(DEPLOY_TASK, Outcome::Success, Some(stamp));
        tracing::info!(%stamp, state = ?attempt.state, "deploy finished");

        Ok(DeployReport {
            stamp: stamp.clone(),
            previous,
            pruned,
        })
    }

    /// Read-only guard. Returns whether a stale directory for `stamp` exists
    /// and `force` allows replacing it.
    fn check_preconditions(&self, stamp: &Stamp, force: bool) -> Result<bool> {
        let refuse = |reason| Error::PreconditionFailed {
            stamp: stamp.clone(),
            reason,
        };
        if self.store.current_stamp()?.as_ref() == Some(stamp) {
            return Err(refuse(Precondition::AlreadyCurrent));
        }
        if self.store.previous_stamp()?.as_ref() == Some(stamp) {
            return Err(refuse(Precondition::IsPrevious));
        }
        if self.store.instance_exists(stamp)? {
            if !force {
                return Err(refuse(Precondition::AlreadyExists));
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn materialize(&self, attempt: &mut DeploymentAttempt) -> Result<InstancePaths> {
        let executor = &self.collaborators.executor;
        let provisioner = &self.collaborators.provisioner;
        let layout = self.store.layout();

        attempt.enter(Step::CreateLayout);
        let instance = self.store.create_layout(&attempt.stamp)?;
        attempt.owns_directory = true;

        attempt.enter(Step::FetchSource);
        self.fetch_source(&attempt.stamp, &instance)?;

        attempt.enter(Step::BuildEnvironment);
        provisioner
            .build_environment(&instance)
            .map_err(|source| Error::ProvisionFailed {
                step: "build_environment",
                source,
            })?;

        attempt.enter(Step::InstallDependencies);
        provisioner
            .install_dependencies(&instance)
            .map_err(|source| Error::ProvisionFailed {
                step: "install_dependencies",
                source,
            })?;

        attempt.enter(Step::CopySharedFiles);
        for name in &self.shared_files {
            executor.copy_file(&layout.shared_file(name), &instance.source.join(name))?;
        }

        attempt.enter(Step::LinkMedia);
        executor.symlink(&layout.media_dir(), &instance.media_link)?;

        attempt.enter(Step::BuildAssets);
        provisioner
            .build_assets(&instance)
            .map_err(|source| Error::ProvisionFailed {
                step: "build_assets",
                source,
            })?;

        Ok(instance)
    }

    fn fetch_source(&self, stamp: &Stamp, instance: &InstancePaths) -> Result<()> {
        let fetch_failed = |source: anyhow::Error| Error::SourceFetchFailed {
            stamp: stamp.clone(),
            source,
        };

        let archive = tempfile::Builder::new()
            .prefix(&format!("shipyard-{}-", stamp))
            .suffix(".tar")
            .tempfile()
            .map_err(|e| fetch_failed(e.into()))?;

        self.collaborators
            .vcs
            .archive(stamp.as_str(), archive.path())
            .map_err(fetch_failed)?;
        self.collaborators
            .executor
            .extract_archive(archive.path(), &instance.source)
            .map_err(|e| fetch_failed(e.into()))?;
        Ok(())
    }

    fn update_database(&self, attempt: &mut DeploymentAttempt, instance: &InstancePaths) -> Result<()> {
        let database = &self.collaborators.database;

        attempt.enter(Step::SnapshotBefore);
        database
            .snapshot(instance, &instance.pre_deploy_snapshot())
            .map_err(db_failed("snapshot"))?;
        attempt.snapshot_taken = true;

        attempt.enter(Step::Migrate);
        database.migrate(instance).map_err(db_failed("migrate"))?;

        attempt.enter(Step::SnapshotAfter);
        database
            .snapshot(instance, &instance.post_deploy_snapshot())
            .map_err(db_failed("snapshot"))?;
        Ok(())
    }

    fn activate(&self, attempt: &mut DeploymentAttempt) -> Result<()> {
        attempt.enter(Step::SwitchPointers);
        self.store.activate(&attempt.stamp)?;

        attempt.enter(Step::Reload);
        self.collaborators.reload.notify().map_err(Error::ReloadFailed)?;
        Ok(())
    }

    /// Record the failure, undo the failed phase and wrap the cause.
    fn compensate(&self, attempt: &mut DeploymentAttempt, cause: Error) -> Error {
        let phase = attempt.phase().unwrap_or(Phase::Materialize);
        let stamp = attempt.stamp.clone();
        attempt.state = InstanceState::Failed;
        tracing::error!(%stamp, %phase, state = ?attempt.state, error = %cause, "deploy failed");
        self.audit.record(DEPLOY_TASK, Outcome::Failed, Some(&stamp));

        let compensation = match self.run_compensation(attempt, phase) {
            Ok(compensation) => compensation,
            Err(err) => {
                tracing::error!(%stamp, error = %err, "compensation failed");
                Compensation::Failed(err.to_string())
            }
        };
        tracing::warn!(%stamp, %compensation, "deploy rolled back");

        Error::DeploymentFailed {
            stamp,
            phase,
            compensation,
            source: Box::new(cause),
        }
    }

    fn run_compensation(&self, attempt: &DeploymentAttempt, phase: Phase) -> Result<Compensation> {
        if !attempt.owns_directory {
            return Ok(Compensation::None);
        }
        let instance = self.store.layout().instance(&attempt.stamp);

        let restored = phase == Phase::Database && attempt.snapshot_taken;
        if restored {
            tracing::info!(stamp = %attempt.stamp, "restoring database");
            self.collaborators
                .database
                .restore(&instance, &instance.pre_deploy_snapshot())
                .map_err(db_failed("restore"))?;
        }

        tracing::info!(stamp = %attempt.stamp, "removing instance from filesystem");
        self.store.remove_instance(&attempt.stamp)?;

        Ok(if restored {
            Compensation::DatabaseRestored
        } else {
            Compensation::InstanceRemoved
        })
    }

    fn uncompensated(&self, attempt: &mut DeploymentAttempt, phase: Phase, cause: Error) -> Error {
        attempt.state = InstanceState::Failed;
        tracing::error!(
            stamp = %attempt.stamp,
            %phase,
            state = ?attempt.state,
            error = %cause,
            "deploy failed after database phase, manual intervention required"
        );
        self.audit.record(DEPLOY_TASK, Outcome::Failed, Some(&attempt.stamp));
        Error::Uncompensated {
            stamp: attempt.stamp.clone(),
            phase,
            source: Box::new(cause),
        }
    }
}

fn db_failed(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Error {
    move |source| Error::DatabaseOperationFailed { operation, source }
}
