//! Named deploy steps grouped into phases.
//!
//! A phase is the unit of compensation: a failure in any step of
//! [`Phase::Materialize`] or [`Phase::Database`] triggers that phase's
//! cleanup. [`Phase::Activate`] and [`Phase::Prune`] are never compensated.

use std::fmt;

use serde::Serialize;

use crate::stamp::Stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Filesystem only. Compensation: delete the instance directory.
    Materialize,
    /// Requires a complete instance. Compensation: restore the pre-deploy
    /// snapshot, then delete the instance directory.
    Database,
    /// Requires both earlier phases. Moves the pointers.
    Activate,
    /// Requires a successful activation.
    Prune,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Materialize => "materialize",
            Phase::Database => "database",
            Phase::Activate => "activation",
            Phase::Prune => "prune",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateLayout,
    FetchSource,
    BuildEnvironment,
    InstallDependencies,
    CopySharedFiles,
    LinkMedia,
    BuildAssets,
    SnapshotBefore,
    Migrate,
    SnapshotAfter,
    SwitchPointers,
    Reload,
    PruneInstances,
}

impl Step {
    pub fn phase(self) -> Phase {
        match self {
            Step::CreateLayout
            | Step::FetchSource
            | Step::BuildEnvironment
            | Step::InstallDependencies
            | Step::CopySharedFiles
            | Step::LinkMedia
            | Step::BuildAssets => Phase::Materialize,
            Step::SnapshotBefore | Step::Migrate | Step::SnapshotAfter => Phase::Database,
            Step::SwitchPointers | Step::Reload => Phase::Activate,
            Step::PruneInstances => Phase::Prune,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Step::CreateLayout => "creating folders",
            Step::FetchSource => "deploying source",
            Step::BuildEnvironment => "creating runtime environment",
            Step::InstallDependencies => "installing dependencies",
            Step::CopySharedFiles => "copying shared configuration",
            Step::LinkMedia => "linking media folder",
            Step::BuildAssets => "building static assets",
            Step::SnapshotBefore => "backing up database at start",
            Step::Migrate => "migrating database",
            Step::SnapshotAfter => "backing up database at end",
            Step::SwitchPointers => "updating instance symlinks",
            Step::Reload => "restarting website",
            Step::PruneInstances => "removing obsolete instances",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Lifecycle of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Provisioning,
    Active,
    Previous,
    Obsolete,
    Failed,
}

/// In-memory record of one deploy run. Never persisted.
#[derive(Debug, Clone)]
pub struct DeploymentAttempt {
    pub stamp: Stamp,
    pub state: InstanceState,
    /// Last step started.
    pub reached: Option<Step>,
    /// Whether this attempt created the instance directory, and so owns it.
    pub owns_directory: bool,
    /// Whether the pre-deploy snapshot was written.
    pub snapshot_taken: bool,
}

impl DeploymentAttempt {
    pub fn new(stamp: Stamp) -> Self {
        Self {
            stamp,
            state: InstanceState::Provisioning,
            reached: None,
            owns_directory: false,
            snapshot_taken: false,
        }
    }

    pub fn enter(&mut self, step: Step) {
        tracing::info!(stamp = %self.stamp, phase = %step.phase(), "{}", step.description());
        self.reached = Some(step);
    }

    pub fn phase(&self) -> Option<Phase> {
        self.reached.map(Step::phase)
    }
}
