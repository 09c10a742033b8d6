//! Error taxonomy for instance lifecycle operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Phase;
use crate::remote::RemoteError;
use crate::stamp::Stamp;

/// Why a deploy was refused before anything was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The stamp is already the active instance.
    AlreadyCurrent,
    /// The stamp is the previous instance; rollback covers this case.
    IsPrevious,
    /// A directory for the stamp exists but was never activated.
    AlreadyExists,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::AlreadyCurrent => write!(f, "it is already the current instance"),
            Precondition::IsPrevious => {
                write!(f, "it is the previous instance, use rollback instead")
            }
            Precondition::AlreadyExists => write!(
                f,
                "it has already been deployed but not activated, use force to replace it"
            ),
        }
    }
}

/// Cleanup that ran after a failed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Nothing needed undoing.
    None,
    /// The instance directory was deleted.
    InstanceRemoved,
    /// The database was restored from the pre-deploy snapshot and the
    /// instance directory was deleted.
    DatabaseRestored,
    /// Compensation itself failed; the host needs manual attention.
    Failed(String),
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::None => write!(f, "no compensation needed"),
            Compensation::InstanceRemoved => write!(f, "instance directory removed"),
            Compensation::DatabaseRestored => write!(
                f,
                "database restored from pre-deploy snapshot, instance directory removed"
            ),
            Compensation::Failed(reason) => write!(f, "compensation failed: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid stamp '{0}'")]
    InvalidStamp(String),

    #[error("Could not resolve reference '{reference}'")]
    RefNotFound {
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Instance {0} has already been deployed")]
    AlreadyDeployed(Stamp),

    #[error("Deploy of {stamp} aborted because {reason}")]
    PreconditionFailed { stamp: Stamp, reason: Precondition },

    #[error("Nothing to activate: instance {0} does not exist")]
    NothingToActivate(Stamp),

    #[error("No previous instance found")]
    NoPreviousInstance,

    #[error("No active instance found")]
    NoActiveInstance,

    #[error("Remote command failed: {0}")]
    RemoteCommandFailed(#[from] RemoteError),

    #[error("Could not fetch source for {stamp}")]
    SourceFetchFailed {
        stamp: Stamp,
        #[source]
        source: anyhow::Error,
    },

    #[error("Provisioning step '{step}' failed")]
    ProvisionFailed {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database {operation} failed")]
    DatabaseOperationFailed {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Reload signal failed")]
    ReloadFailed(#[source] anyhow::Error),

    #[error("Another deploy or rollback holds the lock at {0}")]
    Locked(PathBuf),

    #[error("Deploy of {stamp} failed in {phase} phase ({compensation})")]
    DeploymentFailed {
        stamp: Stamp,
        phase: Phase,
        compensation: Compensation,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "Deploy of {stamp} failed in {phase} phase; no compensation applied, operator intervention required"
    )]
    Uncompensated {
        stamp: Stamp,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    #[error("Rollback impossible: {0}")]
    RollbackImpossible(String),

    #[error("Rollback failed")]
    RollbackFailed(#[source] Box<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;
