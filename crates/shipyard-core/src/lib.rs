//! Shipyard Core Library
//!
//! Drives one project root on one host through the lifecycle of versioned
//! application instances: fetch, provision, migrate, activate, roll back and
//! prune.

pub mod audit;
pub mod backup;
pub mod config;
pub mod context;
pub mod database;
pub mod deploy;
pub mod error;
pub mod layout;
pub mod lock;
pub mod pipeline;
pub mod provision;
pub mod reload;
pub mod remote;
pub mod rollback;
pub mod stamp;
pub mod status;
pub mod store;
pub mod template;
pub mod vcs;

pub use error::{Error, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, DeploySettings, ShipyardConfig};
    pub use crate::context::AppContext;

    // Lifecycle
    pub use crate::deploy::{Collaborators, DeployOptions, DeployReport, Deployer};
    pub use crate::rollback::{RollbackManager, RollbackReport};
    pub use crate::stamp::{Reference, Stamp, StampResolver};
    pub use crate::store::{InstanceEntry, InstanceStore};

    // Records and reports
    pub use crate::audit::{AuditLog, AuditRecord, Outcome};
    pub use crate::backup::BackupManager;
    pub use crate::status::StatusReport;

    // Collaborators
    pub use crate::database::{CommandDatabase, Database};
    pub use crate::provision::{CommandProvisioner, Provisioner};
    pub use crate::reload::{ReloadSignal, TouchReload};
    pub use crate::remote::{Executor, LocalExecutor, SshExecutor, SshTarget};
    pub use crate::vcs::{GitRepository, Vcs};

    pub use crate::error::{Compensation, Error, Precondition, Result};
}
