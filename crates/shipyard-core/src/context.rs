//! Application context for dependency injection.

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::backup::BackupManager;
use crate::config::DeploySettings;
use crate::database::CommandDatabase;
use crate::deploy::{Collaborators, DeployOptions, Deployer};
use crate::error::Result;
use crate::layout::ProjectLayout;
use crate::provision::CommandProvisioner;
use crate::reload::TouchReload;
use crate::remote::{Executor, LocalExecutor, SshExecutor, SshTarget};
use crate::rollback::RollbackManager;
use crate::status::StatusReport;
use crate::store::InstanceStore;
use crate::vcs::GitRepository;

/// Everything one invocation needs for one environment.
///
/// Frontends build this once from resolved settings and ask it for the
/// service they need.
#[derive(Clone)]
pub struct AppContext {
    settings: DeploySettings,
    layout: ProjectLayout,
    collaborators: Collaborators,
}

impl AppContext {
    /// Wire the shipped collaborators: a local or ssh executor, the git
    /// checkout at `settings.repository` and the command templates.
    pub fn from_settings(settings: DeploySettings) -> Self {
        let layout = ProjectLayout::new(settings.project_root());
        let executor: Arc<dyn Executor> = if settings.is_local() {
            Arc::new(LocalExecutor::new())
        } else {
            let mut target = SshTarget::new(settings.host.clone());
            if let Some(port) = settings.port {
                target = target.with_port(port);
            }
            if let Some(identity) = &settings.identity_file {
                target = target.with_identity_file(identity.clone());
            }
            Arc::new(SshExecutor::new(target))
        };

        let collaborators = Collaborators {
            vcs: Arc::new(GitRepository::new(settings.repository.clone())),
            provisioner: Arc::new(CommandProvisioner::new(
                executor.clone(),
                settings.provision.clone(),
                layout.root().to_path_buf(),
            )),
            database: Arc::new(CommandDatabase::new(
                executor.clone(),
                settings.database_commands.clone(),
                settings.database.clone(),
                layout.root().to_path_buf(),
            )),
            reload: Arc::new(TouchReload::new(
                executor.clone(),
                layout.root().join(&settings.reload_marker),
            )),
            executor,
        };

        Self {
            settings,
            layout,
            collaborators,
        }
    }

    /// Context with caller-provided collaborators.
    pub fn with_collaborators(settings: DeploySettings, collaborators: Collaborators) -> Self {
        Self {
            layout: ProjectLayout::new(settings.project_root()),
            settings,
            collaborators,
        }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.collaborators.executor
    }

    pub fn store(&self) -> InstanceStore {
        InstanceStore::new(self.collaborators.executor.clone(), self.layout.clone())
    }

    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(
            self.collaborators.executor.clone(),
            self.layout.audit_log(),
            self.settings.environment.clone(),
            self.settings.actor.clone(),
        )
    }

    pub fn deployer(&self) -> Deployer {
        Deployer::new(
            self.store(),
            self.collaborators.clone(),
            self.audit_log(),
            self.settings.shared_files.clone(),
        )
    }

    /// Options with the configured retention window.
    pub fn deploy_options(&self) -> DeployOptions {
        DeployOptions {
            force: false,
            retain_recent: self.settings.keep_instances,
        }
    }

    pub fn rollback_manager(&self) -> RollbackManager {
        RollbackManager::new(self.store(), self.collaborators.clone(), self.audit_log())
    }

    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(
            self.store(),
            self.collaborators.clone(),
            self.audit_log(),
            self.settings.database.clone(),
        )
    }

    pub fn status(&self, log_lines: usize) -> Result<StatusReport> {
        StatusReport::collect(
            self.collaborators.executor.as_ref(),
            &self.store(),
            &self.audit_log(),
            log_lines,
        )
    }
}
