//! Runtime provisioning for a freshly materialized instance.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::layout::InstancePaths;
use crate::remote::Executor;
use crate::template::TemplateVars;

/// Opaque provisioning steps of the materialize phase.
pub trait Provisioner: Send + Sync {
    fn build_environment(&self, instance: &InstancePaths) -> anyhow::Result<()>;
    fn install_dependencies(&self, instance: &InstancePaths) -> anyhow::Result<()>;
    fn build_assets(&self, instance: &InstancePaths) -> anyhow::Result<()>;
}

/// Command templates for [`CommandProvisioner`].
///
/// Placeholders: `{env}`, `{source}`, `{instance}`, `{project}`, `{log}`.
/// An empty template skips the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionCommands {
    pub build_environment: String,
    pub install_dependencies: String,
    pub build_assets: String,
}

impl Default for ProvisionCommands {
    fn default() -> Self {
        Self {
            build_environment: "virtualenv {env}".to_string(),
            install_dependencies:
                "{env}/bin/pip install -r {source}/requirements.txt --quiet --log={log}/pip.log"
                    .to_string(),
            build_assets:
                "{env}/bin/python {source}/manage.py collectstatic --link --noinput --verbosity=0"
                    .to_string(),
        }
    }
}

/// Runs [`ProvisionCommands`] on the host through an [`Executor`].
pub struct CommandProvisioner {
    executor: Arc<dyn Executor>,
    commands: ProvisionCommands,
    project_root: PathBuf,
}

impl CommandProvisioner {
    pub fn new(
        executor: Arc<dyn Executor>,
        commands: ProvisionCommands,
        project_root: PathBuf,
    ) -> Self {
        Self {
            executor,
            commands,
            project_root,
        }
    }

    fn vars(&self, instance: &InstancePaths) -> TemplateVars {
        TemplateVars::new()
            .with_path("env", &instance.env)
            .with_path("source", &instance.source)
            .with_path("instance", &instance.root)
            .with_path("project", &self.project_root)
            .with_path("log", &self.project_root.join(crate::layout::LOG_DIR))
    }

    fn run(&self, name: &str, template: &str, instance: &InstancePaths) -> anyhow::Result<()> {
        if template.trim().is_empty() {
            tracing::debug!(step = name, "no command configured, skipping");
            return Ok(());
        }
        let command = self.vars(instance).render(template);
        tracing::debug!(step = name, %command, "running provisioning command");
        self.executor
            .run_checked(&command)
            .with_context(|| format!("{} command failed", name))?;
        Ok(())
    }
}

impl Provisioner for CommandProvisioner {
    fn build_environment(&self, instance: &InstancePaths) -> anyhow::Result<()> {
        self.run("build_environment", &self.commands.build_environment, instance)
    }

    fn install_dependencies(&self, instance: &InstancePaths) -> anyhow::Result<()> {
        self.run(
            "install_dependencies",
            &self.commands.install_dependencies,
            instance,
        )
    }

    fn build_assets(&self, instance: &InstancePaths) -> anyhow::Result<()> {
        self.run("build_assets", &self.commands.build_assets, instance)
    }
}
