//! Database snapshot, restore and migration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::layout::InstancePaths;
use crate::remote::Executor;
use crate::template::TemplateVars;

/// The database the project root serves.
///
/// Every operation runs in the context of one instance, whose runtime
/// environment provides the tooling.
pub trait Database: Send + Sync {
    fn snapshot(&self, instance: &InstancePaths, dest: &Path) -> anyhow::Result<()>;
    fn restore(&self, instance: &InstancePaths, src: &Path) -> anyhow::Result<()>;
    fn migrate(&self, instance: &InstancePaths) -> anyhow::Result<()>;
}

/// Command templates for [`CommandDatabase`].
///
/// Placeholders: `{file}`, `{database}`, `{env}`, `{source}`, `{scripts}`,
/// `{project}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCommands {
    pub snapshot: String,
    pub restore: String,
    pub migrate: String,
}

impl Default for DatabaseCommands {
    fn default() -> Self {
        Self {
            snapshot: "{env}/bin/python {scripts}/db_backup.py {file}".to_string(),
            restore: "{env}/bin/python {scripts}/db_drop.py \
                      && {env}/bin/python {scripts}/db_create.py \
                      && {env}/bin/python {scripts}/sql_file.py {file}"
                .to_string(),
            migrate: "{env}/bin/python {source}/manage.py migrate --noinput".to_string(),
        }
    }
}

pub struct CommandDatabase {
    executor: Arc<dyn Executor>,
    commands: DatabaseCommands,
    name: String,
    project_root: PathBuf,
}

impl CommandDatabase {
    pub fn new(
        executor: Arc<dyn Executor>,
        commands: DatabaseCommands,
        name: impl Into<String>,
        project_root: PathBuf,
    ) -> Self {
        Self {
            executor,
            commands,
            name: name.into(),
            project_root,
        }
    }

    fn vars(&self, instance: &InstancePaths) -> TemplateVars {
        TemplateVars::new()
            .with("database", self.name.clone())
            .with_path("env", &instance.env)
            .with_path("source", &instance.source)
            .with_path("scripts", &self.project_root.join("scripts"))
            .with_path("project", &self.project_root)
    }

    fn run(&self, operation: &str, template: &str, vars: TemplateVars) -> anyhow::Result<()> {
        let command = vars.render(template);
        tracing::debug!(operation, %command, "running database command");
        self.executor
            .run_checked(&command)
            .with_context(|| format!("database {} command failed", operation))?;
        Ok(())
    }
}

impl Database for CommandDatabase {
    fn snapshot(&self, instance: &InstancePaths, dest: &Path) -> anyhow::Result<()> {
        let vars = self.vars(instance).with_path("file", dest);
        self.run("snapshot", &self.commands.snapshot, vars)
    }

    fn restore(&self, instance: &InstancePaths, src: &Path) -> anyhow::Result<()> {
        if !self.executor.exists(src)? {
            anyhow::bail!("snapshot {} not found", src.display());
        }
        let vars = self.vars(instance).with_path("file", src);
        self.run("restore", &self.commands.restore, vars)
    }

    fn migrate(&self, instance: &InstancePaths) -> anyhow::Result<()> {
        self.run("migrate", &self.commands.migrate, self.vars(instance))
    }
}
