//! Fully resolved settings for one environment.

use std::path::PathBuf;

use anyhow::{Context, bail};
use serde::Serialize;

use super::schema::{SettingsLayer, ShipyardConfig};
use crate::database::DatabaseCommands;
use crate::deploy::DEFAULT_KEEP_INSTANCES;
use crate::provision::ProvisionCommands;

pub const LOCAL_HOST: &str = "local";

const DEFAULT_PROJECTS_ROOT: &str = "/var/www/vhosts";
const DEFAULT_SHARED_FILE: &str = "settings.py";
const DEFAULT_RELOAD_MARKER: &str = "django.wsgi";

/// Immutable settings handed to [`crate::context::AppContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploySettings {
    pub environment: String,
    pub project_name: String,
    pub repository: PathBuf,
    pub actor: String,
    pub host: String,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub projects_root: PathBuf,
    pub prefix: String,
    pub database: String,
    pub keep_instances: usize,
    pub shared_files: Vec<String>,
    /// File name in the project root touched after activation.
    pub reload_marker: String,
    pub provision: ProvisionCommands,
    pub database_commands: DatabaseCommands,
}

impl DeploySettings {
    /// Resolve `environment` from a merged configuration.
    pub fn resolve(config: &ShipyardConfig, environment: &str) -> anyhow::Result<Self> {
        let Some(env_layer) = config.environments.get(environment) else {
            let known: Vec<&str> = config.environment_names().collect();
            if known.is_empty() {
                bail!("Unknown environment '{}': no environments configured", environment);
            }
            bail!(
                "Unknown environment '{}', expected one of: {}",
                environment,
                known.join(", ")
            );
        };

        let project_name = config
            .project
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .context("project.name is required")?;

        let mut layer = SettingsLayer::default();
        layer.overlay(config.defaults.clone());
        layer.overlay(env_layer.clone());

        let projects_root = layer
            .projects_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECTS_ROOT));
        if !projects_root.is_absolute() {
            bail!(
                "projects_root must be an absolute path, got '{}'",
                projects_root.display()
            );
        }

        let prefix = layer.prefix.unwrap_or_default();
        let database = layer
            .database
            .unwrap_or_else(|| format!("{}{}", prefix, project_name));

        let provision_defaults = ProvisionCommands::default();
        let database_defaults = DatabaseCommands::default();
        let commands = layer.commands;

        Ok(Self {
            environment: environment.to_string(),
            repository: config
                .project
                .repository
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            actor: config
                .project
                .actor
                .clone()
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "unknown".to_string()),
            host: layer.host.unwrap_or_else(|| LOCAL_HOST.to_string()),
            port: layer.port,
            identity_file: layer.identity_file,
            projects_root,
            database,
            keep_instances: layer.keep_instances.unwrap_or(DEFAULT_KEEP_INSTANCES),
            shared_files: layer
                .shared_files
                .unwrap_or_else(|| vec![DEFAULT_SHARED_FILE.to_string()]),
            reload_marker: layer
                .reload_marker
                .unwrap_or_else(|| DEFAULT_RELOAD_MARKER.to_string()),
            provision: ProvisionCommands {
                build_environment: commands
                    .build_environment
                    .unwrap_or(provision_defaults.build_environment),
                install_dependencies: commands
                    .install_dependencies
                    .unwrap_or(provision_defaults.install_dependencies),
                build_assets: commands
                    .build_assets
                    .unwrap_or(provision_defaults.build_assets),
            },
            database_commands: DatabaseCommands {
                snapshot: commands.snapshot.unwrap_or(database_defaults.snapshot),
                restore: commands.restore.unwrap_or(database_defaults.restore),
                migrate: commands.migrate.unwrap_or(database_defaults.migrate),
            },
            project_name,
            prefix,
        })
    }

    /// `projects_root/<prefix><name>`.
    pub fn project_root(&self) -> PathBuf {
        self.projects_root
            .join(format!("{}{}", self.prefix, self.project_name))
    }

    pub fn is_local(&self) -> bool {
        self.host == LOCAL_HOST
    }
}
