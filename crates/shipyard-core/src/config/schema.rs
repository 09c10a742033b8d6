//! Configuration schema for shipyard.toml
//!
//! ```toml
//! [project]
//! name = "site"
//! repository = "."
//!
//! [defaults]
//! projects_root = "/var/www/vhosts"
//!
//! [environments.staging]
//! host = "deploy@staging.example.com"
//! prefix = "s-"
//!
//! [environments.staging.commands]
//! migrate = "{env}/bin/python {source}/manage.py migrate --noinput"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Root of one shipyard.toml file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipyardConfig {
    #[serde(default)]
    pub project: ProjectSection,

    /// Applied to every environment.
    #[serde(default)]
    pub defaults: SettingsLayer,

    #[serde(default)]
    pub environments: BTreeMap<String, SettingsLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: Option<String>,
    /// Local checkout deploys are cut from.
    pub repository: Option<PathBuf>,
    /// Name recorded in the audit log. Defaults to `$USER`.
    pub actor: Option<String>,
}

/// One layer of per-environment settings. Unset fields fall through to the
/// layer below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsLayer {
    /// `"local"` or an ssh destination such as `user@host`.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub projects_root: Option<PathBuf>,
    pub prefix: Option<String>,
    pub database: Option<String>,
    pub keep_instances: Option<usize>,
    pub shared_files: Option<Vec<String>>,
    pub reload_marker: Option<String>,
    #[serde(default)]
    pub commands: CommandsLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsLayer {
    pub build_environment: Option<String>,
    pub install_dependencies: Option<String>,
    pub build_assets: Option<String>,
    pub migrate: Option<String>,
    pub snapshot: Option<String>,
    pub restore: Option<String>,
}

impl ShipyardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// Checks that hold for any single file. Whole-configuration checks run
    /// when settings are resolved.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(name) = &self.project.name
            && name.trim().is_empty()
        {
            bail!("project.name must not be empty");
        }
        self.defaults.validate("defaults")?;
        for (name, layer) in &self.environments {
            layer.validate(&format!("environments.{}", name))?;
        }
        Ok(())
    }
}

impl SettingsLayer {
    fn validate(&self, section: &str) -> anyhow::Result<()> {
        if let Some(root) = &self.projects_root
            && !root.is_absolute()
        {
            bail!(
                "[{}] projects_root must be an absolute path, got '{}'",
                section,
                root.display()
            );
        }
        if self.port == Some(0) {
            bail!("[{}] port must be between 1 and 65535", section);
        }
        if let Some(host) = &self.host
            && host.trim().is_empty()
        {
            bail!("[{}] host must not be empty", section);
        }
        Ok(())
    }
}
