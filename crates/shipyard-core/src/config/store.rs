//! Config store for locating and loading shipyard.toml layers.

use std::path::{Path, PathBuf};

use super::{DeploySettings, ShipyardConfig, merge, parser};

pub const CONFIG_FILE: &str = "shipyard.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    global_path: Option<PathBuf>,
    project_path: PathBuf,
}

impl ConfigStore {
    /// Global file under the user config directory, project file in the
    /// working directory unless `project_path` is given.
    pub fn discover(project_path: Option<&Path>) -> anyhow::Result<Self> {
        let project_path = match project_path {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir()?.join(CONFIG_FILE),
        };
        let global_path = dirs::config_dir().map(|dir| dir.join("shipyard").join(CONFIG_FILE));
        Ok(Self {
            global_path,
            project_path,
        })
    }

    pub fn from_paths(global_path: Option<PathBuf>, project_path: PathBuf) -> Self {
        Self {
            global_path,
            project_path,
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn global_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Both layers merged. A missing global file is skipped; a missing
    /// project file is an error.
    pub fn load(&self) -> anyhow::Result<ShipyardConfig> {
        let global = match &self.global_path {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading global config");
                Some(parser::parse_shipyard_toml(path)?)
            }
            _ => None,
        };
        let project = parser::parse_shipyard_toml(&self.project_path)?;
        Ok(merge::merge_configs(global, Some(project)))
    }

    pub fn load_settings(&self, environment: &str) -> anyhow::Result<DeploySettings> {
        DeploySettings::resolve(&self.load()?, environment)
    }
}
