//! Configuration loading
//!
//! Two file layers, global (`<config_dir>/shipyard/shipyard.toml`) and
//! project (`./shipyard.toml`), resolve into one [`DeploySettings`] per
//! environment.

pub mod merge;
pub mod parser;
pub mod schema;
pub mod settings;
pub mod store;

pub use merge::merge_configs;
pub use parser::{parse_shipyard_toml, parse_shipyard_toml_str};
pub use schema::{CommandsLayer, ProjectSection, SettingsLayer, ShipyardConfig};
pub use settings::{DeploySettings, LOCAL_HOST};
pub use store::{CONFIG_FILE, ConfigStore};
