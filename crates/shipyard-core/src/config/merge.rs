//! Configuration layer merging
//!
//! File layers: global -> project. Within the merged file, settings resolve
//! built-in defaults -> `[defaults]` -> `[environments.<name>]`.

use super::schema::{CommandsLayer, ProjectSection, SettingsLayer, ShipyardConfig};

/// Merge the global and project files. The project file wins per field.
pub fn merge_configs(
    global: Option<ShipyardConfig>,
    project: Option<ShipyardConfig>,
) -> ShipyardConfig {
    let mut merged = global.unwrap_or_default();

    if let Some(project) = project {
        merge_project_section(&mut merged.project, project.project);
        merged.defaults.overlay(project.defaults);
        for (name, layer) in project.environments {
            merged
                .environments
                .entry(name)
                .or_default()
                .overlay(layer);
        }
    }

    merged
}

fn merge_project_section(base: &mut ProjectSection, overlay: ProjectSection) {
    if overlay.name.is_some() {
        base.name = overlay.name;
    }
    if overlay.repository.is_some() {
        base.repository = overlay.repository;
    }
    if overlay.actor.is_some() {
        base.actor = overlay.actor;
    }
}

macro_rules! overlay_fields {
    ($base:expr, $overlay:expr, $($field:ident),+ $(,)?) => {
        $(
            if $overlay.$field.is_some() {
                $base.$field = $overlay.$field;
            }
        )+
    };
}

impl SettingsLayer {
    /// Apply `overlay` on top of `self`; set fields in `overlay` win.
    pub fn overlay(&mut self, overlay: SettingsLayer) {
        overlay_fields!(
            self,
            overlay,
            host,
            port,
            identity_file,
            projects_root,
            prefix,
            database,
            keep_instances,
            shared_files,
            reload_marker,
        );
        self.commands.overlay(overlay.commands);
    }
}

impl CommandsLayer {
    pub fn overlay(&mut self, overlay: CommandsLayer) {
        overlay_fields!(
            self,
            overlay,
            build_environment,
            install_dependencies,
            build_assets,
            migrate,
            snapshot,
            restore,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn layer_with_root(root: &str) -> SettingsLayer {
        SettingsLayer {
            projects_root: Some(PathBuf::from(root)),
            ..Default::default()
        }
    }

    #[test]
    fn test_overlay_keeps_unset_fields() {
        let mut base = SettingsLayer {
            host: Some("local".to_string()),
            keep_instances: Some(5),
            ..Default::default()
        };
        base.overlay(SettingsLayer {
            keep_instances: Some(2),
            ..Default::default()
        });
        assert_eq!(base.host.as_deref(), Some("local"));
        assert_eq!(base.keep_instances, Some(2));
    }

    #[test]
    fn test_commands_overlay_per_template() {
        let mut base = CommandsLayer {
            migrate: Some("base-migrate".to_string()),
            snapshot: Some("base-snapshot".to_string()),
            ..Default::default()
        };
        base.overlay(CommandsLayer {
            migrate: Some("env-migrate".to_string()),
            ..Default::default()
        });
        assert_eq!(base.migrate.as_deref(), Some("env-migrate"));
        assert_eq!(base.snapshot.as_deref(), Some("base-snapshot"));
    }

    #[test]
    fn test_project_file_wins_over_global() {
        let mut global = ShipyardConfig::new();
        global.project.actor = Some("ops".to_string());
        global.defaults = layer_with_root("/srv/global");
        global
            .environments
            .insert("live".to_string(), layer_with_root("/srv/live-global"));

        let mut project = ShipyardConfig::new();
        project.project.name = Some("site".to_string());
        project.environments.insert(
            "live".to_string(),
            SettingsLayer {
                prefix: Some("l-".to_string()),
                ..Default::default()
            },
        );

        let merged = merge_configs(Some(global), Some(project));
        assert_eq!(merged.project.name.as_deref(), Some("site"));
        assert_eq!(merged.project.actor.as_deref(), Some("ops"));
        assert_eq!(
            merged.defaults.projects_root,
            Some(PathBuf::from("/srv/global"))
        );
        let live = &merged.environments["live"];
        assert_eq!(live.projects_root, Some(PathBuf::from("/srv/live-global")));
        assert_eq!(live.prefix.as_deref(), Some("l-"));
    }

    #[test]
    fn test_merge_without_layers_is_empty() {
        assert_eq!(merge_configs(None, None), ShipyardConfig::new());
    }
}
