//! Configuration loading and `terrastat config ...`.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use terrastat_db::SchemaName;
use terrastat_logging::terrastat_home;
use terrastat_pipeline::PipelineConfig;

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path in use
    Path,
    /// Validate the configuration and list projects
    Check,
}

/// Default configuration file: ~/.terrastat/config.toml
pub fn default_config_path() -> PathBuf {
    terrastat_home().join("config.toml")
}

pub fn load(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

pub fn run(path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Check => {
            let config = load(path)?;
            println!("Configuration OK: {}", path.display());
            println!("{}", describe(&config));
            Ok(())
        }
    }
}

fn describe(config: &PipelineConfig) -> String {
    let mut lines = vec![
        format!("  data_root:     {}", config.data_root.display()),
        format!("  temp_root:     {}", config.temp_root.display()),
        format!("  settings_root: {}", config.settings_root.display()),
    ];
    if config.projects.is_empty() {
        lines.push("  (no projects)".to_string());
    }
    for project in &config.projects {
        lines.push(format!(
            "  project {:<16} schema={} shapefiles={} zone_fields={} pixel_size={}",
            project.name,
            SchemaName::for_project(&project.name),
            project.shapefiles.len(),
            project.zone_fields.len(),
            project.projection.pixel_size
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_and_describe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            data_root = "/data"
            temp_root = "/tmp"
            settings_root = "/settings"

            [[projects]]
            name = "Ga AEA"
            shapefiles = ["counties.shp"]
            projection = { target_srs = "EPSG:5070", pixel_size = 250.0 }
            "#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        let text = describe(&config);
        assert!(text.contains("schema=project_ga_aea"));
        assert!(text.contains("pixel_size=250"));
    }

    #[test]
    fn test_missing_file_mentions_path() {
        let err = load(Path::new("/nonexistent/terrastat.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/terrastat.toml"));
    }
}
