//! `finassist config`: configuration management.

use std::path::Path;

use anyhow::Context;
use finassist_config::AppConfig;

pub fn run(config_path: Option<&Path>, init: bool, path_only: bool) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    if path_only {
        println!("{}", path.display());
        return Ok(());
    }

    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, AppConfig::default_toml())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
        }
        return Ok(());
    }

    let mut config = super::load_config(Some(&path))?;
    if config.api_key.is_some() {
        config.api_key = Some("********".into());
    }
    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
