//! `a2ia config`: show the effective configuration or write the default file.

use std::path::Path;

use a2ia_config::AppConfig;
use anyhow::{Context, bail};

pub fn run(init: bool, force: bool) -> anyhow::Result<()> {
    if init {
        let path = AppConfig::config_path();
        write_default(&path, force)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load config")?;
    println!("# {}", AppConfig::config_path().display());
    println!("{}", config.redacted_toml());
    Ok(())
}

fn write_default(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default(&path, false).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.orchestrator.max_iterations, 300);

        let err = write_default(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        write_default(&path, true).unwrap();
    }
}
