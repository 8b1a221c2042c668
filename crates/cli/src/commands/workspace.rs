//! `a2ia workspace`: create, attach or show the sandbox.

use std::path::{Path, PathBuf};

use a2ia_config::{AppConfig, WorkspaceConfig};
use a2ia_workspace::{Workspace, WorkspaceError};
use anyhow::Context;

pub fn run(
    create: Option<String>,
    attach: Option<PathBuf>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let description = description.as_deref();
    let workspace = match (create, attach) {
        (Some(id), _) => Workspace::create(&workspaces_dir(), Some(&id), description)?,
        (None, Some(path)) => Workspace::attach(&path, description)?,
        (None, None) => {
            let config = AppConfig::load().context("Failed to load config")?;
            open(&config.workspace)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&workspace.info())?);
    Ok(())
}

/// Parent directory of named workspaces.
pub fn workspaces_dir() -> PathBuf {
    AppConfig::config_dir().join("workspaces")
}

/// Open the workspace described by the configuration.
///
/// A configured id resumes (or creates) a named workspace; otherwise the
/// configured root directory is attached, created first if missing.
pub fn open(config: &WorkspaceConfig) -> anyhow::Result<Workspace> {
    match &config.workspace_id {
        Some(id) => open_named(&workspaces_dir(), id, config.description.as_deref()),
        None => {
            let root = config.root_dir();
            std::fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create workspace root {}", root.display()))?;
            Ok(Workspace::attach(&root, config.description.as_deref())?)
        }
    }
}

fn open_named(parent: &Path, id: &str, description: Option<&str>) -> anyhow::Result<Workspace> {
    match Workspace::resume(parent, id) {
        Ok(workspace) => Ok(workspace),
        Err(WorkspaceError::NotFound(_)) => Ok(Workspace::create(parent, Some(id), description)?),
        Err(e) => Err(e.into()),
    }
}
