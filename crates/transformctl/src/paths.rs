use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "TRANSFORMCTL_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "PixelTransform";
const APPLICATION: &str = "transformctl";
const CONFIG_FILE: &str = "transformctl.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(config_dir) = env_override(ENV_CONFIG_DIR) {
            return Ok(Self { config_dir });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

/// Resolves the config file to read. An explicit path must exist; the
/// discovered default is optional.
pub fn resolve_config_file(explicit: Option<&Path>, paths: &AppPaths) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(anyhow!("config file {} does not exist", path.display()));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let discovered = paths.config_file();
    let exists = discovered
        .try_exists()
        .with_context(|| format!("failed to inspect {}", discovered.display()))?;
    Ok(exists.then_some(discovered))
}
