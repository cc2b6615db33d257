use crate::settings::user_error;
use anyhow::Result;
use std::path::PathBuf;

pub const STOWAWAY_DIR_NAME: &str = ".stowaway";
pub const CACHE_SUBDIR: &str = "cache";
pub const HOME_OVERRIDE_VAR: &str = "STOWAWAY_HOME";

pub fn stowaway_home() -> Result<PathBuf> {
    if let Ok(override_home) = std::env::var(HOME_OVERRIDE_VAR) {
        let trimmed = override_home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("No home directory found"))?
        .join(STOWAWAY_DIR_NAME))
}

pub fn cache_dir() -> Result<PathBuf> {
    Ok(stowaway_home()?.join(CACHE_SUBDIR))
}

pub fn config_file() -> Result<PathBuf> {
    Ok(stowaway_home()?.join("config.yaml"))
}

/// Expand `~` and `$VAR` references in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .map_err(|err| user_error(format!("failed to expand path '{raw}': {err}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
