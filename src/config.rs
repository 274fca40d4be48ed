use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Name of the manifest inside the config directory
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("ds389"))
}

/// Default manifest location, `~/.config/ds389/manifest.toml`
pub fn default_manifest_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(MANIFEST_FILE))
}

/// Resolve the manifest given on the command line, or the default one
pub fn manifest_path(arg: Option<&Path>) -> Result<PathBuf> {
    match arg {
        Some(path) => Ok(expand_path(&path.to_string_lossy())),
        None => default_manifest_path(),
    }
}

/// Expand `~` in a path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
