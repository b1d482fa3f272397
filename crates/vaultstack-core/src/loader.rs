//! Stack file discovery and loading

use crate::error::{Result, StackError};
use crate::model::StackConfig;
use crate::parser::parse_stack_config;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const CONFIG_ENV_VAR: &str = "VAULTSTACK_CONFIG";
pub const STACK_FILE: &str = "stack.kdl";
pub const STACK_DIR: &str = ".vaultstack";

/// Find the stack file
///
/// Search order:
/// 1. the explicit path (from `--config`)
/// 2. environment variable `VAULTSTACK_CONFIG`
/// 3. `./stack.kdl`
/// 4. `./.vaultstack/stack.kdl`
/// 5. `~/.config/vaultstack/stack.kdl`
pub fn find_stack_file(explicit: Option<&Path>) -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_stack_file_from(&current_dir, explicit)
}

/// [`find_stack_file`] relative to a given directory
pub fn find_stack_file_from(dir: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(StackError::IoError {
            path: path.to_path_buf(),
            message: "stack file does not exist".to_string(),
        });
    }

    if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        debug!(path = %path.display(), "{} points to a missing file", CONFIG_ENV_VAR);
    }

    let candidates = [dir.join(STACK_FILE), dir.join(STACK_DIR).join(STACK_FILE)];
    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("vaultstack").join(STACK_FILE);
        if global.exists() {
            return Ok(global);
        }
    }

    Err(StackError::ConfigNotFound)
}

/// Read and parse a stack file
///
/// Relative key paths in the file resolve against the file's directory.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_stack_config(path: &Path) -> Result<StackConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config = parse_stack_config(&content)?;
    config.base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    info!(stack = %config.name, region = %config.region, "Loaded stack config");
    Ok(config)
}

/// Discover and load in one step
pub fn load_stack(explicit: Option<&Path>) -> Result<(PathBuf, StackConfig)> {
    let path = find_stack_file(explicit)?;
    let config = load_stack_config(&path)?;
    Ok((path, config))
}

/// Directory state and lock files live under
///
/// The state sits next to the stack file; a stack file inside `.vaultstack/`
/// shares that directory with its state.
pub fn project_root(stack_file: &Path) -> PathBuf {
    let dir = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|n| n == STACK_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}
