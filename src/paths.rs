//! Centralized path resolution for wpsync
//!
//! # Environment Variables
//!
//! - `WPSYNC_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/wpsync`)
//! - `WPSYNC_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_file():
//! 1. `--config` flag
//! 2. `WPSYNC_CONFIG_DIR/wpsync.toml`
//! 3. `XDG_CONFIG_HOME/wpsync/wpsync.toml` (if set)
//! 4. `~/.config/wpsync/wpsync.toml`
//!
//! For state_dir():
//! 1. `WPSYNC_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/wpsync` (if set)
//! 3. `~/.local/state/wpsync`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "WPSYNC_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "WPSYNC_STATE_DIR";

/// Default config file name
pub const CONFIG_FILE: &str = "wpsync.toml";

/// State file name
pub const STATE_FILE: &str = "state.json";

/// Get the wpsync config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("wpsync");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("wpsync");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the config file path, honouring an explicit `--config` flag
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Get the wpsync state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("wpsync");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("wpsync");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Get the state file path
pub fn state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join(STATE_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Serializes tests that touch the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        let _env = env_guard();
        with_env_var(ENV_CONFIG_DIR, "/custom/wpsync", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/wpsync"));
            assert_eq!(
                config_file(None).unwrap(),
                PathBuf::from("/custom/wpsync/wpsync.toml")
            );
        });
    }

    #[test]
    fn test_explicit_config_wins() {
        let _env = env_guard();
        with_env_var(ENV_CONFIG_DIR, "/custom/wpsync", || {
            let path = config_file(Some(Path::new("/etc/waypoint.toml"))).unwrap();
            assert_eq!(path, PathBuf::from("/etc/waypoint.toml"));
        });
    }

    #[test]
    fn test_xdg_config_home() {
        let _env = env_guard();
        without_env_var(ENV_CONFIG_DIR, || {
            with_env_var("XDG_CONFIG_HOME", "/tmp/xdg-config-test", || {
                assert_eq!(config_dir().unwrap(), PathBuf::from("/tmp/xdg-config-test/wpsync"));
            });
        });
    }

    #[test]
    fn test_state_dir_env_override() {
        let _env = env_guard();
        with_env_var(ENV_STATE_DIR, "/custom/state", || {
            assert_eq!(state_file().unwrap(), PathBuf::from("/custom/state/state.json"));
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_default_state_dir_unix() {
        let _env = env_guard();
        without_env_var(ENV_STATE_DIR, || {
            without_env_var("XDG_STATE_HOME", || {
                let home = dirs::home_dir().unwrap();
                assert_eq!(state_dir().unwrap(), home.join(".local").join("state").join("wpsync"));
            });
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
