//! Platform paths for the pool config and simulation state

use std::path::{Path, PathBuf};

const APP_DIR: &str = "equitycraft";
const CONFIG_FILE: &str = "pools.json";
const STATE_FILE: &str = "ledger-state.json";

/// Expand a leading `~` to the user's home directory
///
/// ```
/// use equitycraft_store::expand_path;
/// use std::path::PathBuf;
///
/// let path = expand_path(&PathBuf::from("~/pools.json"));
/// assert!(!path.starts_with("~"));
/// ```
pub fn expand_path(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

/// Per-platform base directory, honouring the XDG variable on Linux
fn platform_dir(xdg_var: &str, linux_fallback: &str) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let _ = (xdg_var, linux_fallback);
        home_dir()
            .map(|h| h.join("Library/Application Support/EquityCraft"))
            .unwrap_or_else(|| PathBuf::from(".equitycraft"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var(xdg_var)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                home_dir()
                    .map(|h| h.join(linux_fallback))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join(APP_DIR)
    }
    #[cfg(target_os = "windows")]
    {
        let _ = (xdg_var, linux_fallback);
        std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("EquityCraft")
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = (xdg_var, linux_fallback);
        home_dir()
            .map(|h| h.join(".equitycraft"))
            .unwrap_or_else(|| PathBuf::from(".equitycraft"))
    }
}

/// Default config directory
///
/// - macOS: `~/Library/Application Support/EquityCraft`
/// - Linux: `~/.config/equitycraft`
/// - Windows: `%APPDATA%\EquityCraft`
pub fn default_config_dir() -> PathBuf {
    platform_dir("XDG_CONFIG_HOME", ".config")
}

/// Default data directory (`~/.local/share/equitycraft` on Linux)
pub fn default_data_dir() -> PathBuf {
    platform_dir("XDG_DATA_HOME", ".local/share")
}

/// Default pool config file
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE)
}

/// Default simulated ledger state file
pub fn default_state_path() -> PathBuf {
    default_data_dir().join(STATE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_no_tilde() {
        let path = PathBuf::from("/etc/equitycraft/pools.json");
        assert_eq!(expand_path(&path), path);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/cfg/pools.json"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("cfg/pools.json"));
    }

    #[test]
    fn test_default_paths() {
        assert!(default_config_path().ends_with(CONFIG_FILE));
        assert!(default_state_path().ends_with(STATE_FILE));
        let dir = default_config_dir().to_string_lossy().to_lowercase();
        assert!(dir.contains("equitycraft"));
    }
}
