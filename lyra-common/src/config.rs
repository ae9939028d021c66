//! Configuration file and data directory resolution

use std::path::PathBuf;
use tracing::debug;

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "lyra";

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<user config dir>/lyra/config.toml`, then `/etc/lyra/config.toml` on Linux
///
/// Returns `None` when no file is found; callers fall back to built-in defaults.
/// Explicit paths (1 and 2) are returned even when missing so the caller can
/// report the error.
pub fn resolve_config_file(cli_arg: Option<&str>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    debug!("No config file found, using built-in defaults");
    None
}

/// OS-dependent data directory for databases and state
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/lyra
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib").join(APP_DIR))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/lyra
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("./lyra_data"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("./lyra_data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_file(Some("/tmp/custom.toml"), "LYRA_TEST_UNSET_VAR");
        assert_eq!(path, Some(PathBuf::from("/tmp/custom.toml")));
    }

    #[test]
    fn test_env_var_used_without_cli() {
        std::env::set_var("LYRA_TEST_CONFIG_VAR", "/tmp/from-env.toml");
        let path = resolve_config_file(None, "LYRA_TEST_CONFIG_VAR");
        std::env::remove_var("LYRA_TEST_CONFIG_VAR");
        assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));
    }

    #[test]
    fn test_data_dir_ends_with_app_dir() {
        let dir = default_data_dir();
        assert!(dir.ends_with(APP_DIR) || dir.ends_with("lyra_data"));
    }
}
