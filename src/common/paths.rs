use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for distropkg
/// This module provides a single source of truth for all application paths

/// Get the main config directory
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("distropkg");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Get the main data directory
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .context("Unable to determine user data directory")?
        .join("distropkg");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

/// Tool settings (`config.toml`)
pub fn settings_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Package lists and name mappings (`packages.toml`)
pub fn packages_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("packages.toml"))
}

/// Drop-in directory merged after `packages.toml`
pub fn packages_dropin_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("packages.d"))
}

/// Provenance store
pub fn tracking_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("package_tracking.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_paths_follow_xdg_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config_home = dir.path().join("config");
        let data_home = dir.path().join("data");

        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", &config_home);
            std::env::set_var("XDG_DATA_HOME", &data_home);
        }

        assert_eq!(
            settings_file().unwrap(),
            config_home.join("distropkg/config.toml")
        );
        assert_eq!(
            packages_dropin_dir().unwrap(),
            config_home.join("distropkg/packages.d")
        );
        assert_eq!(
            tracking_file().unwrap(),
            data_home.join("distropkg/package_tracking.toml")
        );
        assert!(data_home.join("distropkg").is_dir());

        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
            std::env::remove_var("XDG_DATA_HOME");
        }
    }
}
