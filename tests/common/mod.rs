use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch XDG directories so tests never touch the real configuration.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        fs::create_dir_all(temp_dir.path().join("config/distropkg"))?;
        fs::create_dir_all(temp_dir.path().join("data/distropkg"))?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Value for `XDG_CONFIG_HOME`
    pub fn config_home(&self) -> PathBuf {
        self.path().join("config")
    }

    /// Value for `XDG_DATA_HOME`
    pub fn data_home(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn tracking_file(&self) -> PathBuf {
        self.data_home().join("distropkg/package_tracking.toml")
    }

    /// Write `packages.toml`
    pub fn write_packages(&self, content: &str) -> Result<()> {
        fs::write(self.config_home().join("distropkg/packages.toml"), content)?;
        Ok(())
    }

    /// Write a drop-in under `packages.d/`
    pub fn write_dropin(&self, name: &str, content: &str) -> Result<()> {
        let dir = self.config_home().join("distropkg/packages.d");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(name), content)?;
        Ok(())
    }

    /// Seed the provenance store directly
    pub fn write_tracking(&self, content: &str) -> Result<()> {
        fs::write(self.tracking_file(), content)?;
        Ok(())
    }
}
