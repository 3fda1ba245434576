//! Package lists and per-distribution name mappings (`packages.toml`).
//!
//! ```toml
//! [packages]
//! dev = ["lazygit", "starship", "fd"]
//!
//! [mapping.fedora]
//! starship = "COPR:atim/starship"
//! lazygit = "COPR:atim/lazygit"
//!
//! [mapping.debian]
//! fd = "fd-find"
//! ```
//!
//! Files in `packages.d/*.toml` are merged afterwards in lexical order.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{Distro, paths};
use crate::ui::prelude::*;

#[derive(Debug, Default, Deserialize)]
struct PackagesFile {
    #[serde(default)]
    packages: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    mapping: BTreeMap<String, BTreeMap<String, String>>,
}

/// Raw mapping values keyed by distro section, then generic name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping. A later value for the same pair replaces the earlier one.
    pub fn insert(&mut self, distro: &str, generic: &str, value: &str) -> Option<String> {
        self.sections
            .entry(distro.to_string())
            .or_default()
            .insert(generic.to_string(), value.to_string())
    }

    pub fn get(&self, generic: &str, distro: Distro) -> Option<&str> {
        self.sections
            .get(distro.config_key())
            .and_then(|section| section.get(generic))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }
}

/// The active configuration: what the user currently asks to have installed.
#[derive(Debug, Clone, Default)]
pub struct PackageConfig {
    /// Category label -> generic names
    pub lists: BTreeMap<String, Vec<String>>,
    pub mappings: MappingTable,
}

impl PackageConfig {
    /// Load `packages.toml` plus drop-ins from the config directory.
    /// Missing files yield an empty configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::packages_file()?, &paths::packages_dropin_dir()?)
    }

    pub fn load_from(main: &Path, dropin_dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        let mut files: Vec<PathBuf> = Vec::new();
        if main.exists() {
            files.push(main.to_path_buf());
        }
        if dropin_dir.is_dir() {
            let pattern = dropin_dir.join("*.toml");
            let pattern = pattern.to_string_lossy();
            for entry in glob::glob(&pattern).context("building drop-in glob")? {
                files.push(entry.context("reading drop-in directory")?);
            }
        }

        for path in files {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            config
                .merge_str(&content, &path.display().to_string())
                .with_context(|| format!("parsing {}", path.display()))?;
        }

        emit(
            Level::Debug,
            "package.mapping.loaded",
            &format!(
                "Loaded {} mapping(s) and {} package list(s)",
                config.mappings.len(),
                config.lists.len()
            ),
            None,
        );

        Ok(config)
    }

    /// Merge one file's worth of TOML into this configuration.
    pub fn merge_str(&mut self, content: &str, origin: &str) -> Result<()> {
        let file: PackagesFile = toml::from_str(content)?;

        for (category, names) in file.packages {
            let list = self.lists.entry(category).or_default();
            for name in names {
                if !list.contains(&name) {
                    list.push(name);
                }
            }
        }

        for (distro, entries) in file.mapping {
            for (generic, value) in entries {
                if let Some(previous) = self.mappings.insert(&distro, &generic, &value) {
                    emit(
                        Level::Info,
                        "package.mapping.override",
                        &format!(
                            "mapping.{distro}: '{generic}' = '{value}' from {origin} replaces '{previous}'"
                        ),
                        Some(serde_json::json!({
                            "distro": distro,
                            "generic": generic,
                            "value": value,
                            "previous": previous,
                            "file": origin,
                        })),
                    );
                }
            }
        }

        Ok(())
    }

    /// First category listing `generic`, if any.
    pub fn category_of(&self, generic: &str) -> Option<&str> {
        self.lists
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == generic))
            .map(|(category, _)| category.as_str())
    }

    /// A package is active while it is listed or mapped for `distro`.
    pub fn is_active(&self, generic: &str, distro: Distro) -> bool {
        self.category_of(generic).is_some() || self.mappings.get(generic, distro).is_some()
    }
}
