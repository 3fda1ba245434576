//! Tool settings stored in `config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::distro::Distro;
use super::paths;

fn default_aur_helpers() -> Vec<String> {
    ["yay", "paru", "pikaur", "trizen"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_flatpak_remotes() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "flathub".to_string(),
        "https://flathub.org/repo/flathub.flatpakrepo".to_string(),
    )])
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Overrides /etc/os-release detection when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,
    /// Community helpers for user-repository packages, in preference order
    #[serde(default = "default_aur_helpers")]
    pub aur_helpers: Vec<String>,
    /// Sandboxed app-store remotes that may be added on demand
    #[serde(default = "default_flatpak_remotes")]
    pub flatpak_remotes: BTreeMap<String, String>,
    /// Skip the migration confirmation prompt
    #[serde(default)]
    pub assume_yes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            distro: None,
            aur_helpers: default_aur_helpers(),
            flatpak_remotes: default_flatpak_remotes(),
            assume_yes: false,
        }
    }
}

impl Settings {
    /// Load the settings from disk. If the file does not exist,
    /// create a default one and return the default.
    pub fn load() -> Result<Settings> {
        Self::load_from(&paths::settings_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Settings> {
        if !path.exists() {
            let default = Settings::default();
            let toml = toml::to_string_pretty(&default).context("serializing default settings")?;
            fs::write(path, toml)
                .with_context(|| format!("writing default settings to {}", path.display()))?;
            return Ok(default);
        }
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }

    /// The configured distro override, if any
    pub fn distro_override(&self) -> Result<Option<Distro>> {
        self.distro
            .as_deref()
            .map(|d| d.parse::<Distro>().context("invalid `distro` in config.toml"))
            .transpose()
    }
}
