use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::package::PackageError;

/// Distribution family the engine knows how to drive.
///
/// Derivatives collapse onto their family: Ubuntu and Mint are `Debian`,
/// Manjaro and EndeavourOS are `Arch`, RHEL and Nobara are `Fedora`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distro {
    Fedora,
    Arch,
    Debian,
}

impl Distro {
    /// Detect the current distribution family from /etc/os-release
    pub fn detect() -> Result<Self> {
        Self::detect_from(Path::new("/etc/os-release"))
    }

    fn detect_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse_os_release(&content)
            .ok_or_else(|| PackageError::UnknownDistro(path.display().to_string()).into())
    }

    /// Parse os-release content and return the detected family
    pub fn parse_os_release(content: &str) -> Option<Self> {
        let mut id = String::new();
        let mut id_like = String::new();

        for line in content.lines() {
            if let Some(val) = line.strip_prefix("ID=") {
                id = val.trim_matches('"').to_string();
            } else if let Some(val) = line.strip_prefix("ID_LIKE=") {
                id_like = val.trim_matches('"').to_string();
            }
        }

        if let Ok(distro) = id.parse() {
            return Some(distro);
        }

        // For unknown IDs, check ID_LIKE for family detection
        id_like.split_whitespace().find_map(|like| like.parse().ok())
    }

    /// Section suffix used in `[mapping.<distro>]` tables.
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Fedora => "fedora",
            Self::Arch => "arch",
            Self::Debian => "debian",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fedora => "Fedora",
            Self::Arch => "Arch Linux",
            Self::Debian => "Debian",
        }
    }
}

impl FromStr for Distro {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fedora" | "rhel" | "centos" | "nobara" => Ok(Self::Fedora),
            "arch" | "manjaro" | "endeavouros" | "instantos" | "cachyos" => Ok(Self::Arch),
            "debian" | "ubuntu" | "pop" | "linuxmint" => Ok(Self::Debian),
            other => Err(PackageError::UnknownDistro(other.to_string())),
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release_direct_id() {
        let content = "NAME=\"Fedora Linux\"\nID=fedora\nVERSION_ID=40\n";
        assert_eq!(Distro::parse_os_release(content), Some(Distro::Fedora));
    }

    #[test]
    fn test_parse_os_release_falls_back_to_id_like() {
        let content = "ID=zorin\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(Distro::parse_os_release(content), Some(Distro::Debian));

        let content = "ID=garuda\nID_LIKE=arch\n";
        assert_eq!(Distro::parse_os_release(content), Some(Distro::Arch));
    }

    #[test]
    fn test_parse_os_release_unknown() {
        assert_eq!(Distro::parse_os_release("ID=void\n"), None);
    }

    #[test]
    fn test_detect_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Distro::detect_from(&dir.path().join("os-release")).is_err());
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("Ubuntu".parse::<Distro>().unwrap(), Distro::Debian);
        assert_eq!("manjaro".parse::<Distro>().unwrap(), Distro::Arch);
        assert!("gentoo".parse::<Distro>().is_err());
    }
}
