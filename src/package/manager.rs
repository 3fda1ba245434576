//! Package manager enum and the command lines each one understands.

use super::executor::{Executor, argv};
use crate::common::Distro;

/// The tools this engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// DNF - Fedora family
    Dnf,
    /// Pacman - Arch Linux family
    Pacman,
    /// APT - Debian/Ubuntu family
    Apt,
    /// Flatpak - sandboxed apps, works on every family
    Flatpak,
    /// AUR helper (yay, paru, ...) - Arch only
    Aur,
}

impl PackageManager {
    /// Native manager of a distribution family.
    pub fn native_for(distro: Distro) -> Self {
        match distro {
            Distro::Fedora => Self::Dnf,
            Distro::Arch => Self::Pacman,
            Distro::Debian => Self::Apt,
        }
    }

    /// Get the install command prefix for this package manager.
    ///
    /// Returns the command and base arguments used to install packages. For
    /// the AUR the program is a placeholder for the detected helper.
    pub fn install_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Dnf => ("sudo", &["dnf", "install", "-y"]),
            Self::Pacman => ("sudo", &["pacman", "-S", "--needed", "--noconfirm"]),
            Self::Apt => ("sudo", &["apt", "install", "-y"]),
            Self::Flatpak => ("flatpak", &["install", "-y"]),
            Self::Aur => ("yay", &["-S", "--needed", "--noconfirm"]),
        }
    }

    /// Get the uninstall command prefix for this package manager.
    ///
    /// AUR packages are ordinary pacman packages once installed.
    pub fn uninstall_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Dnf => ("sudo", &["dnf", "remove", "-y"]),
            Self::Pacman | Self::Aur => ("sudo", &["pacman", "-Rns", "--noconfirm"]),
            Self::Apt => ("sudo", &["apt", "remove", "-y"]),
            Self::Flatpak => ("flatpak", &["uninstall", "-y"]),
        }
    }

    /// Metadata refresh after repositories were added, if the tool needs one.
    pub fn refresh_command(&self) -> Option<Vec<String>> {
        match self {
            Self::Dnf => Some(argv(["sudo", "dnf", "makecache"])),
            Self::Apt => Some(argv(["sudo", "apt", "update"])),
            Self::Pacman | Self::Flatpak | Self::Aur => None,
        }
    }

    /// Short name recorded as a package's `install_method`.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Apt => "apt",
            Self::Flatpak => "flatpak",
            Self::Aur => "aur",
        }
    }

    /// Get a human-readable name for this package manager.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Dnf => "DNF",
            Self::Pacman => "Pacman",
            Self::Apt => "APT",
            Self::Flatpak => "Flatpak",
            Self::Aur => "AUR",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Full install argv for `packages`. `program` replaces the default program
/// (used for the detected AUR helper).
pub fn install_argv(manager: PackageManager, program: Option<&str>, packages: &[&str]) -> Vec<String> {
    let (default_program, base_args) = manager.install_command();
    let mut args = argv([program.unwrap_or(default_program)]);
    args.extend(argv(base_args));
    args.extend(argv(packages));
    args
}

/// Flatpak needs the remote between the flags and the app ids.
pub fn flatpak_install_argv(remote: &str, app_ids: &[&str]) -> Vec<String> {
    let (program, base_args) = PackageManager::Flatpak.install_command();
    let mut args = argv([program]);
    args.extend(argv(base_args));
    args.push(remote.to_string());
    args.extend(argv(app_ids));
    args
}

pub fn uninstall_argv(manager: PackageManager, packages: &[&str]) -> Vec<String> {
    let (program, base_args) = manager.uninstall_command();
    let mut args = argv([program]);
    args.extend(argv(base_args));
    args.extend(argv(packages));
    args
}

// Cooperative build repositories (COPR)

pub fn copr_enable_argv(repo: &str) -> Vec<String> {
    argv(["sudo", "dnf", "copr", "enable", "-y", repo])
}

pub fn copr_disable_argv(repo: &str) -> Vec<String> {
    argv(["sudo", "dnf", "copr", "disable", repo])
}

pub fn copr_remove_argv(repo: &str) -> Vec<String> {
    argv(["sudo", "dnf", "copr", "remove", repo])
}

pub fn copr_list_enabled_argv() -> Vec<String> {
    argv(["dnf", "copr", "list", "--enabled"])
}

/// Parse `dnf copr list --enabled` output into `owner/project` identifiers.
///
/// Lines look like `copr.fedorainfracloud.org/atim/starship`. Lines marked
/// `(disabled)` are skipped.
pub fn parse_enabled_coprs(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.contains("(disabled)"))
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('/').collect();
            match parts.as_slice() {
                [.., owner, project] => Some(format!("{owner}/{project}")),
                _ => None,
            }
        })
        .collect()
}

// Personal package archives (PPA)

pub fn ppa_add_argv(repo: &str) -> Vec<String> {
    let ppa = format!("ppa:{repo}");
    argv(["sudo", "add-apt-repository", "-y", ppa.as_str()])
}

pub fn ppa_remove_argv(repo: &str) -> Vec<String> {
    let ppa = format!("ppa:{repo}");
    argv(["sudo", "add-apt-repository", "-y", "--remove", ppa.as_str()])
}

// Flatpak remotes

pub fn flatpak_remote_add_argv(remote: &str, url: &str) -> Vec<String> {
    argv(["flatpak", "remote-add", "--if-not-exists", remote, url])
}

/// Detect available AUR helper (yay, paru, etc.)
///
/// Returns the first helper in `preference` found on PATH.
pub fn detect_aur_helper(executor: &dyn Executor, preference: &[String]) -> Option<String> {
    preference
        .iter()
        .find(|helper| executor.program_exists(helper))
        .cloned()
}
