//! Where a resolved package comes from.
//!
//! Mapping values arrive as tagged strings (`COPR:atim/starship`). They are
//! parsed into [`Origin`] once, at the resolver boundary; everything past
//! that point matches on the enum.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const COPR_TAG: &str = "COPR:";
pub const AUR_TAG: &str = "AUR:";
pub const PPA_TAG: &str = "PPA:";
pub const FLATPAK_TAG: &str = "FLATPAK:";

/// Provenance `source` value for packages from the distribution's own repositories.
pub const OFFICIAL_SOURCE: &str = "official";
pub const DEFAULT_FLATPAK_REMOTE: &str = "flathub";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// No mapping: the generic name is installable as-is.
    Native(String),
    /// Official repositories under a distribution-specific name.
    Renamed(String),
    /// Fedora COPR project that must be enabled first.
    CooperativeRepo { repo: String, package: String },
    /// Arch User Repository, installed through a helper.
    UserRepo(String),
    /// Ubuntu PPA that must be added and refreshed first.
    PersonalArchive { repo: String, package: String },
    /// Flatpak application from the given remote.
    Sandboxed { remote: String, app_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Native,
    Renamed,
    CooperativeRepo,
    UserRepo,
    PersonalArchive,
    Sandboxed,
}

impl OriginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Renamed => "renamed",
            Self::CooperativeRepo => "copr",
            Self::UserRepo => "aur",
            Self::PersonalArchive => "ppa",
            Self::Sandboxed => "flatpak",
        }
    }
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedValue {
    #[error("empty mapping value")]
    Empty,
    #[error("`{0}` has no repository identifier")]
    MissingRepository(String),
    #[error("`{0}` has no installable name and none can be inferred")]
    MissingName(String),
}

impl Origin {
    /// Parse a raw mapping value for `generic`.
    ///
    /// Tags are checked in a fixed order before falling back to a plain
    /// (possibly renamed) package. For repository tags the installable name
    /// is the text after the second `:`, or the last `/` segment of the
    /// repository identifier when that is omitted.
    pub fn from_mapping(generic: &str, raw: &str) -> Result<Self, MalformedValue> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(MalformedValue::Empty);
        }

        if let Some(rest) = value.strip_prefix(COPR_TAG) {
            let (repo, package) = split_repo_value(value, rest)?;
            return Ok(Self::CooperativeRepo { repo, package });
        }

        if let Some(rest) = value.strip_prefix(AUR_TAG) {
            let package = rest.trim();
            if package.is_empty() {
                return Err(MalformedValue::MissingName(value.to_string()));
            }
            return Ok(Self::UserRepo(package.to_string()));
        }

        if let Some(rest) = value.strip_prefix(PPA_TAG) {
            let (repo, package) = split_repo_value(value, rest)?;
            return Ok(Self::PersonalArchive { repo, package });
        }

        if let Some(rest) = value.strip_prefix(FLATPAK_TAG) {
            let (remote, app_id) = match rest.split_once(':') {
                Some((remote, app_id)) => (remote.trim(), app_id.trim()),
                None => (DEFAULT_FLATPAK_REMOTE, rest.trim()),
            };
            if remote.is_empty() {
                return Err(MalformedValue::MissingRepository(value.to_string()));
            }
            if app_id.is_empty() {
                return Err(MalformedValue::MissingName(value.to_string()));
            }
            return Ok(Self::Sandboxed {
                remote: remote.to_string(),
                app_id: app_id.to_string(),
            });
        }

        if value == generic {
            Ok(Self::Native(value.to_string()))
        } else {
            Ok(Self::Renamed(value.to_string()))
        }
    }

    /// Rebuild an origin from the `source` / `mapped_name` pair stored in a
    /// provenance record. Returns `None` for a source string this version
    /// does not understand.
    pub fn from_record(source: &str, mapped_name: &str, original_name: &str) -> Option<Self> {
        let package = mapped_name.to_string();

        if source == OFFICIAL_SOURCE {
            return Some(if mapped_name == original_name {
                Self::Native(package)
            } else {
                Self::Renamed(package)
            });
        }
        if source == AUR_TAG.trim_end_matches(':') {
            return Some(Self::UserRepo(package));
        }
        if let Some(repo) = source.strip_prefix(COPR_TAG) {
            return Some(Self::CooperativeRepo {
                repo: repo.to_string(),
                package,
            });
        }
        if let Some(repo) = source.strip_prefix(PPA_TAG) {
            return Some(Self::PersonalArchive {
                repo: repo.to_string(),
                package,
            });
        }
        if let Some(remote) = source.strip_prefix(FLATPAK_TAG) {
            return Some(Self::Sandboxed {
                remote: remote.to_string(),
                app_id: package,
            });
        }
        None
    }

    pub fn kind(&self) -> OriginKind {
        match self {
            Self::Native(_) => OriginKind::Native,
            Self::Renamed(_) => OriginKind::Renamed,
            Self::CooperativeRepo { .. } => OriginKind::CooperativeRepo,
            Self::UserRepo(_) => OriginKind::UserRepo,
            Self::PersonalArchive { .. } => OriginKind::PersonalArchive,
            Self::Sandboxed { .. } => OriginKind::Sandboxed,
        }
    }

    /// The name handed to the installing tool.
    pub fn installable_name(&self) -> &str {
        match self {
            Self::Native(name) | Self::Renamed(name) | Self::UserRepo(name) => name,
            Self::CooperativeRepo { package, .. } | Self::PersonalArchive { package, .. } => {
                package
            }
            Self::Sandboxed { app_id, .. } => app_id,
        }
    }

    /// Repository that has to be enabled before installing, and that may be
    /// garbage-collected once nothing references it.
    pub fn repository(&self) -> Option<&str> {
        match self {
            Self::CooperativeRepo { repo, .. } | Self::PersonalArchive { repo, .. } => Some(repo),
            _ => None,
        }
    }

    /// The `source` field of a provenance record.
    ///
    /// Two origins with the same source share a repository, which is what
    /// repository cleanup keys on.
    pub fn source(&self) -> String {
        match self {
            Self::Native(_) | Self::Renamed(_) => OFFICIAL_SOURCE.to_string(),
            Self::CooperativeRepo { repo, .. } => format!("{COPR_TAG}{repo}"),
            Self::UserRepo(_) => AUR_TAG.trim_end_matches(':').to_string(),
            Self::PersonalArchive { repo, .. } => format!("{PPA_TAG}{repo}"),
            Self::Sandboxed { remote, .. } => format!("{FLATPAK_TAG}{remote}"),
        }
    }
}

/// Canonical mapping-value form; drift detection compares these strings.
impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(name) | Self::Renamed(name) => f.write_str(name),
            Self::CooperativeRepo { repo, package } => write!(f, "{COPR_TAG}{repo}:{package}"),
            Self::UserRepo(name) => write!(f, "{AUR_TAG}{name}"),
            Self::PersonalArchive { repo, package } => write!(f, "{PPA_TAG}{repo}:{package}"),
            Self::Sandboxed { remote, app_id } => write!(f, "{FLATPAK_TAG}{remote}:{app_id}"),
        }
    }
}

fn split_repo_value(value: &str, rest: &str) -> Result<(String, String), MalformedValue> {
    let (repo, explicit) = match rest.split_once(':') {
        Some((repo, name)) => (repo.trim(), Some(name.trim())),
        None => (rest.trim(), None),
    };
    if repo.is_empty() {
        return Err(MalformedValue::MissingRepository(value.to_string()));
    }

    let package = match explicit {
        Some(name) if !name.is_empty() => name,
        _ => repo.rsplit('/').next().unwrap_or_default().trim(),
    };
    if package.is_empty() {
        return Err(MalformedValue::MissingName(value.to_string()));
    }

    Ok((repo.to_string(), package.to_string()))
}
