//! Provenance store: which origin every installed package came from.
//!
//! One TOML file under the data directory:
//!
//! ```toml
//! [metadata]
//! version = 1
//! created_at = "2026-01-04T10:12:00Z"
//! last_updated = "2026-01-09T18:40:31Z"
//! distro = "fedora"
//!
//! [package.starship]
//! name = "starship"
//! source = "COPR:atim/starship"
//! mapped_name = "starship"
//! installed_at = "2026-01-09T18:40:31Z"
//! install_method = "dnf-copr"
//! category = "dev"
//! original_name = "starship"
//! ```
//!
//! Every mutation takes an exclusive lock, re-reads the file, applies the
//! change and replaces the file atomically.

use anyhow::{Context, Result};
use chrono::Utc;
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::PackageError;
use super::manager::PackageManager;
use super::origin::Origin;
use crate::common::Distro;
use crate::ui::prelude::*;

pub const DEFAULT_CATEGORY: &str = "uncategorized";
const STORE_VERSION: u32 = 1;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreMetadata {
    pub version: u32,
    pub created_at: String,
    pub last_updated: String,
    pub distro: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TrackedPackage {
    pub name: String,
    pub source: String,
    pub mapped_name: String,
    pub installed_at: String,
    pub install_method: String,
    pub category: String,
    pub original_name: String,
}

impl TrackedPackage {
    /// The origin this record describes, if its source string is understood.
    pub fn origin(&self) -> Option<Origin> {
        Origin::from_record(&self.source, &self.mapped_name, &self.original_name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct TrackingFile {
    metadata: StoreMetadata,
    #[serde(default)]
    package: BTreeMap<String, TrackedPackage>,
}

impl TrackingFile {
    fn new(distro: Distro) -> Self {
        let stamp = now();
        Self {
            metadata: StoreMetadata {
                version: STORE_VERSION,
                created_at: stamp.clone(),
                last_updated: stamp,
                distro: distro.config_key().to_string(),
            },
            package: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct ProvenanceStore {
    path: PathBuf,
    distro: Distro,
    file: TrackingFile,
    /// Write changes back to disk
    persist: bool,
    /// Why the on-disk file must not be touched, if it was unreadable
    unavailable: Option<String>,
}

impl ProvenanceStore {
    /// Load the store. A missing file is an empty store; an unreadable one is an error.
    pub fn open(path: PathBuf, distro: Distro) -> Result<Self> {
        let file = read_file(&path)?.unwrap_or_else(|| TrackingFile::new(distro));
        Ok(Self {
            path,
            distro,
            file,
            persist: true,
            unavailable: None,
        })
    }

    /// Like [`open`](Self::open), but an unreadable file degrades to an empty
    /// store that refuses to write, so installs can proceed without tracking.
    pub fn open_lenient(path: PathBuf, distro: Distro) -> Self {
        match Self::open(path.clone(), distro) {
            Ok(store) => store,
            Err(err) => {
                emit(
                    Level::Warn,
                    "package.tracking.unreadable",
                    &format!(
                        "Provenance store {} is unreadable, tracking disabled for this run: {:#}",
                        path.display(),
                        err
                    ),
                    None,
                );
                Self {
                    path,
                    distro,
                    file: TrackingFile::new(distro),
                    persist: false,
                    unavailable: Some(format!("{:#}", err)),
                }
            }
        }
    }

    /// Keep all further changes in memory only.
    pub fn detach(&mut self) {
        self.persist = false;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.file.metadata
    }

    /// Record `name` as installed from `origin`. Re-tracking replaces the record.
    pub fn track(
        &mut self,
        name: &str,
        origin: &Origin,
        category: &str,
        original_name: &str,
    ) -> Result<()> {
        let category = if category.trim().is_empty() {
            DEFAULT_CATEGORY
        } else {
            category
        };
        let record = TrackedPackage {
            name: name.to_string(),
            source: origin.source(),
            mapped_name: origin.installable_name().to_string(),
            installed_at: now(),
            install_method: install_method(self.distro, origin).to_string(),
            category: category.to_string(),
            original_name: original_name.to_string(),
        };

        self.mutate(|file| {
            file.package.insert(record.name.clone(), record);
        })
    }

    /// Forget `name`. Returns whether a record existed.
    pub fn untrack(&mut self, name: &str) -> Result<bool> {
        let mut existed = false;
        self.mutate(|file| existed = file.package.remove(name).is_some())?;
        Ok(existed)
    }

    pub fn get(&self, name: &str) -> Option<&TrackedPackage> {
        self.file.package.get(name)
    }

    pub fn get_source(&self, name: &str) -> Option<Origin> {
        self.get(name).and_then(TrackedPackage::origin)
    }

    /// All records, ordered by name.
    pub fn list(&self) -> Vec<&TrackedPackage> {
        self.file.package.values().collect()
    }

    /// Names of tracked packages installed from the same source as `origin`.
    pub fn packages_referencing(&self, origin: &Origin) -> Vec<String> {
        let source = origin.source();
        self.file
            .package
            .values()
            .filter(|record| record.source == source)
            .map(|record| record.name.clone())
            .collect()
    }

    fn mutate<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut TrackingFile),
    {
        if let Some(reason) = &self.unavailable {
            return Err(PackageError::StoreUnavailable(reason.clone()).into());
        }
        if !self.persist {
            change(&mut self.file);
            return Ok(());
        }

        let _lock = lock_store(&self.path)?;

        // Another invocation may have written since we loaded
        if let Some(on_disk) = read_file(&self.path)? {
            self.file = on_disk;
        }

        change(&mut self.file);
        self.file.metadata.last_updated = now();
        self.file.metadata.distro = self.distro.config_key().to_string();

        write_atomic(&self.path, &self.file)
    }
}

/// Value of a record's `install_method` field.
fn install_method(distro: Distro, origin: &Origin) -> &'static str {
    match origin {
        Origin::Native(_) | Origin::Renamed(_) => PackageManager::native_for(distro).method_name(),
        Origin::CooperativeRepo { .. } => "dnf-copr",
        Origin::UserRepo(_) => PackageManager::Aur.method_name(),
        Origin::PersonalArchive { .. } => "apt-ppa",
        Origin::Sandboxed { .. } => PackageManager::Flatpak.method_name(),
    }
}

fn read_file(path: &Path) -> Result<Option<TrackingFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(file))
}

fn lock_store(path: &Path) -> Result<Flock<File>> {
    let lock_path = path.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("opening {}", lock_path.display()))?;

    Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| anyhow::anyhow!("locking {}: {}", lock_path.display(), errno))
}

fn write_atomic(path: &Path, file: &TrackingFile) -> Result<()> {
    let dir = path
        .parent()
        .context("provenance store path has no parent directory")?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let content = toml::to_string_pretty(file).context("serializing provenance store")?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .context("writing provenance store")?;
    tmp.as_file()
        .sync_all()
        .context("flushing provenance store")?;
    fs::set_permissions(tmp.path(), Permissions::from_mode(0o600))
        .context("restricting provenance store permissions")?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copr(repo: &str, package: &str) -> Origin {
        Origin::CooperativeRepo {
            repo: repo.to_string(),
            package: package.to_string(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> ProvenanceStore {
        ProvenanceStore::open(dir.path().join("package_tracking.toml"), Distro::Fedora).unwrap()
    }

    #[test]
    fn test_track_then_get_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let origin = copr("atim/starship", "starship");

        store.track("starship", &origin, "dev", "starship").unwrap();
        assert_eq!(store.get_source("starship"), Some(origin));
        assert_eq!(store.get_source("lazygit"), None);
    }

    #[test]
    fn test_retrack_overwrites_single_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store
            .track("lazygit", &copr("atim/lazygit", "lazygit"), "dev", "lazygit")
            .unwrap();
        store
            .track("lazygit", &copr("dejan/lazygit", "lazygit"), "tools", "lazygit")
            .unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.matches("[package.lazygit]").count(), 1);

        let reloaded = store_in(&dir);
        let record = reloaded.get("lazygit").unwrap();
        assert_eq!(record.source, "COPR:dejan/lazygit");
        assert_eq!(record.category, "tools");
        assert_eq!(reloaded.list().len(), 1);
    }

    #[test]
    fn test_record_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store
            .track("fd-find", &Origin::Renamed("fd-find".to_string()), "", "fd")
            .unwrap();

        let record = store.get("fd-find").unwrap();
        assert_eq!(record.source, "official");
        assert_eq!(record.mapped_name, "fd-find");
        assert_eq!(record.original_name, "fd");
        assert_eq!(record.category, DEFAULT_CATEGORY);
        assert_eq!(record.install_method, "dnf");
        assert!(record.installed_at.ends_with('Z'));
        assert_eq!(record.installed_at.len(), "2026-01-01T00:00:00Z".len());
    }

    #[test]
    fn test_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store
            .track("git", &Origin::Native("git".to_string()), "dev", "git")
            .unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_untrack() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store
            .track("git", &Origin::Native("git".to_string()), "dev", "git")
            .unwrap();

        assert!(store.untrack("git").unwrap());
        assert!(!store.untrack("git").unwrap());
        assert!(store_in(&dir).list().is_empty());
    }

    #[test]
    fn test_packages_referencing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store
            .track("starship", &copr("atim/starship", "starship"), "dev", "starship")
            .unwrap();
        store
            .track("lazygit", &copr("atim/lazygit", "lazygit"), "dev", "lazygit")
            .unwrap();
        store
            .track("starship-nightly", &copr("atim/starship", "starship-nightly"), "dev", "x")
            .unwrap();

        let mut names = store.packages_referencing(&copr("atim/starship", "whatever"));
        names.sort();
        assert_eq!(names, vec!["starship".to_string(), "starship-nightly".to_string()]);
        assert!(store.packages_referencing(&copr("u/r", "r")).is_empty());
    }

    #[test]
    fn test_mutation_merges_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = store_in(&dir);
        let mut second = store_in(&dir);

        first
            .track("git", &Origin::Native("git".to_string()), "dev", "git")
            .unwrap();
        second
            .track("htop", &Origin::Native("htop".to_string()), "apps", "htop")
            .unwrap();

        let reloaded = store_in(&dir);
        assert!(reloaded.get("git").is_some());
        assert!(reloaded.get("htop").is_some());
    }

    #[test]
    fn test_lenient_open_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package_tracking.toml");
        fs::write(&path, "this is [not toml").unwrap();

        assert!(ProvenanceStore::open(path.clone(), Distro::Arch).is_err());

        let mut store = ProvenanceStore::open_lenient(path.clone(), Distro::Arch);
        let err = store
            .track("git", &Origin::Native("git".to_string()), "dev", "git")
            .unwrap_err();
        assert!(err.downcast_ref::<PackageError>().is_some());
        assert_eq!(fs::read_to_string(&path).unwrap(), "this is [not toml");
    }

    #[test]
    fn test_detached_store_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.detach();
        store
            .track("git", &Origin::Native("git".to_string()), "dev", "git")
            .unwrap();

        assert!(store.get("git").is_some());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_metadata_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store
            .track("git", &Origin::Native("git".to_string()), "dev", "git")
            .unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("[metadata]"));
        assert!(content.contains("distro = \"fedora\""));
        assert_eq!(store_in(&dir).metadata().version, STORE_VERSION);
    }
}
