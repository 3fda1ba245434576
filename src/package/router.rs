//! Batched installation routed by origin.
//!
//! A batch is partitioned into buckets by origin kind. Repositories needed by
//! a bucket are enabled once per batch, metadata is refreshed once, and each
//! bucket is installed with a single call. Buckets fail independently.

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::executor::{Executor, run_checked};
use super::manager::{self, PackageManager};
use super::origin::Origin;
use super::resolver::{ResolutionLog, ResolvedPackage};
use super::tracking::{DEFAULT_CATEGORY, ProvenanceStore};
use super::PackageError;
use crate::common::Distro;
use crate::common::config::Settings;
use crate::ui::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    /// Native and renamed packages from official repositories
    Regular,
    CooperativeRepo,
    UserRepo,
    PersonalArchive,
    Sandboxed,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regular => "official",
            Self::CooperativeRepo => "COPR",
            Self::UserRepo => "AUR",
            Self::PersonalArchive => "PPA",
            Self::Sandboxed => "Flatpak",
        })
    }
}

#[derive(Debug, Default)]
struct Buckets {
    regular: Vec<ResolvedPackage>,
    copr: BTreeMap<String, Vec<ResolvedPackage>>,
    aur: Vec<ResolvedPackage>,
    ppa: BTreeMap<String, Vec<ResolvedPackage>>,
    flatpak: BTreeMap<String, Vec<ResolvedPackage>>,
}

/// Result of one install call (or of the repository step that prevented it).
#[derive(Debug)]
pub struct BucketOutcome {
    pub kind: BucketKind,
    pub label: String,
    pub packages: Vec<ResolvedPackage>,
    pub error: Option<String>,
}

impl BucketOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn installable_names(&self) -> Vec<&str> {
        self.packages
            .iter()
            .map(|p| p.origin.installable_name())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BucketOutcome>,
}

impl BatchReport {
    /// True only if every bucket succeeded.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(BucketOutcome::succeeded)
    }

    pub fn failed_packages(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .flat_map(|o| o.packages.iter().map(|p| p.generic_name.as_str()))
            .collect()
    }

    pub fn installed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.packages.len())
            .sum()
    }

    /// One line per bucket, then a tally. Failed packages are always named.
    pub fn print_summary(&self) {
        for outcome in &self.outcomes {
            let names = outcome.installable_names().join(", ");
            match &outcome.error {
                None => emit(
                    Level::Success,
                    "package.install.bucket_ok",
                    &format!("✓ {}: {}", outcome.label, names),
                    Some(serde_json::json!({
                        "bucket": outcome.kind,
                        "packages": outcome.installable_names(),
                    })),
                ),
                Some(err) => emit(
                    Level::Error,
                    "package.install.bucket_failed",
                    &format!("✗ {}: {} ({})", outcome.label, names, err),
                    Some(serde_json::json!({
                        "bucket": outcome.kind,
                        "packages": outcome.installable_names(),
                        "error": err,
                    })),
                ),
            }
        }

        let failed = self.failed_packages();
        let (level, code) = if failed.is_empty() {
            (Level::Success, "package.install.done")
        } else {
            (Level::Error, "package.install.incomplete")
        };
        emit(
            level,
            code,
            &format!(
                "Installed {} package(s), {} failed",
                self.installed_count(),
                failed.len()
            ),
            Some(serde_json::json!({
                "installed": self.installed_count(),
                "failed": failed,
            })),
        );
    }
}

pub struct Router<'a> {
    distro: Distro,
    executor: &'a dyn Executor,
    settings: &'a Settings,
}

impl<'a> Router<'a> {
    pub fn new(distro: Distro, executor: &'a dyn Executor, settings: &'a Settings) -> Self {
        Self {
            distro,
            executor,
            settings,
        }
    }

    fn native(&self) -> PackageManager {
        PackageManager::native_for(self.distro)
    }

    /// Install a resolved batch and track everything that succeeded.
    ///
    /// Every bucket is attempted; the report says which ones failed.
    pub fn install_batch(
        &self,
        packages: &[ResolvedPackage],
        log: &ResolutionLog,
        store: &mut ProvenanceStore,
    ) -> BatchReport {
        let buckets = match self.distro {
            Distro::Fedora => partition_fedora(packages),
            Distro::Arch => partition_arch(packages),
            Distro::Debian => partition_debian(packages),
        };

        let mut report = BatchReport::default();
        if !buckets.regular.is_empty() {
            report.outcomes.push(self.install_regular(buckets.regular));
        }
        if !buckets.copr.is_empty() {
            report.outcomes.extend(self.install_with_repositories(
                BucketKind::CooperativeRepo,
                buckets.copr,
            ));
        }
        if !buckets.ppa.is_empty() {
            report.outcomes.extend(self.install_with_repositories(
                BucketKind::PersonalArchive,
                buckets.ppa,
            ));
        }
        if !buckets.aur.is_empty() {
            report.outcomes.push(self.install_aur(buckets.aur));
        }
        for (remote, packages) in buckets.flatpak {
            report.outcomes.push(self.install_flatpak(&remote, packages));
        }

        for outcome in report.outcomes.iter().filter(|o| o.succeeded()) {
            for package in &outcome.packages {
                track_installed(store, log, package);
            }
        }

        report
    }

    fn install_regular(&self, packages: Vec<ResolvedPackage>) -> BucketOutcome {
        let native = self.native();
        let mut outcome = BucketOutcome {
            kind: BucketKind::Regular,
            label: format!("official ({})", native.method_name()),
            packages,
            error: None,
        };
        let names = dedup(outcome.installable_names());
        outcome.error = run_checked(self.executor, &manager::install_argv(native, None, &names))
            .err()
            .map(|e| format!("{:#}", e));
        outcome
    }

    /// COPR and PPA buckets: enable each distinct repository once, refresh
    /// once, then install everything whose repository is available in one call.
    fn install_with_repositories(
        &self,
        kind: BucketKind,
        by_repo: BTreeMap<String, Vec<ResolvedPackage>>,
    ) -> Vec<BucketOutcome> {
        let already_enabled = if kind == BucketKind::CooperativeRepo {
            self.enabled_coprs()
        } else {
            BTreeSet::new()
        };

        let mut outcomes = Vec::new();
        let mut ready = Vec::new();
        let mut changed = false;

        for (repo, packages) in by_repo {
            if already_enabled.contains(&repo) {
                emit(
                    Level::Info,
                    "package.repo.already_enabled",
                    &format!("{} {} is already enabled", kind, repo),
                    None,
                );
                ready.extend(packages);
                continue;
            }

            let enable = match kind {
                BucketKind::CooperativeRepo => manager::copr_enable_argv(&repo),
                _ => manager::ppa_add_argv(&repo),
            };
            match run_checked(self.executor, &enable) {
                Ok(()) => {
                    changed = true;
                    ready.extend(packages);
                }
                Err(err) => outcomes.push(BucketOutcome {
                    kind,
                    label: format!("{} {}", kind, repo),
                    packages,
                    error: Some(format!("could not enable repository: {:#}", err)),
                }),
            }
        }

        if changed {
            self.refresh_metadata();
        }

        if !ready.is_empty() {
            let mut outcome = BucketOutcome {
                kind,
                label: kind.to_string(),
                packages: ready,
                error: None,
            };
            let names = dedup(outcome.installable_names());
            outcome.error = run_checked(
                self.executor,
                &manager::install_argv(self.native(), None, &names),
            )
            .err()
            .map(|e| format!("{:#}", e));
            outcomes.insert(0, outcome);
        }

        outcomes
    }

    fn install_aur(&self, packages: Vec<ResolvedPackage>) -> BucketOutcome {
        let mut outcome = BucketOutcome {
            kind: BucketKind::UserRepo,
            label: BucketKind::UserRepo.to_string(),
            packages,
            error: None,
        };

        let Some(helper) = manager::detect_aur_helper(self.executor, &self.settings.aur_helpers)
        else {
            outcome.error =
                Some(PackageError::NoUserRepoHelper(self.settings.aur_helpers.join(", ")).to_string());
            return outcome;
        };

        outcome.label = format!("AUR ({})", helper);
        let names = dedup(outcome.installable_names());
        outcome.error = run_checked(
            self.executor,
            &manager::install_argv(PackageManager::Aur, Some(&helper), &names),
        )
        .err()
        .map(|e| format!("{:#}", e));
        outcome
    }

    fn install_flatpak(&self, remote: &str, packages: Vec<ResolvedPackage>) -> BucketOutcome {
        let mut outcome = BucketOutcome {
            kind: BucketKind::Sandboxed,
            label: format!("Flatpak {}", remote),
            packages,
            error: None,
        };

        if let Err(err) = self.ensure_flatpak_remote(remote) {
            outcome.error = Some(format!("could not add remote: {:#}", err));
            return outcome;
        }

        let names = dedup(outcome.installable_names());
        outcome.error = run_checked(self.executor, &manager::flatpak_install_argv(remote, &names))
            .err()
            .map(|e| format!("{:#}", e));
        outcome
    }

    fn ensure_flatpak_remote(&self, remote: &str) -> Result<()> {
        match self.settings.flatpak_remotes.get(remote) {
            Some(url) => run_checked(
                self.executor,
                &manager::flatpak_remote_add_argv(remote, url),
            ),
            None => {
                emit(
                    Level::Debug,
                    "package.flatpak.remote_unknown",
                    &format!("No URL configured for remote '{}', assuming it exists", remote),
                    None,
                );
                Ok(())
            }
        }
    }

    fn enabled_coprs(&self) -> BTreeSet<String> {
        match self.executor.read(&manager::copr_list_enabled_argv()) {
            Ok(out) if out.success() => manager::parse_enabled_coprs(&out.output)
                .into_iter()
                .collect(),
            _ => {
                emit(
                    Level::Debug,
                    "package.repo.list_failed",
                    "Could not list enabled COPR repositories",
                    None,
                );
                BTreeSet::new()
            }
        }
    }

    fn refresh_metadata(&self) {
        let Some(refresh) = self.native().refresh_command() else {
            return;
        };
        if let Err(err) = run_checked(self.executor, &refresh) {
            emit(
                Level::Warn,
                "package.repo.refresh_failed",
                &format!("Metadata refresh failed, continuing: {:#}", err),
                None,
            );
        }
    }

    // Single-package steps used by migration

    /// Make the repository or remote `origin` needs available, refreshing metadata.
    pub fn add_repository(&self, origin: &Origin) -> Result<()> {
        match origin {
            Origin::CooperativeRepo { repo, .. } => {
                run_checked(self.executor, &manager::copr_enable_argv(repo))
            }
            Origin::PersonalArchive { repo, .. } => {
                run_checked(self.executor, &manager::ppa_add_argv(repo))?;
                self.refresh_metadata();
                Ok(())
            }
            Origin::Sandboxed { remote, .. } => self.ensure_flatpak_remote(remote),
            Origin::Native(_) | Origin::Renamed(_) | Origin::UserRepo(_) => Ok(()),
        }
    }

    /// Install one package assuming its repository is already available.
    pub fn install_one(&self, origin: &Origin) -> Result<()> {
        let name = origin.installable_name();
        match origin {
            Origin::Native(_) | Origin::Renamed(_) => {
                run_checked(self.executor, &manager::install_argv(self.native(), None, &[name]))
            }
            Origin::CooperativeRepo { .. } | Origin::PersonalArchive { .. } => {
                self.require_supported(origin)?;
                run_checked(self.executor, &manager::install_argv(self.native(), None, &[name]))
            }
            Origin::UserRepo(_) => {
                self.require_supported(origin)?;
                let helper = manager::detect_aur_helper(self.executor, &self.settings.aur_helpers)
                    .ok_or_else(|| {
                        PackageError::NoUserRepoHelper(self.settings.aur_helpers.join(", "))
                    })?;
                run_checked(
                    self.executor,
                    &manager::install_argv(PackageManager::Aur, Some(&helper), &[name]),
                )
            }
            Origin::Sandboxed { remote, .. } => {
                run_checked(self.executor, &manager::flatpak_install_argv(remote, &[name]))
            }
        }
    }

    /// Uninstall one package with the tool that owns it.
    pub fn remove_one(&self, origin: &Origin) -> Result<()> {
        let name = origin.installable_name();
        let manager = match origin {
            Origin::Sandboxed { .. } => PackageManager::Flatpak,
            _ => self.native(),
        };
        run_checked(self.executor, &manager::uninstall_argv(manager, &[name]))
    }

    /// Disable a COPR without deleting its configuration. Other origins have nothing to disable.
    pub fn disable_repository(&self, origin: &Origin) -> Result<()> {
        match origin {
            Origin::CooperativeRepo { repo, .. } => {
                run_checked(self.executor, &manager::copr_disable_argv(repo))
            }
            _ => Ok(()),
        }
    }

    /// Undo [`disable_repository`](Self::disable_repository).
    pub fn reenable_repository(&self, origin: &Origin) -> Result<()> {
        match origin {
            Origin::CooperativeRepo { repo, .. } => {
                run_checked(self.executor, &manager::copr_enable_argv(repo))
            }
            _ => Ok(()),
        }
    }

    /// Delete a repository definition entirely.
    pub fn remove_repository(&self, origin: &Origin) -> Result<()> {
        match origin {
            Origin::CooperativeRepo { repo, .. } => {
                run_checked(self.executor, &manager::copr_remove_argv(repo))
            }
            Origin::PersonalArchive { repo, .. } => {
                run_checked(self.executor, &manager::ppa_remove_argv(repo))
            }
            _ => Ok(()),
        }
    }

    fn require_supported(&self, origin: &Origin) -> Result<()> {
        if supports(self.distro, origin) {
            Ok(())
        } else {
            Err(PackageError::UnsupportedOrigin {
                distro: self.distro,
                origin: origin.to_string(),
            }
            .into())
        }
    }
}

/// Hand a successfully installed package to the provenance store.
/// Tracking problems never fail the install.
fn track_installed(store: &mut ProvenanceStore, log: &ResolutionLog, package: &ResolvedPackage) {
    let category = log
        .get(&package.generic_name)
        .map(|r| r.category.as_str())
        .unwrap_or(DEFAULT_CATEGORY);
    let name = package.origin.installable_name();

    if let Err(err) = store.track(name, &package.origin, category, &package.generic_name) {
        emit(
            Level::Debug,
            "package.tracking.failed",
            &format!("Could not track {}: {:#}", name, err),
            None,
        );
    }
}

fn dedup<'s>(names: Vec<&'s str>) -> Vec<&'s str> {
    let mut seen = BTreeSet::new();
    names.into_iter().filter(|n| seen.insert(*n)).collect()
}

/// Whether `distro` has a mechanism for installing from `origin`.
fn supports(distro: Distro, origin: &Origin) -> bool {
    match origin {
        Origin::CooperativeRepo { .. } => distro == Distro::Fedora,
        Origin::UserRepo(_) => distro == Distro::Arch,
        Origin::PersonalArchive { .. } => distro == Distro::Debian,
        Origin::Native(_) | Origin::Renamed(_) | Origin::Sandboxed { .. } => true,
    }
}

/// The origin a package is actually installed (and tracked) from on `distro`.
///
/// Tags the distribution has no mechanism for fall back to official
/// repositories under their installable name.
pub fn effective_origin(distro: Distro, generic_name: &str, origin: &Origin) -> Origin {
    if supports(distro, origin) {
        return origin.clone();
    }
    let name = origin.installable_name().to_string();
    if name == generic_name {
        Origin::Native(name)
    } else {
        Origin::Renamed(name)
    }
}

fn demote(distro: Distro, package: &ResolvedPackage) -> ResolvedPackage {
    let origin = effective_origin(distro, &package.generic_name, &package.origin);
    emit(
        Level::Warn,
        "package.route.unsupported",
        &format!(
            "{} is mapped to {} which {} cannot use; installing '{}' from official repositories",
            package.generic_name,
            package.origin,
            distro.display_name(),
            origin.installable_name()
        ),
        None,
    );
    ResolvedPackage {
        generic_name: package.generic_name.clone(),
        origin,
    }
}

fn push_keyed(
    map: &mut BTreeMap<String, Vec<ResolvedPackage>>,
    key: &str,
    package: &ResolvedPackage,
) {
    map.entry(key.to_string()).or_default().push(package.clone());
}

fn partition_fedora(packages: &[ResolvedPackage]) -> Buckets {
    let mut buckets = Buckets::default();
    for package in packages {
        match &package.origin {
            Origin::Native(_) | Origin::Renamed(_) => buckets.regular.push(package.clone()),
            Origin::CooperativeRepo { repo, .. } => push_keyed(&mut buckets.copr, repo, package),
            Origin::Sandboxed { remote, .. } => push_keyed(&mut buckets.flatpak, remote, package),
            Origin::UserRepo(_) | Origin::PersonalArchive { .. } => {
                buckets.regular.push(demote(Distro::Fedora, package))
            }
        }
    }
    buckets
}

fn partition_arch(packages: &[ResolvedPackage]) -> Buckets {
    let mut buckets = Buckets::default();
    for package in packages {
        match &package.origin {
            Origin::Native(_) | Origin::Renamed(_) => buckets.regular.push(package.clone()),
            Origin::UserRepo(_) => buckets.aur.push(package.clone()),
            Origin::Sandboxed { remote, .. } => push_keyed(&mut buckets.flatpak, remote, package),
            Origin::CooperativeRepo { .. } | Origin::PersonalArchive { .. } => {
                buckets.regular.push(demote(Distro::Arch, package))
            }
        }
    }
    buckets
}

fn partition_debian(packages: &[ResolvedPackage]) -> Buckets {
    let mut buckets = Buckets::default();
    for package in packages {
        match &package.origin {
            Origin::Native(_) | Origin::Renamed(_) => buckets.regular.push(package.clone()),
            Origin::PersonalArchive { repo, .. } => push_keyed(&mut buckets.ppa, repo, package),
            Origin::Sandboxed { remote, .. } => push_keyed(&mut buckets.flatpak, remote, package),
            Origin::CooperativeRepo { .. } | Origin::UserRepo(_) => {
                buckets.regular.push(demote(Distro::Debian, package))
            }
        }
    }
    buckets
}
