//! Moving tracked packages to the origin the configuration now asks for.
//!
//! Per package: remove -> (repository swap) -> install -> re-track, with a
//! rollback to the old origin when any step after removal fails. After a
//! successful move, the old repository is removed once nothing tracked
//! references it anymore.

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::fmt;

use super::origin::Origin;
use super::router::Router;
use super::tracking::{ProvenanceStore, TrackedPackage};
use crate::ui::prelude::*;

/// One detected drift. Computed per run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Name of the tracked record
    pub package_name: String,
    pub generic_name: String,
    pub category: String,
    pub old_origin: Origin,
    pub new_origin: Origin,
}

impl PlanEntry {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "package": self.package_name,
            "generic_name": self.generic_name,
            "category": self.category,
            "old": self.old_origin.to_string(),
            "old_source": self.old_origin.source(),
            "new": self.new_origin.to_string(),
            "new_source": self.new_origin.source(),
        })
    }
}

/// Compare tracked records against what the configuration currently resolves to.
///
/// `current` returns the configured origin for a generic name, or `None` when
/// the package is no longer in the active configuration (those are skipped).
pub fn plan_migrations<'r, I, F>(records: I, mut current: F) -> Vec<PlanEntry>
where
    I: IntoIterator<Item = &'r TrackedPackage>,
    F: FnMut(&str) -> Option<Origin>,
{
    let mut plan = Vec::new();

    for record in records {
        let Some(new_origin) = current(&record.original_name) else {
            continue;
        };
        let Some(old_origin) = record.origin() else {
            emit(
                Level::Warn,
                "package.migrate.unknown_source",
                &format!(
                    "Skipping {}: unrecognized source '{}'",
                    record.name, record.source
                ),
                None,
            );
            continue;
        };

        if old_origin.to_string() != new_origin.to_string() {
            plan.push(PlanEntry {
                package_name: record.name.clone(),
                generic_name: record.original_name.clone(),
                category: record.category.clone(),
                old_origin,
                new_origin,
            });
        }
    }

    plan
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Remove,
    AddRepository,
    Install,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remove => "remove",
            Self::AddRepository => "add repository",
            Self::Install => "install",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Now installed from, and tracked as, the new origin
    Migrated,
    /// A step failed and the old origin was reinstalled
    RolledBack { reason: String },
    /// The rollback failed too; needs manual cleanup
    Failed {
        reason: String,
        rollback_error: String,
    },
}

#[derive(Debug, Default)]
pub struct MigrationSummary {
    pub migrated: Vec<String>,
    pub rolled_back: Vec<String>,
    pub failed: Vec<String>,
    pub cancelled: bool,
}

impl MigrationSummary {
    pub fn success(&self) -> bool {
        !self.cancelled && self.rolled_back.is_empty() && self.failed.is_empty()
    }
}

pub struct MigrationEngine<'a> {
    router: Router<'a>,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(router: Router<'a>) -> Self {
        Self { router }
    }

    /// Run a whole plan. `confirm` sees the plan once before anything changes.
    pub fn run<C>(
        &self,
        plan: &[PlanEntry],
        store: &mut ProvenanceStore,
        confirm: C,
    ) -> Result<MigrationSummary>
    where
        C: FnOnce(&[PlanEntry]) -> Result<bool>,
    {
        let mut summary = MigrationSummary::default();

        if plan.is_empty() {
            emit(
                Level::Success,
                "package.migrate.none",
                "All tracked packages match their configured sources",
                None,
            );
            return Ok(summary);
        }

        print_plan(plan);

        if !confirm(plan)? {
            emit(
                Level::Info,
                "package.migrate.cancelled",
                "Migration cancelled",
                None,
            );
            summary.cancelled = true;
            return Ok(summary);
        }

        let mut errors = serde_json::Map::new();
        for entry in plan {
            let name = entry.package_name.clone();
            match self.migrate(entry, store) {
                MigrationOutcome::Migrated => summary.migrated.push(name),
                MigrationOutcome::RolledBack { reason } => {
                    errors.insert(name.clone(), serde_json::json!({ "reason": reason }));
                    summary.rolled_back.push(name);
                }
                MigrationOutcome::Failed {
                    reason,
                    rollback_error,
                } => {
                    errors.insert(
                        name.clone(),
                        serde_json::json!({ "reason": reason, "rollback_error": rollback_error }),
                    );
                    summary.failed.push(name);
                }
            }
        }

        let level = if summary.success() {
            Level::Success
        } else {
            Level::Error
        };
        emit(
            level,
            "package.migrate.summary",
            &format!(
                "Migration finished: {} migrated, {} rolled back, {} failed",
                summary.migrated.len(),
                summary.rolled_back.len(),
                summary.failed.len()
            ),
            Some(serde_json::json!({
                "migrated": summary.migrated,
                "rolled_back": summary.rolled_back,
                "failed": summary.failed,
                "errors": errors,
            })),
        );

        Ok(summary)
    }

    /// Move one package from its old origin to its new one.
    pub fn migrate(&self, entry: &PlanEntry, store: &mut ProvenanceStore) -> MigrationOutcome {
        let old = &entry.old_origin;
        let new = &entry.new_origin;

        emit(
            Level::Info,
            "package.migrate.start",
            &format!("Migrating {}: {} → {}", entry.package_name, old, new),
            None,
        );

        // The repository may already be gone; that is fine
        if let Err(err) = self.router.disable_repository(old) {
            emit(
                Level::Warn,
                "package.migrate.disable_failed",
                &format!("Could not disable {}: {:#}", old.source(), err),
                None,
            );
        }

        if let Err(err) = self.router.remove_one(old) {
            return self.rollback(entry, Step::Remove, err, store);
        }
        if let Err(err) = self.router.add_repository(new) {
            return self.rollback(entry, Step::AddRepository, err, store);
        }
        if let Err(err) = self.router.install_one(new) {
            return self.rollback(entry, Step::Install, err, store);
        }

        let new_name = new.installable_name();
        if new_name != entry.package_name {
            if let Err(err) = store.untrack(&entry.package_name) {
                emit(
                    Level::Debug,
                    "package.tracking.failed",
                    &format!("Could not untrack {}: {:#}", entry.package_name, err),
                    None,
                );
            }
        }
        if let Err(err) = store.track(new_name, new, &entry.category, &entry.generic_name) {
            emit(
                Level::Debug,
                "package.tracking.failed",
                &format!("Could not track {}: {:#}", new_name, err),
                None,
            );
        }

        emit(
            Level::Success,
            "package.migrate.done",
            &format!("✓ {} now comes from {}", new_name, new.source()),
            None,
        );

        self.cleanup(old, store);
        MigrationOutcome::Migrated
    }

    fn rollback(
        &self,
        entry: &PlanEntry,
        step: Step,
        err: anyhow::Error,
        store: &ProvenanceStore,
    ) -> MigrationOutcome {
        let old = &entry.old_origin;
        let new = &entry.new_origin;
        let reason = format!("{} failed: {:#}", step, err);

        emit(
            Level::Warn,
            "package.migrate.rolling_back",
            &format!(
                "{} for {}; restoring {}",
                reason, entry.package_name, old
            ),
            None,
        );

        // The new repository was added for this package only
        if step == Step::Install
            && new.repository().is_some()
            && new.source() != old.source()
            && store.packages_referencing(new).is_empty()
        {
            if let Err(err) = self.router.remove_repository(new) {
                emit(
                    Level::Warn,
                    "package.migrate.repo_remove_failed",
                    &format!("Could not remove {}: {:#}", new.source(), err),
                    None,
                );
            }
        }

        if let Err(err) = self.router.add_repository(old) {
            emit(
                Level::Warn,
                "package.migrate.restore_repo_failed",
                &format!("Could not restore {}: {:#}", old.source(), err),
                None,
            );
        }

        match self.router.install_one(old) {
            Ok(()) => {
                emit(
                    Level::Warn,
                    "package.migrate.rolled_back",
                    &format!(
                        "↺ {} rolled back to {} ({})",
                        entry.package_name,
                        old.source(),
                        reason
                    ),
                    None,
                );
                MigrationOutcome::RolledBack { reason }
            }
            Err(rollback_err) => {
                let rollback_error = format!("{:#}", rollback_err);
                emit(
                    Level::Error,
                    "package.migrate.unrecoverable",
                    &format!(
                        "✗ {} could not be restored ({}); reinstall '{}' manually: {}",
                        entry.package_name,
                        reason,
                        old.installable_name(),
                        rollback_error
                    ),
                    None,
                );
                MigrationOutcome::Failed {
                    reason,
                    rollback_error,
                }
            }
        }
    }

    /// Remove the old repository once no tracked package uses it.
    fn cleanup(&self, old: &Origin, store: &ProvenanceStore) {
        if old.repository().is_none() {
            return;
        }

        let users = store.packages_referencing(old);
        if !users.is_empty() {
            emit(
                Level::Info,
                "package.migrate.repo_kept",
                &format!("Keeping {}, still used by {}", old.source(), users.join(", ")),
                None,
            );
            // Disabled before the removal; the remaining users still need it
            if let Err(err) = self.router.reenable_repository(old) {
                emit(
                    Level::Warn,
                    "package.migrate.reenable_failed",
                    &format!("Could not re-enable {}: {:#}", old.source(), err),
                    None,
                );
            }
            return;
        }

        match self.router.remove_repository(old) {
            Ok(()) => emit(
                Level::Info,
                "package.migrate.repo_removed",
                &format!("Removed unused repository {}", old.source()),
                None,
            ),
            Err(err) => emit(
                Level::Warn,
                "package.migrate.repo_remove_failed",
                &format!("Could not remove {}: {:#}", old.source(), err),
                None,
            ),
        }
    }
}

/// Show the before/after plan, as a table or a JSON array.
pub fn print_plan(plan: &[PlanEntry]) {
    if get_output_format() == OutputFormat::Json {
        emit_json(&serde_json::Value::Array(
            plan.iter().map(PlanEntry::to_json).collect(),
        ));
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Package", "Category", "Installed from", "Configured"]);
    for entry in plan {
        table.add_row(vec![
            entry.package_name.clone(),
            entry.category.clone(),
            entry.old_origin.to_string(),
            entry.new_origin.to_string(),
        ]);
    }

    emit(
        Level::Info,
        "package.migrate.plan",
        &format!("{} package(s) have a changed source:", plan.len()),
        None,
    );
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Distro;
    use crate::common::config::Settings;
    use crate::package::executor::testing::RecordingExecutor;

    fn copr(repo: &str, package: &str) -> Origin {
        Origin::CooperativeRepo {
            repo: repo.to_string(),
            package: package.to_string(),
        }
    }

    fn store(dir: &tempfile::TempDir, distro: Distro) -> ProvenanceStore {
        ProvenanceStore::open(dir.path().join("package_tracking.toml"), distro).unwrap()
    }

    fn entry(name: &str, old: Origin, new: Origin) -> PlanEntry {
        PlanEntry {
            package_name: name.to_string(),
            generic_name: name.to_string(),
            category: "dev".to_string(),
            old_origin: old,
            new_origin: new,
        }
    }

    #[test]
    fn test_plan_detects_changed_copr() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("lazygit", &copr("atim/lazygit", "lazygit"), "dev", "lazygit")
            .unwrap();

        let plan = plan_migrations(store.list(), |name| {
            (name == "lazygit").then(|| copr("dejan/lazygit", "lazygit"))
        });

        assert_eq!(
            plan,
            vec![PlanEntry {
                package_name: "lazygit".to_string(),
                generic_name: "lazygit".to_string(),
                category: "dev".to_string(),
                old_origin: copr("atim/lazygit", "lazygit"),
                new_origin: copr("dejan/lazygit", "lazygit"),
            }]
        );
    }

    #[test]
    fn test_plan_skips_unchanged_and_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("starship", &copr("atim/starship", "starship"), "dev", "starship")
            .unwrap();
        store
            .track("neofetch", &copr("old/neofetch", "neofetch"), "apps", "neofetch")
            .unwrap();

        // starship unchanged, neofetch no longer configured
        let plan = plan_migrations(store.list(), |name| match name {
            "starship" => Some(copr("atim/starship", "starship")),
            _ => None,
        });

        assert!(plan.is_empty());
        assert_eq!(store.get_source("neofetch"), Some(copr("old/neofetch", "neofetch")));
    }

    #[test]
    fn test_successful_migration_removes_unused_repo_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("lazygit", &copr("atim/lazygit", "lazygit"), "dev", "lazygit")
            .unwrap();

        let exec = RecordingExecutor::new();
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let outcome = engine.migrate(
            &entry(
                "lazygit",
                copr("atim/lazygit", "lazygit"),
                copr("dejan/lazygit", "lazygit"),
            ),
            &mut store,
        );

        assert_eq!(outcome, MigrationOutcome::Migrated);
        assert_eq!(
            exec.lines(),
            vec![
                "sudo dnf copr disable atim/lazygit".to_string(),
                "sudo dnf remove -y lazygit".to_string(),
                "sudo dnf copr enable -y dejan/lazygit".to_string(),
                "sudo dnf install -y lazygit".to_string(),
                "sudo dnf copr remove atim/lazygit".to_string(),
            ]
        );
        assert_eq!(store.get_source("lazygit"), Some(copr("dejan/lazygit", "lazygit")));
        assert!(store.packages_referencing(&copr("atim/lazygit", "lazygit")).is_empty());
    }

    #[test]
    fn test_shared_repo_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("starship", &copr("atim/tools", "starship"), "dev", "starship")
            .unwrap();
        store
            .track("lazygit", &copr("atim/tools", "lazygit"), "dev", "lazygit")
            .unwrap();

        let exec = RecordingExecutor::new();
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let outcome = engine.migrate(
            &entry(
                "lazygit",
                copr("atim/tools", "lazygit"),
                Origin::Native("lazygit".to_string()),
            ),
            &mut store,
        );

        assert_eq!(outcome, MigrationOutcome::Migrated);
        assert_eq!(
            exec.lines(),
            vec![
                "sudo dnf copr disable atim/tools".to_string(),
                "sudo dnf remove -y lazygit".to_string(),
                "sudo dnf install -y lazygit".to_string(),
                "sudo dnf copr enable -y atim/tools".to_string(),
            ]
        );
        assert_eq!(store.get("lazygit").unwrap().source, "official");
    }

    #[test]
    fn test_repo_add_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("pkgX", &Origin::Native("pkgX".to_string()), "apps", "pkgX")
            .unwrap();

        let exec = RecordingExecutor::new().fail_on(&["sudo", "dnf", "copr", "enable", "-y", "u/r"]);
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let outcome = engine.migrate(
            &entry("pkgX", Origin::Native("pkgX".to_string()), copr("u/r", "pkgX")),
            &mut store,
        );

        assert!(matches!(outcome, MigrationOutcome::RolledBack { .. }));
        assert_eq!(
            exec.lines(),
            vec![
                "sudo dnf remove -y pkgX".to_string(),
                "sudo dnf copr enable -y u/r".to_string(),
                "sudo dnf install -y pkgX".to_string(),
            ]
        );
        assert_eq!(store.get_source("pkgX"), Some(Origin::Native("pkgX".to_string())));
    }

    #[test]
    fn test_install_failure_removes_newly_added_repo() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("pkgX", &Origin::Native("pkgX".to_string()), "apps", "pkgX")
            .unwrap();

        let exec =
            RecordingExecutor::new().fail_on(&["sudo", "dnf", "install", "-y", "pkgx-nightly"]);
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let outcome = engine.migrate(
            &PlanEntry {
                package_name: "pkgX".to_string(),
                generic_name: "pkgX".to_string(),
                category: "apps".to_string(),
                old_origin: Origin::Native("pkgX".to_string()),
                new_origin: copr("u/r", "pkgx-nightly"),
            },
            &mut store,
        );

        assert!(matches!(outcome, MigrationOutcome::RolledBack { .. }));
        assert_eq!(
            exec.lines(),
            vec![
                "sudo dnf remove -y pkgX".to_string(),
                "sudo dnf copr enable -y u/r".to_string(),
                "sudo dnf install -y pkgx-nightly".to_string(),
                "sudo dnf copr remove u/r".to_string(),
                "sudo dnf install -y pkgX".to_string(),
            ]
        );
        assert_eq!(store.get_source("pkgX"), Some(Origin::Native("pkgX".to_string())));
    }

    #[test]
    fn test_failed_rollback_is_unrecoverable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("pkgX", &Origin::Native("pkgX".to_string()), "apps", "pkgX")
            .unwrap();

        let exec = RecordingExecutor::new().fail_on(&["sudo", "dnf", "install"]);
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let outcome = engine.migrate(
            &entry("pkgX", Origin::Native("pkgX".to_string()), copr("u/r", "pkgX")),
            &mut store,
        );

        assert!(matches!(outcome, MigrationOutcome::Failed { .. }));
        assert_eq!(store.get_source("pkgX"), Some(Origin::Native("pkgX".to_string())));
    }

    #[test]
    fn test_renamed_package_is_retracked_under_new_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Debian);
        store
            .track("fd", &Origin::Native("fd".to_string()), "dev", "fd")
            .unwrap();

        let exec = RecordingExecutor::new();
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Debian, &exec, &settings));

        let outcome = engine.migrate(
            &entry("fd", Origin::Native("fd".to_string()), Origin::Renamed("fd-find".to_string())),
            &mut store,
        );

        assert_eq!(outcome, MigrationOutcome::Migrated);
        assert!(store.get("fd").is_none());
        let record = store.get("fd-find").unwrap();
        assert_eq!(record.original_name, "fd");
        assert_eq!(record.category, "dev");
    }

    #[test]
    fn test_run_continues_after_failure_and_tallies() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        store
            .track("a", &copr("old/a", "a"), "dev", "a")
            .unwrap();
        store
            .track("b", &copr("old/b", "b"), "dev", "b")
            .unwrap();

        let exec = RecordingExecutor::new().fail_on(&["sudo", "dnf", "copr", "enable", "-y", "new/a"]);
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let plan = vec![
            entry("a", copr("old/a", "a"), copr("new/a", "a")),
            entry("b", copr("old/b", "b"), copr("new/b", "b")),
        ];
        let mut confirmations = 0;
        let summary = engine
            .run(&plan, &mut store, |p| {
                confirmations += 1;
                assert_eq!(p.len(), 2);
                Ok(true)
            })
            .unwrap();

        assert_eq!(confirmations, 1);
        assert_eq!(summary.rolled_back, vec!["a".to_string()]);
        assert_eq!(summary.migrated, vec!["b".to_string()]);
        assert!(!summary.success());
        assert_eq!(store.get_source("b"), Some(copr("new/b", "b")));
    }

    #[test]
    fn test_declined_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir, Distro::Fedora);
        let exec = RecordingExecutor::new();
        let settings = Settings::default();
        let engine = MigrationEngine::new(Router::new(Distro::Fedora, &exec, &settings));

        let plan = vec![entry("a", copr("old/a", "a"), copr("new/a", "a"))];
        let summary = engine.run(&plan, &mut store, |_| Ok(false)).unwrap();

        assert!(summary.cancelled);
        assert!(exec.calls().is_empty());
    }
}
