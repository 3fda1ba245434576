//! Per-invocation context shared by every package operation.
//!
//! Other tools call into the engine through two functions only:
//! [`Session::install_packages`] and [`Session::resolve_source`].

use anyhow::Result;

use super::executor::{DryRunExecutor, Executor, SystemExecutor};
use super::mapping::PackageConfig;
use super::migration::{MigrationEngine, MigrationSummary, PlanEntry, plan_migrations};
use super::origin::Origin;
use super::resolver::Resolver;
use super::router::{BatchReport, Router, effective_origin};
use super::tracking::{DEFAULT_CATEGORY, ProvenanceStore};
use crate::common::config::Settings;
use crate::common::{Distro, paths};
use crate::ui::prelude::*;

/// How to build a [`Session`] from the environment.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Skip detection and act as this distribution
    pub distro: Option<Distro>,
    /// Print commands instead of running them, and never write the store
    pub dry_run: bool,
}

pub struct Session {
    distro: Distro,
    config: PackageConfig,
    resolver: Resolver,
    store: ProvenanceStore,
    executor: Box<dyn Executor>,
    settings: Settings,
}

impl Session {
    /// Load settings, configuration and the provenance store for this run.
    pub fn open(options: &SessionOptions) -> Result<Self> {
        let settings = Settings::load()?;
        let distro = match options.distro {
            Some(distro) => distro,
            None => match settings.distro_override()? {
                Some(distro) => distro,
                None => Distro::detect()?,
            },
        };
        emit(
            Level::Debug,
            "package.session.distro",
            &format!("Using {} package tooling", distro.display_name()),
            None,
        );

        let config = PackageConfig::load()?;
        let mut store = ProvenanceStore::open_lenient(paths::tracking_file()?, distro);

        let executor: Box<dyn Executor> = if options.dry_run {
            store.detach();
            Box::new(DryRunExecutor)
        } else {
            Box::new(SystemExecutor)
        };

        Ok(Self::from_parts(distro, config, settings, store, executor))
    }

    pub fn from_parts(
        distro: Distro,
        config: PackageConfig,
        settings: Settings,
        store: ProvenanceStore,
        executor: Box<dyn Executor>,
    ) -> Self {
        let resolver = Resolver::new(distro, config.mappings.clone());
        Self {
            distro,
            config,
            resolver,
            store,
            executor,
            settings,
        }
    }

    pub fn distro(&self) -> Distro {
        self.distro
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ProvenanceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ProvenanceStore {
        &mut self.store
    }

    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    /// Resolve and install generic names as one batch.
    ///
    /// Without an explicit category, each name takes the first list it
    /// appears in, or the default category.
    pub fn install_packages(&mut self, names: &[String], category: Option<&str>) -> BatchReport {
        let packages: Vec<_> = names
            .iter()
            .map(|name| {
                let category = category
                    .or_else(|| self.config.category_of(name))
                    .unwrap_or(DEFAULT_CATEGORY)
                    .to_string();
                self.resolver.resolve(name, &category)
            })
            .collect();

        let router = Router::new(self.distro, self.executor.as_ref(), &self.settings);
        router.install_batch(&packages, self.resolver.log(), &mut self.store)
    }

    /// The origin `generic_name` currently resolves to.
    pub fn resolve_source(&self, generic_name: &str) -> Origin {
        self.resolver.lookup(generic_name)
    }

    /// The origin `generic_name` would be installed and tracked from here,
    /// after tags this distribution cannot use fall back to official repositories.
    pub fn configured_origin(&self, generic_name: &str) -> Origin {
        effective_origin(
            self.distro,
            generic_name,
            &self.resolver.lookup(generic_name),
        )
    }

    /// Tracked packages whose configured origin has changed.
    pub fn migration_plan(&self) -> Vec<PlanEntry> {
        plan_migrations(self.store.list(), |generic| {
            self.config
                .is_active(generic, self.distro)
                .then(|| self.configured_origin(generic))
        })
    }

    pub fn run_migrations<C>(&mut self, plan: &[PlanEntry], confirm: C) -> Result<MigrationSummary>
    where
        C: FnOnce(&[PlanEntry]) -> Result<bool>,
    {
        let engine = MigrationEngine::new(Router::new(
            self.distro,
            self.executor.as_ref(),
            &self.settings,
        ));
        engine.run(plan, &mut self.store, confirm)
    }
}
