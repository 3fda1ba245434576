//! Generic package name -> concrete origin for one distribution.

use serde::Serialize;
use std::collections::HashMap;

use super::mapping::MappingTable;
use super::origin::{Origin, OriginKind};
use crate::common::Distro;
use crate::ui::prelude::*;

/// A generic name together with the origin it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub generic_name: String,
    pub origin: Origin,
}

/// Provenance fields captured at resolution time, consumed after install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub kind: OriginKind,
    pub category: String,
    pub installable_name: String,
}

/// Per-run side table of everything the resolver handed out.
#[derive(Debug, Default)]
pub struct ResolutionLog {
    entries: HashMap<String, Resolution>,
}

impl ResolutionLog {
    pub fn get(&self, generic_name: &str) -> Option<&Resolution> {
        self.entries.get(generic_name)
    }

    fn record(&mut self, generic_name: &str, origin: &Origin, category: &str) {
        self.entries.insert(
            generic_name.to_string(),
            Resolution {
                kind: origin.kind(),
                category: category.to_string(),
                installable_name: origin.installable_name().to_string(),
            },
        );
    }
}

#[derive(Debug)]
pub struct Resolver {
    distro: Distro,
    mappings: MappingTable,
    log: ResolutionLog,
}

impl Resolver {
    pub fn new(distro: Distro, mappings: MappingTable) -> Self {
        Self {
            distro,
            mappings,
            log: ResolutionLog::default(),
        }
    }

    /// Resolve without recording anything. Never fails: unmapped names are
    /// native and malformed values degrade to native with a warning.
    pub fn lookup(&self, generic_name: &str) -> Origin {
        let Some(raw) = self.mappings.get(generic_name, self.distro) else {
            return Origin::Native(generic_name.to_string());
        };

        match Origin::from_mapping(generic_name, raw) {
            Ok(origin) => origin,
            Err(err) => {
                emit(
                    Level::Warn,
                    "package.resolve.malformed",
                    &format!(
                        "Ignoring mapping.{}.{} ({}); installing '{}' from official repositories",
                        self.distro, generic_name, err, generic_name
                    ),
                    Some(serde_json::json!({
                        "distro": self.distro.config_key(),
                        "generic": generic_name,
                        "value": raw,
                    })),
                );
                Origin::Native(generic_name.to_string())
            }
        }
    }

    /// Resolve `generic_name` and remember its provenance fields for this run.
    pub fn resolve(&mut self, generic_name: &str, category: &str) -> ResolvedPackage {
        let origin = self.lookup(generic_name);
        self.log.record(generic_name, &origin, category);

        emit(
            Level::Debug,
            "package.resolve",
            &format!("{} -> {} ({})", generic_name, origin, origin.kind()),
            None,
        );

        ResolvedPackage {
            generic_name: generic_name.to_string(),
            origin,
        }
    }

    pub fn log(&self) -> &ResolutionLog {
        &self.log
    }
}
