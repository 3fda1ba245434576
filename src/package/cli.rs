use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use dialoguer::Confirm;

use super::migration::PlanEntry;
use super::session::{Session, SessionOptions};
use super::tracking::TrackedPackage;
use crate::ui::prelude::*;

#[derive(Subcommand, Debug)]
pub enum PackageCommands {
    /// Resolve and install packages by their generic names
    Install {
        /// Generic package names
        #[arg(required = true)]
        names: Vec<String>,
        /// Category recorded for every package in this batch
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Show where a generic name would be installed from
    Resolve { name: String },
    /// Inspect the provenance store
    Track {
        #[command(subcommand)]
        command: TrackCommands,
    },
    /// Move installed packages to their newly configured sources
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum TrackCommands {
    /// List every tracked package
    List,
    /// Show one tracked package
    Show { name: String },
    /// Forget a package without uninstalling it
    Untrack { name: String },
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommands {
    /// Show which tracked packages have a changed source
    Check,
    /// Migrate every package with a changed source
    Run {
        /// Do not ask for confirmation
        #[arg(short, long, alias = "auto")]
        yes: bool,
    },
}

pub fn handle_package_command(command: PackageCommands, options: &SessionOptions) -> Result<()> {
    let mut session = Session::open(options)?;

    match command {
        PackageCommands::Install { names, category } => install(&mut session, &names, category),
        PackageCommands::Resolve { name } => {
            resolve(&session, &name);
            Ok(())
        }
        PackageCommands::Track { command } => match command {
            TrackCommands::List => {
                list_tracked(&session);
                Ok(())
            }
            TrackCommands::Show { name } => show_tracked(&session, &name),
            TrackCommands::Untrack { name } => untrack(&mut session, &name),
        },
        PackageCommands::Migrate { command } => match command {
            MigrateCommands::Check => {
                migrate_check(&session);
                Ok(())
            }
            MigrateCommands::Run { yes } => migrate_run(&mut session, yes),
        },
    }
}

fn install(session: &mut Session, names: &[String], category: Option<String>) -> Result<()> {
    let report = session.install_packages(names, category.as_deref());
    report.print_summary();

    if !report.success() {
        bail!(
            "Failed to install: {}",
            report.failed_packages().join(", ")
        );
    }
    Ok(())
}

fn resolve(session: &Session, name: &str) {
    let origin = session.resolve_source(name);
    emit(
        Level::Info,
        "package.resolve.result",
        &format!(
            "{} {} {} ({}, source: {})",
            name.bold(),
            "→".dimmed(),
            origin.installable_name(),
            origin.kind(),
            origin.source()
        ),
        Some(serde_json::json!({
            "generic_name": name,
            "distro": session.distro().config_key(),
            "kind": origin.kind(),
            "installable_name": origin.installable_name(),
            "source": origin.source(),
            "value": origin.to_string(),
        })),
    );
}

fn record_json(record: &TrackedPackage) -> serde_json::Value {
    serde_json::to_value(record).unwrap_or(serde_json::Value::Null)
}

fn list_tracked(session: &Session) {
    let records = session.store().list();

    if get_output_format() == OutputFormat::Json {
        emit_json(&serde_json::Value::Array(
            records.into_iter().map(record_json).collect(),
        ));
        return;
    }

    if records.is_empty() {
        emit(
            Level::Info,
            "package.track.empty",
            "No packages are tracked yet",
            None,
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Package", "Source", "Category", "Method", "Installed"]);
    for record in &records {
        table.add_row(vec![
            record.name.as_str(),
            record.source.as_str(),
            record.category.as_str(),
            record.install_method.as_str(),
            record.installed_at.as_str(),
        ]);
    }
    println!("{table}");

    let metadata = session.store().metadata();
    println!(
        "{} tracked package(s) in {} (last updated {})",
        records.len(),
        session.store().path().display(),
        metadata.last_updated
    );
}

fn show_tracked(session: &Session, name: &str) -> Result<()> {
    let Some(record) = session.store().get(name) else {
        bail!("'{}' is not tracked", name);
    };

    if get_output_format() == OutputFormat::Json {
        emit_json(&record_json(record));
        return Ok(());
    }

    println!("{}", record.name.bold());
    separator();
    println!("  {:<16} {}", "Source:", record.source.cyan());
    println!("  {:<16} {}", "Installed as:", record.mapped_name);
    println!("  {:<16} {}", "Generic name:", record.original_name);
    println!("  {:<16} {}", "Category:", record.category);
    println!("  {:<16} {}", "Method:", record.install_method);
    println!("  {:<16} {}", "Installed at:", record.installed_at);

    let configured = session.configured_origin(&record.original_name);
    if configured.to_string() != record.origin().map(|o| o.to_string()).unwrap_or_default() {
        println!(
            "  {:<16} {}",
            "Configured:",
            format!("{} (migration pending)", configured).yellow()
        );
    }
    Ok(())
}

fn untrack(session: &mut Session, name: &str) -> Result<()> {
    if session.store_mut().untrack(name)? {
        emit(
            Level::Success,
            "package.track.removed",
            &format!("Stopped tracking {}", name),
            None,
        );
    } else {
        emit(
            Level::Warn,
            "package.track.not_found",
            &format!("'{}' was not tracked", name),
            None,
        );
    }
    Ok(())
}

fn migrate_check(session: &Session) {
    let plan = session.migration_plan();
    if plan.is_empty() {
        emit(
            Level::Success,
            "package.migrate.none",
            "All tracked packages match their configured sources",
            None,
        );
        return;
    }
    super::migration::print_plan(&plan);
}

fn migrate_run(session: &mut Session, yes: bool) -> Result<()> {
    let plan = session.migration_plan();
    let skip_prompt = yes || session.settings().assume_yes || session.is_dry_run();

    if !skip_prompt && !plan.is_empty() && get_output_format() == OutputFormat::Json {
        bail!("Refusing to migrate without confirmation in JSON mode; pass --yes");
    }

    let summary = session.run_migrations(&plan, |plan: &[PlanEntry]| {
        if skip_prompt {
            return Ok(true);
        }
        Ok(Confirm::new()
            .with_prompt(format!("Migrate {} package(s)?", plan.len()))
            .default(false)
            .interact()?)
    })?;

    if !summary.cancelled && !summary.success() {
        let mut failed = summary.rolled_back.clone();
        failed.extend(summary.failed.iter().cloned());
        bail!("Migration incomplete for: {}", failed.join(", "));
    }
    Ok(())
}
