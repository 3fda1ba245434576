mod common;
mod package;
mod ui;

use clap::Parser;
use std::io::IsTerminal;
use std::str::FromStr;

use crate::common::Distro;
use crate::package::SessionOptions;
use crate::package::cli::{PackageCommands, handle_package_command};
use crate::ui::prelude::*;

/// Distribution-aware package installer with source tracking
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,

    /// Print the commands that would run without executing them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Act as this distribution instead of detecting it (e.g. fedora, ubuntu, manjaro)
    #[arg(long, value_parser = Distro::from_str, global = true)]
    distro: Option<Distro>,

    #[command(subcommand)]
    command: PackageCommands,
}

fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, std::io::stdout().is_terminal());
    ui::set_debug_mode(cli.debug);

    let options = SessionOptions {
        distro: cli.distro,
        dry_run: cli.dry_run,
    };

    if let Err(err) = handle_package_command(cli.command, &options) {
        emit(Level::Error, "distropkg.error", &format!("{:#}", err), None);
        std::process::exit(1);
    }
}
