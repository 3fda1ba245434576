//! Package source resolution, installation routing and provenance tracking.
//!
//! # Architecture
//!
//! - [`Resolver`](resolver::Resolver): generic name -> [`Origin`](origin::Origin) for the current distribution
//! - [`Router`](router::Router): installs a resolved batch, one call per bucket
//! - [`ProvenanceStore`](tracking::ProvenanceStore): which origin each installed package came from
//! - [`MigrationEngine`](migration::MigrationEngine): moves tracked packages when their configured origin changes
//!
//! Every command goes through an [`Executor`](executor::Executor), so the
//! whole engine runs against a recording fake in tests.
//!
//! # Mapping values
//!
//! ```toml
//! [mapping.fedora]
//! starship = "COPR:atim/starship"           # enable atim/starship, install starship
//! tool = "COPR:user/repo:tool-bin"          # explicit package name
//!
//! [mapping.arch]
//! vscode = "AUR:visual-studio-code-bin"
//!
//! [mapping.debian]
//! fd = "fd-find"                            # plain rename
//! neovim = "PPA:neovim-ppa/unstable:neovim"
//! spotify = "FLATPAK:flathub:com.spotify.Client"
//! ```

pub mod cli;
mod error;
pub mod executor;
pub mod manager;
pub mod mapping;
pub mod migration;
pub mod origin;
pub mod resolver;
pub mod router;
pub mod session;
pub mod tracking;

pub use error::PackageError;
pub use session::SessionOptions;
